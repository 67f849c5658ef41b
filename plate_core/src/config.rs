use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;

use crate::ContentType;
use crate::ContextSource;
use crate::DEFAULT_MAX_OPEN_FILES;
use crate::PlateError;
use crate::PlateResult;
use crate::UndefinedPolicy;

/// Supported config file locations in discovery order (highest precedence
/// first).
pub const CONFIG_FILE_CANDIDATES: [&str; 3] = ["plate.toml", ".plate.toml", ".config/plate.toml"];

/// Context entry of `plate.toml`.
///
/// A plain string is a data file path:
///
/// ```toml
/// context = "plate.context.yaml"
/// ```
///
/// Typed entries can provide an explicit format:
///
/// ```toml
/// context = { path = "values", format = "json" }
/// ```
///
/// Script-backed entries execute a command and parse its stdout:
///
/// ```toml
/// context = { command = "./scripts/context.sh", format = "yaml" }
/// ```
#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
#[serde(untagged)]
#[non_exhaustive]
pub enum ContextConfig {
	Path(PathBuf),
	Typed(TypedContextConfig),
	Script(ScriptContextConfig),
}

#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
pub struct TypedContextConfig {
	pub path: PathBuf,
	#[serde(default)]
	pub format: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
pub struct ScriptContextConfig {
	pub command: String,
	#[serde(default)]
	pub format: Option<String>,
}

impl ContextConfig {
	/// The context source this entry describes.
	pub fn to_source(&self) -> ContextSource {
		match self {
			Self::Path(path) => {
				ContextSource::File {
					path: path.clone(),
					format: None,
				}
			}
			Self::Typed(typed) => {
				ContextSource::File {
					path: typed.path.clone(),
					format: typed.format.clone(),
				}
			}
			Self::Script(script) => {
				ContextSource::Command {
					command: script.command.clone(),
					format: script.format.clone(),
				}
			}
		}
	}
}

/// Contents of `plate.toml`. Every key is optional.
#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
pub struct PlateConfig {
	#[serde(default)]
	pub context: Option<ContextConfig>,
	/// Maximum number of files open at once in directory mode.
	#[serde(default = "default_max_open_files")]
	pub max_open_files: usize,
	/// Sort inputs by path before rendering.
	#[serde(default)]
	pub sorted: bool,
	#[serde(default)]
	pub undefined: UndefinedPolicy,
	/// Extension (`json` or `yaml`) assumed for files with an unknown
	/// extension.
	#[serde(default)]
	pub unknown_extension: Option<String>,
}

fn default_max_open_files() -> usize {
	DEFAULT_MAX_OPEN_FILES
}

impl Default for PlateConfig {
	fn default() -> Self {
		Self {
			context: None,
			max_open_files: DEFAULT_MAX_OPEN_FILES,
			sorted: false,
			undefined: UndefinedPolicy::default(),
			unknown_extension: None,
		}
	}
}

impl PlateConfig {
	pub fn resolve_path(root: &Path) -> Option<PathBuf> {
		CONFIG_FILE_CANDIDATES
			.iter()
			.map(|candidate| root.join(candidate))
			.find(|path| path.is_file())
	}

	/// Load the first config file found in `root`, if any.
	pub fn load(root: &Path) -> PlateResult<Option<PlateConfig>> {
		let Some(config_path) = Self::resolve_path(root) else {
			return Ok(None);
		};

		let content =
			std::fs::read_to_string(&config_path).map_err(|e| PlateError::file_io(&config_path, e))?;
		let config: PlateConfig =
			toml::from_str(&content).map_err(|e| PlateError::ConfigParse(e.to_string()))?;

		if config.max_open_files == 0 {
			return Err(PlateError::ConfigParse(
				"`max_open_files` must be at least 1".to_string(),
			));
		}

		tracing::debug!(path = %config_path.display(), "loaded config file");
		Ok(Some(config))
	}

	/// The fallback content type for unknown extensions.
	pub fn unknown_extension(&self) -> PlateResult<Option<ContentType>> {
		self.unknown_extension
			.as_deref()
			.map(|extension| {
				ContentType::from_extension(extension).ok_or_else(|| {
					PlateError::ConfigParse(format!(
						"`unknown_extension` must be `json` or `yaml`, found `{extension}`"
					))
				})
			})
			.transpose()
	}
}
