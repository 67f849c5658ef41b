use std::fmt;
use std::future::Future;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use derive_more::Deref;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Map;
use serde_json::Number;
use serde_json::Value;
use tokio::process::Command;

use crate::PlateError;
use crate::PlateResult;

/// Context files looked up in the working directory when no context source
/// is configured, in discovery order.
pub const CONTEXT_FILE_CANDIDATES: [&str; 4] = [
	"plate.context.json",
	"plate.context.yaml",
	"plate.context.yml",
	"plate.context.toml",
];

/// The frozen evaluation context shared by every placeholder of a run.
///
/// Cloning is cheap; the underlying mapping is never mutated once built.
#[derive(Debug, Clone, Default, Deref)]
#[deref(forward)]
pub struct Context(Arc<Map<String, Value>>);

impl Context {
	pub fn new(values: Map<String, Value>) -> Self {
		Self(Arc::new(values))
	}

	pub fn as_map(&self) -> &Map<String, Value> {
		&self.0
	}
}

impl From<Map<String, Value>> for Context {
	fn from(values: Map<String, Value>) -> Self {
		Self::new(values)
	}
}

/// A zero-argument asynchronous context producer.
pub type ContextLoader = Box<dyn FnOnce() -> BoxFuture<'static, PlateResult<Value>> + Send>;

/// Where the evaluation context comes from.
#[derive(Default)]
#[non_exhaustive]
pub enum ContextSource {
	/// No context at all.
	#[default]
	Empty,
	/// An already built mapping.
	Inline(Map<String, Value>),
	/// A data file. The format defaults to the file extension.
	File {
		path: PathBuf,
		format: Option<String>,
	},
	/// A shell command whose stdout is parsed with `format` (default `json`).
	Command {
		command: String,
		format: Option<String>,
	},
	/// A function producing the context.
	Loader(ContextLoader),
}

impl fmt::Debug for ContextSource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Empty => f.write_str("Empty"),
			Self::Inline(map) => f.debug_tuple("Inline").field(map).finish(),
			Self::File { path, format } => {
				f.debug_struct("File")
					.field("path", path)
					.field("format", format)
					.finish()
			}
			Self::Command { command, format } => {
				f.debug_struct("Command")
					.field("command", command)
					.field("format", format)
					.finish()
			}
			Self::Loader(_) => f.write_str("Loader(..)"),
		}
	}
}

impl ContextSource {
	/// Wrap an async function as a context source.
	pub fn loader<F, Fut>(load: F) -> Self
	where
		F: FnOnce() -> Fut + Send + 'static,
		Fut: Future<Output = PlateResult<Value>> + Send + 'static,
	{
		Self::Loader(Box::new(move || load().boxed()))
	}

	/// Use the first context file found in `cwd`, or no context at all.
	pub fn discover(cwd: &Path) -> Self {
		CONTEXT_FILE_CANDIDATES
			.iter()
			.map(|candidate| cwd.join(candidate))
			.find(|path| path.is_file())
			.map_or(Self::Empty, |path| {
				Self::File { path, format: None }
			})
	}
}

/// Resolve a context source into a frozen [`Context`].
///
/// A missing, empty or `null` value resolves to an empty context, a mapping
/// becomes the context, and anything else is rejected.
pub async fn resolve_context(source: ContextSource, cwd: &Path) -> PlateResult<Context> {
	let value = match source {
		ContextSource::Empty => Value::Null,
		ContextSource::Inline(map) => Value::Object(map),
		ContextSource::File { path, format } => {
			let abs_path = cwd.join(&path);
			let display = path.display().to_string();
			let content = tokio::fs::read_to_string(&abs_path).await.map_err(|e| {
				PlateError::ContextFile {
					path: display.clone(),
					reason: e.to_string(),
				}
			})?;
			let format = format
				.as_deref()
				.map(str::trim)
				.filter(|value| !value.is_empty())
				.map(str::to_ascii_lowercase)
				.unwrap_or_else(|| {
					abs_path
						.extension()
						.and_then(|e| e.to_str())
						.unwrap_or("")
						.to_ascii_lowercase()
				});
			parse_context_data(&content, &format, &display)?
		}
		ContextSource::Command { command, format } => {
			let stdout = execute_command(cwd, &command).await?;
			let format = format
				.as_deref()
				.map(str::trim)
				.filter(|value| !value.is_empty())
				.map_or_else(|| "json".to_string(), str::to_ascii_lowercase);
			parse_context_data(&stdout, &format, &command)?
		}
		ContextSource::Loader(load) => load().await?,
	};

	let context = context_from_value(value)?;
	tracing::debug!(keys = context.len(), "resolved evaluation context");
	Ok(context)
}

fn context_from_value(value: Value) -> PlateResult<Context> {
	match value {
		Value::Null => Ok(Context::default()),
		Value::Object(map) => Ok(Context::new(map)),
		Value::Bool(_) => Err(PlateError::ContextShape {
			found: "a boolean".to_string(),
		}),
		Value::Number(_) => Err(PlateError::ContextShape {
			found: "a number".to_string(),
		}),
		Value::String(_) => Err(PlateError::ContextShape {
			found: "a string".to_string(),
		}),
		Value::Array(_) => Err(PlateError::ContextShape {
			found: "a sequence".to_string(),
		}),
	}
}

async fn execute_command(cwd: &Path, command: &str) -> PlateResult<String> {
	let mut process = if cfg!(windows) {
		let mut process = Command::new("cmd");
		process.arg("/C").arg(command);
		process
	} else {
		let mut process = Command::new("sh");
		process.arg("-c").arg(command);
		process
	};

	let output = process
		.current_dir(cwd)
		.kill_on_drop(true)
		.output()
		.await
		.map_err(|e| {
			PlateError::ContextScript {
				command: command.to_string(),
				reason: e.to_string(),
			}
		})?;

	if !output.status.success() {
		let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
		let reason = if stderr.is_empty() {
			format!(
				"command exited with status {}",
				output
					.status
					.code()
					.map_or_else(|| "unknown".to_string(), |code| code.to_string())
			)
		} else {
			stderr
		};

		return Err(PlateError::ContextScript {
			command: command.to_string(),
			reason,
		});
	}

	Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Parse context data into a `serde_json::Value` based on its format. Blank
/// content is treated as no context.
pub fn parse_context_data(content: &str, format: &str, path_display: &str) -> PlateResult<Value> {
	if content.trim().is_empty() {
		return Ok(Value::Null);
	}

	let context_error = |reason: String| {
		PlateError::ContextFile {
			path: path_display.to_string(),
			reason,
		}
	};

	match format {
		"json" => serde_json::from_str(content).map_err(|e| context_error(e.to_string())),
		"yaml" | "yml" => {
			serde_yaml_ng::from_str(content).map_err(|e| context_error(e.to_string()))
		}
		"toml" => {
			let toml_value: toml::Value =
				toml::from_str(content).map_err(|e| context_error(e.to_string()))?;
			toml_to_json(toml_value, path_display)
		}
		"kdl" => {
			let doc: kdl::KdlDocument = content
				.parse()
				.map_err(|e: kdl::KdlError| context_error(e.to_string()))?;
			kdl_document_to_value(&doc, path_display)
		}
		"ini" => serde_ini::from_str(content).map_err(|e| context_error(e.to_string())),
		other => Err(PlateError::UnsupportedContextFormat(other.to_string())),
	}
}

fn float_to_json(value: f64, path_display: &str) -> PlateResult<Value> {
	Number::from_f64(value).map(Value::Number).ok_or_else(|| {
		PlateError::UnconvertibleFloat {
			path: path_display.to_string(),
			value: value.to_string(),
		}
	})
}

/// Convert a `toml::Value` to a `serde_json::Value`.
fn toml_to_json(value: toml::Value, path_display: &str) -> PlateResult<Value> {
	let json = match value {
		toml::Value::String(s) => Value::String(s),
		toml::Value::Integer(i) => Value::Number(Number::from(i)),
		toml::Value::Float(f) => float_to_json(f, path_display)?,
		toml::Value::Boolean(b) => Value::Bool(b),
		toml::Value::Datetime(dt) => Value::String(dt.to_string()),
		toml::Value::Array(arr) => {
			let items: PlateResult<Vec<Value>> = arr
				.into_iter()
				.map(|v| toml_to_json(v, path_display))
				.collect();
			Value::Array(items?)
		}
		toml::Value::Table(table) => {
			let mut map = Map::new();
			for (k, v) in table {
				map.insert(k, toml_to_json(v, path_display)?);
			}
			Value::Object(map)
		}
	};

	Ok(json)
}

/// Convert a KDL document to a `serde_json::Value`.
fn kdl_document_to_value(doc: &kdl::KdlDocument, path_display: &str) -> PlateResult<Value> {
	let mut map = Map::new();

	for node in doc.nodes() {
		let name = node.name().value().to_string();
		let value = kdl_node_to_value(node, path_display)?;
		map.insert(name, value);
	}

	Ok(Value::Object(map))
}

/// Convert a KDL node to a `serde_json::Value`.
fn kdl_node_to_value(node: &kdl::KdlNode, path_display: &str) -> PlateResult<Value> {
	// Children make the node an object.
	if let Some(children) = node.children() {
		return kdl_document_to_value(children, path_display);
	}

	let entries: Vec<&kdl::KdlEntry> = node.entries().iter().collect();

	if entries.is_empty() {
		return Ok(Value::Null);
	}

	if entries.len() == 1 && entries[0].name().is_none() {
		return kdl_entry_value_to_json(entries[0].value(), path_display);
	}

	if entries.iter().all(|e| e.name().is_some()) {
		let mut map = Map::new();
		for entry in &entries {
			if let Some(name) = entry.name() {
				map.insert(
					name.value().to_string(),
					kdl_entry_value_to_json(entry.value(), path_display)?,
				);
			}
		}
		return Ok(Value::Object(map));
	}

	let values: PlateResult<Vec<Value>> = entries
		.iter()
		.map(|e| kdl_entry_value_to_json(e.value(), path_display))
		.collect();
	Ok(Value::Array(values?))
}

/// Convert a KDL entry value to a `serde_json::Value`.
fn kdl_entry_value_to_json(value: &kdl::KdlValue, path_display: &str) -> PlateResult<Value> {
	match value {
		kdl::KdlValue::String(s) => Ok(Value::String(s.clone())),
		kdl::KdlValue::Integer(i) => {
			match i64::try_from(*i) {
				Ok(small) => Ok(Value::Number(Number::from(small))),
				Err(_) => float_to_json(*i as f64, path_display),
			}
		}
		kdl::KdlValue::Float(f) => float_to_json(*f, path_display),
		kdl::KdlValue::Bool(b) => Ok(Value::Bool(*b)),
		kdl::KdlValue::Null => Ok(Value::Null),
	}
}
