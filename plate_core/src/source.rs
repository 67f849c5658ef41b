use std::collections::HashSet;
use std::fmt;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use derive_more::Display;
use futures::StreamExt;
use futures::stream;
use futures::stream::BoxStream;
use globset::GlobBuilder;
use ignore::WalkBuilder;

use crate::PlateError;
use crate::PlateResult;

/// Characters that start a glob token. The pattern is walked from the
/// directory made of the components before the first one containing any of
/// these.
const GLOB_META: [char; 4] = ['*', '?', '[', '{'];

/// The lazy chunk sequence of a document's text.
pub type ChunkStream = BoxStream<'static, PlateResult<String>>;

/// Declared type of a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
pub enum ContentType {
	#[display("json")]
	Json,
	#[display("yaml")]
	Yaml,
	#[display("{_0}")]
	Other(String),
}

impl ContentType {
	/// Content type for a bare extension (`json`, `yaml` or `yml`).
	pub fn from_extension(extension: &str) -> Option<Self> {
		match extension.to_ascii_lowercase().as_str() {
			"json" => Some(Self::Json),
			"yaml" | "yml" => Some(Self::Yaml),
			_ => None,
		}
	}

	pub fn from_path(path: &Path) -> Option<Self> {
		path.extension()
			.and_then(|extension| extension.to_str())
			.and_then(Self::from_extension)
	}
}

/// A document waiting to be rendered.
pub struct InputEntry {
	pub path: PathBuf,
	pub content_type: ContentType,
	pub contents: ChunkStream,
}

impl fmt::Debug for InputEntry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("InputEntry")
			.field("path", &self.path)
			.field("content_type", &self.content_type)
			.finish_non_exhaustive()
	}
}

impl InputEntry {
	/// An entry backed by a file on disk. Nothing is read until the contents
	/// are polled.
	pub fn from_file(path: PathBuf, content_type: ContentType) -> Self {
		let read_path = path.clone();
		let contents = stream::once(async move {
			tokio::fs::read_to_string(&read_path)
				.await
				.map_err(|e| PlateError::file_io(&read_path, e))
		})
		.boxed();

		Self {
			path,
			content_type,
			contents,
		}
	}

	/// An entry made of in-memory text chunks.
	pub fn from_chunks<I>(path: impl Into<PathBuf>, content_type: ContentType, chunks: I) -> Self
	where
		I: IntoIterator,
		I::Item: Into<String>,
	{
		let chunks: Vec<PlateResult<String>> = chunks.into_iter().map(|c| Ok(c.into())).collect();

		Self {
			path: path.into(),
			content_type,
			contents: stream::iter(chunks).boxed(),
		}
	}
}

/// A rendered document. The text is produced lazily as the contents are
/// polled.
pub struct OutputEntry {
	pub path: PathBuf,
	pub content_type: ContentType,
	pub contents: ChunkStream,
}

impl fmt::Debug for OutputEntry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("OutputEntry")
			.field("path", &self.path)
			.field("content_type", &self.content_type)
			.finish_non_exhaustive()
	}
}

impl OutputEntry {
	pub fn from_chunks<I>(path: impl Into<PathBuf>, content_type: ContentType, chunks: I) -> Self
	where
		I: IntoIterator,
		I::Item: Into<String>,
	{
		let input = InputEntry::from_chunks(path, content_type, chunks);

		Self {
			path: input.path,
			content_type: input.content_type,
			contents: input.contents,
		}
	}
}

#[derive(Debug, Clone, Default)]
pub struct DiscoverOptions {
	/// Content type used for files whose extension is not recognized. When
	/// `None` such files are an error.
	pub unknown_extension: Option<ContentType>,
}

/// Find every file matching the glob `pattern`.
///
/// Relative patterns are resolved against `cwd`. `*` does not cross
/// directory boundaries while `**` does. Hidden files and directories are
/// skipped. Returned paths are absolute and unique, in walk order.
pub fn discover(pattern: &str, cwd: &Path, options: &DiscoverOptions) -> PlateResult<Vec<InputEntry>> {
	let trimmed = pattern.strip_prefix("./").unwrap_or(pattern);
	let is_absolute = Path::new(trimmed).is_absolute();

	let matcher = GlobBuilder::new(trimmed)
		.literal_separator(true)
		.build()
		.map_err(|e| {
			PlateError::InvalidPattern {
				pattern: pattern.to_string(),
				reason: e.kind().to_string(),
			}
		})?
		.compile_matcher();

	let prefix = literal_prefix(trimmed);
	let walk_root = if is_absolute {
		prefix
	} else {
		cwd.join(prefix)
	};

	if !walk_root.exists() {
		tracing::debug!(pattern, root = %walk_root.display(), "pattern root does not exist");
		return Ok(Vec::new());
	}

	let mut seen = HashSet::new();
	let mut entries = Vec::new();
	let walker = WalkBuilder::new(&walk_root)
		.standard_filters(false)
		.hidden(true)
		.build();

	for result in walker {
		let entry = result.map_err(|e| {
			PlateError::FileIo {
				path: walk_root.display().to_string(),
				source: std::io::Error::other(e.to_string()),
			}
		})?;

		if !entry.file_type().is_some_and(|file_type| file_type.is_file()) {
			continue;
		}

		let path = entry.into_path();
		let candidate = if is_absolute {
			path.as_path()
		} else {
			path.strip_prefix(cwd).unwrap_or(&path)
		};

		if !matcher.is_match(candidate) || !seen.insert(path.clone()) {
			continue;
		}

		let content_type = content_type_for(&path, options)?;
		entries.push(InputEntry::from_file(path, content_type));
	}

	tracing::debug!(pattern, count = entries.len(), "discovered input files");
	Ok(entries)
}

fn content_type_for(path: &Path, options: &DiscoverOptions) -> PlateResult<ContentType> {
	if let Some(content_type) = ContentType::from_path(path) {
		return Ok(content_type);
	}

	let extension = path
		.extension()
		.and_then(|extension| extension.to_str())
		.unwrap_or("")
		.to_string();

	match &options.unknown_extension {
		Some(fallback) => {
			tracing::warn!(
				path = %path.display(),
				extension = %extension,
				fallback = %fallback,
				"unknown file extension, using fallback content type"
			);
			Ok(fallback.clone())
		}
		None => {
			Err(PlateError::UnknownExtension {
				path: path.display().to_string(),
				extension,
			})
		}
	}
}

/// The leading components of `pattern` that contain no glob syntax.
fn literal_prefix(pattern: &str) -> PathBuf {
	let mut prefix = PathBuf::new();

	for component in Path::new(pattern).components() {
		let literal = match component {
			Component::Normal(part) => {
				part.to_str()
					.is_some_and(|part| !part.contains(GLOB_META))
			}
			_ => true,
		};

		if !literal {
			break;
		}

		prefix.push(component);
	}

	prefix
}
