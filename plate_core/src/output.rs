use std::collections::HashMap;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use futures::TryStreamExt;
use futures::stream::BoxStream;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::sync::OnceCell;

use crate::ContentType;
use crate::OutputEntry;
use crate::PlateError;
use crate::PlateResult;
use crate::YAML_DOCUMENT_SEPARATOR;

/// Default bound on simultaneously open destination files.
pub const DEFAULT_MAX_OPEN_FILES: usize = 5;

/// A stream of rendered documents in encounter order.
pub type EntryStream = BoxStream<'static, PlateResult<OutputEntry>>;

/// Where rendered documents are written.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputTarget {
	/// Mirror every source path under `root`. Paths are made relative to
	/// `base_dir` when set, otherwise to the working directory.
	Directory {
		root: PathBuf,
		base_dir: Option<PathBuf>,
	},
	/// Concatenate every YAML document into a single file.
	File(PathBuf),
	/// Concatenate every document onto standard output.
	#[default]
	Stdout,
}

#[derive(Debug, Clone)]
pub struct WriteOptions {
	/// Maximum number of destination files open at once in directory mode.
	/// Values below 1 are treated as 1.
	pub max_open_files: usize,
	/// Directory relative paths are resolved against.
	pub cwd: PathBuf,
}

impl Default for WriteOptions {
	fn default() -> Self {
		Self {
			max_open_files: DEFAULT_MAX_OPEN_FILES,
			cwd: PathBuf::from("."),
		}
	}
}

/// What a write run produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
	/// Documents consumed from the stream.
	pub documents: usize,
	/// Files created on disk.
	pub files_written: usize,
	/// Directories created on disk.
	pub directories_created: usize,
	/// Highest number of destination files open at the same time.
	pub peak_concurrency: usize,
}

/// Write every entry of `entries` to `target`.
pub async fn write_output(
	entries: EntryStream,
	target: &OutputTarget,
	options: &WriteOptions,
) -> PlateResult<WriteSummary> {
	let summary = match target {
		OutputTarget::Directory { root, base_dir } => {
			write_directory(entries, root, base_dir.as_deref(), options).await?
		}
		OutputTarget::File(path) => write_combined_file(entries, &options.cwd.join(path)).await?,
		OutputTarget::Stdout => {
			let mut stdout = tokio::io::stdout();
			write_concatenated(entries, &mut stdout).await?
		}
	};

	tracing::info!(
		documents = summary.documents,
		files = summary.files_written,
		directories = summary.directories_created,
		"finished writing output"
	);

	Ok(summary)
}

/// Compute where `file` lands below `root`.
///
/// All paths are resolved lexically against `cwd`. With a `base_dir` the
/// destination mirrors the path of `file` relative to it, and a file outside
/// of it is a [`PlateError::PathSafety`] error. Without one, the path is
/// made relative to `cwd` and any leading `..` segments are dropped.
pub fn destination_path(
	root: &Path,
	file: &Path,
	base_dir: Option<&Path>,
	cwd: &Path,
) -> PlateResult<PathBuf> {
	let cwd = normalize(cwd);
	let root = normalize(&cwd.join(root));
	let file = normalize(&cwd.join(file));

	let relative = match base_dir {
		Some(base_dir) => {
			let base_dir = normalize(&cwd.join(base_dir));
			file.strip_prefix(&base_dir)
				.map_err(|_| {
					PlateError::PathSafety {
						file: file.display().to_string(),
						base_dir: base_dir.display().to_string(),
					}
				})?
				.to_path_buf()
		}
		None => strip_common_prefix(&file, &cwd),
	};

	let relative: PathBuf = relative
		.components()
		.filter(|component| matches!(component, Component::Normal(_)))
		.collect();

	Ok(root.join(relative))
}

/// Resolve `.` and `..` segments without touching the file system.
fn normalize(path: &Path) -> PathBuf {
	let mut normalized = PathBuf::new();

	for component in path.components() {
		match component {
			Component::CurDir => {}
			Component::ParentDir => {
				normalized.pop();
			}
			other => normalized.push(other),
		}
	}

	normalized
}

/// The components of `path` after the longest prefix it shares with `base`.
fn strip_common_prefix(path: &Path, base: &Path) -> PathBuf {
	let shared = path
		.components()
		.zip(base.components())
		.take_while(|(a, b)| a == b)
		.count();

	path.components().skip(shared).collect()
}

/// Shared state of one directory-mode run.
struct DirectoryWriter<'a> {
	root: &'a Path,
	base_dir: Option<&'a Path>,
	cwd: &'a Path,
	barriers: Mutex<HashMap<PathBuf, Arc<OnceCell<()>>>>,
	open_files: AtomicUsize,
	peak: AtomicUsize,
	files_written: AtomicUsize,
	directories_created: AtomicUsize,
}

/// Releases a write slot when dropped, including on error.
struct OpenSlot<'a>(&'a AtomicUsize);

impl Drop for OpenSlot<'_> {
	fn drop(&mut self) {
		self.0.fetch_sub(1, Ordering::SeqCst);
	}
}

impl DirectoryWriter<'_> {
	fn acquire_slot(&self) -> OpenSlot<'_> {
		let open = self.open_files.fetch_add(1, Ordering::SeqCst) + 1;
		self.peak.fetch_max(open, Ordering::SeqCst);
		OpenSlot(&self.open_files)
	}

	/// Create `dir` exactly once. Concurrent callers for the same directory
	/// wait until the first one has finished creating it.
	async fn ensure_directory(&self, dir: &Path) -> PlateResult<()> {
		let barrier = {
			let mut barriers = self.barriers.lock().await;
			Arc::clone(barriers.entry(dir.to_path_buf()).or_default())
		};

		barrier
			.get_or_try_init(|| {
				async {
					tokio::fs::create_dir_all(dir)
						.await
						.map_err(|e| PlateError::file_io(dir, e))?;
					self.directories_created.fetch_add(1, Ordering::SeqCst);
					tracing::debug!(path = %dir.display(), "created output directory");
					Ok::<(), PlateError>(())
				}
			})
			.await?;

		Ok(())
	}

	async fn write_entry(&self, entry: OutputEntry) -> PlateResult<()> {
		let _slot = self.acquire_slot();
		let destination = destination_path(self.root, &entry.path, self.base_dir, self.cwd)?;

		if let Some(parent) = destination.parent() {
			self.ensure_directory(parent).await?;
		}

		let mut file = tokio::fs::File::create(&destination)
			.await
			.map_err(|e| PlateError::file_io(&destination, e))?;
		let mut contents = entry.contents;

		while let Some(chunk) = contents.try_next().await? {
			file.write_all(chunk.as_bytes())
				.await
				.map_err(|e| PlateError::file_io(&destination, e))?;
		}

		file.flush()
			.await
			.map_err(|e| PlateError::file_io(&destination, e))?;
		self.files_written.fetch_add(1, Ordering::SeqCst);
		tracing::debug!(
			source = %entry.path.display(),
			destination = %destination.display(),
			"wrote file"
		);

		Ok(())
	}
}

/// Write each entry to its mirrored path below `root`, with at most
/// `options.max_open_files` files open at once.
pub async fn write_directory(
	entries: EntryStream,
	root: &Path,
	base_dir: Option<&Path>,
	options: &WriteOptions,
) -> PlateResult<WriteSummary> {
	let writer = DirectoryWriter {
		root,
		base_dir,
		cwd: &options.cwd,
		barriers: Mutex::new(HashMap::new()),
		open_files: AtomicUsize::new(0),
		peak: AtomicUsize::new(0),
		files_written: AtomicUsize::new(0),
		directories_created: AtomicUsize::new(0),
	};
	let writer = &writer;

	entries
		.try_for_each_concurrent(options.max_open_files.max(1), move |entry| {
			writer.write_entry(entry)
		})
		.await?;

	let files_written = writer.files_written.load(Ordering::SeqCst);

	Ok(WriteSummary {
		documents: files_written,
		files_written,
		directories_created: writer.directories_created.load(Ordering::SeqCst),
		peak_concurrency: writer.peak.load(Ordering::SeqCst),
	})
}

async fn write_combined_file(entries: EntryStream, path: &Path) -> PlateResult<WriteSummary> {
	let mut directories_created = 0;

	if let Some(parent) = path.parent() {
		let exists = tokio::fs::try_exists(parent)
			.await
			.map_err(|e| PlateError::file_io(parent, e))?;

		if !exists {
			tokio::fs::create_dir_all(parent)
				.await
				.map_err(|e| PlateError::file_io(parent, e))?;
			directories_created = 1;
			tracing::debug!(path = %parent.display(), "created output directory");
		}
	}

	let mut file = tokio::fs::File::create(path)
		.await
		.map_err(|e| PlateError::file_io(path, e))?;
	let summary = write_combined(entries, &mut file).await?;
	tracing::debug!(path = %path.display(), documents = summary.documents, "wrote combined file");

	Ok(WriteSummary {
		files_written: 1,
		directories_created,
		..summary
	})
}

/// Concatenate YAML documents into `writer` in encounter order.
///
/// Every document after the first is preceded by a `---` line, and a
/// non-empty document that does not end with a newline gets one so the
/// separator always starts its own line. Any non-YAML entry fails with
/// [`PlateError::NotCombinable`].
pub async fn write_combined<W>(mut entries: EntryStream, writer: &mut W) -> PlateResult<WriteSummary>
where
	W: AsyncWrite + Unpin + Send,
{
	let mut summary = WriteSummary::default();

	while let Some(entry) = entries.try_next().await? {
		if entry.content_type != ContentType::Yaml {
			return Err(PlateError::NotCombinable {
				path: entry.path.display().to_string(),
				content_type: entry.content_type.to_string(),
			});
		}

		if summary.documents > 0 {
			writer
				.write_all(YAML_DOCUMENT_SEPARATOR.as_bytes())
				.await?;
		}

		let mut contents = entry.contents;
		let mut ends_with_newline = true;

		while let Some(chunk) = contents.try_next().await? {
			if chunk.is_empty() {
				continue;
			}

			ends_with_newline = chunk.ends_with('\n');
			writer.write_all(chunk.as_bytes()).await?;
		}

		if !ends_with_newline {
			writer.write_all(b"\n").await?;
		}

		summary.documents += 1;
	}

	writer.flush().await?;
	Ok(summary)
}

/// Concatenate every document into `writer` exactly as rendered.
pub async fn write_concatenated<W>(mut entries: EntryStream, writer: &mut W) -> PlateResult<WriteSummary>
where
	W: AsyncWrite + Unpin + Send,
{
	let mut summary = WriteSummary::default();

	while let Some(entry) = entries.try_next().await? {
		let mut contents = entry.contents;

		while let Some(chunk) = contents.try_next().await? {
			writer.write_all(chunk.as_bytes()).await?;
		}

		summary.documents += 1;
	}

	writer.flush().await?;
	Ok(summary)
}
