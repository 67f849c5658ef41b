use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use futures::TryStreamExt;
use futures::stream;
use futures::stream::BoxStream;

use crate::ContentType;
use crate::ContextSource;
use crate::DEFAULT_MAX_OPEN_FILES;
use crate::DiscoverOptions;
use crate::EntryStream;
use crate::ExpressionEvaluator;
use crate::InputEntry;
use crate::JinjaEvaluator;
use crate::OutputTarget;
use crate::PlateResult;
use crate::Renderer;
use crate::UndefinedPolicy;
use crate::WriteOptions;
use crate::WriteSummary;
use crate::discover;
use crate::resolve_context;
use crate::write_output;

/// Where the documents to render come from.
pub enum InputSource {
	/// Files matching a glob pattern. With `sorted` every match is collected
	/// and ordered by path before rendering starts.
	Pattern { pattern: String, sorted: bool },
	/// Entries produced by the caller.
	Entries(BoxStream<'static, PlateResult<InputEntry>>),
}

impl fmt::Debug for InputSource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Pattern { pattern, sorted } => {
				f.debug_struct("Pattern")
					.field("pattern", pattern)
					.field("sorted", sorted)
					.finish()
			}
			Self::Entries(_) => f.write_str("Entries(..)"),
		}
	}
}

/// Everything needed for one run.
pub struct PlateOptions {
	pub input: InputSource,
	pub context: ContextSource,
	pub output: OutputTarget,
	pub max_open_files: usize,
	pub undefined: UndefinedPolicy,
	pub unknown_extension: Option<ContentType>,
	/// Directory relative paths are resolved against.
	pub cwd: PathBuf,
	/// Overrides the default [`JinjaEvaluator`].
	pub evaluator: Option<Arc<dyn ExpressionEvaluator>>,
}

impl fmt::Debug for PlateOptions {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PlateOptions")
			.field("input", &self.input)
			.field("context", &self.context)
			.field("output", &self.output)
			.field("max_open_files", &self.max_open_files)
			.field("undefined", &self.undefined)
			.field("unknown_extension", &self.unknown_extension)
			.field("cwd", &self.cwd)
			.finish_non_exhaustive()
	}
}

impl PlateOptions {
	/// Options rendering `input` to stdout with an empty context.
	pub fn new(input: InputSource, cwd: impl Into<PathBuf>) -> Self {
		Self {
			input,
			context: ContextSource::Empty,
			output: OutputTarget::Stdout,
			max_open_files: DEFAULT_MAX_OPEN_FILES,
			undefined: UndefinedPolicy::default(),
			unknown_extension: None,
			cwd: cwd.into(),
			evaluator: None,
		}
	}
}

/// Rendered documents ready to be written, with the destination they were
/// configured for.
pub struct ProcessedInput {
	pub entries: EntryStream,
	pub output: OutputTarget,
	pub write_options: WriteOptions,
}

impl fmt::Debug for ProcessedInput {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ProcessedInput")
			.field("output", &self.output)
			.field("write_options", &self.write_options)
			.finish_non_exhaustive()
	}
}

/// Resolve the context and the inputs, and map every input through the
/// renderer. Documents are rendered lazily as the returned stream is
/// consumed.
pub async fn process_input(options: PlateOptions) -> PlateResult<ProcessedInput> {
	let PlateOptions {
		input,
		context,
		output,
		max_open_files,
		undefined,
		unknown_extension,
		cwd,
		evaluator,
	} = options;

	let context = resolve_context(context, &cwd).await?;
	let evaluator: Arc<dyn ExpressionEvaluator> = match evaluator {
		Some(evaluator) => evaluator,
		None => Arc::new(JinjaEvaluator::new(undefined)),
	};
	let renderer = Renderer::new(evaluator, context);

	let inputs: BoxStream<'static, PlateResult<InputEntry>> = match input {
		InputSource::Pattern { pattern, sorted } => {
			let mut entries = discover(&pattern, &cwd, &DiscoverOptions { unknown_extension })?;

			if sorted {
				entries.sort_by(|a, b| a.path.cmp(&b.path));
			}

			tracing::debug!(pattern = %pattern, sorted, count = entries.len(), "processing input files");
			stream::iter(entries.into_iter().map(Ok)).boxed()
		}
		InputSource::Entries(entries) => entries,
	};

	let entries = inputs
		.map_ok(move |entry| renderer.render_entry(entry))
		.boxed();

	Ok(ProcessedInput {
		entries,
		output,
		write_options: WriteOptions {
			max_open_files: max_open_files.max(1),
			cwd,
		},
	})
}

/// Render every input and write the results to the configured output.
pub async fn evaluate(options: PlateOptions) -> PlateResult<WriteSummary> {
	let processed = process_input(options).await?;
	write_output(processed.entries, &processed.output, &processed.write_options).await
}
