use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use futures::TryStreamExt;
use futures::stream;
use serde::Deserialize;

use crate::ContentType;
use crate::Context;
use crate::Document;
use crate::ExpressionEvaluator;
use crate::InputEntry;
use crate::LeafScope;
use crate::OutputEntry;
use crate::PlateError;
use crate::PlateResult;
use crate::TraverseAction;
use crate::placeholder_expression;
use crate::traverse_and_mutate;

/// Separator line between YAML sub-documents.
pub const YAML_DOCUMENT_SEPARATOR: &str = "---\n";

/// Renders whole documents: parse, evaluate every placeholder, serialize.
#[derive(Clone)]
pub struct Renderer {
	evaluator: Arc<dyn ExpressionEvaluator>,
	context: Context,
}

impl std::fmt::Debug for Renderer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Renderer")
			.field("context", &self.context)
			.finish_non_exhaustive()
	}
}

impl Renderer {
	pub fn new(evaluator: Arc<dyn ExpressionEvaluator>, context: Context) -> Self {
		Self { evaluator, context }
	}

	pub fn context(&self) -> &Context {
		&self.context
	}

	/// Render the complete text of one document.
	pub fn render(&self, path: &Path, content_type: &ContentType, text: &str) -> PlateResult<String> {
		let rendered = match content_type {
			ContentType::Yaml => self.render_yaml(path, text)?,
			ContentType::Json => self.render_json(path, text)?,
			ContentType::Other(other) => {
				return Err(PlateError::UnsupportedContentType {
					path: path.display().to_string(),
					content_type: other.clone(),
				});
			}
		};

		tracing::debug!(path = %path.display(), %content_type, "rendered document");
		Ok(rendered)
	}

	/// Wrap an input entry into its rendered output entry.
	///
	/// Nothing happens until the output contents are polled: then every input
	/// chunk is buffered and the full text is rendered at once.
	pub fn render_entry(&self, entry: InputEntry) -> OutputEntry {
		let InputEntry {
			path,
			content_type,
			contents,
		} = entry;
		let renderer = self.clone();
		let source_path = path.clone();
		let source_type = content_type.clone();

		let rendered = stream::once(async move {
			let text = contents
				.try_fold(String::new(), |mut text, chunk| {
					async move {
						text.push_str(&chunk);
						Ok(text)
					}
				})
				.await?;

			renderer.render(&source_path, &source_type, &text)
		})
		.boxed();

		OutputEntry {
			path,
			content_type,
			contents: rendered,
		}
	}

	fn render_yaml(&self, path: &Path, text: &str) -> PlateResult<String> {
		let source: Arc<str> = Arc::from(text);
		let display = path.display().to_string();
		let mut parts = Vec::new();

		for sub_document in serde_yaml_ng::Deserializer::from_str(text) {
			let value =
				serde_yaml_ng::Value::deserialize(sub_document).map_err(|e| yaml_error(&display, &e))?;
			let mut document = Document::from_yaml(value, &display)?;

			// Empty sub-documents keep their slot so separators round-trip.
			if document.is_null() {
				parts.push(String::new());
				continue;
			}

			self.mutate(&mut document, path, &ContentType::Yaml, &source)?;
			let rendered = serde_yaml_ng::to_string(&document.view())
				.map_err(|e| PlateError::Io(std::io::Error::other(e)))?;
			parts.push(rendered);
		}

		Ok(parts.join(YAML_DOCUMENT_SEPARATOR))
	}

	fn render_json(&self, path: &Path, text: &str) -> PlateResult<String> {
		let value: serde_json::Value = serde_json::from_str(text).map_err(|e| {
			PlateError::Parse {
				path: path.display().to_string(),
				format: "json".to_string(),
				message: e.to_string(),
				line: e.line(),
				column: e.column(),
			}
		})?;

		let source: Arc<str> = Arc::from(text);
		let mut document = Document::from_json(value);
		self.mutate(&mut document, path, &ContentType::Json, &source)?;

		serde_json::to_string_pretty(&document.view()).map_err(|e| PlateError::Io(e.into()))
	}

	fn mutate(
		&self,
		document: &mut Document,
		path: &Path,
		content_type: &ContentType,
		source: &Arc<str>,
	) -> PlateResult<()> {
		traverse_and_mutate(document, |value, visit_path| {
			let Some(expression) = placeholder_expression(value) else {
				return Ok(TraverseAction::Ignore);
			};

			let scope = LeafScope {
				context: &self.context,
				source,
				file: path,
				content_type,
				path: visit_path,
			};

			self.evaluator.evaluate(expression, &scope)
		})
	}
}

fn yaml_error(path: &str, error: &serde_yaml_ng::Error) -> PlateError {
	let (line, column) = error
		.location()
		.map_or((0, 0), |location| (location.line(), location.column()));

	PlateError::Parse {
		path: path.to_string(),
		format: "yaml".to_string(),
		message: error.to_string(),
		line,
		column,
	}
}
