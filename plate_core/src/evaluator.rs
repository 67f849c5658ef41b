use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::OnceLock;

use minijinja::Environment;
use minijinja::UndefinedBehavior;
use minijinja::Value as JinjaValue;
use minijinja::value::Enumerator;
use minijinja::value::Object;
use minijinja::value::ValueKind;
use serde::Deserialize;

use crate::ContentType;
use crate::Context;
use crate::PlateError;
use crate::PlateResult;
use crate::TraverseAction;
use crate::placeholder::spread_target;

/// Names the engine adds to every evaluation scope. They shadow context keys
/// of the same name.
pub const RESERVED_FIELDS: [&str; 6] = [
	"__path",
	"__filename",
	"__dirname",
	"__type",
	"__line",
	"__column",
];

/// Everything an evaluator may need to know about the leaf being rendered.
#[derive(Debug, Clone, Copy)]
pub struct LeafScope<'a> {
	/// The frozen evaluation context.
	pub context: &'a Context,
	/// Full text of the document the leaf was parsed from.
	pub source: &'a Arc<str>,
	/// Path of the document on disk.
	pub file: &'a Path,
	/// Content type of the document.
	pub content_type: &'a ContentType,
	/// Structural path of the leaf, e.g. `.attrs[2].name`.
	pub path: &'a str,
}

/// Evaluates placeholder expressions into traversal actions.
pub trait ExpressionEvaluator: Send + Sync {
	/// Evaluate the raw `expression` (the text between `${` and `}`).
	fn evaluate(&self, expression: &str, scope: &LeafScope<'_>) -> PlateResult<TraverseAction>;
}

/// How references to names missing from the context behave.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UndefinedPolicy {
	/// Any use of an undefined value is an evaluation error.
	Strict,
	/// Undefined values evaluate to undefined, which removes the leaf.
	#[default]
	Lenient,
	/// Like `Lenient`, and attribute access on undefined values is allowed.
	Chainable,
}

impl From<UndefinedPolicy> for UndefinedBehavior {
	fn from(policy: UndefinedPolicy) -> Self {
		match policy {
			UndefinedPolicy::Strict => Self::Strict,
			UndefinedPolicy::Lenient => Self::Lenient,
			UndefinedPolicy::Chainable => Self::Chainable,
		}
	}
}

/// Decides whether an evaluated value may replace a leaf.
pub type AcceptPredicate = Arc<dyn Fn(&JinjaValue) -> bool + Send + Sync>;

/// The default leaf replacement policy: anything except undefined, none and
/// callables.
pub fn accept_by_default(value: &JinjaValue) -> bool {
	!matches!(
		value.kind(),
		ValueKind::Undefined | ValueKind::None | ValueKind::Plain
	)
}

/// [`ExpressionEvaluator`] backed by [`minijinja`] expressions.
///
/// Each evaluation runs in a fresh scope that only exposes the context, the
/// reserved `__*` fields and minijinja's builtin filters, tests and
/// functions.
#[derive(Clone)]
pub struct JinjaEvaluator {
	env: Environment<'static>,
	accept: AcceptPredicate,
}

impl fmt::Debug for JinjaEvaluator {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("JinjaEvaluator")
			.field("env", &self.env)
			.finish_non_exhaustive()
	}
}

impl Default for JinjaEvaluator {
	fn default() -> Self {
		Self::new(UndefinedPolicy::default())
	}
}

impl JinjaEvaluator {
	pub fn new(undefined: UndefinedPolicy) -> Self {
		let mut env = Environment::new();
		env.set_undefined_behavior(undefined.into());

		Self {
			env,
			accept: Arc::new(accept_by_default),
		}
	}

	/// Replace the leaf replacement policy. Rejected values remove the leaf.
	#[must_use]
	pub fn with_accept<F>(mut self, accept: F) -> Self
	where
		F: Fn(&JinjaValue) -> bool + Send + Sync + 'static,
	{
		self.accept = Arc::new(accept);
		self
	}

	fn eval(&self, source: &str, scope: JinjaValue) -> Result<JinjaValue, minijinja::Error> {
		let expression = self.env.compile_expression(source)?;
		expression.eval(scope)
	}
}

impl ExpressionEvaluator for JinjaEvaluator {
	fn evaluate(&self, expression: &str, scope: &LeafScope<'_>) -> PlateResult<TraverseAction> {
		let spread = spread_target(expression);
		let object = ScopeObject {
			context: scope.context.clone(),
			source: Arc::clone(scope.source),
			expression: expression.to_string(),
			file: scope.file.to_path_buf(),
			content_type: scope.content_type.clone(),
			location: OnceLock::new(),
		};

		let evaluation_error = |cause: String| {
			PlateError::Evaluation {
				path: format!("{}{}", scope.file.display(), scope.path),
				expression: expression.trim().to_string(),
				cause,
			}
		};

		let value = self
			.eval(spread.unwrap_or(expression), JinjaValue::from_object(object))
			.map_err(|e| evaluation_error(e.to_string()))?;

		if value.is_undefined() || value.is_none() {
			return Ok(TraverseAction::Remove);
		}

		if spread.is_some() {
			return match value.kind() {
				ValueKind::Seq | ValueKind::Map | ValueKind::Iterable => {
					let values =
						serde_json::to_value(&value).map_err(|e| evaluation_error(e.to_string()))?;
					Ok(TraverseAction::spread(values))
				}
				_ => Ok(TraverseAction::Remove),
			};
		}

		if !(self.accept)(&value) {
			return Ok(TraverseAction::Remove);
		}

		let new_value = serde_json::to_value(&value).map_err(|e| evaluation_error(e.to_string()))?;
		Ok(TraverseAction::Set(new_value))
	}
}

/// 0-based position of an expression in its source document: the number of
/// newlines before it and the character offset within its line. `(0, 0)` is
/// also returned when the expression could not be found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Location {
	pub line: usize,
	pub column: usize,
}

/// Locate the first occurrence of `needle` in `haystack`.
///
/// This is a best-effort lookup: when the parser normalized the expression
/// text (folded whitespace, escapes) it is not found and `(0, 0)` is
/// returned.
pub fn locate(needle: &str, haystack: &str) -> Location {
	let Some(index) = haystack.find(needle) else {
		return Location::default();
	};

	let before = &haystack[..index];
	let line_start = before.rfind('\n').map_or(0, |i| i + 1);

	Location {
		line: before.matches('\n').count(),
		column: before[line_start..].chars().count(),
	}
}

/// The root object an expression is evaluated against. Context values are
/// converted on access and the location is only computed when `__line` or
/// `__column` is read.
#[derive(Debug)]
struct ScopeObject {
	context: Context,
	source: Arc<str>,
	expression: String,
	file: PathBuf,
	content_type: ContentType,
	location: OnceLock<Location>,
}

impl ScopeObject {
	fn location(&self) -> Location {
		*self
			.location
			.get_or_init(|| locate(&self.expression, &self.source))
	}
}

impl Object for ScopeObject {
	fn get_value(self: &Arc<Self>, key: &JinjaValue) -> Option<JinjaValue> {
		let key = key.as_str()?;

		match key {
			"__path" | "__filename" => Some(JinjaValue::from(self.file.display().to_string())),
			"__dirname" => {
				Some(JinjaValue::from(
					self.file
						.parent()
						.map(|parent| parent.display().to_string())
						.unwrap_or_default(),
				))
			}
			"__type" => Some(JinjaValue::from(self.content_type.to_string())),
			"__line" => Some(JinjaValue::from(self.location().line)),
			"__column" => Some(JinjaValue::from(self.location().column)),
			_ => self.context.get(key).map(JinjaValue::from_serialize),
		}
	}

	fn enumerate(self: &Arc<Self>) -> Enumerator {
		let keys = RESERVED_FIELDS
			.iter()
			.map(|key| JinjaValue::from(*key))
			.chain(
				self.context
					.keys()
					.filter(|key| !RESERVED_FIELDS.contains(&key.as_str()))
					.map(|key| JinjaValue::from(key.as_str())),
			)
			.collect();

		Enumerator::Values(keys)
	}
}
