use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum PlateError {
	#[error(transparent)]
	#[diagnostic(code(plate::io_error))]
	Io(#[from] std::io::Error),

	#[error("failed to access `{path}`: {source}")]
	#[diagnostic(code(plate::file_io))]
	FileIo {
		path: String,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse {format} document `{path}` at line {line} column {column}: {message}")]
	#[diagnostic(code(plate::parse))]
	Parse {
		path: String,
		format: String,
		message: String,
		line: usize,
		column: usize,
	},

	#[error("failed to evaluate `{expression}` at `{path}`: {cause}")]
	#[diagnostic(
		code(plate::evaluation),
		help("placeholders are minijinja expressions evaluated against the context")
	)]
	Evaluation {
		path: String,
		expression: String,
		cause: String,
	},

	#[error("an object with recursive references found at `{path}`, cannot continue evaluation")]
	#[diagnostic(code(plate::cyclic_structure))]
	CyclicStructure { path: String },

	#[error("unsupported content type `{content_type}` for `{path}`")]
	#[diagnostic(
		code(plate::unsupported_content_type),
		help("only json and yaml documents can be rendered")
	)]
	UnsupportedContentType { path: String, content_type: String },

	#[error("cannot write `{content_type}` document `{path}` into a combined file")]
	#[diagnostic(
		code(plate::not_combinable),
		help("only yaml documents can be combined into a single file, use an output directory instead")
	)]
	NotCombinable { path: String, content_type: String },

	#[error("source file `{file}` is outside base directory `{base_dir}`")]
	#[diagnostic(code(plate::path_safety))]
	PathSafety { file: String, base_dir: String },

	#[error("file `{path}` has an unknown extension `{extension}`")]
	#[diagnostic(
		code(plate::unknown_extension),
		help("use `.json`, `.yaml` or `.yml` files, or configure `unknown_extension` in plate.toml")
	)]
	UnknownExtension { path: String, extension: String },

	#[error("invalid input pattern `{pattern}`: {reason}")]
	#[diagnostic(code(plate::invalid_pattern))]
	InvalidPattern { pattern: String, reason: String },

	#[error("failed to load context file `{path}`: {reason}")]
	#[diagnostic(code(plate::context_file))]
	ContextFile { path: String, reason: String },

	#[error("failed to execute context command `{command}`: {reason}")]
	#[diagnostic(code(plate::context_script))]
	ContextScript { command: String, reason: String },

	#[error("context must resolve to a mapping, found {found}")]
	#[diagnostic(
		code(plate::context_shape),
		help("the context source must produce a key/value mapping (or nothing at all)")
	)]
	ContextShape { found: String },

	#[error("unsupported context file format: `{0}`")]
	#[diagnostic(
		code(plate::unsupported_format),
		help("supported formats: json, toml, yaml, yml, kdl, ini")
	)]
	UnsupportedContextFormat(String),

	#[error("unconvertible float value in `{path}`: {value}")]
	#[diagnostic(
		code(plate::unconvertible_float),
		help("NaN and Infinity are not valid JSON numbers")
	)]
	UnconvertibleFloat { path: String, value: String },

	#[error("failed to parse config file: {0}")]
	#[diagnostic(
		code(plate::config_parse),
		help("check that plate.toml is valid TOML")
	)]
	ConfigParse(String),
}

impl PlateError {
	/// Wrap an io error with the path that triggered it.
	pub fn file_io(path: &std::path::Path, source: std::io::Error) -> Self {
		Self::FileIo {
			path: path.display().to_string(),
			source,
		}
	}
}

pub type PlateResult<T> = Result<T, PlateError>;
pub type AnyError = Box<dyn std::error::Error>;
pub type AnyEmptyResult = Result<(), AnyError>;
pub type AnyResult<T> = Result<T, AnyError>;
