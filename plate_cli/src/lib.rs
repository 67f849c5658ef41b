use std::path::PathBuf;

use clap::Parser;
use clap::ValueEnum;
use plate_core::ContentType;

#[derive(Parser)]
#[command(
	author,
	version,
	about = "Render YAML and JSON templates with embedded `${ expression }` placeholders.",
	long_about = "plate renders YAML and JSON documents whose string values contain `${ expression \
	              }` placeholders, evaluated against a context loaded from a data file, a command \
	              or `plate.toml`.\n\nRendered documents are written to a mirrored output \
	              directory (`--out-dir`), concatenated into a single YAML file (`--single-file`) \
	              or printed to stdout.\n\nExamples:\n  plate -p 'templates/**/*.yaml' -c \
	              values.yaml -d dist -b templates\n  plate -p 'k8s/*.yaml' -c values.json -s \
	              all.yaml --sorted"
)]
#[allow(clippy::struct_excessive_bools)]
pub struct PlateCli {
	/// Glob pattern of the documents to render. `*` stays within a directory,
	/// `**` crosses directories.
	#[arg(long, short = 'p')]
	pub pattern: String,

	/// Data file (json, yaml, toml, kdl or ini) used as the evaluation
	/// context. Defaults to `context` from `plate.toml`, then to the first
	/// `plate.context.*` file in the working directory.
	#[arg(long, short = 'c', conflicts_with = "context_command")]
	pub context: Option<PathBuf>,

	/// Shell command whose JSON output is used as the evaluation context.
	#[arg(long)]
	pub context_command: Option<String>,

	/// Write every rendered document below this directory, mirroring the
	/// input paths.
	#[arg(long, short = 'd', conflicts_with = "single_file")]
	pub out_dir: Option<PathBuf>,

	/// Concatenate every rendered YAML document into this file.
	#[arg(long, short = 's')]
	pub single_file: Option<PathBuf>,

	/// Mirror input paths relative to this directory instead of the working
	/// directory. Inputs outside of it are an error.
	#[arg(long, short = 'b', requires = "out_dir")]
	pub base_dir: Option<PathBuf>,

	/// Render documents in path order. Every input is collected before
	/// rendering starts.
	#[arg(long, default_value_t = false)]
	pub sorted: bool,

	/// Maximum number of output files open at the same time.
	#[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
	pub max_open_files: Option<u64>,

	/// Fail on any use of a value missing from the context instead of
	/// removing the key.
	#[arg(long, default_value_t = false)]
	pub strict: bool,

	/// Content type assumed for files with an unrecognized extension.
	#[arg(long, value_enum)]
	pub unknown_extension: Option<ExtensionKind>,

	/// Working directory that patterns and relative paths are resolved
	/// against.
	#[arg(long)]
	pub path: Option<PathBuf>,

	/// Enable verbose output.
	#[arg(long, short, default_value_t = false)]
	pub verbose: bool,

	/// Disable colored output.
	#[arg(long, default_value_t = false)]
	pub no_color: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ExtensionKind {
	Json,
	Yaml,
}

impl From<ExtensionKind> for ContentType {
	fn from(kind: ExtensionKind) -> Self {
		match kind {
			ExtensionKind::Json => Self::Json,
			ExtensionKind::Yaml => Self::Yaml,
		}
	}
}
