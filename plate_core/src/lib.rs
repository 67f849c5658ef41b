//! `plate_core` renders YAML and JSON documents that embed `${ expression }`
//! placeholders against an evaluation context, and writes the results to a
//! mirrored directory tree, a single combined file or standard output.
//!
//! ## Processing Pipeline
//!
//! ```text
//! Input pattern
//!   → Discovery (glob walk, content type per extension, lazy file contents)
//!   → Renderer (buffer chunks, parse, traverse + evaluate placeholders, serialize)
//!   → Output writer (directory mode, combined file or stdout)
//! ```
//!
//! ## Placeholders
//!
//! A string scalar is a placeholder when its whole value is `${ ... }`. The
//! inner text is a [`minijinja`](https://docs.rs/minijinja) expression
//! evaluated against the context:
//!
//! ```yaml
//! name: ${ app.name | upper }
//! replicas: ${ replicas }
//! labels:
//!   team: core
//!   extra: ${ ...labels }
//! ```
//!
//! A `...` prefix spreads a mapping into the parent mapping or a sequence
//! into the parent sequence. Results that are `none` or undefined remove the
//! key (or element) holding the placeholder.
//!
//! ## Modules
//!
//! - [`config`]: `plate.toml` loading.
//! - [`tree`]: the arena document model walked by [`traverse_and_mutate`].
//! - [`output`]: directory, combined file and stream writers.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use plate_core::InputSource;
//! use plate_core::OutputTarget;
//! use plate_core::PlateOptions;
//!
//! # async fn run() -> plate_core::PlateResult<()> {
//! let mut options = PlateOptions::new(
//! 	InputSource::Pattern {
//! 		pattern: "templates/**/*.yaml".to_string(),
//! 		sorted: true,
//! 	},
//! 	".",
//! );
//! options.output = OutputTarget::Directory {
//! 	root: "dist".into(),
//! 	base_dir: Some("templates".into()),
//! };
//!
//! let summary = plate_core::evaluate(options).await?;
//! println!("wrote {} files", summary.files_written);
//! # Ok(())
//! # }
//! ```

pub use config::*;
pub use context::*;
pub use error::*;
pub use evaluator::*;
pub use output::*;
pub use pipeline::*;
pub use placeholder::*;
pub use renderer::*;
pub use source::*;
pub use traverse::*;
pub use tree::*;

pub mod config;
mod context;
#[allow(unused_assignments)]
mod error;
mod evaluator;
pub mod output;
mod pipeline;
mod placeholder;
mod renderer;
mod source;
mod traverse;
pub mod tree;
