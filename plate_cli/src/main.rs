use std::path::PathBuf;
use std::process;

use clap::Parser;
use owo_colors::OwoColorize;
use plate_cli::PlateCli;
use plate_core::ContextSource;
use plate_core::InputSource;
use plate_core::OutputTarget;
use plate_core::PlateConfig;
use plate_core::PlateOptions;
use plate_core::PlateResult;
use plate_core::UndefinedPolicy;
use plate_core::WriteSummary;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "PLATE_LOG";

static USE_COLOR: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

fn color_enabled() -> bool {
	USE_COLOR.load(std::sync::atomic::Ordering::Relaxed)
}

/// Apply ANSI color codes only when color is enabled.
macro_rules! colored {
	($text:expr,red) => {
		if color_enabled() {
			format!("{}", $text.red())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,green) => {
		if color_enabled() {
			format!("{}", $text.green())
		} else {
			format!("{}", $text)
		}
	};
}

fn main() {
	let args = PlateCli::parse();

	// Respect NO_COLOR env var and --no-color flag.
	let use_color = !args.no_color && std::env::var_os("NO_COLOR").is_none();
	if !use_color {
		USE_COLOR.store(false, std::sync::atomic::Ordering::Relaxed);
	}

	init_tracing(args.verbose, use_color);

	// Install miette's fancy handler for rich error diagnostics.
	miette::set_hook(Box::new(move |_| {
		Box::new(
			miette::MietteHandlerOpts::new()
				.color(use_color)
				.unicode(use_color)
				.build(),
		)
	}))
	.ok();

	if let Err(e) = run(&args) {
		// Try to render through miette for rich diagnostics with help text
		// and error codes.
		match e.downcast::<plate_core::PlateError>() {
			Ok(plate_err) => {
				let report: miette::Report = (*plate_err).into();
				eprintln!("{report:?}");
			}
			Err(e) => {
				eprintln!("{} {e}", colored!("error:", red));
			}
		}
		process::exit(1);
	}
}

fn init_tracing(verbose: bool, use_color: bool) {
	let filter = if verbose {
		EnvFilter::new("debug")
	} else {
		EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
	};

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_ansi(use_color)
		.with_target(false)
		.try_init()
		.ok();
}

fn resolve_root(args: &PlateCli) -> PathBuf {
	args.path
		.clone()
		.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn run(args: &PlateCli) -> Result<(), Box<dyn std::error::Error>> {
	let root = resolve_root(args);
	let config = PlateConfig::load(&root)?.unwrap_or_default();
	tracing::debug!(root = %root.display(), ?config, "resolved configuration");
	let options = build_options(args, &config, root)?;
	let output = options.output.clone();

	let rt = tokio::runtime::Runtime::new()?;
	let summary = rt.block_on(plate_core::evaluate(options))?;
	print_summary(&output, &summary);

	Ok(())
}

/// Merge command line flags over `plate.toml`. Flags win.
fn build_options(args: &PlateCli, config: &PlateConfig, root: PathBuf) -> PlateResult<PlateOptions> {
	let context = if let Some(path) = &args.context {
		ContextSource::File {
			path: path.clone(),
			format: None,
		}
	} else if let Some(command) = &args.context_command {
		ContextSource::Command {
			command: command.clone(),
			format: None,
		}
	} else if let Some(context) = &config.context {
		context.to_source()
	} else {
		ContextSource::discover(&root)
	};

	let output = match (&args.out_dir, &args.single_file) {
		(Some(out_dir), _) => {
			OutputTarget::Directory {
				root: out_dir.clone(),
				base_dir: args.base_dir.clone(),
			}
		}
		(None, Some(single_file)) => OutputTarget::File(single_file.clone()),
		(None, None) => OutputTarget::Stdout,
	};

	let unknown_extension = match args.unknown_extension {
		Some(kind) => Some(kind.into()),
		None => config.unknown_extension()?,
	};

	let mut options = PlateOptions::new(
		InputSource::Pattern {
			pattern: args.pattern.clone(),
			sorted: args.sorted || config.sorted,
		},
		root,
	);
	options.context = context;
	options.output = output;
	options.max_open_files = args
		.max_open_files
		.map_or(config.max_open_files, |max| max as usize);
	options.undefined = if args.strict {
		UndefinedPolicy::Strict
	} else {
		config.undefined
	};
	options.unknown_extension = unknown_extension;

	Ok(options)
}

fn print_summary(output: &OutputTarget, summary: &WriteSummary) {
	match output {
		OutputTarget::Directory { root, .. } => {
			println!(
				"{} Rendered {} document(s) into {}",
				colored!("✓", green),
				summary.files_written,
				root.display()
			);
		}
		OutputTarget::File(path) => {
			println!(
				"{} Rendered {} document(s) into {}",
				colored!("✓", green),
				summary.documents,
				path.display()
			);
		}
		// Stdout carries the documents themselves.
		OutputTarget::Stdout => {}
	}
}
