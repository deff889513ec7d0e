mod commands;
mod config;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Scope rendering for the inputs subcommand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum ScopeView {
    /// Every condition, `Else` branches spelled out as negations
    Detailed,
    /// Negated predecessors collapsed into an `Else` marker
    Simple,
}

/// Inspect, resolve and run TUFLOW control files.
#[derive(Parser)]
#[command(name = "tmf", version, about = "Inspect, resolve and run TUFLOW control files")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Log debug detail to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Configuration file (defaults to ./tmf.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the inputs of a control file with their scopes
    Inputs {
        /// Path to the control file
        file: PathBuf,
        /// Include inputs of child control files
        #[arg(long)]
        recursive: bool,
        /// Scope rendering
        #[arg(long, default_value = "simple", value_enum)]
        scopes: ScopeView,
    },

    /// List every file referenced by a model
    Files {
        /// Path to the control file
        file: PathBuf,
        /// Only list files that do not exist
        #[arg(long)]
        missing: bool,
    },

    /// Resolve a model against scenario/event flags
    Resolve {
        /// Path to the control file
        file: PathBuf,
        /// Context flags, e.g. "-s1 DEV -e1 Q100"
        #[arg(long, short = 'c', allow_hyphen_values = true)]
        context: Option<String>,
    },

    /// Parse a model and report missing files
    Check {
        /// Path to the control file
        file: PathBuf,
    },

    /// Write a model back out through the writer
    Write {
        /// Path to the control file
        file: PathBuf,
        /// Destination of the main control file
        #[arg(long)]
        out: PathBuf,
    },

    /// Resolve a model and start the solver on it
    Run {
        /// Path to the control file
        file: PathBuf,
        /// Registered solver version, or a path to an executable
        #[arg(long = "version", id = "solver_version")]
        solver_version: String,
        /// Context flags, e.g. "-s1 DEV -e1 Q100"
        #[arg(long, short = 'c', allow_hyphen_values = true)]
        context: Option<String>,
        /// Print the solver command instead of starting it
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match config::load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            report_error(&e, cli.output, cli.quiet);
            process::exit(1);
        }
    };
    init_logging(config.log_level.as_deref(), cli.verbose);

    let context_or_default = |flags: Option<String>| {
        flags
            .or_else(|| config.default_context.clone())
            .unwrap_or_default()
    };

    match cli.command {
        Commands::Inputs {
            file,
            recursive,
            scopes,
        } => commands::inputs::cmd_inputs(&file, recursive, scopes, cli.output, cli.quiet),
        Commands::Files { file, missing } => {
            commands::files::cmd_files(&file, missing, cli.output, cli.quiet)
        }
        Commands::Resolve { file, context } => {
            let flags = context_or_default(context);
            commands::resolve::cmd_resolve(&file, &flags, cli.output, cli.quiet)
        }
        Commands::Check { file } => commands::check::cmd_check(&file, cli.output, cli.quiet),
        Commands::Write { file, out } => commands::write::cmd_write(&file, &out, cli.output, cli.quiet),
        Commands::Run {
            file,
            solver_version,
            context,
            dry_run,
        } => {
            let flags = context_or_default(context);
            let registry = config.registry();
            commands::run::cmd_run(
                &file,
                &registry,
                &solver_version,
                &flags,
                dry_run,
                cli.output,
                cli.quiet,
            )
        }
    }
}

/// Install the stderr log subscriber. `RUST_LOG` wins over the
/// configured level; `--verbose` raises the default to debug.
fn init_logging(level: Option<&str>, verbose: bool) {
    let default = if verbose { "debug" } else { level.unwrap_or("warn") };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Load a control file from disk, exiting with a report on failure.
pub(crate) fn load_or_exit(file: &Path, output: OutputFormat, quiet: bool) -> tmf_core::ControlFile {
    match tmf_core::ControlFile::load(file) {
        Ok(cf) => cf,
        Err(e) => {
            report_parse_error(&e, output, quiet);
            process::exit(1);
        }
    }
}

pub(crate) fn report_parse_error(e: &tmf_core::ParseError, output: OutputFormat, quiet: bool) {
    match output {
        OutputFormat::Json => {
            let err_json = serde_json::to_string_pretty(&e.to_json_value())
                .unwrap_or_else(|_| format!("{{\"error\": \"{}\"}}", e));
            eprintln!("{}", err_json);
        }
        OutputFormat::Text => {
            if !quiet {
                eprintln!("parse error: {}", e);
            }
        }
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{{\"error\": \"{}\"}}", msg.replace('"', "\\\""));
        }
    }
}

/// Pretty-print a JSON value to stdout.
pub(crate) fn print_json(value: &serde_json::Value) {
    let json = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e));
    println!("{}", json);
}
