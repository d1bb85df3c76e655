//! Folio CLI: incremental builds for documentation projects.
//!
//! Provides `folio build` to run a build cycle, `folio plan` to preview which
//! documents would be rebuilt, `folio deps` to query recorded dependencies,
//! `folio status` to inspect the last build and `folio clean` to drop all
//! incremental state.

#![warn(missing_docs)]

mod build;
mod deps;
mod pipeline;
mod plan;
mod status;
mod steps;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

/// Folio, a documentation compiler that only rebuilds what changed.
#[derive(Parser, Debug)]
#[command(name = "folio", version, about = "Folio documentation builder")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a custom `folio.toml` or the project directory containing it.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the project, reusing outputs of unaffected documents.
    Build(BuildArgs),
    /// Show what a build would do without running any step.
    Plan(PlanArgs),
    /// Show the expanded dependencies of a document.
    Deps(DepsArgs),
    /// Show the outcome of the last build.
    Status,
    /// Delete the build cache, forcing the next build to start from scratch.
    Clean,
}

/// Options shared by commands that plan a cycle.
#[derive(Parser, Debug, Default)]
pub struct CycleArgs {
    /// JSON file mapping document paths to `created`, `updated`, `deleted`
    /// or `unchanged`, overriding local change detection for those paths.
    #[arg(long)]
    pub changes: Option<PathBuf>,

    /// Rebuild every document regardless of prior state.
    #[arg(long)]
    pub full: bool,
}

/// Arguments for the `folio build` subcommand.
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Change-detection options.
    #[command(flatten)]
    pub cycle: CycleArgs,

    /// Worker threads for build steps (overrides `build.jobs`).
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

/// Arguments for the `folio plan` subcommand.
#[derive(Parser, Debug)]
pub struct PlanArgs {
    /// Change-detection options.
    #[command(flatten)]
    pub cycle: CycleArgs,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Arguments for the `folio deps` subcommand.
#[derive(Parser, Debug)]
pub struct DepsArgs {
    /// Document path relative to the source directory.
    pub doc: String,

    /// List the documents that depend on `doc` instead.
    #[arg(long)]
    pub reverse: bool,
}

/// Output format for reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable terminal output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Optional path to a custom config file or project directory.
    pub config: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        config: cli.config,
    };

    let result = match cli.command {
        Command::Build(ref args) => build::run(args, &global),
        Command::Plan(ref args) => plan::run(args, &global),
        Command::Deps(ref args) => deps::run(args, &global),
        Command::Status => status::run(&global),
        Command::Clean => clean(&global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

/// Installs a stderr subscriber honoring `RUST_LOG`.
///
/// Without `RUST_LOG`, library events are shown at `warn` (`error` with
/// `--quiet`, `debug` with `--verbose`).
fn init_tracing(verbose: bool, quiet: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(verbose))
        .with(filter)
        .init();
}

/// Runs `folio clean`.
fn clean(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = pipeline::Project::load(global)?;
    let cache_dir = project.cache_dir();
    if cache_dir.exists() {
        std::fs::remove_dir_all(&cache_dir)?;
        if !global.quiet {
            eprintln!("   Removed {}", cache_dir.display());
        }
    } else if !global.quiet {
        eprintln!("   Nothing to clean");
    }
    Ok(0)
}
