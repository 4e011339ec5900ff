//! # depsync CLI Entry Point
//!
//! Parses arguments with clap, sets up logging and Ctrl-C handling, and
//! routes to the handlers in [`depsync::commands`].
//!
//! ## Commands
//!
//! - `sync`: materialize every entry at its pinned revision
//! - `status`: what `sync` would do, as a table
//! - `list`: entries with their locator and backend
//! - `prune`: remove checkouts of ids no longer in the table
//! - `completion`: shell completion scripts

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use colored::*;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use depsync::cancel::{self, CancelToken};
use depsync::commands::{self, Context, EXIT_SUCCESS};
use depsync::commands::sync::SyncArgs;

#[derive(Parser)]
#[command(name = "depsync")]
#[command(about = "Materialize pinned dependencies from a DEPS table", version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Checkout root that destination paths are relative to
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    /// Dependency table (default: [sync].table from depsync.toml, else DEPS.toml)
    #[arg(long, global = true)]
    table: Option<PathBuf>,
    /// Log decisions (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Log everything, including backend internals
    #[arg(long, global = true)]
    trace: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch or update every entry to its pinned revision
    Sync {
        /// Report what would change without writing anything
        #[arg(long)]
        dry_run: bool,
        /// Maximum concurrent fetches [default: available CPUs]
        #[arg(short = 'j', long)]
        parallelism: Option<usize>,
        /// Restrict the run to these ids (comma separated)
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,
    },
    /// Show which entries are current, missing or outdated
    Status {
        /// Restrict to these ids (comma separated)
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,
    },
    /// List table entries with their resolved locator and backend
    List,
    /// Remove checkouts of ids that left the table
    Prune {
        /// Show what would be removed
        #[arg(long)]
        dry_run: bool,
    },
    /// Generate shell completion scripts
    Completion { shell: Shell },
}

fn init_logging(verbose: bool, trace: bool) {
    let default = if trace {
        "trace"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_env("DEPSYNC_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.trace);

    match run(&cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("{} {:#}", "error:".red().bold(), err);
            ExitCode::from(commands::exit_code_for(&err))
        }
    }
}

fn run(cli: &Cli) -> Result<u8> {
    if let Commands::Completion { shell } = &cli.command {
        let mut cmd = Cli::command();
        let bin_name = cmd.get_name().to_string();
        generate(*shell, &mut cmd, bin_name, &mut std::io::stdout());
        return Ok(EXIT_SUCCESS);
    }

    let ctx = Context::load(&cli.root, cli.table.as_deref())?;
    match &cli.command {
        Commands::Sync {
            dry_run,
            parallelism,
            only,
        } => {
            let cancel = CancelToken::new();
            cancel::install_signal_handler(&cancel);
            let args = SyncArgs {
                dry_run: *dry_run,
                parallelism: *parallelism,
                only: commands::parse_only(only),
            };
            commands::sync::run_sync(&ctx, args, &cancel)
        }
        Commands::Status { only } => commands::sync::run_status(&ctx, commands::parse_only(only)),
        Commands::List => commands::list::run_list(&ctx),
        Commands::Prune { dry_run } => commands::prune::run_prune(&ctx, *dry_run),
        Commands::Completion { .. } => Ok(EXIT_SUCCESS),
    }
}
