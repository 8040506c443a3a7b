//! Vista CLI - vista command

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cli_lib::cmd;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;

/// Vista - repository views over a fixture
#[derive(Parser)]
#[command(name = "vista")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the view tree of a fixture
    Tree {
        /// Fixture file (TOML)
        fixture: PathBuf,
        /// Open collapsed rows this many levels deep (default: 2)
        #[arg(short, long, default_value = "2")]
        depth: usize,
        /// Override the commit page size
        #[arg(long)]
        page_size: Option<usize>,
    },
    /// Find and reveal a repository, or a commit on one of its branches
    Find {
        /// Fixture file (TOML)
        fixture: PathBuf,
        /// Repository path
        repository: String,
        /// Branch to search (requires --sha)
        #[arg(long, requires = "sha")]
        branch: Option<String>,
        /// Commit sha to search for (requires --branch)
        #[arg(long, requires = "branch")]
        sha: Option<String>,
        /// Override the commit page size
        #[arg(long)]
        page_size: Option<usize>,
        /// Give up after this many milliseconds (default: 5000)
        #[arg(long, default_value = "5000")]
        timeout_ms: u64,
        /// Expand this many levels below the revealed node
        #[arg(long)]
        expand: Option<u8>,
    },
    /// Replay a fixture's events and show how the tree reacts
    Replay {
        /// Fixture file (TOML)
        fixture: PathBuf,
        /// Open collapsed rows this many levels deep (default: 2)
        #[arg(short, long, default_value = "2")]
        depth: usize,
        /// Override the commit page size
        #[arg(long)]
        page_size: Option<usize>,
    },
    /// View or edit configuration
    Config {
        /// List all values
        #[arg(long)]
        list: bool,
        /// Get a value (e.g. views.page_size)
        #[arg(long)]
        get: Option<String>,
        /// Set a value
        #[arg(long, num_args = 2, value_names = ["KEY", "VALUE"])]
        set: Option<Vec<String>>,
        /// Show the config file path
        #[arg(long)]
        path: bool,
        /// Create the config file if missing (with --path)
        #[arg(long)]
        create: bool,
        /// Show an example configuration
        #[arg(long)]
        example: bool,
    },
}

fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = if verbose { Level::DEBUG } else { Level::WARN };

    let Some(path) = log_file else {
        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .init();
        return Ok(None);
    };

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let name = path
        .file_name()
        .with_context(|| format!("Invalid log file path: {}", path.display()))?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(false)
        .with_writer(writer)
        .init();
    Ok(Some(guard))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(cli.verbose, cli.log_file.as_deref())?;

    match cli.command {
        Commands::Tree { fixture, depth, page_size } => {
            cmd::tree::run(&fixture, depth, page_size).await
        }
        Commands::Find { fixture, repository, branch, sha, page_size, timeout_ms, expand } => {
            let target = cmd::find::Target {
                repository,
                commit: branch.zip(sha),
            };
            let options = cmd::find::reveal_options(expand);
            cmd::find::run(&fixture, target, options, page_size, Duration::from_millis(timeout_ms))
                .await
        }
        Commands::Replay { fixture, depth, page_size } => {
            cmd::replay::run(&fixture, depth, page_size).await
        }
        Commands::Config { get, set, path, create, example, .. } => {
            if let Some(key) = get {
                cmd::config::run_get(&key).await
            } else if let Some(pair) = set {
                cmd::config::run_set(&pair[0], &pair[1]).await
            } else if path {
                cmd::config::run_path(create).await
            } else if example {
                cmd::config::run_example().await
            } else {
                cmd::config::run_list().await
            }
        }
    }
}
