//! hubscaled — the hubscale daemon.
//!
//! Runs the launcher and the scaling orchestrator in one process against a
//! redb checkpoint file, and offers a few operator commands on the side.
//!
//! # Usage
//!
//! ```text
//! hubscaled run --config /etc/hubscale/hubscale.toml --data-dir /var/lib/hubscale
//! hubscaled status --data-dir /var/lib/hubscale
//! hubscaled terminate --data-dir /var/lib/hubscale
//! hubscaled evaluate --config /etc/hubscale/hubscale.toml
//! ```

mod daemon;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info,hubscaled=debug,hubscale=debug";

#[derive(Parser)]
#[command(name = "hubscaled", about = "IoT hub autoscaling daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the launcher and the orchestrator until Ctrl-C.
    Run {
        /// Path to hubscale.toml.
        #[arg(long, default_value = "hubscale.toml")]
        config: PathBuf,

        /// Directory holding the checkpoint database.
        #[arg(long, default_value = "/var/lib/hubscale")]
        data_dir: PathBuf,
    },
    /// Print the persisted checkpoint as JSON.
    Status {
        #[arg(long, default_value = "/var/lib/hubscale")]
        data_dir: PathBuf,
    },
    /// Mark the running instance completed. The next launcher tick starts
    /// a fresh one.
    Terminate {
        #[arg(long, default_value = "/var/lib/hubscale")]
        data_dir: PathBuf,
    },
    /// Run a single decision cycle now, outside the orchestration.
    Evaluate {
        #[arg(long, default_value = "hubscale.toml")]
        config: PathBuf,
    },
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Run { config, data_dir } => daemon::run(&config, data_dir).await,
        Command::Status { data_dir } => daemon::print_status(&data_dir),
        Command::Terminate { data_dir } => daemon::terminate(&data_dir),
        Command::Evaluate { config } => daemon::evaluate_once(&config).await,
    }
}
