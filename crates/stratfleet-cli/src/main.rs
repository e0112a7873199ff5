mod backtest_cmd;
mod config;
mod launch_cmd;
mod status_cmd;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "stratfleet",
    about = "Trading-strategy fleet orchestrator: batch backtests and live workers"
)]
struct Cli {
    /// Config file path (overrides STRATFLEET_CONFIG env var)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Backtest pending strategies in batches
    Backtest {
        /// Reset errored strategies to pending and include them
        #[arg(long)]
        retry_errors: bool,
        /// Strategies per batch (defaults to the configured batch size)
        #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
        batch_size: Option<usize>,
    },
    /// Launch the top strategies as live workers and verify their endpoints
    Launch {
        /// Worker count cap (defaults to the configured max)
        #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
        max_parallel: Option<usize>,
        /// Terminate the configured fleet instead of launching it
        #[arg(long)]
        kill: bool,
    },
    /// Show the tracker summary
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = config::resolve_path(cli.config.as_deref());

    match cli.command {
        Commands::Init { force } => {
            config::cmd_init(&config_path, force)?;
        }
        Commands::Backtest {
            retry_errors,
            batch_size,
        } => {
            let cfg = config::load_config(&config_path)?;
            backtest_cmd::run_backtest(&cfg, retry_errors, batch_size).await?;
        }
        Commands::Launch { max_parallel, kill } => {
            let cfg = config::load_config(&config_path)?;
            launch_cmd::run_launch(&cfg, max_parallel, kill).await?;
        }
        Commands::Status => {
            let cfg = config::load_config(&config_path)?;
            status_cmd::run_status(&cfg)?;
        }
    }

    Ok(())
}
