use std::path::PathBuf;

use clap::{Parser, Subcommand};
use theta_core::config::DEFAULT_STRATEGY;
use theta_core::config_loader::DEFAULT_CONFIG_PATH;
use theta_core::ConfigLoader;
use tracing::{error, warn};

mod app;
mod commands;

use app::App;

#[derive(Parser)]
#[command(name = "theta")]
#[command(about = "Scheduled multi-leg options strategies on Kite", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Keep the position record in memory instead of the configured store
    #[arg(long, global = true)]
    dry_run: bool,

    /// Optional log file path (logs to file instead of stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enter at the entry window, hold until the exit window, then unwind
    Run {
        #[arg(default_value = DEFAULT_STRATEGY)]
        strategy: String,
    },
    /// Unwind a persisted position set now
    Exit {
        #[arg(default_value = DEFAULT_STRATEGY)]
        strategy: String,
    },
    /// Print the persisted position set as JSON
    Status {
        #[arg(default_value = DEFAULT_STRATEGY)]
        strategy: String,
    },
}

fn init_logging(log_file: Option<&PathBuf>) -> anyhow::Result<()> {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter()).init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_ref())?;

    let config = ConfigLoader::load_from(&cli.config)?;
    let app = App::build(config, cli.dry_run).await?;

    let (name, result) = match &cli.command {
        Commands::Run { strategy } => (
            strategy,
            tokio::select! {
                result = commands::run_strategy(&app, strategy) => result,
                _ = tokio::signal::ctrl_c() => {
                    warn!(strategy = %strategy, "Interrupted, position record left as is");
                    anyhow::bail!("interrupted");
                }
            },
        ),
        Commands::Exit { strategy } => (
            strategy,
            tokio::select! {
                result = commands::run_exit(&app, strategy) => result,
                _ = tokio::signal::ctrl_c() => {
                    warn!(strategy = %strategy, "Interrupted, position record left as is");
                    anyhow::bail!("interrupted");
                }
            },
        ),
        Commands::Status { strategy } => (strategy, commands::run_status(&app, strategy).await),
    };

    if let Err(e) = &result {
        error!(strategy = %name, error = %format!("{e:#}"), "Run failed");
        app.report_failure(name, e).await;
    }
    result
}
