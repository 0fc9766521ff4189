use anyhow::Result;
use theta_engine::StartOutcome;
use tracing::info;

use crate::app::App;

/// Authenticates, runs the strategy through its holding period, then unwinds.
pub async fn run_strategy(app: &App, name: &str) -> Result<()> {
    app.authenticate().await?;

    let mut strategy = app.strategy(name)?;
    info!(strategy = name, "Starting strategy");

    match strategy.start().await? {
        StartOutcome::MarketClosed => {
            info!(strategy = name, "Market closed, nothing to do");
            return Ok(());
        }
        StartOutcome::UnwindPending => {
            info!(strategy = name, "Finishing interrupted unwind");
        }
        StartOutcome::Completed => {
            info!(strategy = name, "Exit window reached, unwinding");
        }
    }

    strategy.stop().await?;
    info!(strategy = name, "Run complete");
    Ok(())
}
