use anyhow::Result;
use tracing::info;

use crate::app::App;

/// Unwinds whatever the persisted record holds, without entering.
pub async fn run_exit(app: &App, name: &str) -> Result<()> {
    app.authenticate().await?;

    let mut strategy = app.strategy(name)?;
    info!(strategy = name, "Manual unwind");
    strategy.stop().await?;
    Ok(())
}
