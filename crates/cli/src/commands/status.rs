use anyhow::Result;

use crate::app::App;

/// Prints the persisted position set as JSON.
pub async fn run_status(app: &App, name: &str) -> Result<()> {
    let mut strategy = app.strategy(name)?;
    let set = strategy.snapshot().await?;
    println!("{}", serde_json::to_string_pretty(&set)?);
    Ok(())
}
