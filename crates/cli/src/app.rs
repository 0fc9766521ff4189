//! Composition root: wires configuration into broker, store, notifier and
//! strategy registry.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use theta_core::{AppConfig, Broker, Clock, Notifier, StateStore, SystemClock};
use theta_engine::{notify_best_effort, Strategy, StrategyContext, StrategyRegistry};
use theta_kite::{KiteClient, KiteClientConfig};
use theta_store::{MemoryStore, SqliteStore};
use tracing::info;

pub struct App {
    config: AppConfig,
    broker: Arc<dyn Broker>,
    store: Arc<dyn StateStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    registry: StrategyRegistry,
}

/// Creates the parent directory of a `sqlite://` file URL.
fn ensure_sqlite_dir(url: &str) -> Result<()> {
    let Some(file_path) = url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let file_path = file_path.split('?').next().unwrap_or(file_path);
    if let Some(parent) = Path::new(file_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("creating database directory {}", parent.display())
            })?;
        }
    }
    Ok(())
}

impl App {
    /// Builds every component from `config`. With `dry_run` the position
    /// record lives in memory and is discarded on exit.
    pub async fn build(config: AppConfig, dry_run: bool) -> Result<Self> {
        let kite = KiteClientConfig::from_settings(&config.kite, &config.venue);
        let broker: Arc<dyn Broker> = Arc::new(KiteClient::new(kite)?);

        let store: Arc<dyn StateStore> = if dry_run {
            info!("Dry run: using in-memory store");
            Arc::new(MemoryStore::new())
        } else {
            ensure_sqlite_dir(&config.store.url)?;
            info!(url = %config.store.url, "Opening store");
            Arc::new(SqliteStore::connect(&config.store.url, config.store.max_connections).await?)
        };

        let notifier = theta_notify::from_config(&config.notifier)?;
        let registry = StrategyRegistry::from_config(&config);

        Ok(Self {
            config,
            broker,
            store,
            notifier,
            clock: Arc::new(SystemClock),
            registry,
        })
    }

    pub async fn authenticate(&self) -> Result<()> {
        self.broker
            .authenticate()
            .await
            .context("broker authentication failed")
    }

    /// Builds the strategy configured as `name`.
    pub fn strategy(&self, name: &str) -> Result<Box<dyn Strategy>> {
        let strategy = self
            .config
            .strategy(name)
            .cloned()
            .with_context(|| format!("no strategy named {name} in configuration"))?;

        let ctx = StrategyContext {
            name: name.to_string(),
            broker: self.broker.clone(),
            store: self.store.clone(),
            notifier: self.notifier.clone(),
            clock: self.clock.clone(),
            timezone: self.config.venue.timezone,
            execution: self.config.execution.clone(),
            scheduler: self.config.scheduler.clone(),
            strategy,
        };
        Ok(self.registry.build(ctx)?)
    }

    pub async fn report_failure(&self, name: &str, err: &anyhow::Error) {
        let subject = format!("{name} run failed");
        notify_best_effort(self.notifier.as_ref(), &subject, &format!("{err:#}")).await;
    }
}
