//! Named strategy factories.
//!
//! Strategies are built per run from a [`StrategyContext`], so the same
//! factory can serve several configured instances (one per namespace).

use std::collections::HashMap;
use std::sync::Arc;

use chrono_tz::Tz;
use theta_core::{
    AppConfig, Broker, Clock, ExecutionConfig, Notifier, SchedulerConfig, StateStore,
    StrategyConfig,
};

use crate::error::{EngineError, Result};
use crate::strategy::{ShortStrangle, Strategy};

/// Everything a strategy needs to run.
#[derive(Clone)]
pub struct StrategyContext {
    /// Strategy name; also the persistence namespace.
    pub name: String,
    pub broker: Arc<dyn Broker>,
    pub store: Arc<dyn StateStore>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
    pub timezone: Tz,
    pub execution: ExecutionConfig,
    pub scheduler: SchedulerConfig,
    pub strategy: StrategyConfig,
}

type Factory = Box<dyn Fn(StrategyContext) -> Result<Box<dyn Strategy>> + Send + Sync>;

/// Registry of strategy factories keyed by name.
pub struct StrategyRegistry {
    factories: HashMap<String, Factory>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategyRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry with a short strangle for every configured strategy.
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        let mut registry = Self::new();
        for name in config.strategies.keys() {
            registry.register(name.clone(), |ctx| {
                Ok(Box::new(ShortStrangle::new(ctx)?) as Box<dyn Strategy>)
            });
        }
        registry
    }

    /// Registers `factory` under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(StrategyContext) -> Result<Box<dyn Strategy>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Builds the strategy registered as `ctx.name`.
    ///
    /// # Errors
    ///
    /// `UnknownStrategy` for an unregistered name; construction errors.
    pub fn build(&self, ctx: StrategyContext) -> Result<Box<dyn Strategy>> {
        let factory = self
            .factories
            .get(&ctx.name)
            .ok_or_else(|| EngineError::UnknownStrategy(ctx.name.clone()))?;
        factory(ctx)
    }
}
