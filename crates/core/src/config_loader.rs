use crate::config::AppConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::path::Path;
use tracing::debug;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/theta.toml";

/// Prefix of environment overrides, e.g. `THETA_KITE__ACCESS_TOKEN`.
pub const ENV_PREFIX: &str = "THETA_";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads application configuration from the default file and environment.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load() -> Result<AppConfig> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Loads application configuration by layering built-in defaults, the TOML
    /// file at `path` and `THETA_` environment variables (`__` separates
    /// nested keys).
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load_from(path: impl AsRef<Path>) -> Result<AppConfig> {
        let path = path.as_ref();
        debug!(path = %path.display(), exists = path.exists(), "Loading configuration");
        let config: AppConfig = Self::figment(path).extract()?;
        debug!(strategies = config.strategies.len(), "Configuration loaded");
        Ok(config)
    }

    #[must_use]
    pub fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }
}
