//! Notification channels.

pub mod log;
pub mod webhook;

pub use log::LogNotifier;
pub use webhook::WebhookNotifier;

use std::sync::Arc;
use theta_core::{Notifier, NotifierConfig};

/// Builds the notifier selected by configuration: a webhook when a URL is
/// set, otherwise log-only.
///
/// # Errors
///
/// Returns error if the webhook client cannot be built.
pub fn from_config(config: &NotifierConfig) -> Result<Arc<dyn Notifier>, theta_core::NotifyError> {
    match config.webhook_url.as_deref().filter(|url| !url.is_empty()) {
        Some(url) => Ok(Arc::new(WebhookNotifier::new(url)?)),
        None => Ok(Arc::new(LogNotifier)),
    }
}
