use async_trait::async_trait;
use theta_core::{Notifier, NotifyError};
use tracing::info;

/// Writes notifications to the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        info!(subject, body, "Notification");
        Ok(())
    }
}
