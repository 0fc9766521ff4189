use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use theta_core::{Notifier, NotifyError};
use tracing::debug;

/// Payload posted to the webhook.
///
/// `text` carries subject and body together for chat-style receivers that
/// only render a single field.
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    subject: &'a str,
    body: &'a str,
    text: String,
}

/// POSTs each notification as JSON to a webhook URL.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    url: String,
    http: Client,
}

impl WebhookNotifier {
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>) -> Result<Self, NotifyError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotifyError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            url: url.into(),
            http,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        let payload = WebhookPayload {
            subject,
            body,
            text: format!("{subject}\n{body}"),
        };

        let response = self
            .http
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(NotifyError::Delivery(format!("{status}: {text}")));
        }

        debug!(subject, "Webhook notification delivered");
        Ok(())
    }
}
