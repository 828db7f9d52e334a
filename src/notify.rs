//! Out-of-band notification channels for severe alerts.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use crate::error::{MonitError, Result};
use crate::runtime_config::MonitSettings;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, subject: &str, message: &str) -> Result<()>;
}

/// Posts `{subject, text}` as JSON to a webhook (chat, paging or mail relay).
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url = url.trim();
        if url.is_empty() {
            return Err(MonitError::InvalidInput(
                "notification webhook url is required".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| {
                MonitError::ChildExecutionFailed(format!("Failed to build notifier client: {error}"))
            })?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, subject: &str, message: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "subject": subject, "text": message }))
            .send()
            .await
            .map_err(|error| {
                MonitError::ChildExecutionFailed(format!("Failed to deliver notification: {error}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(MonitError::ChildExecutionFailed(format!(
                "notification webhook responded with {status}"
            )));
        }
        Ok(())
    }
}

/// Writes notifications to the log. Used when no webhook is configured.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, subject: &str, message: &str) -> Result<()> {
        info!(subject, "{message}");
        Ok(())
    }
}

pub fn notifier_from_settings(settings: &MonitSettings) -> Box<dyn Notifier> {
    match settings.notification_webhook_url.as_deref() {
        Some(url) => match WebhookNotifier::new(url, Duration::from_secs(10)) {
            Ok(notifier) => Box::new(notifier),
            Err(error) => {
                warn!(error = %error, "webhook notifier unavailable; falling back to log channel");
                Box::new(LogNotifier)
            }
        },
        None => Box::new(LogNotifier),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_requires_url() {
        let result = WebhookNotifier::new("  ", Duration::from_secs(1));
        assert!(matches!(result, Err(MonitError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn log_notifier_always_succeeds() {
        LogNotifier
            .send("CRITICAL Alert - Patient P001", "details")
            .await
            .expect("log notifier should not fail");
    }
}
