//! Zapier catch-hook client

use async_trait::async_trait;
use reqwest::Client;

use super::WebhookClient;
use crate::Result;

/// Posts JSON to Zapier catch hooks
#[derive(Debug, Clone, Default)]
pub struct ZapierWebhook {
    client: Client,
}

impl ZapierWebhook {
    /// Create a new webhook client
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WebhookClient for ZapierWebhook {
    async fn post(&self, url: &str, payload: &serde_json::Value) -> Result<u16> {
        let response = self.client.post(url).json(payload).send().await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(status = %status, body = %body, "webhook responded");

        Ok(status.as_u16())
    }
}
