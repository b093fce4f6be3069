use anyhow::{Context, Result};
use async_trait::async_trait;
use models::{NotificationPayload, Presentation, Transaction};
use presence::PresenceSink;
use reqwest::{Client, Url};
use std::time::Duration;

/// Posts `{status, description}` to a webhook on every presence change.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    http: Client,
    url: Url,
}

impl WebhookNotifier {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url).with_context(|| format!("Invalid notification webhook URL: {url}"))?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http, url })
    }
}

#[async_trait]
impl PresenceSink for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn publish(&self, presentation: &Presentation, _transaction: Option<&Transaction>) -> Result<()> {
        let payload = NotificationPayload::from(presentation);

        self.http
            .post(self.url.clone())
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("POST {} failed", self.url))?
            .error_for_status()
            .with_context(|| format!("POST {} returned non-success status", self.url))?;

        tracing::info!(status = %payload.status, "Sent presence notification");
        Ok(())
    }
}
