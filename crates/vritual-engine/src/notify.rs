//! Emergency notification sinks.
//!
//! Delivery is best-effort: callers log a failed `notify` and move on.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};
use vritual_core::{EmergencyReport, Error, Result};

use crate::config::NotifyConfig;

#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, report: &EmergencyReport) -> Result<()>;
}

/// No external sink configured; the report only reaches the tracing output.
pub struct LogOnlySink;

#[async_trait::async_trait]
impl NotificationSink for LogOnlySink {
    fn name(&self) -> &str { "log" }

    async fn notify(&self, report: &EmergencyReport) -> Result<()> {
        info!("Emergency (log only): {}", render(report));
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookBody<'a> {
    content: String,
    report: &'a EmergencyReport,
}

/// POSTs `{"content": <summary>, "report": {...}}` to a chat-style webhook.
pub struct WebhookSink {
    client: Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("webhook client: {e}")))?;
        Ok(Self { client, url: url.into() })
    }
}

#[async_trait::async_trait]
impl NotificationSink for WebhookSink {
    fn name(&self) -> &str { "webhook" }

    async fn notify(&self, report: &EmergencyReport) -> Result<()> {
        let body = WebhookBody { content: render(report), report };
        debug!("Posting emergency {} to webhook", report.id);

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::effect_dispatch("webhook", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::effect_dispatch(
                "webhook",
                format!("HTTP {}: {}", status, text.trim()),
            ));
        }
        Ok(())
    }
}

/// One-line human summary of a report.
pub fn render(report: &EmergencyReport) -> String {
    let reasons: Vec<String> = report.reasons.iter().map(|r| r.to_string()).collect();
    let mut line = format!(
        "VRITUAL EMERGENCY: {} | attention: {}",
        reasons.join(", "),
        report.attention_state
    );
    if !report.critical_loops.is_empty() {
        line.push_str(&format!(" | critical loops: {}", report.critical_loops.join(", ")));
    }
    line
}

/// Webhook if a URL is configured, log-only otherwise.
pub fn sink_from_config(config: &NotifyConfig) -> Arc<dyn NotificationSink> {
    match config.webhook_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => {
            match WebhookSink::new(url, Duration::from_millis(config.timeout_ms)) {
                Ok(sink) => return Arc::new(sink),
                Err(e) => warn!("Webhook sink unavailable, falling back to log-only: {}", e),
            }
        }
        _ => debug!("No webhook configured — emergency reports are log-only"),
    }
    Arc::new(LogOnlySink)
}
