//! New-asset notification transports. Dispatch is fire-and-forget:
//! failures are logged and never block the merge path.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::AlertingConfig;
use crate::domain::models::Asset;

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webhook returned status {0}")]
    UnexpectedStatus(reqwest::StatusCode),
}

#[async_trait]
pub trait AlertTransport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn notify_new_asset(&self, asset: &Asset) -> Result<(), AlertError>;
}

/// Log-line transport, always on when alerting is enabled.
pub struct LogTransport;

#[async_trait]
impl AlertTransport for LogTransport {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn notify_new_asset(&self, asset: &Asset) -> Result<(), AlertError> {
        info!(
            "new asset alert: {} - {} ({})",
            asset.id, asset.ip_address, asset.device_type
        );
        Ok(())
    }
}

/// POSTs a JSON summary of the new asset to the configured URL.
pub struct WebhookTransport {
    url: String,
    client: reqwest::Client,
}

impl WebhookTransport {
    pub fn new(url: String) -> Self {
        WebhookTransport {
            url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl AlertTransport for WebhookTransport {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn notify_new_asset(&self, asset: &Asset) -> Result<(), AlertError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let body = json!({
            "event": "new_asset",
            "id": asset.id,
            "ip_address": asset.ip_address,
            "mac_address": asset.mac_address,
            "hostname": asset.hostname,
            "vendor": asset.vendor,
            "device_type": asset.device_type,
            "os_family": asset.os_info.family,
            "confidence": asset.confidence,
            "first_seen": asset.first_seen,
        });

        let response = self
            .client
            .post(&self.url)
            .headers(headers)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(AlertError::UnexpectedStatus(status))
        }
    }
}

/// Fans one new-asset event out to every configured transport.
pub struct AlertDispatcher {
    transports: Vec<Arc<dyn AlertTransport>>,
}

impl AlertDispatcher {
    /// Build the dispatcher, or `None` when alerting is disabled.
    pub fn from_config(config: &AlertingConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }

        let mut transports: Vec<Arc<dyn AlertTransport>> = vec![Arc::new(LogTransport)];
        if let Some(url) = &config.webhook_url {
            if !url.is_empty() {
                transports.push(Arc::new(WebhookTransport::new(url.clone())));
            }
        }
        if !config.email_to.is_empty() {
            warn!("alerting.email_to is configured but no email transport is available");
        }

        Some(AlertDispatcher { transports })
    }

    #[cfg(test)]
    pub fn with_transports(transports: Vec<Arc<dyn AlertTransport>>) -> Self {
        AlertDispatcher { transports }
    }

    pub async fn dispatch(&self, asset: &Asset) {
        for transport in &self.transports {
            if let Err(e) = transport.notify_new_asset(asset).await {
                warn!(
                    "alert delivery via {} failed for {}: {}",
                    transport.name(),
                    asset.id,
                    e
                );
            }
        }
    }
}
