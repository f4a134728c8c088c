//! Webhook Sink - taps POSTed to an HTTP ingestion endpoint.
//!
//! # Example
//!
//! ```rust,ignore
//! use cardlink::sinks::WebhookSink;
//! use std::time::Duration;
//!
//! let sink = WebhookSink::new("https://ingest.example.com/taps")
//!     .with_timeout(Duration::from_secs(2))
//!     .with_bearer_token("secret");
//! ```

use super::{SinkError, TapSink};
use crate::tap::TapEvent;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Default timeout for a single webhook request
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// A sink that POSTs each tap as JSON. One attempt, no retries.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    url: String,

    /// HTTP client (reused for connection pooling)
    client: Client,

    timeout: Duration,

    bearer_token: Option<String>,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: Client::new(),
            timeout: DEFAULT_TIMEOUT,
            bearer_token: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TapSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, event: &TapEvent) -> Result<(), SinkError> {
        let mut request = self.client.post(&self.url).timeout(self.timeout).json(event);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SinkError::Timeout(self.timeout.as_millis() as u64)
            } else {
                SinkError::Http(e)
            }
        })?;

        let status = response.status();
        if status.is_success() {
            debug!(url = %self.url, status = %status, uid = %event.uid, "Tap delivered");
            Ok(())
        } else {
            warn!(url = %self.url, status = %status, "Tap webhook returned error status");
            Err(SinkError::Rejected(format!("webhook returned status {}", status)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tap::RequestMeta;

    #[test]
    fn test_webhook_builder() {
        let sink = WebhookSink::new("https://ingest.example.com/taps")
            .with_timeout(Duration::from_millis(500))
            .with_bearer_token("secret");

        assert_eq!(sink.url(), "https://ingest.example.com/taps");
        assert_eq!(sink.timeout, Duration::from_millis(500));
        assert_eq!(sink.bearer_token.as_deref(), Some("secret"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_an_error() {
        // Port 9 (discard) on localhost is closed in test environments
        let sink = WebhookSink::new("http://127.0.0.1:9/taps").with_timeout(Duration::from_millis(500));
        let event = TapEvent::at("abc123", "abc123", 1, RequestMeta::default());

        assert!(sink.deliver(&event).await.is_err());
    }
}
