//! Log Sink - taps as structured log lines.

use super::{SinkError, TapSink};
use crate::tap::TapEvent;
use async_trait::async_trait;
use tracing::info;

#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl LogSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TapSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, event: &TapEvent) -> Result<(), SinkError> {
        info!(
            uid = %event.uid,
            slug = %event.slug,
            ts = event.ts,
            ip = ?event.ip,
            ua = ?event.ua,
            referrer = ?event.referrer,
            "Tap: {}",
            event.uid
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tap::RequestMeta;

    #[tokio::test]
    async fn test_log_sink_always_succeeds() {
        let sink = LogSink::new();
        let event = TapEvent::at("abc123", "joao", 1, RequestMeta::default());

        assert!(sink.deliver(&event).await.is_ok());
        assert_eq!(sink.name(), "log");
    }
}
