//! Redis Stream Sink - taps appended to a capped stream.
//!
//! Each tap becomes one stream entry whose fields mirror the wire format
//! (`uid`, `slug`, `ts`, and whichever of `ip`, `ua`, `referrer` are known).
//! The stream is trimmed with `MAXLEN ~` so it cannot grow without bound if
//! no consumer is reading.

use super::{SinkError, TapSink};
use crate::tap::TapEvent;
use async_trait::async_trait;
use deadpool_redis::redis::cmd;
use deadpool_redis::Pool;
use tracing::debug;

/// Default stream name for tap events
pub const TAP_STREAM_NAME: &str = "cardlink:taps";

/// Default approximate cap on stream length
pub const DEFAULT_MAX_LEN: usize = 100_000;

#[derive(Clone)]
pub struct RedisStreamSink {
    pool: Pool,
    stream: String,
    max_len: usize,
}

impl RedisStreamSink {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            stream: TAP_STREAM_NAME.to_string(),
            max_len: DEFAULT_MAX_LEN,
        }
    }

    pub fn with_stream(mut self, stream: impl Into<String>) -> Self {
        self.stream = stream.into();
        self
    }

    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Build the `XADD` command for an event.
    fn xadd(&self, event: &TapEvent) -> deadpool_redis::redis::Cmd {
        let mut xadd = cmd("XADD");
        xadd.arg(&self.stream)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.max_len)
            .arg("*");
        for (field, value) in event.fields() {
            xadd.arg(field).arg(value);
        }
        xadd
    }
}

#[async_trait]
impl TapSink for RedisStreamSink {
    fn name(&self) -> &str {
        "redis"
    }

    async fn deliver(&self, event: &TapEvent) -> Result<(), SinkError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| SinkError::Connection(e.to_string()))?;

        let id: String = self
            .xadd(event)
            .query_async(&mut conn)
            .await
            .map_err(|e| SinkError::Rejected(e.to_string()))?;

        debug!(id = %id, stream = %self.stream, uid = %event.uid, "Tap appended to stream");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tap::RequestMeta;
    use deadpool_redis::{Config, Runtime};

    fn sink() -> RedisStreamSink {
        let pool = Config::from_url("redis://localhost:6379")
            .create_pool(Some(Runtime::Tokio1))
            .unwrap();
        RedisStreamSink::new(pool)
    }

    #[tokio::test]
    async fn test_xadd_command_layout() {
        let sink = sink().with_stream("taps:test").with_max_len(500);
        let meta = RequestMeta {
            client_ip: Some("203.0.113.7".to_string()),
            ..Default::default()
        };
        let event = TapEvent::at("abc123", "joao", 42, meta);

        let packed = String::from_utf8_lossy(&sink.xadd(&event).get_packed_command()).to_string();
        for part in ["XADD", "taps:test", "MAXLEN", "500", "uid", "abc123", "slug", "joao", "ts", "42", "ip"] {
            assert!(packed.contains(part), "missing {part} in {packed}");
        }
        assert!(!packed.contains("referrer"));
    }

    #[tokio::test]
    async fn test_defaults() {
        let sink = sink();
        assert_eq!(sink.stream(), TAP_STREAM_NAME);
        assert_eq!(sink.max_len, DEFAULT_MAX_LEN);
    }
}
