//! Tap event sinks.
//!
//! A [`TapSink`] performs one delivery attempt for one event. Sinks do not
//! retry and are never awaited on the redirect path; the
//! [`TapEmitter`](crate::emitter::TapEmitter) runs them in the background and
//! bounds each attempt.
//!
//! ## Built-in Sinks
//!
//! - [`LogSink`]: structured log line per tap (default, useful in development)
//! - [`RedisStreamSink`]: `XADD` to a capped Redis stream
//! - [`WebhookSink`]: JSON `POST` to an ingestion endpoint

pub mod log;
pub mod redis_stream;
pub mod webhook;

use crate::tap::TapEvent;
use async_trait::async_trait;
use thiserror::Error;

pub use log::LogSink;
pub use redis_stream::RedisStreamSink;
pub use webhook::WebhookSink;

/// Errors a sink can report for a single delivery attempt.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("delivery timed out after {0}ms")]
    Timeout(u64),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("sink connection error: {0}")]
    Connection(String),

    #[error("sink rejected event: {0}")]
    Rejected(String),
}

/// Destination for tap events.
#[async_trait]
pub trait TapSink: Send + Sync {
    /// Short name used in logs (e.g. "log", "redis", "webhook")
    fn name(&self) -> &str;

    /// Attempt to deliver `event` once.
    async fn deliver(&self, event: &TapEvent) -> Result<(), SinkError>;
}
