//! Graceful shutdown coordination.
//!
//! [`ShutdownSignal::wait`] resolves on SIGINT or SIGTERM. The server stops
//! accepting connections when it fires; the tap emitter is then given
//! [`ShutdownSignal::timeout`] to drain.
//!
//! # Example
//!
//! ```rust,ignore
//! use cardlink::shutdown::ShutdownSignal;
//!
//! let shutdown = ShutdownSignal::new();
//! let server_shutdown = shutdown.clone();
//!
//! axum::serve(listener, app)
//!     .with_graceful_shutdown(async move { server_shutdown.wait().await })
//!     .await?;
//! ```

use std::time::Duration;
use tracing::{error, info};

/// Default drain deadline in milliseconds.
const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, Copy)]
pub struct ShutdownSignal {
    timeout: Duration,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_millis(DEFAULT_SHUTDOWN_TIMEOUT_MS))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// How long background work may take to finish after the signal.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait for SIGINT or SIGTERM.
    pub async fn wait(&self) {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    error!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received Ctrl+C, initiating graceful shutdown...");
            }
            _ = terminate => {
                info!("Received SIGTERM, initiating graceful shutdown...");
            }
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeout() {
        let signal = ShutdownSignal::new();
        assert_eq!(signal.timeout(), Duration::from_secs(5));

        let signal = ShutdownSignal::with_timeout(Duration::from_secs(60));
        assert_eq!(signal.timeout(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_wait_blocks_without_signal() {
        let signal = ShutdownSignal::new();
        let result = tokio::time::timeout(Duration::from_millis(20), signal.wait()).await;
        assert!(result.is_err());
    }
}
