//! Card state store clients.
//!
//! The router only ever reads from the store. A [`CardStore`] returns the raw
//! stored value (or `None` when the key does not exist); [`lookup_state`]
//! bounds the read with a timeout and folds every failure mode into a
//! routable [`CardState`]:
//!
//! ```text
//! Outcome                  | CardState
//! -------------------------|-----------
//! key missing              | Absent
//! timeout / store error    | Absent
//! value fails to decode    | Pending
//! value decodes            | record.state()
//! ```

pub mod memory;
pub mod redis;

use crate::card::{CardRecord, CardState};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub use memory::MemoryCardStore;
pub use redis::RedisCardStore;

/// Default key prefix for card records.
pub const CARD_KEY_PREFIX: &str = "card:";

/// Default bound on a single store read.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_millis(250);

/// Errors a store client can report.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection error: {0}")]
    Connection(String),

    #[error("store command error: {0}")]
    Command(String),
}

/// Read-only access to card routing records.
#[async_trait]
pub trait CardStore: Send + Sync {
    /// Short name used in logs (e.g. "redis", "memory")
    fn name(&self) -> &str;

    /// Fetch the raw stored value for `identifier`.
    ///
    /// `Ok(None)` means the key does not exist, which is not an error.
    async fn fetch(&self, identifier: &str) -> Result<Option<String>, StoreError>;

    /// Connectivity check used by the health endpoint.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Look up a card and resolve it to a routable state.
///
/// Never fails: the redirect path must always have somewhere to go.
pub async fn lookup_state(store: &dyn CardStore, identifier: &str, timeout: Duration) -> CardState {
    let raw = match tokio::time::timeout(timeout, store.fetch(identifier)).await {
        Ok(Ok(Some(raw))) => raw,
        Ok(Ok(None)) => {
            debug!(identifier = %identifier, "Card not found");
            return CardState::Absent;
        }
        Ok(Err(e)) => {
            warn!(
                identifier = %identifier,
                store = %store.name(),
                error = %e,
                "Card lookup failed, treating as absent"
            );
            return CardState::Absent;
        }
        Err(_) => {
            warn!(
                identifier = %identifier,
                store = %store.name(),
                timeout_ms = timeout.as_millis() as u64,
                "Card lookup timed out, treating as absent"
            );
            return CardState::Absent;
        }
    };

    match CardRecord::decode(&raw) {
        Ok(record) => record.state(),
        Err(e) => {
            warn!(
                identifier = %identifier,
                error = %e,
                "Malformed card record, treating as pending"
            );
            CardState::undecodable()
        }
    }
}
