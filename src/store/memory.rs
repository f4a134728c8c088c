//! In-process card store.
//!
//! Holds raw values exactly as a real store would, so malformed records can
//! be exercised the same way. Used for local runs without Redis and in tests.

use super::{CardStore, StoreError};
use crate::card::CardRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryCardStore {
    records: RwLock<HashMap<String, String>>,
}

impl MemoryCardStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record under `identifier`.
    pub fn insert(&self, identifier: impl Into<String>, record: &CardRecord) {
        // CardRecord only holds strings and JSON values
        let raw = serde_json::to_string(record).unwrap_or_default();
        self.insert_raw(identifier, raw);
    }

    /// Store an arbitrary raw value, valid or not.
    pub fn insert_raw(&self, identifier: impl Into<String>, raw: impl Into<String>) {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.insert(identifier.into(), raw.into());
    }

    pub fn remove(&self, identifier: &str) -> bool {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.remove(identifier).is_some()
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CardStore for MemoryCardStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn fetch(&self, identifier: &str) -> Result<Option<String>, StoreError> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(identifier).cloned())
    }
}
