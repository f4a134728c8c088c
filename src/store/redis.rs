//! Redis-backed card store.
//!
//! Records live under `{prefix}{identifier}` (default `card:{identifier}`)
//! as JSON strings written by the card management system. The pool is
//! created once at startup and shared by every request.

use super::{CardStore, StoreError, CARD_KEY_PREFIX};
use async_trait::async_trait;
use deadpool_redis::redis::cmd;
use deadpool_redis::{Config, Pool, Runtime};
use tracing::error;

#[derive(Clone)]
pub struct RedisCardStore {
    pool: Pool,
    key_prefix: String,
}

impl RedisCardStore {
    /// Wrap an existing pool.
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            key_prefix: CARD_KEY_PREFIX.to_string(),
        }
    }

    /// Build a pool from a `redis://` URL.
    pub fn from_url(url: &str) -> Result<Self, StoreError> {
        let pool = Config::from_url(url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self::new(pool))
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn key_for(&self, identifier: &str) -> String {
        format!("{}{}", self.key_prefix, identifier)
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection, StoreError> {
        self.pool.get().await.map_err(|e| {
            error!(error = %e, "Failed to get Redis connection");
            StoreError::Connection(e.to_string())
        })
    }
}

#[async_trait]
impl CardStore for RedisCardStore {
    fn name(&self) -> &str {
        "redis"
    }

    async fn fetch(&self, identifier: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection().await?;

        let value: Option<Vec<u8>> = cmd("GET")
            .arg(self.key_for(identifier))
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Command(e.to_string()))?;

        // Invalid UTF-8 still counts as a present record; decoding will fail later
        Ok(value.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _: String = cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Command(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_key_format() {
        let store = RedisCardStore::from_url("redis://localhost:6379").unwrap();
        assert_eq!(store.key_for("abc123"), "card:abc123");

        let store = store.with_key_prefix("tap:card:");
        assert_eq!(store.key_for("abc123"), "tap:card:abc123");
    }
}
