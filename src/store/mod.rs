//! Key-value store contract and the bundled backends.
//!
//! The throttler persists nothing outside a [`Store`]. Backends only need
//! existence checks, reads, writes with an expiry and deletes; no atomic
//! increment or compare-and-swap is assumed.

pub mod filesystem;
pub mod memory;
pub mod redis;

use crate::error::StoreError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use self::filesystem::FsStore;
pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

#[async_trait]
pub trait Store: Send + Sync {
    /// Whether a live (unexpired) entry exists for `key`.
    async fn has(&self, key: &str) -> Result<bool, StoreError>;

    /// Reads the value under `key`. Absent or expired keys yield
    /// [`StoreError::NotFound`].
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Writes `value` under `key`, replacing any previous entry. The entry
    /// becomes invisible once `ttl` has elapsed.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError>;

    /// Removes `key`. Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Checks the backend is reachable.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;
}

#[async_trait]
impl<S: Store + ?Sized> Store for Arc<S> {
    async fn has(&self, key: &str) -> Result<bool, StoreError> {
        (**self).has(key).await
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        (**self).set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        (**self).ping().await
    }

    fn backend(&self) -> &'static str {
        (**self).backend()
    }
}
