use super::Store;
use crate::clock::{duration_millis, Clock, SystemClock};
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: u64,
}

impl Entry {
    fn is_live(&self, now: u64) -> bool {
        now < self.expires_at
    }
}

/// In-process store. State is lost on restart and not shared between
/// processes.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock: Arc::new(clock),
        }
    }

    /// Number of entries held, expired ones included until purged.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drops expired entries and returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let mut entries = self.entries.write().await;

        let initial_count = entries.len();
        entries.retain(|_, entry| entry.is_live(now));

        initial_count - entries.len()
    }

    /// Spawns a task purging expired entries every `every`.
    ///
    /// Expired entries are already invisible to readers; this only bounds
    /// memory held by clients that never come back. The caller owns the
    /// handle and aborts it on shutdown.
    pub fn spawn_janitor(&self, every: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let purged = store.purge_expired().await;
                if purged > 0 {
                    tracing::debug!(purged, "Purged expired memory store entries");
                }
            }
        })
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn has(&self, key: &str) -> Result<bool, StoreError> {
        let now = self.clock.now_millis();
        let entries = self.entries.read().await;
        Ok(entries.get(key).is_some_and(|entry| entry.is_live(now)))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let now = self.clock.now_millis();
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(entry.value.clone()),
            _ => Err(StoreError::NotFound(key.to_string())),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = self
            .clock
            .now_millis()
            .saturating_add(duration_millis(ttl));

        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new();

        store
            .set("client", b"payload".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(store.has("client").await.unwrap());
        assert_eq!(store.get("client").await.unwrap(), b"payload");

        store.delete("client").await.unwrap();
        assert!(!store.has("client").await.unwrap());
        assert!(matches!(
            store.get("client").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_absent_key_is_ok() {
        let store = MemoryStore::new();
        assert!(store.delete("nobody").await.is_ok());
    }

    #[tokio::test]
    async fn test_entries_expire_after_ttl() {
        let clock = ManualClock::new(10_000);
        let store = MemoryStore::with_clock(clock.clone());

        store
            .set("client", vec![1], Duration::from_secs(5))
            .await
            .unwrap();

        clock.advance(Duration::from_millis(4_999));
        assert!(store.has("client").await.unwrap());

        clock.advance(Duration::from_millis(1));
        assert!(!store.has("client").await.unwrap());
        assert!(store.get("client").await.is_err());
    }

    #[tokio::test]
    async fn test_set_refreshes_ttl() {
        let clock = ManualClock::new(0);
        let store = MemoryStore::with_clock(clock.clone());

        store.set("k", vec![1], Duration::from_secs(2)).await.unwrap();
        clock.advance(Duration::from_secs(1));
        store.set("k", vec![2], Duration::from_secs(2)).await.unwrap();
        clock.advance(Duration::from_millis(1_500));

        assert_eq!(store.get("k").await.unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let clock = ManualClock::new(0);
        let store = MemoryStore::with_clock(clock.clone());

        store.set("short", vec![1], Duration::from_secs(1)).await.unwrap();
        store.set("long", vec![2], Duration::from_secs(60)).await.unwrap();
        clock.advance(Duration::from_secs(2));

        assert_eq!(store.len().await, 2);
        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.len().await, 1);
        assert!(store.has("long").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_janitor_purges_in_background() {
        let clock = ManualClock::new(0);
        let store = MemoryStore::with_clock(clock.clone());
        store.set("k", vec![1], Duration::from_secs(1)).await.unwrap();
        clock.advance(Duration::from_secs(5));

        let handle = store.spawn_janitor(Duration::from_secs(30));
        // The first tick fires immediately.
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(store.is_empty().await);
        handle.abort();
    }
}
