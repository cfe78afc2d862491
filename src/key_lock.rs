//! In-process per-key mutual exclusion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Serializes async sections per key. Entries are removed when the last
/// guard drops, or on the next `lock` if their last waiter was cancelled,
/// so the map only grows with concurrent keys.
#[derive(Debug, Clone, Default)]
pub(crate) struct KeyLocks {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl KeyLocks {
    pub(crate) async fn lock(&self, key: &str) -> KeyGuard {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // A waiter cancelled after the holder released leaves an entry
            // nobody references; sweep those here.
            locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
            locks.entry(key.to_string()).or_default().clone()
        };

        KeyGuard {
            guard: Some(mutex.lock_owned().await),
            key: key.to_string(),
            locks: self.clone(),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

pub(crate) struct KeyGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: String,
    locks: KeyLocks,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        // Release first so the owned guard no longer counts as a holder.
        self.guard.take();

        let mut locks = self
            .locks
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.key)
            .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
        {
            locks.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_entry_removed_after_release() {
        let locks = KeyLocks::default();
        {
            let _guard = locks.lock("a").await;
            assert_eq!(locks.len(), 1);
        }
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = KeyLocks::default();
        let guard = locks.lock("a").await;

        let contender = locks.clone();
        let waiter = tokio::spawn(async move {
            let _guard = contender.lock("a").await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_entry_is_swept() {
        let locks = KeyLocks::default();
        let guard = locks.lock("a").await;

        let mut waiter = Box::pin(locks.lock("a"));
        assert!(tokio::time::timeout(Duration::from_millis(10), &mut waiter)
            .await
            .is_err());

        // The waiter still references the entry when the holder releases.
        drop(guard);
        drop(waiter);

        let _b = locks.lock("b").await;
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = KeyLocks::default();
        let _a = locks.lock("a").await;
        let _b = tokio::time::timeout(Duration::from_millis(50), locks.lock("b"))
            .await
            .expect("independent key should lock immediately");
        assert_eq!(locks.len(), 2);
    }
}
