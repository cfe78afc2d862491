use super::Store;
use crate::clock::{duration_millis, Clock, SystemClock};
use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize)]
struct FileEntry {
    expires_at: u64,
    value: Vec<u8>,
}

/// Store keeping one file per key under a directory.
///
/// File names are the SHA-256 of the key, so any key is a valid name.
/// Expired files are ignored on read and replaced by the next write.
#[derive(Debug, Clone)]
pub struct FsStore {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl FsStore {
    /// Opens (and creates if needed) the store directory.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::open_with_clock(dir, SystemClock).await
    }

    pub async fn open_with_clock(
        dir: impl Into<PathBuf>,
        clock: impl Clock + 'static,
    ) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            clock: Arc::new(clock),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir.join(format!("{:x}", digest))
    }

    /// Reads the live entry for `key`.
    async fn read_live(&self, key: &str) -> Result<Option<FileEntry>, StoreError> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: FileEntry = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Backend(format!("corrupt entry {}: {}", path.display(), e)))?;

        // Expired files are left in place: another process sharing the
        // directory may rename a fresh entry over this path at any moment,
        // and `set` overwrites stale files anyway.
        if self.clock.now_millis() >= entry.expires_at {
            return Ok(None);
        }

        Ok(Some(entry))
    }
}

async fn remove_if_exists(path: &Path) -> Result<(), StoreError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl Store for FsStore {
    async fn has(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.read_live(key).await?.is_some())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.read_live(key)
            .await?
            .map(|entry| entry.value)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        let entry = FileEntry {
            expires_at: self
                .clock
                .now_millis()
                .saturating_add(duration_millis(ttl)),
            value,
        };
        let bytes = serde_json::to_vec(&entry)
            .map_err(|e| StoreError::Backend(format!("failed to encode entry: {}", e)))?;

        // Write then rename so readers never observe a partial file.
        let path = self.path_for(key);
        let tmp = self.dir.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        remove_if_exists(&self.path_for(key)).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let metadata = tokio::fs::metadata(&self.dir).await?;
        if metadata.is_dir() {
            Ok(())
        } else {
            Err(StoreError::Backend(format!(
                "{} is not a directory",
                self.dir.display()
            )))
        }
    }

    fn backend(&self) -> &'static str {
        "filesystem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[tokio::test]
    async fn test_set_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path().join("cache")).await.unwrap();

        store
            .set("10.0.0.1", b"state".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(store.has("10.0.0.1").await.unwrap());
        assert_eq!(store.get("10.0.0.1").await.unwrap(), b"state");

        store.delete("10.0.0.1").await.unwrap();
        assert!(!store.has("10.0.0.1").await.unwrap());
        assert!(store.delete("10.0.0.1").await.is_ok());
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_entries_are_invisible() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(0);
        let store = FsStore::open_with_clock(dir.path(), clock.clone())
            .await
            .unwrap();

        store.set("k", vec![7], Duration::from_secs(1)).await.unwrap();
        clock.advance(Duration::from_secs(1));
        assert!(!store.has("k").await.unwrap());
        assert!(matches!(store.get("k").await, Err(StoreError::NotFound(_))));

        store.set("k", vec![8], Duration::from_secs(1)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), vec![8]);
    }

    #[tokio::test]
    async fn test_stale_reader_keeps_fresh_entry_from_other_process() {
        let dir = tempfile::tempdir().unwrap();
        let late_clock = ManualClock::new(10_000);
        let early_clock = ManualClock::new(0);
        let late = FsStore::open_with_clock(dir.path(), late_clock)
            .await
            .unwrap();
        let early = FsStore::open_with_clock(dir.path(), early_clock)
            .await
            .unwrap();

        // Written by a process whose clock lags: already expired for `late`.
        early.set("k", vec![1], Duration::from_secs(1)).await.unwrap();
        assert!(!late.has("k").await.unwrap());

        // The file survives the expired read.
        assert_eq!(early.get("k").await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_keys_with_path_separators() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path()).await.unwrap();

        store
            .set("../../etc/passwd", vec![1], Duration::from_secs(10))
            .await
            .unwrap();
        assert!(store.path_for("../../etc/passwd").starts_with(dir.path()));
        assert_eq!(store.get("../../etc/passwd").await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_backend_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path()).await.unwrap();

        tokio::fs::write(store.path_for("k"), b"garbage").await.unwrap();
        assert!(matches!(store.get("k").await, Err(StoreError::Backend(_))));
    }
}
