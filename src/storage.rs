use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

/// Key under which the meal history blob is kept.
pub const HISTORY_KEY: &str = "nutri_lens_history";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid storage key: {0}")]
    InvalidKey(String),
    #[error("io error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Durable key/value blob storage for local application data.
#[async_trait]
pub trait HistoryStorage: Send + Sync {
    /// Returns `None` when nothing was ever written under `key`.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError>;
    /// Replaces the value under `key`. Returns only once the write is durable.
    async fn put(&self, key: &str, body: Bytes) -> Result<(), StorageError>;
}

/// One JSON file per key inside a data directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub async fn new(root: impl AsRef<Path>) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await.map_err(|e| {
            anyhow::anyhow!("create data dir {}: {}", root.display(), e)
        })?;
        tracing::info!(root = %root.display(), "file storage ready");
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
            && !key.starts_with('.');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

#[async_trait]
impl HistoryStorage for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    async fn put(&self, key: &str, body: Bytes) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let tmp_path = path.with_extension("json.tmp");
        let io_err = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };

        // Write-then-rename so a crash never leaves a half-written history.
        {
            use tokio::io::AsyncWriteExt;
            let mut file = tokio::fs::File::create(&tmp_path).await.map_err(io_err)?;
            file.write_all(&body).await.map_err(io_err)?;
            file.sync_all().await.map_err(io_err)?;
        }
        if let Err(source) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(io_err(source));
        }
        tracing::debug!(key = %key, size = body.len(), "blob persisted");
        Ok(())
    }
}

#[cfg(test)]
pub use memory::MemoryStorage;

#[cfg(test)]
mod memory {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// In-memory storage with a switch to make writes fail.
    #[derive(Default)]
    pub struct MemoryStorage {
        blobs: Mutex<HashMap<String, Bytes>>,
        fail_writes: AtomicBool,
        writes: AtomicUsize,
    }

    impl MemoryStorage {
        pub fn with_blob(key: &str, body: impl Into<Bytes>) -> Self {
            let storage = Self::default();
            storage
                .blobs
                .lock()
                .unwrap()
                .insert(key.to_string(), body.into());
            storage
        }

        pub fn fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }

        pub fn write_count(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }

        pub fn raw(&self, key: &str) -> Option<Bytes> {
            self.blobs.lock().unwrap().get(key).cloned()
        }
    }

    #[async_trait]
    impl HistoryStorage for MemoryStorage {
        async fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
            Ok(self.blobs.lock().unwrap().get(key).cloned())
        }

        async fn put(&self, key: &str, body: Bytes) -> Result<(), StorageError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StorageError::Unavailable("write refused".into()));
            }
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.blobs.lock().unwrap().insert(key.to_string(), body);
            Ok(())
        }
    }
}

#[cfg(test)]
mod storage_tests {
    use super::*;

    #[tokio::test]
    async fn missing_key_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).await.unwrap();
        assert!(storage.get(HISTORY_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_then_get_returns_latest_value() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).await.unwrap();

        storage.put(HISTORY_KEY, Bytes::from_static(b"[1]")).await.unwrap();
        storage.put(HISTORY_KEY, Bytes::from_static(b"[2]")).await.unwrap();

        let got = storage.get(HISTORY_KEY).await.unwrap().unwrap();
        assert_eq!(&got[..], b"[2]");
        assert!(dir.path().join("nutri_lens_history.json").exists());
        assert!(!dir.path().join("nutri_lens_history.json.tmp").exists());
    }

    #[tokio::test]
    async fn rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).await.unwrap();
        for key in ["", "../escape", "a/b", ".hidden"] {
            let err = storage.get(key).await.unwrap_err();
            assert!(matches!(err, StorageError::InvalidKey(_)), "key {key:?}");
        }
    }

    #[tokio::test]
    async fn creates_missing_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let storage = FileStorage::new(&nested).await.unwrap();
        storage.put("k", Bytes::from_static(b"{}")).await.unwrap();
        assert!(nested.join("k.json").exists());
    }
}
