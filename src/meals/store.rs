use std::sync::{Arc, RwLock};

use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};
use super::model::{History, MealId, MealRecord};
use crate::storage::{HistoryStorage, StorageError, HISTORY_KEY};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("persisted history is unreadable: {0}")]
    CorruptHistory(String),
    #[error("history could not be persisted: {0}")]
    PersistenceFailed(#[source] StorageError),
    #[error("history could not be read: {0}")]
    LoadFailed(#[source] StorageError),
    #[error("meal {0} already exists")]
    DuplicateRecord(MealId),
}

/// Owns the meal history and keeps it in step with durable storage.
///
/// Writers are serialized by `write_lock`; readers only clone the current
/// snapshot and never wait on a write in progress.
pub struct MealStore {
    storage: Arc<dyn HistoryStorage>,
    current: RwLock<History>,
    write_lock: Mutex<()>,
}

impl MealStore {
    /// Reads the persisted history. A missing blob is an empty history;
    /// an unparseable one is reported as `CorruptHistory` and left on disk.
    #[instrument(skip(storage))]
    pub async fn load(storage: Arc<dyn HistoryStorage>) -> Result<Self, StoreError> {
        let history = match storage.get(HISTORY_KEY).await.map_err(StoreError::LoadFailed)? {
            None => {
                info!("no persisted history; starting empty");
                History::default()
            }
            Some(raw) => decode(&raw)?,
        };
        info!(meals = history.len(), "history loaded");
        Ok(Self {
            storage,
            current: RwLock::new(history),
            write_lock: Mutex::new(()),
        })
    }

    pub fn snapshot(&self) -> History {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn get(&self, id: &MealId) -> Option<MealRecord> {
        self.snapshot().get(id).cloned()
    }

    /// Prepends `record` and persists. On a failed write the previous
    /// history stays current and `PersistenceFailed` is returned.
    #[instrument(skip(self, record), fields(meal_id = %record.id()))]
    pub async fn append(&self, record: MealRecord) -> Result<History, StoreError> {
        let _guard = self.write_lock.lock().await;
        let before = self.snapshot();
        if before.contains(record.id()) {
            warn!("refusing duplicate meal id");
            return Err(StoreError::DuplicateRecord(record.id().clone()));
        }
        let next = before.prepend(record);
        self.persist(&next).await?;
        self.publish(next.clone());
        debug!(meals = next.len(), "meal appended");
        Ok(next)
    }

    /// Drops the meal with `id`. Unknown ids are a no-op and write nothing.
    #[instrument(skip(self, id), fields(meal_id = %id))]
    pub async fn remove(&self, id: &MealId) -> Result<History, StoreError> {
        let _guard = self.write_lock.lock().await;
        let before = self.snapshot();
        if !before.contains(id) {
            debug!("meal not present; nothing to remove");
            return Ok(before);
        }
        let next = before.without(id);
        self.persist(&next).await?;
        self.publish(next.clone());
        debug!(meals = next.len(), "meal removed");
        Ok(next)
    }

    async fn persist(&self, history: &History) -> Result<(), StoreError> {
        let body = serde_json::to_vec(history).map_err(|e| {
            StoreError::PersistenceFailed(StorageError::Unavailable(format!("encode history: {e}")))
        })?;
        self.storage
            .put(HISTORY_KEY, Bytes::from(body))
            .await
            .map_err(|e| {
                error!(error = %e, "history write failed; keeping previous state");
                StoreError::PersistenceFailed(e)
            })
    }

    fn publish(&self, history: History) {
        match self.current.write() {
            Ok(mut guard) => *guard = history,
            Err(poisoned) => *poisoned.into_inner() = history,
        }
    }
}

fn decode(raw: &[u8]) -> Result<History, StoreError> {
    let history: History = serde_json::from_slice(raw).map_err(|e| {
        error!(error = %e, "persisted history failed to parse");
        StoreError::CorruptHistory(e.to_string())
    })?;
    if let Some(dup) = history.duplicate_id() {
        error!(meal_id = %dup, "persisted history contains duplicate ids");
        return Err(StoreError::CorruptHistory(format!("duplicate meal id {dup}")));
    }
    Ok(history)
}
