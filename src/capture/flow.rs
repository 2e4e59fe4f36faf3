use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::meals::model::{FoodItem, ItemId, MealRecord};
use crate::meals::store::{MealStore, StoreError};
use crate::recognition::{CapturedImage, FoodRecognizer, RecognitionFailed};

/// Staged captures older than this are dropped on the next `begin`.
const STAGE_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("no usable image frame: {0}")]
    CameraUnavailable(String),
    #[error("capture {0}")]
    NotFound(Uuid),
    #[error("capture {0} was discarded")]
    Discarded(Uuid),
    #[error("capture {id} is {status:?}")]
    NotReady { id: Uuid, status: CaptureStatus },
    #[error("no items selected; set accept_empty to save an empty meal")]
    EmptySelection,
    #[error("unknown item ids: {0:?}")]
    UnknownItems(Vec<ItemId>),
    #[error(transparent)]
    Recognition(#[from] RecognitionFailed),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<CaptureError> for AppError {
    fn from(e: CaptureError) -> Self {
        match e {
            CaptureError::CameraUnavailable(msg) => AppError::CameraUnavailable(msg),
            e @ CaptureError::NotFound(_) => AppError::NotFound(e.to_string()),
            e @ (CaptureError::Discarded(_) | CaptureError::NotReady { .. }) => {
                AppError::Conflict(e.to_string())
            }
            e @ (CaptureError::EmptySelection | CaptureError::UnknownItems(_)) => {
                AppError::InvalidRequest(e.to_string())
            }
            CaptureError::Recognition(e) => AppError::RecognitionFailed(e),
            CaptureError::Store(e) => e.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureStatus {
    Recognizing,
    Ready,
    Failed,
    Saving,
}

#[derive(Debug, Clone)]
enum Stage {
    Recognizing,
    Ready(Vec<FoodItem>),
    Failed(String),
    Saving(Vec<FoodItem>),
}

impl Stage {
    fn status(&self) -> CaptureStatus {
        match self {
            Stage::Recognizing => CaptureStatus::Recognizing,
            Stage::Ready(_) => CaptureStatus::Ready,
            Stage::Failed(_) => CaptureStatus::Failed,
            Stage::Saving(_) => CaptureStatus::Saving,
        }
    }
}

struct StagedCapture {
    image: CapturedImage,
    stage: Stage,
    /// Bumped on every recognition attempt so stale results can be spotted.
    attempt: u32,
    staged_at: Instant,
}

/// What the review screen needs to render a capture.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureView {
    pub id: Uuid,
    pub status: CaptureStatus,
    pub items: Vec<FoodItem>,
    pub total_calories: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl CaptureView {
    fn of(id: Uuid, staged: &StagedCapture) -> Self {
        let items = match &staged.stage {
            Stage::Ready(items) | Stage::Saving(items) => items.clone(),
            Stage::Recognizing | Stage::Failed(_) => Vec::new(),
        };
        let failure = match &staged.stage {
            Stage::Failed(_) => Some("food recognition failed, please try again".to_string()),
            _ => None,
        };
        Self {
            id,
            status: staged.stage.status(),
            total_calories: items.iter().map(|i| i.calories).sum(),
            items,
            failure,
        }
    }
}

/// Stages captured photos between recognition and the user's decision.
///
/// Nothing reaches the store until `confirm`. A capture discarded while its
/// recognition call is in flight simply ignores the result when it arrives.
pub struct CaptureFlow {
    recognizer: Arc<dyn FoodRecognizer>,
    store: Arc<MealStore>,
    staged: Mutex<HashMap<Uuid, StagedCapture>>,
}

impl CaptureFlow {
    pub fn new(recognizer: Arc<dyn FoodRecognizer>, store: Arc<MealStore>) -> Self {
        Self {
            recognizer,
            store,
            staged: Mutex::new(HashMap::new()),
        }
    }

    fn staged(&self) -> MutexGuard<'_, HashMap<Uuid, StagedCapture>> {
        match self.staged.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Stages a new frame in the recognizing state.
    #[instrument(skip(self, image_b64))]
    pub fn begin(&self, image_b64: &str, content_type: Option<&str>) -> Result<Uuid, CaptureError> {
        let image_b64 = image_b64.trim();
        let decoded = STANDARD
            .decode(image_b64)
            .map_err(|e| CaptureError::CameraUnavailable(format!("image is not base64: {e}")))?;
        if decoded.is_empty() {
            return Err(CaptureError::CameraUnavailable("empty image".into()));
        }
        let content_type = content_type
            .filter(|ct| ct.starts_with("image/"))
            .unwrap_or("image/jpeg")
            .to_string();

        let id = Uuid::new_v4();
        let mut staged = self.staged();
        staged.retain(|_, c| c.staged_at.elapsed() < STAGE_TTL);
        staged.insert(
            id,
            StagedCapture {
                image: CapturedImage {
                    base64: image_b64.to_string(),
                    content_type,
                },
                stage: Stage::Recognizing,
                attempt: 0,
                staged_at: Instant::now(),
            },
        );
        info!(capture_id = %id, bytes = decoded.len(), "capture staged");
        Ok(id)
    }

    /// Runs one recognition pass for a capture in the recognizing state.
    #[instrument(skip(self))]
    pub async fn recognize(&self, id: Uuid) -> Result<CaptureView, CaptureError> {
        let (image, attempt) = {
            let staged = self.staged();
            let capture = staged.get(&id).ok_or(CaptureError::NotFound(id))?;
            if !matches!(capture.stage, Stage::Recognizing) {
                return Err(CaptureError::NotReady {
                    id,
                    status: capture.stage.status(),
                });
            }
            (capture.image.clone(), capture.attempt)
        };

        let outcome = self.recognizer.recognize(&image).await;

        let mut staged = self.staged();
        let Some(capture) = staged.get_mut(&id).filter(|c| c.attempt == attempt) else {
            debug!(capture_id = %id, "capture gone before recognition finished; result ignored");
            return Err(CaptureError::Discarded(id));
        };
        match outcome {
            Ok(items) => {
                info!(capture_id = %id, items = items.len(), "capture ready for review");
                capture.stage = Stage::Ready(items);
                Ok(CaptureView::of(id, capture))
            }
            Err(e) => {
                warn!(capture_id = %id, reason = %e.reason, "capture recognition failed");
                capture.stage = Stage::Failed(e.reason.clone());
                Err(e.into())
            }
        }
    }

    /// Puts a failed capture back into recognition with the same image.
    pub async fn retry(&self, id: Uuid) -> Result<CaptureView, CaptureError> {
        self.prepare_retry(id)?;
        self.recognize(id).await
    }

    pub(crate) fn prepare_retry(&self, id: Uuid) -> Result<(), CaptureError> {
        let mut staged = self.staged();
        let capture = staged.get_mut(&id).ok_or(CaptureError::NotFound(id))?;
        if !matches!(capture.stage, Stage::Failed(_)) {
            return Err(CaptureError::NotReady {
                id,
                status: capture.stage.status(),
            });
        }
        capture.stage = Stage::Recognizing;
        capture.attempt += 1;
        Ok(())
    }

    pub fn view(&self, id: Uuid) -> Option<CaptureView> {
        self.staged().get(&id).map(|c| CaptureView::of(id, c))
    }

    /// Drops a staged capture. Returns whether it existed.
    ///
    /// A capture whose meal is being saved can no longer be discarded.
    pub fn discard(&self, id: Uuid) -> Result<bool, CaptureError> {
        let mut staged = self.staged();
        if let Some(capture) = staged.get(&id) {
            if matches!(capture.stage, Stage::Saving(_)) {
                return Err(CaptureError::NotReady {
                    id,
                    status: CaptureStatus::Saving,
                });
            }
        }
        let existed = staged.remove(&id).is_some();
        if existed {
            info!(capture_id = %id, "capture discarded");
        }
        Ok(existed)
    }

    /// Saves the reviewed capture as a meal.
    ///
    /// `item_ids` narrows the saved items (recognition order is kept); `None`
    /// accepts them all. An empty selection needs `accept_empty`.
    #[instrument(skip(self, item_ids))]
    pub async fn confirm(
        &self,
        id: Uuid,
        item_ids: Option<Vec<ItemId>>,
        accept_empty: bool,
    ) -> Result<MealRecord, CaptureError> {
        let (record, items) = {
            let mut staged = self.staged();
            let capture = staged.get_mut(&id).ok_or(CaptureError::NotFound(id))?;
            let Stage::Ready(items) = &capture.stage else {
                return Err(CaptureError::NotReady {
                    id,
                    status: capture.stage.status(),
                });
            };
            let items = items.clone();

            let selected = match item_ids {
                None => items.clone(),
                Some(ids) => {
                    let unknown: Vec<ItemId> = ids
                        .iter()
                        .filter(|want| !items.iter().any(|i| &i.id == *want))
                        .cloned()
                        .collect();
                    if !unknown.is_empty() {
                        return Err(CaptureError::UnknownItems(unknown));
                    }
                    items.iter().filter(|i| ids.contains(&i.id)).cloned().collect()
                }
            };
            if selected.is_empty() && !accept_empty {
                return Err(CaptureError::EmptySelection);
            }

            let record = MealRecord::new(
                capture.image.base64.clone(),
                Some(capture.image.content_type.clone()),
                selected,
                OffsetDateTime::now_utc(),
            );
            capture.stage = Stage::Saving(items.clone());
            (record, items)
        };

        match self.store.append(record.clone()).await {
            Ok(_) => {
                self.staged().remove(&id);
                info!(capture_id = %id, meal_id = %record.id(), kcal = record.total_calories(), "meal saved");
                Ok(record)
            }
            Err(e) => {
                if let Some(capture) = self.staged().get_mut(&id) {
                    capture.stage = Stage::Ready(items);
                }
                Err(e.into())
            }
        }
    }
}
