use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::meals::store::StoreError;
use crate::recognition::RecognitionFailed;

/// Error surfaced to API callers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),
    #[error(transparent)]
    RecognitionFailed(#[from] RecognitionFailed),
    #[error("{0}")]
    PersistenceFailed(String),
    #[error("{0}")]
    CorruptHistory(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    InvalidRequest(String),
    #[error("{0}")]
    Conflict(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: String,
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::CameraUnavailable(_) => (StatusCode::BAD_REQUEST, "camera_unavailable"),
            AppError::RecognitionFailed(_) => (StatusCode::BAD_GATEWAY, "recognition_failed"),
            AppError::PersistenceFailed(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "persistence_failed")
            }
            AppError::CorruptHistory(_) => (StatusCode::INTERNAL_SERVER_ERROR, "corrupt_history"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::CorruptHistory(msg) => AppError::CorruptHistory(msg),
            StoreError::DuplicateRecord(id) => AppError::Conflict(format!("meal {id} already exists")),
            e @ (StoreError::PersistenceFailed(_) | StoreError::LoadFailed(_)) => {
                AppError::PersistenceFailed(e.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code, "request failed");
        } else {
            tracing::warn!(error = %self, code, "request rejected");
        }
        // Recognition causes stay in the logs; callers only learn it can be retried.
        let message = match &self {
            AppError::RecognitionFailed(_) => "food recognition failed, please try again".into(),
            other => other.to_string(),
        };
        (status, Json(ErrorBody { code, message })).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod error_tests {
    use super::*;
    use crate::storage::StorageError;

    #[test]
    fn store_errors_map_to_api_kinds() {
        let e: AppError =
            StoreError::PersistenceFailed(StorageError::Unavailable("disk full".into())).into();
        assert!(matches!(e, AppError::PersistenceFailed(ref m) if m.contains("disk full")));

        let e: AppError = StoreError::CorruptHistory("bad".into()).into();
        assert!(matches!(e, AppError::CorruptHistory(_)));

        let e: AppError = StoreError::DuplicateRecord(crate::meals::model::MealId::from("meal-1")).into();
        assert_eq!(e.status_and_code().0, StatusCode::CONFLICT);
    }

    #[test]
    fn recognition_failure_is_bad_gateway() {
        let e = AppError::from(RecognitionFailed::new("timeout"));
        let resp = e.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }
}
