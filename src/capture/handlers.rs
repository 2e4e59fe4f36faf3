use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::flow::{CaptureError, CaptureFlow, CaptureView};
use crate::error::{AppError, AppResult};
use crate::meals::dto::MealDetails;
use crate::meals::model::ItemId;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateCaptureRequest {
    pub image_b64: String,
    pub content_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WaitQuery {
    /// Hold the request open until recognition finishes.
    #[serde(default)]
    pub wait: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfirmRequest {
    pub item_ids: Option<Vec<ItemId>>,
    #[serde(default)]
    pub accept_empty: bool,
}

pub fn capture_routes() -> Router<AppState> {
    Router::new()
        .route("/captures", post(create_capture))
        .route("/captures/:id", get(get_capture).delete(discard_capture))
        .route("/captures/:id/retry", post(retry_capture))
        .route("/captures/:id/confirm", post(confirm_capture))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20MB
}

/// Runs recognition inline when `wait` is set, otherwise in the background.
async fn run_recognition(
    flow: Arc<CaptureFlow>,
    id: Uuid,
    wait: bool,
) -> AppResult<(StatusCode, Json<CaptureView>)> {
    if wait {
        let view = flow.recognize(id).await?;
        return Ok((StatusCode::OK, Json(view)));
    }
    let background = flow.clone();
    tokio::spawn(async move {
        if let Err(e) = background.recognize(id).await {
            debug!(capture_id = %id, error = %e, "background recognition ended without result");
        }
    });
    let view = flow
        .view(id)
        .ok_or_else(|| AppError::from(CaptureError::NotFound(id)))?;
    Ok((StatusCode::ACCEPTED, Json(view)))
}

/// POST /captures { image_b64, content_type? }
#[instrument(skip(state, body))]
pub async fn create_capture(
    State(state): State<AppState>,
    Query(q): Query<WaitQuery>,
    Json(body): Json<CreateCaptureRequest>,
) -> AppResult<(StatusCode, Json<CaptureView>)> {
    let id = state
        .captures
        .begin(&body.image_b64, body.content_type.as_deref())?;
    run_recognition(state.captures.clone(), id, q.wait).await
}

#[instrument(skip(state))]
pub async fn get_capture(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<CaptureView>> {
    state
        .captures
        .view(id)
        .map(Json)
        .ok_or_else(|| CaptureError::NotFound(id).into())
}

#[instrument(skip(state))]
pub async fn retry_capture(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<WaitQuery>,
) -> AppResult<(StatusCode, Json<CaptureView>)> {
    state.captures.prepare_retry(id)?;
    run_recognition(state.captures.clone(), id, q.wait).await
}

#[instrument(skip(state, body))]
pub async fn confirm_capture(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<ConfirmRequest>>,
) -> AppResult<(StatusCode, Json<MealDetails>)> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let record = state
        .captures
        .confirm(id, body.item_ids, body.accept_empty)
        .await?;
    Ok((StatusCode::CREATED, Json(MealDetails::from(&record))))
}

#[instrument(skip(state))]
pub async fn discard_capture(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.captures.discard(id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod capture_route_tests {
    use super::*;
    use crate::meals::model::fixtures::item;
    use crate::recognition::RecognitionFailed;
    use crate::state::test_support::{fake_state, send};
    use axum::http::Method;
    use serde_json::json;

    #[tokio::test]
    async fn capture_review_confirm_roundtrip() {
        let (state, recognizer, _) = fake_state().await;
        recognizer.push(Ok(vec![item("rice", 250.0), item("egg", 400.0)]));
        let app = crate::app::build_app(state.clone());

        let (status, view) = send(
            &app,
            Method::POST,
            "/api/v1/captures?wait=true",
            Some(json!({"image_b64": "aW1n", "content_type": "image/jpeg"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["status"], "ready");
        assert_eq!(view["items"].as_array().unwrap().len(), 2);
        let id = view["id"].as_str().unwrap().to_string();

        let (status, meal) = send(
            &app,
            Method::POST,
            &format!("/api/v1/captures/{id}/confirm"),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(meal["total_calories"], 650.0);
        assert_eq!(state.store.snapshot().len(), 1);

        let (status, _) = send(&app, Method::GET, &format!("/api/v1/captures/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn recognition_failure_surfaces_as_bad_gateway() {
        let (state, recognizer, _) = fake_state().await;
        recognizer.push(Err(RecognitionFailed::new("missing field `calories`")));
        let app = crate::app::build_app(state.clone());

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/captures?wait=true",
            Some(json!({"image_b64": "aW1n"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["code"], "recognition_failed");
        assert!(state.store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn empty_frame_is_rejected() {
        let (state, _, _) = fake_state().await;
        let app = crate::app::build_app(state);
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/captures",
            Some(json!({"image_b64": ""})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "camera_unavailable");
    }

    #[tokio::test]
    async fn background_recognition_can_be_polled() {
        let (state, recognizer, _) = fake_state().await;
        recognizer.push(Ok(vec![item("tea", 5.0)]));
        let app = crate::app::build_app(state);

        let (status, view) = send(
            &app,
            Method::POST,
            "/api/v1/captures",
            Some(json!({"image_b64": "aW1n"})),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let id = view["id"].as_str().unwrap().to_string();

        let mut ready = false;
        for _ in 0..50 {
            let (_, view) = send(&app, Method::GET, &format!("/api/v1/captures/{id}"), None).await;
            if view["status"] == "ready" {
                ready = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(ready);
    }

    #[tokio::test]
    async fn confirm_without_body_accepts_all_items() {
        let (state, recognizer, _) = fake_state().await;
        recognizer.push(Ok(vec![item("rice", 100.0)]));
        let app = crate::app::build_app(state.clone());
        let (_, view) = send(
            &app,
            Method::POST,
            "/api/v1/captures?wait=true",
            Some(json!({"image_b64": "aW1n"})),
        )
        .await;
        let id = view["id"].as_str().unwrap().to_string();

        let (status, _) = send(&app, Method::POST, &format!("/api/v1/captures/{id}/confirm"), None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(state.store.snapshot().len(), 1);
    }
}
