use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use time::OffsetDateTime;
use tracing::{error, instrument};

use super::dto::{
    MealDetails, MealListItem, MealListResponse, Pagination, SummaryResponse, TrendQuery,
    TrendResponse,
};
use super::model::MealId;
use super::stats::{average_daily_total, today_progress, trailing_daily_totals};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

const MAX_PAGE: usize = 100;
const MAX_TREND_DAYS: usize = 366;

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/meals", get(list_meals))
        .route("/meals/:id", get(get_meal).delete(delete_meal))
        .route("/meals/:id/photo", get(get_photo))
}

pub fn stats_routes() -> Router<AppState> {
    Router::new()
        .route("/stats/today", get(stats_today))
        .route("/stats/trend", get(stats_trend))
        .route("/stats/summary", get(stats_summary))
}

#[instrument(skip(state))]
pub async fn list_meals(
    State(state): State<AppState>,
    Query(p): Query<Pagination>,
) -> AppResult<Json<MealListResponse>> {
    if p.limit == 0 || p.limit > MAX_PAGE {
        return Err(AppError::InvalidRequest(format!(
            "limit must be between 1 and {MAX_PAGE}"
        )));
    }
    let history = state.store.snapshot();
    let meals = history
        .records()
        .iter()
        .skip(p.offset)
        .take(p.limit)
        .map(MealListItem::from)
        .collect();
    Ok(Json(MealListResponse {
        total: history.len(),
        meals,
    }))
}

#[instrument(skip(state))]
pub async fn get_meal(
    State(state): State<AppState>,
    Path(id): Path<MealId>,
) -> AppResult<Json<MealDetails>> {
    let meal = state
        .store
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("meal {id}")))?;
    Ok(Json(MealDetails::from(&meal)))
}

#[instrument(skip(state))]
pub async fn get_photo(
    State(state): State<AppState>,
    Path(id): Path<MealId>,
) -> AppResult<impl IntoResponse> {
    let meal = state
        .store
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("meal {id}")))?;
    let bytes = STANDARD.decode(meal.image()).map_err(|e| {
        error!(error = %e, meal_id = %id, "stored photo is not valid base64");
        AppError::CorruptHistory(format!("photo of meal {id} is unreadable"))
    })?;
    Ok((
        [(header::CONTENT_TYPE, meal.content_type().to_string())],
        Bytes::from(bytes),
    ))
}

/// Deleting an unknown meal is not an error.
#[instrument(skip(state))]
pub async fn delete_meal(
    State(state): State<AppState>,
    Path(id): Path<MealId>,
) -> AppResult<StatusCode> {
    state.store.remove(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn stats_today(State(state): State<AppState>) -> Json<super::stats::TodayProgress> {
    let history = state.store.snapshot();
    Json(today_progress(
        &history,
        state.config.daily_target_kcal,
        OffsetDateTime::now_utc(),
        state.config.utc_offset,
    ))
}

#[instrument(skip(state))]
pub async fn stats_trend(
    State(state): State<AppState>,
    Query(q): Query<TrendQuery>,
) -> AppResult<Json<TrendResponse>> {
    if q.days == 0 || q.days > MAX_TREND_DAYS {
        return Err(AppError::InvalidRequest(format!(
            "days must be between 1 and {MAX_TREND_DAYS}"
        )));
    }
    let history = state.store.snapshot();
    let now = OffsetDateTime::now_utc();
    let offset = state.config.utc_offset;
    Ok(Json(TrendResponse {
        days: trailing_daily_totals(&history, q.days, now, offset, state.config.language),
        average: average_daily_total(&history, q.days, now, offset),
    }))
}

#[instrument(skip(state))]
pub async fn stats_summary(State(state): State<AppState>) -> Json<SummaryResponse> {
    let history = state.store.snapshot();
    let now = OffsetDateTime::now_utc();
    let offset = state.config.utc_offset;
    Json(SummaryResponse {
        today: today_progress(&history, state.config.daily_target_kcal, now, offset),
        week: trailing_daily_totals(&history, 7, now, offset, state.config.language),
        weekly_average: average_daily_total(&history, 7, now, offset),
        meal_count: history.len(),
    })
}
