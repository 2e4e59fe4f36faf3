pub mod dto;
pub mod handlers;
pub mod model;
pub mod stats;
pub mod store;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::read_routes())
        .merge(handlers::stats_routes())
}
