mod flow;
pub mod handlers;

pub use flow::CaptureFlow;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::capture_routes()
}
