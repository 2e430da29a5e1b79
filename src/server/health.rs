//! Health check endpoint for liveness probes.

use axum::extract::State;
use axum::http::StatusCode;

use super::AppState;

/// Returns 200 while the build worker is accepting triggers, 503 once it has
/// stopped.
pub async fn health_handler(State(app_state): State<AppState>) -> (StatusCode, &'static str) {
    if app_state.queue().is_closed() {
        (StatusCode::SERVICE_UNAVAILABLE, "worker stopped")
    } else {
        (StatusCode::OK, "OK")
    }
}
