//! Build history inspection endpoint.

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;

use super::AppState;
use crate::types::BuildRecord;

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    /// Only return records for this branch.
    pub branch: Option<String>,
}

/// Returns persisted build records, oldest first.
///
/// ```ignore
/// GET /api/v1/history?branch=master HTTP/1.1
///
/// HTTP/1.1 200 OK
/// Content-Type: application/json
///
/// [{"seq":0,"ts":"…","branch":"master","hash":"…","succeeded":true,"result":{…}}]
/// ```
pub async fn history_handler(
    State(app_state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<BuildRecord>> {
    let history = app_state.history();
    let records = match query.branch {
        Some(branch) => history.for_branch(&branch),
        None => history.all(),
    };
    Json(records)
}
