//! HTTP server for the build robot.
//!
//! # Endpoints
//!
//! - `POST /<webhook path>` - Accepts signed change notifications (202 Accepted)
//! - `GET /api/v1/history[?branch=<name>]` - Returns the build history as JSON
//! - `GET /health` - Returns 200 while the build worker is running

use std::sync::Arc;

pub mod health;
pub mod history;
pub mod webhook;

pub use health::health_handler;
pub use history::history_handler;
pub use webhook::webhook_handler;

use crate::persistence::BuildHistory;
use crate::worker::TriggerQueue;

/// Shared application state, passed to handlers via axum's `State`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Secret for HMAC-SHA256 signature verification.
    webhook_secret: Vec<u8>,

    /// Where verified webhooks queue their runs.
    queue: TriggerQueue,

    /// Read-only view for the history endpoint.
    history: Arc<BuildHistory>,
}

impl AppState {
    pub fn new(
        webhook_secret: impl Into<Vec<u8>>,
        queue: TriggerQueue,
        history: Arc<BuildHistory>,
    ) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                webhook_secret: webhook_secret.into(),
                queue,
                history,
            }),
        }
    }

    pub fn webhook_secret(&self) -> &[u8] {
        &self.inner.webhook_secret
    }

    pub fn queue(&self) -> &TriggerQueue {
        &self.inner.queue
    }

    pub fn history(&self) -> &BuildHistory {
        &self.inner.history
    }
}

/// Builds the axum Router with all endpoints.
///
/// `webhook_path` is a single path segment without slashes, e.g. `webhooks`.
pub fn build_router(app_state: AppState, webhook_path: &str) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route(&format!("/{webhook_path}"), post(webhook_handler))
        .route("/api/v1/history", get(history_handler))
        .route("/health", get(health_handler))
        .with_state(app_state)
}
