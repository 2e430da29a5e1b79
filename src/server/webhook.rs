//! Webhook endpoint handler.
//!
//! Verifies the delivery's signature and, if valid, queues one orchestration
//! run. The response is sent as soon as the run is queued; the run itself
//! happens on the build worker.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{info, warn};

use super::AppState;
use crate::types::DeliveryId;
use crate::webhooks::{DELIVERY_HEADER, SIGNATURE_HEADER, verify_signature};
use crate::worker::{QueueClosed, Trigger};

/// Errors that can occur when accepting a webhook.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Missing, malformed or wrong signature. All three look the same to the
    /// caller.
    #[error("invalid signature")]
    InvalidSignature,

    #[error("build worker is not running")]
    QueueClosed(#[from] QueueClosed),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::InvalidSignature => StatusCode::UNAUTHORIZED,
            WebhookError::QueueClosed(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, self.to_string()).into_response()
    }
}

/// Webhook handler.
///
/// # Request
///
/// - Method: POST
/// - `X-Hub-Signature-256`: `sha256=<hex>` HMAC of the body (required)
/// - `X-GitHub-Delivery`: delivery ID, used in logs (optional)
/// - Body: anything; it is authenticated but not interpreted
///
/// # Response
///
/// - 202 Accepted: one run queued
/// - 401 Unauthorized: signature missing, malformed or wrong
/// - 503 Service Unavailable: the build worker has stopped
pub async fn webhook_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), WebhookError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let delivery_id = headers
        .get(DELIVERY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(DeliveryId::new);

    if !verify_signature(&body, signature, app_state.webhook_secret()) {
        warn!(
            delivery_id = delivery_id.as_ref().map_or("-", DeliveryId::as_str),
            "Rejected webhook with invalid signature"
        );
        return Err(WebhookError::InvalidSignature);
    }

    info!(
        delivery_id = delivery_id.as_ref().map_or("-", DeliveryId::as_str),
        "Webhook accepted, queueing run"
    );
    app_state.queue().enqueue(Trigger::Webhook { delivery_id })?;

    Ok((StatusCode::ACCEPTED, "Accepted"))
}
