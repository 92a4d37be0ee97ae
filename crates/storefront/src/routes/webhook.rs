//! Payments platform webhook receiver.
//!
//! Deliveries are acknowledged once their signature checks out. Order
//! records are written by checkout, not here, so no event changes state.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::payments::webhook::SIGNATURE_HEADER;
use crate::state::AppState;

/// Verify and acknowledge a webhook delivery.
///
/// POST /webhook
///
/// Answers `400 {"error": "Invalid signature"}` for anything that fails
/// verification, and `{"received": true}` otherwise.
#[instrument(skip_all)]
pub async fn receive(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let event = match state.webhooks().verify(&body, signature, Utc::now()) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Rejected webhook delivery");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid signature" })),
            )
                .into_response();
        }
    };

    let object_id = event.object_id().unwrap_or("unknown");
    match event.event_type.as_str() {
        "payment_intent.succeeded" => {
            info!(event_id = %event.id, intent_id = %object_id, "Payment succeeded");
        }
        "payment_intent.payment_failed" => {
            warn!(event_id = %event.id, intent_id = %object_id, "Payment failed");
        }
        other => {
            info!(event_id = %event.id, event_type = %other, "Unhandled webhook event");
        }
    }

    Json(json!({ "received": true })).into_response()
}
