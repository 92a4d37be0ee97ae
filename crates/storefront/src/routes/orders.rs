//! Order form submission.

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_sessions::Session;
use tracing::{info, instrument};

use bakehouse_core::{OrderDraft, OrderRequest};

use crate::error::Result;
use crate::middleware::OptionalAuth;
use crate::models::{PendingOrder, keys};
use crate::routes::session_error;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftResponse {
    pub draft: OrderDraft,
    pub expires_at: DateTime<Utc>,
}

/// Validate and price an order, holding it in the session for checkout.
///
/// POST /orders/draft
///
/// Replaces any earlier pending order. Nothing is sent to the payments
/// platform.
///
/// # Errors
///
/// Returns `AppError::Order` with the first failing rule's message.
#[instrument(skip_all, fields(authenticated = user.is_some()))]
pub async fn create_draft(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    session: Session,
    Json(request): Json<OrderRequest>,
) -> Result<Json<DraftResponse>> {
    let settings = state.settings().snapshot();
    let now = Utc::now();
    let draft = OrderDraft::assemble(
        &request,
        &settings,
        user.is_some(),
        now,
        state.config().timezone,
    )?;

    let pending = PendingOrder::new(draft, now);
    session
        .insert(keys::PENDING_ORDER, &pending)
        .await
        .map_err(session_error)?;
    info!(total = %pending.draft.total(), recurring = pending.draft.is_recurring(), "Order draft created");

    Ok(Json(DraftResponse {
        expires_at: pending.expires_at,
        draft: pending.draft,
    }))
}
