//! Checkout route handlers.
//!
//! The pending order lives in the session from `/orders/draft` until
//! checkout succeeds. A missing or expired one means the customer has to
//! start again (409).

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use bakehouse_core::PaymentMethodId;

use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::OptionalAuth;
use crate::models::{CurrentUser, PendingOrder, UserProfile, keys};
use crate::routes::session_error;
use crate::services::checkout::{CheckoutConfirmation, CheckoutError, CheckoutOutcome, CheckoutService};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PayRequest {
    #[serde(alias = "paymentMethodId")]
    pub payment_method_id: Option<PaymentMethodId>,
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    #[serde(alias = "intentId")]
    pub intent_id: String,
}

/// The session's pending order, dropping it if it has expired.
async fn pending_order(session: &Session, now: DateTime<Utc>) -> Result<PendingOrder> {
    let pending: Option<PendingOrder> = session
        .get(keys::PENDING_ORDER)
        .await
        .map_err(session_error)?;
    match pending {
        Some(pending) if !pending.is_expired(now) => Ok(pending),
        Some(_) => {
            session
                .remove::<PendingOrder>(keys::PENDING_ORDER)
                .await
                .map_err(session_error)?;
            Err(CheckoutError::OrderExpired.into())
        }
        None => Err(CheckoutError::OrderExpired.into()),
    }
}

async fn account(state: &AppState, user: Option<&CurrentUser>) -> Result<Option<UserProfile>> {
    let Some(user) = user else {
        return Ok(None);
    };
    state
        .store()
        .get_profile(user.id)
        .await?
        .map(Some)
        .ok_or_else(|| AppError::Unauthorized("Please sign in again.".to_owned()))
}

/// Swap the pending order for the one-shot confirmation.
async fn finish(session: &Session, confirmation: &CheckoutConfirmation) -> Result<()> {
    session
        .remove::<PendingOrder>(keys::PENDING_ORDER)
        .await
        .map_err(session_error)?;
    session
        .insert(keys::CHECKOUT_CONFIRMATION, confirmation)
        .await
        .map_err(session_error)
}

/// Start paying for the pending order.
///
/// POST /checkout/pay
///
/// Returns either what the browser needs to confirm the card, or the
/// completed order when a saved card was charged server-side.
///
/// # Errors
///
/// Returns 409 when there is no live pending order, 400 when the platform
/// reports a non-success status, and 502 when it cannot be reached.
#[instrument(skip_all, fields(authenticated = user.is_some()))]
pub async fn pay(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    session: Session,
    Json(request): Json<PayRequest>,
) -> Result<Json<CheckoutOutcome>> {
    let now = Utc::now();
    let mut pending = pending_order(&session, now).await?;
    let profile = account(&state, user.as_ref()).await?;

    let config = state.config();
    let checkout = CheckoutService::new(
        state.gateway(),
        state.store(),
        &config.stripe.currency,
        config.timezone,
    );
    let outcome = checkout
        .begin(
            &mut pending,
            profile.as_ref(),
            request.payment_method_id.as_ref(),
            now,
        )
        .await?;

    match &outcome {
        CheckoutOutcome::Completed(confirmation) => finish(&session, confirmation).await?,
        CheckoutOutcome::RequiresClientConfirmation(client) => {
            add_breadcrumb(
                "checkout",
                "Awaiting client confirmation",
                &[("flow", client.flow.as_str()), ("intent_id", client.intent_id.as_str())],
            );
            session
                .insert(keys::PENDING_ORDER, &pending)
                .await
                .map_err(session_error)?;
        }
    }

    Ok(Json(outcome))
}

/// Record the order once the browser has confirmed the intent.
///
/// POST /checkout/complete
///
/// # Errors
///
/// Returns 409 when there is no live pending order or the intent is not the
/// one created for it, and 400 when the payment did not succeed.
#[instrument(skip_all, fields(intent_id = %request.intent_id))]
pub async fn complete(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    session: Session,
    Json(request): Json<CompleteRequest>,
) -> Result<Json<CheckoutConfirmation>> {
    let now = Utc::now();
    let pending = pending_order(&session, now).await?;

    let config = state.config();
    let checkout = CheckoutService::new(
        state.gateway(),
        state.store(),
        &config.stripe.currency,
        config.timezone,
    );
    let confirmation = checkout
        .complete(&pending, user.map(|u| u.id), &request.intent_id, now)
        .await?;

    finish(&session, &confirmation).await?;
    Ok(Json(confirmation))
}

/// The last completed checkout. Readable once.
///
/// GET /checkout/confirmation
///
/// # Errors
///
/// Returns `AppError::NotFound` when there is nothing to show.
pub async fn confirmation(session: Session) -> Result<Json<CheckoutConfirmation>> {
    session
        .remove::<CheckoutConfirmation>(keys::CHECKOUT_CONFIRMATION)
        .await
        .map_err(session_error)?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("No completed order to show".to_owned()))
}
