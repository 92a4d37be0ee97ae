//! Account route handlers.
//!
//! These routes require authentication. Subscription ids that belong to
//! another account answer 404.

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use serde::Deserialize;
use tracing::instrument;

use bakehouse_core::{SubscriptionId, SubscriptionStatus};

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::{Order, ProfileUpdate, Subscription, UserProfile};
use crate::services::account::AccountService;
use crate::services::subscriptions::{
    AddressUpdate, ItemsUpdate, ScheduleUpdate, SubscriptionService,
};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub status: SubscriptionStatus,
}

/// GET /account/profile
///
/// # Errors
///
/// Returns 404 if the account was deleted under the session.
pub async fn profile(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<UserProfile>> {
    let profile = AccountService::new(state.store()).profile(user.id).await?;
    Ok(Json(profile))
}

/// PATCH /account/profile
///
/// # Errors
///
/// Returns 400 for an empty edit, a blank name, or an undeliverable ZIP.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn update_profile(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<UserProfile>> {
    let settings = state.settings().snapshot();
    let profile = AccountService::new(state.store())
        .update_profile(user.id, &update, &settings)
        .await?;
    Ok(Json(profile))
}

/// Orders placed by the account or under its email, newest first.
///
/// GET /account/orders
///
/// # Errors
///
/// Returns a database error if either lookup fails.
pub async fn orders(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<Order>>> {
    let orders = AccountService::new(state.store()).orders(user.id).await?;
    Ok(Json(orders))
}

/// GET /account/subscriptions
///
/// # Errors
///
/// Returns a database error if the lookup fails.
pub async fn subscriptions(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<Subscription>>> {
    let subscriptions = SubscriptionService::new(state.store(), user.id).list().await?;
    Ok(Json(subscriptions))
}

/// PATCH /account/subscriptions/{id}/schedule
///
/// # Errors
///
/// Returns 400 if the weekday is not a delivery day, 409 if cancelled.
pub async fn update_schedule(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<SubscriptionId>,
    Json(update): Json<ScheduleUpdate>,
) -> Result<Json<Subscription>> {
    let settings = state.settings().snapshot();
    let subscription = SubscriptionService::new(state.store(), user.id)
        .update_schedule(id, &update, &settings, Utc::now(), state.config().timezone)
        .await?;
    Ok(Json(subscription))
}

/// PATCH /account/subscriptions/{id}/items
///
/// # Errors
///
/// Returns 400 for an empty or unknown selection, 409 if cancelled.
pub async fn update_items(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<SubscriptionId>,
    Json(update): Json<ItemsUpdate>,
) -> Result<Json<Subscription>> {
    let settings = state.settings().snapshot();
    let subscription = SubscriptionService::new(state.store(), user.id)
        .update_items(id, &update, &settings)
        .await?;
    Ok(Json(subscription))
}

/// PATCH /account/subscriptions/{id}/address
///
/// # Errors
///
/// Returns 400 for a blank street or an undeliverable ZIP, 409 if cancelled.
pub async fn update_address(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<SubscriptionId>,
    Json(update): Json<AddressUpdate>,
) -> Result<Json<Subscription>> {
    let settings = state.settings().snapshot();
    let subscription = SubscriptionService::new(state.store(), user.id)
        .update_address(id, &update, &settings)
        .await?;
    Ok(Json(subscription))
}

/// POST /account/subscriptions/{id}/status
///
/// # Errors
///
/// Returns 409 for a transition the status machine forbids.
pub async fn change_status(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<SubscriptionId>,
    Json(change): Json<StatusChange>,
) -> Result<Json<Subscription>> {
    let subscription = SubscriptionService::new(state.store(), user.id)
        .change_status(id, change.status)
        .await?;
    Ok(Json(subscription))
}
