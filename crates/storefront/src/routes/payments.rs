//! Payments platform passthrough routes.
//!
//! Thin JSON wrappers over [`PaymentGateway`] for the account dashboard and
//! custom payment pages. Every intent and card touched here must belong to
//! the signed-in account's customer; anything else is reported as not found.
//! Guest checkout goes through `/checkout` instead.

use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument};

use bakehouse_core::{
    Cents, CustomerId, Email, Frequency, PaymentIntentId, PaymentMethodId, SetupIntentId, UserId,
};

use crate::error::{AppError, Result};
use crate::middleware::{OptionalAuth, RequireAuth};
use crate::models::{CurrentUser, UserProfile};
use crate::payments::{
    CaptureMethod, CardDetails, CreatePaymentIntent, CreateSetupIntent, PaymentGateway,
    PaymentIntent, SetupIntent,
};
use crate::services::checkout::linked_customer;
use crate::state::AppState;

/// Platform limits on metadata.
const MAX_METADATA_KEYS: usize = 50;
const MAX_METADATA_VALUE_CHARS: usize = 500;

// =============================================================================
// Response Types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub status: String,
}

impl From<PaymentIntent> for IntentResponse {
    fn from(intent: PaymentIntent) -> Self {
        Self {
            id: intent.id.as_str().to_owned(),
            client_secret: intent.client_secret,
            status: intent.status.as_str().to_owned(),
        }
    }
}

impl From<SetupIntent> for IntentResponse {
    fn from(intent: SetupIntent) -> Self {
        Self {
            id: intent.id.as_str().to_owned(),
            client_secret: intent.client_secret,
            status: intent.status.as_str().to_owned(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CustomerResponse {
    pub id: CustomerId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodView {
    pub id: PaymentMethodId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card: Option<CardDetails>,
    pub is_default: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodsResponse {
    pub payment_methods: Vec<PaymentMethodView>,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

// =============================================================================
// Request Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CustomerRequest {
    pub email: String,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentIntentRequest {
    pub amount: Cents,
    #[serde(default)]
    pub order_details: BTreeMap<String, Value>,
    pub user_id: Option<UserId>,
    pub payment_method_id: Option<PaymentMethodId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSetupIntentRequest {
    pub customer_id: CustomerId,
    #[serde(default)]
    pub order_details: BTreeMap<String, Value>,
    pub frequency: Option<Frequency>,
    #[serde(default)]
    pub is_recurring: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachMethodRequest {
    pub payment_method_id: PaymentMethodId,
}

// =============================================================================
// Helpers
// =============================================================================

/// Flatten free-form order details into platform metadata.
fn metadata_from_details(details: &BTreeMap<String, Value>) -> BTreeMap<String, String> {
    details
        .iter()
        .take(MAX_METADATA_KEYS)
        .map(|(key, value)| {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), text.chars().take(MAX_METADATA_VALUE_CHARS).collect())
        })
        .collect()
}

async fn profile(state: &AppState, user: &CurrentUser) -> Result<UserProfile> {
    state
        .store()
        .get_profile(user.id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Please sign in again.".to_owned()))
}

/// The account's customer, linking one if needed.
async fn customer_of(state: &AppState, user: &CurrentUser) -> Result<CustomerId> {
    let profile = profile(state, user).await?;
    Ok(linked_customer(state.gateway(), state.store(), &profile).await?)
}

async fn require_saved_method(
    gateway: &dyn PaymentGateway,
    customer: &CustomerId,
    method: &PaymentMethodId,
) -> Result<()> {
    let saved = gateway.list_payment_methods(customer).await?;
    if saved.iter().any(|m| &m.id == method) {
        Ok(())
    } else {
        Err(AppError::NotFound("Payment method not found".to_owned()))
    }
}

async fn owned_payment_intent(
    state: &AppState,
    user: &CurrentUser,
    id: &PaymentIntentId,
) -> Result<CustomerId> {
    let customer = customer_of(state, user).await?;
    let intent = state.gateway().get_payment_intent(id).await?;
    if intent.customer.as_ref() == Some(&customer) {
        Ok(customer)
    } else {
        Err(AppError::NotFound("Payment not found".to_owned()))
    }
}

async fn owned_setup_intent(
    state: &AppState,
    user: &CurrentUser,
    id: &SetupIntentId,
) -> Result<CustomerId> {
    let customer = customer_of(state, user).await?;
    let intent = state.gateway().get_setup_intent(id).await?;
    if intent.customer.as_ref() == Some(&customer) {
        Ok(customer)
    } else {
        Err(AppError::NotFound("Card setup not found".to_owned()))
    }
}

// =============================================================================
// Customers
// =============================================================================

/// Look up or create the payments customer for an email.
///
/// POST /customer/create-or-find
///
/// A signed-in caller may only ask for their own email, and the customer is
/// linked to their account.
///
/// # Errors
///
/// Returns `AppError::BadRequest` for a malformed or foreign email.
#[instrument(skip_all)]
pub async fn create_or_find_customer(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Json(request): Json<CustomerRequest>,
) -> Result<Json<CustomerResponse>> {
    let email =
        Email::parse(&request.email).map_err(|e| AppError::BadRequest(e.to_string()))?;

    if let Some(user) = &user {
        if user.email != email {
            return Err(AppError::BadRequest(
                "Email does not match the signed-in account".to_owned(),
            ));
        }
        let id = customer_of(&state, user).await?;
        return Ok(Json(CustomerResponse { id }));
    }

    let name = request.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
    let metadata = BTreeMap::from([("guest".to_owned(), "true".to_owned())]);
    let customer =
        crate::payments::create_or_find_customer(state.gateway(), &email, name, metadata).await?;
    Ok(Json(CustomerResponse { id: customer.id }))
}

// =============================================================================
// Payment Intents
// =============================================================================

/// Create a payment intent on the account's customer.
///
/// POST /payment-intent/create
///
/// With a saved `paymentMethodId` the card is attached but not confirmed;
/// otherwise the card entered in the browser is kept for later orders.
///
/// # Errors
///
/// Returns `AppError::BadRequest` for a zero amount or a foreign `userId`.
#[instrument(skip_all, fields(user_id = %user.id, amount = %request.amount))]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(request): Json<CreatePaymentIntentRequest>,
) -> Result<Json<IntentResponse>> {
    if request.amount == Cents::ZERO {
        return Err(AppError::BadRequest("Amount must be positive".to_owned()));
    }
    if request.user_id.is_some_and(|id| id != user.id) {
        return Err(AppError::BadRequest(
            "userId does not match the signed-in account".to_owned(),
        ));
    }

    let customer = customer_of(&state, &user).await?;
    let gateway = state.gateway();
    if let Some(method) = &request.payment_method_id {
        require_saved_method(gateway, &customer, method).await?;
    }

    let mut metadata = metadata_from_details(&request.order_details);
    metadata.insert("user_id".to_owned(), user.id.to_string());

    let intent = gateway
        .create_payment_intent(&CreatePaymentIntent {
            amount: request.amount,
            currency: state.config().stripe.currency.clone(),
            customer: Some(customer),
            capture_method: CaptureMethod::Automatic,
            save_payment_method: request.payment_method_id.is_none(),
            description: None,
            receipt_email: Some(user.email.clone()),
            metadata,
        })
        .await?;

    let intent = match &request.payment_method_id {
        Some(method) => gateway.update_payment_intent(&intent.id, method).await?,
        None => intent,
    };
    info!(intent_id = %intent.id, "Payment intent created");
    Ok(Json(intent.into()))
}

/// Attach a saved card to one of the account's payment intents.
///
/// POST /payment-intent/{id}/update
///
/// # Errors
///
/// Returns `AppError::NotFound` for another customer's intent or card.
#[instrument(skip_all, fields(intent_id = %id))]
pub async fn update_payment_intent(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<PaymentIntentId>,
    Json(request): Json<AttachMethodRequest>,
) -> Result<Json<IntentResponse>> {
    let customer = owned_payment_intent(&state, &user, &id).await?;
    require_saved_method(state.gateway(), &customer, &request.payment_method_id).await?;
    let intent = state
        .gateway()
        .update_payment_intent(&id, &request.payment_method_id)
        .await?;
    Ok(Json(intent.into()))
}

/// Confirm one of the account's payment intents server-side.
///
/// POST /payment-intent/{id}/confirm
///
/// The resulting status is returned as-is; callers treat `succeeded` and
/// `requires_capture` as paid.
///
/// # Errors
///
/// Returns `AppError::NotFound` for another customer's intent.
#[instrument(skip_all, fields(intent_id = %id))]
pub async fn confirm_payment_intent(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<PaymentIntentId>,
) -> Result<Json<IntentResponse>> {
    owned_payment_intent(&state, &user, &id).await?;
    let intent = state.gateway().confirm_payment_intent(&id).await?;
    info!(status = %intent.status, "Payment intent confirmed");
    Ok(Json(intent.into()))
}

// =============================================================================
// Setup Intents
// =============================================================================

/// Create a setup intent to save a card for future charges.
///
/// POST /setup-intent/create
///
/// # Errors
///
/// Returns `AppError::BadRequest` if `customerId` is not the account's.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn create_setup_intent(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(request): Json<CreateSetupIntentRequest>,
) -> Result<Json<IntentResponse>> {
    let customer = customer_of(&state, &user).await?;
    if request.customer_id != customer {
        return Err(AppError::BadRequest(
            "customerId does not match the signed-in account".to_owned(),
        ));
    }

    let mut metadata = metadata_from_details(&request.order_details);
    metadata.insert("user_id".to_owned(), user.id.to_string());
    metadata.insert("is_recurring".to_owned(), request.is_recurring.to_string());
    if let Some(frequency) = request.frequency {
        metadata.insert("frequency".to_owned(), frequency.as_str().to_owned());
    }

    let intent = state
        .gateway()
        .create_setup_intent(&CreateSetupIntent { customer, metadata })
        .await?;
    info!(intent_id = %intent.id, "Setup intent created");
    Ok(Json(intent.into()))
}

/// Attach a saved card to one of the account's setup intents.
///
/// POST /setup-intent/{id}/update
///
/// # Errors
///
/// Returns `AppError::NotFound` for another customer's intent or card.
#[instrument(skip_all, fields(intent_id = %id))]
pub async fn update_setup_intent(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<SetupIntentId>,
    Json(request): Json<AttachMethodRequest>,
) -> Result<Json<IntentResponse>> {
    let customer = owned_setup_intent(&state, &user, &id).await?;
    require_saved_method(state.gateway(), &customer, &request.payment_method_id).await?;
    let intent = state
        .gateway()
        .update_setup_intent(&id, &request.payment_method_id)
        .await?;
    Ok(Json(intent.into()))
}

/// Confirm one of the account's setup intents server-side.
///
/// POST /setup-intent/{id}/confirm
///
/// # Errors
///
/// Returns `AppError::NotFound` for another customer's intent.
#[instrument(skip_all, fields(intent_id = %id))]
pub async fn confirm_setup_intent(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<SetupIntentId>,
) -> Result<Json<IntentResponse>> {
    owned_setup_intent(&state, &user, &id).await?;
    let intent = state.gateway().confirm_setup_intent(&id).await?;
    info!(status = %intent.status, "Setup intent confirmed");
    Ok(Json(intent.into()))
}

// =============================================================================
// Saved Payment Methods
// =============================================================================

/// Cards saved on the account.
///
/// GET /payment-methods
///
/// # Errors
///
/// Returns platform errors from the listing.
pub async fn list_payment_methods(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<PaymentMethodsResponse>> {
    let profile = profile(&state, &user).await?;
    // No customer yet means nothing has been saved
    let Some(customer_id) = profile.customer_id else {
        return Ok(Json(PaymentMethodsResponse {
            payment_methods: Vec::new(),
        }));
    };

    let gateway = state.gateway();
    let customer = gateway.get_customer(&customer_id).await?;
    let default = customer.default_payment_method();
    let payment_methods = gateway
        .list_payment_methods(&customer_id)
        .await?
        .into_iter()
        .map(|m| PaymentMethodView {
            is_default: default == Some(&m.id),
            id: m.id,
            card: m.card,
        })
        .collect();

    Ok(Json(PaymentMethodsResponse { payment_methods }))
}

/// Remove a saved card.
///
/// DELETE /payment-method/{id}
///
/// # Errors
///
/// Returns `AppError::NotFound` if the card is not saved on the account.
#[instrument(skip_all, fields(payment_method = %id))]
pub async fn delete_payment_method(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<PaymentMethodId>,
) -> Result<Json<SuccessResponse>> {
    let customer = customer_of(&state, &user).await?;
    require_saved_method(state.gateway(), &customer, &id).await?;
    state.gateway().detach_payment_method(&id).await?;
    info!("Payment method removed");
    Ok(Json(SuccessResponse { success: true }))
}

/// Make a saved card the default.
///
/// POST /payment-method/{id}/default
///
/// # Errors
///
/// Returns `AppError::NotFound` if the card is not saved on the account.
#[instrument(skip_all, fields(payment_method = %id))]
pub async fn set_default_payment_method(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<PaymentMethodId>,
) -> Result<Json<SuccessResponse>> {
    let customer = customer_of(&state, &user).await?;
    require_saved_method(state.gateway(), &customer, &id).await?;
    state
        .gateway()
        .set_default_payment_method(&customer, &id)
        .await?;
    Ok(Json(SuccessResponse { success: true }))
}
