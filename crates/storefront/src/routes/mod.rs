//! HTTP route handlers for storefront.
//!
//! Every route speaks JSON. Errors use the body documented on
//! [`crate::error::AppError`].
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                       - Liveness
//! GET    /health/ready                 - Readiness (database reachable)
//!
//! # Catalog
//! GET    /products                     - Products and delivery settings
//! GET    /delivery/dates?count=N       - Next deliverable dates
//! GET    /delivery/zip/{zip}           - ZIP eligibility
//!
//! # Auth (rate limited)
//! POST   /auth/signup                  - Create account and sign in
//! POST   /auth/login                   - Sign in
//! POST   /auth/logout                  - Sign out
//!
//! # Ordering
//! POST   /orders/draft                 - Validate and price; holds the pending order
//!
//! # Checkout (rate limited)
//! POST   /checkout/pay                 - Run the selected payment flow
//! POST   /checkout/complete            - Record the order after client confirmation
//! GET    /checkout/confirmation        - One-shot success payload
//!
//! # Payments platform passthrough (rate limited, account only)
//! POST   /customer/create-or-find
//! POST   /payment-intent/create
//! POST   /payment-intent/{id}/update
//! POST   /payment-intent/{id}/confirm
//! POST   /setup-intent/create
//! POST   /setup-intent/{id}/update
//! POST   /setup-intent/{id}/confirm
//! GET    /payment-methods
//! DELETE /payment-method/{id}
//! POST   /payment-method/{id}/default
//!
//! # Webhook
//! POST   /webhook                      - Signed platform events
//!
//! # Account (requires auth)
//! GET    /account/profile, PATCH /account/profile
//! GET    /account/orders
//! GET    /account/subscriptions
//! PATCH  /account/subscriptions/{id}/schedule | /items | /address
//! POST   /account/subscriptions/{id}/status
//! ```

pub mod account;
pub mod auth;
pub mod catalog;
pub mod checkout;
pub mod health;
pub mod orders;
pub mod payments;
pub mod webhook;


use axum::{
    Router,
    routing::{get, patch, post},
};

use crate::error::AppError;
use crate::middleware::RateLimits;
use crate::state::AppState;

/// Map a session store failure to a 500.
pub(crate) fn session_error(err: tower_sessions::session::Error) -> AppError {
    AppError::Internal(format!("session error: {err}"))
}

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
}

/// Create the checkout routes router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/pay", post(checkout::pay))
        .route("/complete", post(checkout::complete))
        .route("/confirmation", get(checkout::confirmation))
}

/// Create the payments passthrough router.
pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/customer/create-or-find", post(payments::create_or_find_customer))
        .route("/payment-intent/create", post(payments::create_payment_intent))
        .route(
            "/payment-intent/{id}/update",
            post(payments::update_payment_intent),
        )
        .route(
            "/payment-intent/{id}/confirm",
            post(payments::confirm_payment_intent),
        )
        .route("/setup-intent/create", post(payments::create_setup_intent))
        .route("/setup-intent/{id}/update", post(payments::update_setup_intent))
        .route(
            "/setup-intent/{id}/confirm",
            post(payments::confirm_setup_intent),
        )
        .route("/payment-methods", get(payments::list_payment_methods))
        .route(
            "/payment-method/{id}",
            axum::routing::delete(payments::delete_payment_method),
        )
        .route(
            "/payment-method/{id}/default",
            post(payments::set_default_payment_method),
        )
}

/// Create the account routes router.
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/profile",
            get(account::profile).patch(account::update_profile),
        )
        .route("/orders", get(account::orders))
        .route("/subscriptions", get(account::subscriptions))
        .route(
            "/subscriptions/{id}/schedule",
            patch(account::update_schedule),
        )
        .route("/subscriptions/{id}/items", patch(account::update_items))
        .route("/subscriptions/{id}/address", patch(account::update_address))
        .route("/subscriptions/{id}/status", post(account::change_status))
}

/// Create all routes for the storefront.
pub fn routes(limits: RateLimits) -> Router<AppState> {
    let mut auth = auth_routes();
    if let Some(layer) = limits.auth {
        auth = auth.layer(layer);
    }

    let mut payments = Router::new()
        .nest("/checkout", checkout_routes())
        .merge(payment_routes());
    if let Some(layer) = limits.payments {
        payments = payments.layer(layer);
    }

    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .route("/products", get(catalog::products))
        .route("/delivery/dates", get(catalog::delivery_dates))
        .route("/delivery/zip/{zip}", get(catalog::check_zip))
        .route("/orders/draft", post(orders::create_draft))
        .route("/webhook", post(webhook::receive))
        .nest("/auth", auth)
        .nest("/account", account_routes())
        .merge(payments)
}
