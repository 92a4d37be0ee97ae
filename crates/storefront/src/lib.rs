//! Bakehouse Storefront library.
//!
//! The ordering and checkout HTTP service as a library, so the binary,
//! the operator CLI and tests share one router.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod routes;
pub mod services;
pub mod state;

#[cfg(test)]
mod test_support;

use axum::Router;
use tower_http::trace::TraceLayer;
use tower_sessions::{SessionManagerLayer, SessionStore};

use middleware::RateLimits;
use state::AppState;

/// Build the full application: routes, sessions and the middleware stack.
///
/// Layers run outermost first: Sentry, request id, tracing, security
/// headers, sessions.
pub fn app<S>(state: AppState, session_layer: SessionManagerLayer<S>, limits: RateLimits) -> Router
where
    S: SessionStore + Clone,
{
    Router::new()
        .merge(routes::routes(limits))
        .layer(session_layer)
        .layer(axum::middleware::from_fn(
            middleware::security_headers_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}
