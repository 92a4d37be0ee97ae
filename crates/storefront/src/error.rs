//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//!
//! Every error renders as `{"error": true, "message": "..."}`. Messages for
//! caller mistakes are shown verbatim; platform and database failures get a
//! generic message and the detail goes to the log and Sentry.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use bakehouse_core::OrderDraftError;

use crate::db::RepositoryError;
use crate::payments::PaymentsError;
use crate::services::account::AccountError;
use crate::services::auth::AuthError;
use crate::services::checkout::{CheckoutError, LinkCustomerError};
use crate::services::subscriptions::SubscriptionError;

const INTERNAL_MESSAGE: &str = "Internal server error";
const PAYMENTS_UNAVAILABLE: &str =
    "We couldn't reach our payment processor. Please try again in a moment.";

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Payments platform call failed.
    #[error("Payments error: {0}")]
    Payments(#[from] PaymentsError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Order form rejected.
    #[error("{0}")]
    Order(#[from] OrderDraftError),

    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    #[error("Subscription error: {0}")]
    Subscription(#[from] SubscriptionError),

    #[error("Account error: {0}")]
    Account(#[from] AccountError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<LinkCustomerError> for AppError {
    fn from(err: LinkCustomerError) -> Self {
        match err {
            LinkCustomerError::Payments(e) => Self::Payments(e),
            LinkCustomerError::Repository(e) => Self::Database(e),
        }
    }
}

fn repository_response(err: &RepositoryError) -> (StatusCode, String) {
    match err {
        RepositoryError::NotFound(_) => (StatusCode::NOT_FOUND, "Not found".to_owned()),
        RepositoryError::Conflict(_) => (
            StatusCode::CONFLICT,
            "This was already recorded".to_owned(),
        ),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_owned()),
    }
}

impl AppError {
    /// Status code and client-safe message.
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            Self::Database(err) => repository_response(err),
            // Platform 4xx answers included: the caller cannot fix them
            Self::Payments(_) => (StatusCode::BAD_GATEWAY, PAYMENTS_UNAVAILABLE.to_owned()),
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials | AuthError::UserNotFound => {
                    (StatusCode::UNAUTHORIZED, "Invalid credentials".to_owned())
                }
                AuthError::UserAlreadyExists => (
                    StatusCode::CONFLICT,
                    "An account with this email already exists".to_owned(),
                ),
                AuthError::WeakPassword(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
                AuthError::InvalidEmail(_) => {
                    (StatusCode::BAD_REQUEST, "Invalid email address".to_owned())
                }
                AuthError::MissingName => {
                    (StatusCode::BAD_REQUEST, "Please enter your name".to_owned())
                }
                AuthError::UndeliverableZip(zip) => (
                    StatusCode::BAD_REQUEST,
                    format!("We don't deliver to ZIP code {zip}"),
                ),
                AuthError::CaptchaFailed => (
                    StatusCode::BAD_REQUEST,
                    "Captcha verification failed".to_owned(),
                ),
                AuthError::Captcha(_) => (
                    StatusCode::BAD_GATEWAY,
                    "Captcha service unavailable".to_owned(),
                ),
                AuthError::Repository(err) => repository_response(err),
                AuthError::PasswordHash => {
                    (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_owned())
                }
            },
            Self::Order(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            Self::Checkout(err) => match err {
                CheckoutError::OrderExpired | CheckoutError::IntentMismatch => {
                    (StatusCode::CONFLICT, err.to_string())
                }
                CheckoutError::PaymentNotCompleted(_) => (StatusCode::BAD_REQUEST, err.to_string()),
                CheckoutError::AccountRequired | CheckoutError::Flow(_) => (
                    StatusCode::UNAUTHORIZED,
                    "Please sign in to set up a recurring order".to_owned(),
                ),
                CheckoutError::Payments(_) => {
                    (StatusCode::BAD_GATEWAY, PAYMENTS_UNAVAILABLE.to_owned())
                }
                CheckoutError::Repository(err) => repository_response(err),
            },
            Self::Subscription(err) => match err {
                SubscriptionError::NotFound => (StatusCode::NOT_FOUND, err.to_string()),
                SubscriptionError::Cancelled | SubscriptionError::InvalidTransition { .. } => {
                    (StatusCode::CONFLICT, err.to_string())
                }
                SubscriptionError::Repository(err) => repository_response(err),
                _ => (StatusCode::BAD_REQUEST, err.to_string()),
            },
            Self::Account(err) => match err {
                AccountError::NotFound => (StatusCode::NOT_FOUND, err.to_string()),
                AccountError::Repository(err) => repository_response(err),
                _ => (StatusCode::BAD_REQUEST, err.to_string()),
            },
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_owned()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        (status, Json(json!({ "error": true, "message": message }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for checkout steps.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
pub fn add_breadcrumb(category: &str, message: &str, data: &[(&str, &str)]) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    for (key, value) in data {
        breadcrumb.data.insert(
            (*key).to_string(),
            serde_json::Value::String((*value).to_string()),
        );
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::to_bytes;
    use bakehouse_core::IntentStatus;

    use super::*;

    async fn render(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("order-123".to_string());
        assert_eq!(err.to_string(), "Not found: order-123");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[tokio::test]
    async fn test_app_error_status_codes() {
        assert_eq!(
            render(AppError::NotFound("test".to_string())).await.0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            render(AppError::Unauthorized("test".to_string())).await.0,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            render(CheckoutError::OrderExpired.into()).await.0,
            StatusCode::CONFLICT
        );
    }

    #[tokio::test]
    async fn test_body_shape_and_verbatim_messages() {
        let (status, body) = render(OrderDraftError::EmptyCart.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], true);
        assert_eq!(body["message"], OrderDraftError::EmptyCart.to_string());

        let (_, body) = render(
            CheckoutError::PaymentNotCompleted(IntentStatus::from("requires_action")).into(),
        )
        .await;
        assert_eq!(
            body["message"],
            "Payment was not completed (status: requires_action). Please try again."
        );
    }

    #[tokio::test]
    async fn test_internal_details_are_hidden() {
        let (status, body) = render(AppError::Internal("pool exhausted".to_string())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], INTERNAL_MESSAGE);

        let (status, body) = render(
            PaymentsError::Api {
                status: 503,
                message: "upstream timeout sk_live_abc".to_owned(),
                code: None,
            }
            .into(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["message"], PAYMENTS_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_platform_client_errors_are_server_errors() {
        let declined = PaymentsError::Api {
            status: 402,
            message: "Your card was declined.".to_owned(),
            code: Some("card_declined".to_owned()),
        };
        let (status, body) = render(declined.into()).await;
        assert!(status.is_server_error());
        assert_eq!(body["message"], PAYMENTS_UNAVAILABLE);

        let missing = PaymentsError::Api {
            status: 404,
            message: "No such payment_intent".to_owned(),
            code: Some("resource_missing".to_owned()),
        };
        let (status, _) = render(CheckoutError::Payments(missing).into()).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        // Only an incomplete payment reported by the platform is the caller's problem
        let (status, _) = render(
            CheckoutError::PaymentNotCompleted(IntentStatus::from("requires_payment_method"))
                .into(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
