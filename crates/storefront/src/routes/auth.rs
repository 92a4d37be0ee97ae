//! Authentication route handlers.
//!
//! Email and password accounts. A successful signup or login stores
//! [`CurrentUser`] in the session.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use bakehouse_core::{CustomerId, Email, UserId};

use crate::error::{Result, clear_sentry_user, set_sentry_user};
use crate::middleware::{clear_current_user, set_current_user};
use crate::models::{CurrentUser, UserProfile};
use crate::routes::session_error;
use crate::services::auth::{AuthService, SignupRequest};
use crate::state::AppState;

/// Login form data.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// The signed-in account as returned to the browser.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    pub id: UserId,
    pub email: Email,
    pub name: String,
    pub customer_id: Option<CustomerId>,
}

impl From<UserProfile> for AccountResponse {
    fn from(profile: UserProfile) -> Self {
        Self {
            id: profile.id,
            email: profile.email,
            name: profile.name,
            customer_id: profile.customer_id,
        }
    }
}

async fn sign_in(session: &Session, profile: &UserProfile) -> Result<()> {
    let user = CurrentUser {
        id: profile.id,
        email: profile.email.clone(),
    };
    set_current_user(session, &user)
        .await
        .map_err(session_error)?;
    set_sentry_user(&profile.id, Some(profile.email.as_str()));
    Ok(())
}

/// Create an account and sign in.
///
/// POST /auth/signup
///
/// # Errors
///
/// Returns `AppError::Auth` for invalid input, a failed captcha, or a taken email.
#[instrument(skip_all)]
pub async fn signup(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<SignupRequest>,
) -> Result<Response> {
    let settings = state.settings().snapshot();
    let auth = AuthService::new(state.store(), state.gateway(), state.captcha());
    let profile = auth.signup(&request, &settings).await?;

    sign_in(&session, &profile).await?;
    Ok((StatusCode::CREATED, Json(AccountResponse::from(profile))).into_response())
}

/// Sign in.
///
/// POST /auth/login
///
/// # Errors
///
/// Returns `AppError::Auth` (401) for a wrong email or password.
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AccountResponse>> {
    let auth = AuthService::new(state.store(), state.gateway(), state.captcha());
    let profile = auth.login(&request.email, &request.password).await?;

    sign_in(&session, &profile).await?;
    Ok(Json(AccountResponse::from(profile)))
}

/// Sign out. Also drops any pending order.
///
/// POST /auth/logout
///
/// # Errors
///
/// Returns `AppError::Internal` if the session store fails.
pub async fn logout(session: Session) -> Result<StatusCode> {
    clear_current_user(&session).await.map_err(session_error)?;
    clear_sentry_user();
    Ok(StatusCode::NO_CONTENT)
}
