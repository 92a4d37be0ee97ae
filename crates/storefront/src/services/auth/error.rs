//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::captcha::CaptchaError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] bakehouse_core::EmailError),

    /// Invalid credentials (wrong password or user not found).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// User not found.
    #[error("user not found")]
    UserNotFound,

    /// User already exists.
    #[error("user already exists")]
    UserAlreadyExists,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Name left blank.
    #[error("name is required")]
    MissingName,

    /// Signup ZIP outside the delivery area.
    #[error("ZIP {0} is outside the delivery area")]
    UndeliverableZip(String),

    /// Captcha token missing or rejected.
    #[error("captcha verification failed")]
    CaptchaFailed,

    /// Captcha service unreachable.
    #[error("captcha error: {0}")]
    Captcha(#[from] CaptchaError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}
