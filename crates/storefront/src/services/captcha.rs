//! reCAPTCHA verification for signups.

use async_trait::async_trait;
use mockall::automock;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

/// Google's token verification endpoint.
const VERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";

/// Errors that can occur when verifying a token.
#[derive(Debug, Error)]
pub enum CaptchaError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
}

/// Checks that a signup came from a person.
#[automock]
#[async_trait]
pub trait CaptchaVerifier: Send + Sync {
    /// Whether `token` is valid. `Ok(false)` for a rejected token.
    async fn verify(&self, token: &str) -> Result<bool, CaptchaError>;
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

/// reCAPTCHA v2/v3 verifier.
#[derive(Clone)]
pub struct RecaptchaClient {
    client: reqwest::Client,
    secret: SecretString,
    verify_url: String,
}

impl RecaptchaClient {
    #[must_use]
    pub fn new(client: reqwest::Client, secret: SecretString) -> Self {
        Self {
            client,
            secret,
            verify_url: VERIFY_URL.to_owned(),
        }
    }
}

#[async_trait]
impl CaptchaVerifier for RecaptchaClient {
    #[instrument(skip_all)]
    async fn verify(&self, token: &str) -> Result<bool, CaptchaError> {
        let response = self
            .client
            .post(&self.verify_url)
            .form(&[("secret", self.secret.expose_secret()), ("response", token)])
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CaptchaError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: VerifyResponse = response.json().await?;
        if !body.success {
            debug!(error_codes = ?body.error_codes, "Captcha token rejected");
        }
        Ok(body.success)
    }
}
