//! Authentication service.
//!
//! Email and password accounts. Each account is linked to a customer on the
//! payments platform so saved cards and subscriptions have an owner.

mod error;

pub use error::AuthError;

use std::collections::BTreeMap;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use bakehouse_core::{Email, StoreSettings};

use crate::db::{DocumentStore, RepositoryError};
use crate::models::{NewProfile, UserProfile};
use crate::payments::{PaymentGateway, create_or_find_customer};
use crate::services::captcha::CaptchaVerifier;

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Signup form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub phone: Option<String>,
    pub street: Option<String>,
    pub zip: Option<String>,
    pub captcha_token: Option<String>,
}

/// Authentication service.
///
/// Handles account registration and login.
pub struct AuthService<'a> {
    store: &'a dyn DocumentStore,
    gateway: &'a dyn PaymentGateway,
    captcha: Option<&'a dyn CaptchaVerifier>,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    ///
    /// Without a captcha verifier, signups are not challenged.
    #[must_use]
    pub const fn new(
        store: &'a dyn DocumentStore,
        gateway: &'a dyn PaymentGateway,
        captcha: Option<&'a dyn CaptchaVerifier>,
    ) -> Self {
        Self {
            store,
            gateway,
            captcha,
        }
    }

    /// Register a new account.
    ///
    /// The payments customer is linked best-effort: if the platform is down
    /// the account is still created and checkout links it later.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::WeakPassword` if the password is too short.
    /// Returns `AuthError::CaptchaFailed` if the captcha is missing or rejected.
    /// Returns `AuthError::UndeliverableZip` if a ZIP is given outside the area.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    #[instrument(skip(self, request, settings))]
    pub async fn signup(
        &self,
        request: &SignupRequest,
        settings: &StoreSettings,
    ) -> Result<UserProfile, AuthError> {
        let email = Email::parse(&request.email)?;
        validate_password(&request.password)?;
        let name = request.name.trim();
        if name.is_empty() {
            return Err(AuthError::MissingName);
        }

        if let Some(captcha) = self.captcha {
            let token = request
                .captcha_token
                .as_deref()
                .filter(|t| !t.is_empty())
                .ok_or(AuthError::CaptchaFailed)?;
            if !captcha.verify(token).await? {
                return Err(AuthError::CaptchaFailed);
            }
        }

        let zip = non_blank(request.zip.as_deref());
        if let Some(zip) = &zip
            && !settings.allowed_zips.is_deliverable(zip)
        {
            return Err(AuthError::UndeliverableZip(zip.clone()));
        }

        let password_hash = hash_password(&request.password)?;

        let profile = self
            .store
            .create_profile(&NewProfile {
                email: email.clone(),
                password_hash,
                name: name.to_owned(),
                phone: non_blank(request.phone.as_deref()),
                street: non_blank(request.street.as_deref()),
                zip,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        let metadata = BTreeMap::from([("user_id".to_owned(), profile.id.to_string())]);
        match create_or_find_customer(self.gateway, &email, Some(name), metadata).await {
            Ok(customer) => {
                self.store.set_customer_id(profile.id, &customer.id).await?;
                info!(user_id = %profile.id, customer_id = %customer.id, "Account created");
                Ok(UserProfile {
                    customer_id: Some(customer.id),
                    ..profile
                })
            }
            Err(e) => {
                warn!(user_id = %profile.id, error = %e, "Account created without payments customer");
                Ok(profile)
            }
        }
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    #[instrument(skip(self, email, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let credentials = self
            .store
            .get_credentials(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &credentials.password_hash)?;

        self.store
            .get_profile(credentials.user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// Validate password requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    Ok(())
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bakehouse_core::CustomerId;

    use super::*;
    use crate::db::memory::MemoryDocumentStore;
    use crate::payments::{Customer, MockPaymentGateway, PaymentsError};
    use crate::services::captcha::MockCaptchaVerifier;

    fn signup_request() -> SignupRequest {
        SignupRequest {
            email: "Jo@Example.com".to_owned(),
            password: "correct horse".to_owned(),
            name: "Jo Baker".to_owned(),
            zip: Some(" 97201 ".to_owned()),
            ..SignupRequest::default()
        }
    }

    fn gateway_creating_customer() -> MockPaymentGateway {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_find_customer_by_email()
            .returning(|_| Ok(None));
        gateway.expect_create_customer().once().returning(|new| {
            Ok(Customer {
                id: CustomerId::new("cus_jo"),
                email: Some(new.email.to_string()),
                name: new.name.clone(),
                metadata: new.metadata.clone(),
                invoice_settings: None,
            })
        });
        gateway
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("eight ch").is_ok());
    }

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash).is_ok());
        assert!(matches!(
            verify_password("wrong horse", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_signup_links_customer_and_login_succeeds() {
        let store = MemoryDocumentStore::default();
        let gateway = gateway_creating_customer();
        let auth = AuthService::new(&store, &gateway, None);

        let profile = auth
            .signup(&signup_request(), &StoreSettings::default())
            .await
            .unwrap();
        assert_eq!(profile.email.as_str(), "jo@example.com");
        assert_eq!(profile.zip.as_deref(), Some("97201"));
        assert_eq!(profile.customer_id, Some(CustomerId::new("cus_jo")));

        let stored = store.get_profile(profile.id).await.unwrap().unwrap();
        assert_eq!(stored.customer_id, Some(CustomerId::new("cus_jo")));

        let logged_in = auth.login("jo@example.com", "correct horse").await.unwrap();
        assert_eq!(logged_in.id, profile.id);
        assert!(matches!(
            auth.login("jo@example.com", "wrong horse").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.login("nobody@example.com", "correct horse").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_signup_rejects_duplicate_email() {
        let store = MemoryDocumentStore::default();
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_find_customer_by_email()
            .returning(|email| {
                Ok(Some(Customer {
                    id: CustomerId::new("cus_jo"),
                    email: Some(email.to_string()),
                    name: None,
                    metadata: BTreeMap::new(),
                    invoice_settings: None,
                }))
            });
        let auth = AuthService::new(&store, &gateway, None);

        auth.signup(&signup_request(), &StoreSettings::default())
            .await
            .unwrap();
        assert!(matches!(
            auth.signup(&signup_request(), &StoreSettings::default()).await,
            Err(AuthError::UserAlreadyExists)
        ));
    }

    #[tokio::test]
    async fn test_signup_validation_runs_before_any_call() {
        let store = MemoryDocumentStore::default();
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_find_customer_by_email().never();
        gateway.expect_create_customer().never();
        let auth = AuthService::new(&store, &gateway, None);
        let settings = StoreSettings::default();

        let mut request = signup_request();
        request.email = "not-an-email".to_owned();
        assert!(matches!(
            auth.signup(&request, &settings).await,
            Err(AuthError::InvalidEmail(_))
        ));

        let mut request = signup_request();
        request.password = "short".to_owned();
        assert!(matches!(
            auth.signup(&request, &settings).await,
            Err(AuthError::WeakPassword(_))
        ));

        let mut request = signup_request();
        request.zip = Some("90210".to_owned());
        assert!(matches!(
            auth.signup(&request, &settings).await,
            Err(AuthError::UndeliverableZip(zip)) if zip == "90210"
        ));
    }

    #[tokio::test]
    async fn test_signup_requires_passing_captcha_when_configured() {
        let store = MemoryDocumentStore::default();
        let gateway = gateway_creating_customer();
        let mut captcha = MockCaptchaVerifier::new();
        captcha
            .expect_verify()
            .withf(|token| token == "bad")
            .return_once(|_| Ok(false));
        captcha
            .expect_verify()
            .withf(|token| token == "good")
            .return_once(|_| Ok(true));
        let auth = AuthService::new(&store, &gateway, Some(&captcha));
        let settings = StoreSettings::default();

        let mut request = signup_request();
        assert!(matches!(
            auth.signup(&request, &settings).await,
            Err(AuthError::CaptchaFailed)
        ));

        request.captcha_token = Some("bad".to_owned());
        assert!(matches!(
            auth.signup(&request, &settings).await,
            Err(AuthError::CaptchaFailed)
        ));

        request.captcha_token = Some("good".to_owned());
        assert!(auth.signup(&request, &settings).await.is_ok());
    }

    #[tokio::test]
    async fn test_signup_survives_payments_outage() {
        let store = MemoryDocumentStore::default();
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_find_customer_by_email().return_once(|_| {
            Err(PaymentsError::Api {
                status: 503,
                message: "unavailable".to_owned(),
                code: None,
            })
        });
        let auth = AuthService::new(&store, &gateway, None);

        let profile = auth
            .signup(&signup_request(), &StoreSettings::default())
            .await
            .unwrap();
        assert!(profile.customer_id.is_none());
    }
}
