//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use bakehouse_core::StoreSettings;

use crate::config::StorefrontConfig;
use crate::db::{DocumentStore, PgDocumentStore};
use crate::payments::{PaymentGateway, PaymentsError, StripeClient, WebhookVerifier};
use crate::services::captcha::{CaptchaVerifier, RecaptchaClient};
use crate::services::settings::SettingsSource;

/// Error building application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("payments client: {0}")]
    Payments(#[from] PaymentsError),
    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like the document store, payments gateway and
/// configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: Option<PgPool>,
    store: Arc<dyn DocumentStore>,
    gateway: Arc<dyn PaymentGateway>,
    settings: SettingsSource,
    webhooks: WebhookVerifier,
    captcha: Option<Arc<dyn CaptchaVerifier>>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `pool` - `PostgreSQL` connection pool
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn new(config: StorefrontConfig, pool: PgPool) -> Result<Self, StateError> {
        let gateway = StripeClient::new(&config.stripe)?;
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        let settings = match &config.settings_url {
            Some(url) => SettingsSource::remote(StoreSettings::default(), http.clone(), url.clone()),
            None => SettingsSource::fixed(StoreSettings::default()),
        };
        let captcha = config
            .recaptcha_secret
            .clone()
            .map(|secret| Arc::new(RecaptchaClient::new(http, secret)) as Arc<dyn CaptchaVerifier>);
        let webhooks = WebhookVerifier::new(config.stripe.webhook_secret.clone());

        Ok(Self {
            inner: Arc::new(AppStateInner {
                store: Arc::new(PgDocumentStore::new(pool.clone())),
                pool: Some(pool),
                gateway: Arc::new(gateway),
                settings,
                webhooks,
                captcha,
                config,
            }),
        })
    }

    /// State over in-process collaborators, for handler tests.
    #[cfg(test)]
    pub(crate) fn for_tests(
        config: StorefrontConfig,
        store: Arc<dyn DocumentStore>,
        gateway: Arc<dyn PaymentGateway>,
        captcha: Option<Arc<dyn CaptchaVerifier>>,
    ) -> Self {
        let webhooks = WebhookVerifier::new(config.stripe.webhook_secret.clone());
        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool: None,
                store,
                gateway,
                settings: SettingsSource::fixed(StoreSettings::default()),
                webhooks,
                captcha,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// The database pool, absent when running over an in-memory store.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }

    #[must_use]
    pub fn store(&self) -> &dyn DocumentStore {
        self.inner.store.as_ref()
    }

    #[must_use]
    pub fn gateway(&self) -> &dyn PaymentGateway {
        self.inner.gateway.as_ref()
    }

    /// Live store settings.
    #[must_use]
    pub fn settings(&self) -> &SettingsSource {
        &self.inner.settings
    }

    #[must_use]
    pub fn webhooks(&self) -> &WebhookVerifier {
        &self.inner.webhooks
    }

    /// Signup captcha, when configured.
    #[must_use]
    pub fn captcha(&self) -> Option<&dyn CaptchaVerifier> {
        self.inner.captcha.as_deref()
    }
}
