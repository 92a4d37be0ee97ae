//! Live store settings.
//!
//! Handlers read an immutable [`StoreSettings`] snapshot. A reload fetches the
//! remote document, validates it, and swaps the whole snapshot; a failed
//! reload leaves the previous snapshot in place.

use std::sync::Arc;
use std::time::Duration;

use bakehouse_core::{SettingsError, StoreSettings};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Why a reload did not replace the snapshot.
#[derive(Debug, Error)]
pub enum SettingsSourceError {
    #[error("failed to fetch settings: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid settings document: {0}")]
    Invalid(#[from] SettingsError),

    #[error("no remote settings URL configured")]
    NoRemote,
}

struct Remote {
    client: reqwest::Client,
    url: Url,
}

/// Shared handle to the current settings. Cheap to clone.
#[derive(Clone)]
pub struct SettingsSource {
    inner: Arc<SettingsSourceInner>,
}

struct SettingsSourceInner {
    sender: watch::Sender<Arc<StoreSettings>>,
    remote: Option<Remote>,
}

impl SettingsSource {
    /// A source that only ever serves `initial`.
    #[must_use]
    pub fn fixed(initial: StoreSettings) -> Self {
        Self::build(initial, None)
    }

    /// A source that starts from `initial` and reloads from `url`.
    #[must_use]
    pub fn remote(initial: StoreSettings, client: reqwest::Client, url: Url) -> Self {
        Self::build(initial, Some(Remote { client, url }))
    }

    fn build(initial: StoreSettings, remote: Option<Remote>) -> Self {
        let (sender, _) = watch::channel(Arc::new(initial));
        Self {
            inner: Arc::new(SettingsSourceInner { sender, remote }),
        }
    }

    /// The current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<StoreSettings> {
        Arc::clone(&self.inner.sender.borrow())
    }

    /// Validate and install `settings`.
    ///
    /// # Errors
    ///
    /// Returns the validation failure; the current snapshot is kept.
    pub fn replace(&self, settings: StoreSettings) -> Result<(), SettingsError> {
        settings.validate()?;
        self.inner.sender.send_replace(Arc::new(settings));
        Ok(())
    }

    /// Fetch the remote document and install it.
    ///
    /// # Errors
    ///
    /// Returns an error if no remote is configured, the fetch fails, or the
    /// document is invalid. The current snapshot is kept in every case.
    #[instrument(skip(self))]
    pub async fn reload(&self) -> Result<(), SettingsSourceError> {
        let remote = self
            .inner
            .remote
            .as_ref()
            .ok_or(SettingsSourceError::NoRemote)?;

        let body = remote
            .client
            .get(remote.url.clone())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let settings = StoreSettings::from_json(&body)?;

        let products = settings.products.len();
        self.inner.sender.send_replace(Arc::new(settings));
        debug!(products, "Store settings reloaded");
        Ok(())
    }

    /// Reload on a fixed interval until the process exits.
    ///
    /// Does nothing useful without a remote; callers check first.
    #[must_use]
    pub fn spawn_refresh(&self, every: Duration) -> JoinHandle<()> {
        let source = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = source.reload().await {
                    warn!(error = %e, "Keeping previous store settings");
                }
            }
        })
    }

    /// Whether a remote document is configured.
    #[must_use]
    pub fn has_remote(&self) -> bool {
        self.inner.remote.is_some()
    }

    /// Load the remote document once at startup, falling back to the current
    /// snapshot on failure.
    pub async fn initial_load(&self) {
        if !self.has_remote() {
            return;
        }
        match self.reload().await {
            Ok(()) => info!("Loaded store settings from remote"),
            Err(e) => warn!(error = %e, "Using fallback store settings"),
        }
    }
}
