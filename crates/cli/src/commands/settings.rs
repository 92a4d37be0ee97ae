//! Store settings document checks.
//!
//! # Usage
//!
//! ```bash
//! # Validate a local draft before publishing it
//! bakehouse-cli settings check ./settings.json
//!
//! # Validate the document the storefront is reading
//! bakehouse-cli settings check https://example.com/bakehouse/settings.json
//! ```

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use bakehouse_core::{SettingsError, StoreSettings, weekday_from_number};

/// Errors loading a settings document.
#[derive(Debug, Error)]
pub enum SettingsCheckError {
    #[error("Could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not fetch settings: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error(transparent)]
    Invalid(#[from] SettingsError),
}

/// Where a settings document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    File(PathBuf),
    Remote(Url),
}

impl Source {
    /// `http(s)://` arguments are fetched; anything else is a file path.
    #[must_use]
    pub fn parse(arg: &str) -> Self {
        match Url::parse(arg) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Self::Remote(url),
            _ => Self::File(PathBuf::from(arg)),
        }
    }
}

/// Read, parse and validate a settings document.
///
/// # Errors
///
/// Fails if the document cannot be read or fetched, or does not validate.
pub async fn load(source: &Source) -> Result<StoreSettings, SettingsCheckError> {
    let body = match source {
        Source::File(path) => {
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| SettingsCheckError::Read {
                    path: path.clone(),
                    source,
                })?
        }
        Source::Remote(url) => {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()?;
            client
                .get(url.clone())
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?
        }
    };
    Ok(StoreSettings::from_json(&body)?)
}

/// Validate a settings document and summarize it.
///
/// # Errors
///
/// Returns the first problem with the document.
pub async fn check(arg: &str) -> Result<(), SettingsCheckError> {
    let settings = load(&Source::parse(arg)).await?;

    let weekdays: Vec<String> = settings
        .delivery_weekdays
        .iter()
        .filter_map(|&day| weekday_from_number(day))
        .map(|day| day.to_string())
        .collect();

    tracing::info!("Settings document is valid");
    for product in &settings.products {
        tracing::info!(id = %product.id, price = %product.price, "  {}", product.name);
    }
    tracing::info!(
        weekdays = %weekdays.join(", "),
        min_lead_hours = settings.min_lead_hours,
        blackout_dates = settings.blackout_dates.len(),
        zips = settings.allowed_zips.len(),
        holiday_mode = settings.holiday_mode,
        "Delivery rules"
    );
    if settings.holiday_mode {
        tracing::warn!("Holiday mode is on: the storefront will refuse new orders");
    }
    Ok(())
}
