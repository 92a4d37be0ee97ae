//! Delivery date preview.
//!
//! # Usage
//!
//! ```bash
//! # Next five dates under the built-in settings
//! bakehouse-cli dates preview --count 5
//!
//! # Under a draft document, as if ordering at a given instant
//! bakehouse-cli dates preview --settings ./settings.json --at 2024-12-23T18:00:00Z
//! ```

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use thiserror::Error;

use bakehouse_core::{StoreSettings, delivery::available_delivery_dates};

use super::settings::{SettingsCheckError, Source, load};

#[derive(Debug, Error)]
pub enum DatesError {
    #[error("Unknown timezone: {0}")]
    Timezone(String),

    #[error(transparent)]
    Settings(#[from] SettingsCheckError),
}

/// Log the next `count` deliverable dates.
///
/// # Errors
///
/// Fails on an unknown timezone or an unusable settings document.
pub async fn preview(
    count: usize,
    settings: Option<&str>,
    timezone: &str,
    at: Option<DateTime<Utc>>,
) -> Result<(), DatesError> {
    let timezone: Tz = timezone
        .parse()
        .map_err(|_| DatesError::Timezone(timezone.to_owned()))?;
    let settings = match settings {
        Some(arg) => load(&Source::parse(arg)).await?,
        None => StoreSettings::default(),
    };
    let now = at.unwrap_or_else(Utc::now);

    let policy = settings.delivery_policy(timezone);
    let dates = available_delivery_dates(now, &policy, count);

    tracing::info!(
        now = %now.with_timezone(&timezone),
        cutoff = %policy.lead_time_cutoff(now),
        "Delivery dates"
    );
    if dates.is_empty() {
        tracing::warn!("No deliverable dates in the lookahead window");
    }
    for date in dates {
        tracing::info!("  {}", date.format("%A %Y-%m-%d"));
    }
    Ok(())
}
