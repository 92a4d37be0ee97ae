//! Integration tests for Bakehouse.
//!
//! Black-box HTTP tests against a running storefront. They are ignored by
//! default because they need the server, its database and Stripe test keys.
//!
//! # Running Tests
//!
//! ```bash
//! # Apply migrations to the database named by STOREFRONT_DATABASE_URL
//! cargo run -p bakehouse-cli -- migrate
//!
//! # Start the storefront with Stripe test keys, then
//! cargo test -p bakehouse-integration-tests -- --ignored
//! ```
//!
//! # Environment Variables
//!
//! - `STOREFRONT_BASE_URL` - where the storefront listens (default `http://localhost:3000`)

use chrono::Utc;
use reqwest::Client;

use bakehouse_core::{StoreSettings, delivery::available_delivery_dates};

/// Base URL for the storefront API.
#[must_use]
pub fn storefront_base_url() -> String {
    std::env::var("STOREFRONT_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

/// A client that keeps the session cookie between requests.
///
/// # Panics
///
/// Panics if the TLS backend cannot be initialized.
#[must_use]
pub fn session_client() -> Client {
    Client::builder()
        .cookie_store(true)
        .build()
        .expect("Failed to create HTTP client")
}

/// Next delivery date under the built-in settings, as `YYYY-MM-DD`.
///
/// Matches the server only when it runs without a remote settings document.
#[must_use]
pub fn next_delivery_date() -> Option<String> {
    let policy = StoreSettings::default().delivery_policy(chrono_tz::America::Los_Angeles);
    available_delivery_dates(Utc::now(), &policy, 1)
        .first()
        .map(ToString::to_string)
}

/// A throwaway email address for signup tests.
#[must_use]
pub fn unique_email() -> String {
    format!("test+{}@example.com", uuid::Uuid::new_v4().simple())
}
