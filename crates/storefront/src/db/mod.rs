//! Document store for accounts, orders, and subscriptions.
//!
//! # Database: `bakehouse`
//!
//! ## Tables (schema `storefront`)
//!
//! - `profiles` - Accounts, password hashes, linked payments customer
//! - `orders` - Paid orders; line items and delivery choice as JSONB
//! - `subscriptions` - Recurring deliveries
//! - `tower_sessions.session` - Session storage (created by the session store)
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p bakehouse-cli -- migrate
//! ```

#[cfg(test)]
pub mod memory;
mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use bakehouse_core::{
    Cents, CustomerId, DeliveryAddress, Email, Frequency, LineItem, OrderId, SubscriptionId,
    SubscriptionStatus, UserId,
};

use crate::models::{NewProfile, Order, ProfileUpdate, StoredCredentials, Subscription, UserProfile};

pub use postgres::PgDocumentStore;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Requested record was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),
}

/// Persistence operations the storefront needs.
///
/// Every method is a single independent write or read, except
/// [`DocumentStore::create_recurring_order`], which writes both records or
/// neither.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create an account.
    ///
    /// Fails with [`RepositoryError::Conflict`] if the email is taken.
    async fn create_profile(&self, profile: &NewProfile) -> Result<UserProfile, RepositoryError>;

    async fn get_profile(&self, id: UserId) -> Result<Option<UserProfile>, RepositoryError>;

    async fn get_profile_by_email(
        &self,
        email: &Email,
    ) -> Result<Option<UserProfile>, RepositoryError>;

    /// Password hash for login.
    async fn get_credentials(
        &self,
        email: &Email,
    ) -> Result<Option<StoredCredentials>, RepositoryError>;

    /// Apply a partial edit to contact and address fields.
    async fn update_profile(
        &self,
        id: UserId,
        update: &ProfileUpdate,
    ) -> Result<UserProfile, RepositoryError>;

    /// Link the account to its payments-platform customer.
    async fn set_customer_id(
        &self,
        id: UserId,
        customer_id: &CustomerId,
    ) -> Result<(), RepositoryError>;

    async fn create_order(&self, order: &Order) -> Result<(), RepositoryError>;

    /// Orders placed by an account, newest first.
    async fn list_orders_by_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError>;

    /// Orders placed under an email, including guest orders, newest first.
    async fn list_orders_by_email(&self, email: &Email) -> Result<Vec<Order>, RepositoryError>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    async fn create_subscription(&self, subscription: &Subscription)
    -> Result<(), RepositoryError>;

    /// Record a recurring order and its subscription together.
    ///
    /// Fails with [`RepositoryError::Conflict`] if either the payment or the
    /// card setup was already recorded; nothing is written in that case.
    async fn create_recurring_order(
        &self,
        order: &Order,
        subscription: &Subscription,
    ) -> Result<(), RepositoryError>;

    /// Subscriptions owned by an account, newest first.
    async fn list_subscriptions(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Subscription>, RepositoryError>;

    async fn get_subscription(
        &self,
        id: SubscriptionId,
    ) -> Result<Option<Subscription>, RepositoryError>;

    async fn update_subscription_schedule(
        &self,
        id: SubscriptionId,
        weekday: u8,
        frequency: Frequency,
        next_delivery: DateTime<Utc>,
    ) -> Result<Subscription, RepositoryError>;

    async fn update_subscription_items(
        &self,
        id: SubscriptionId,
        items: &[LineItem],
        total: Cents,
    ) -> Result<Subscription, RepositoryError>;

    async fn update_subscription_address(
        &self,
        id: SubscriptionId,
        address: &DeliveryAddress,
    ) -> Result<Subscription, RepositoryError>;

    async fn update_subscription_status(
        &self,
        id: SubscriptionId,
        status: SubscriptionStatus,
    ) -> Result<Subscription, RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
