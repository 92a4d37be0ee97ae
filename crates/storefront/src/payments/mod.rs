//! Payments platform adapter.
//!
//! # Architecture
//!
//! - [`PaymentGateway`] is the seam: handlers and the checkout service only
//!   see the trait, so tests substitute `MockPaymentGateway`.
//! - [`StripeClient`] implements it over the REST API with `reqwest`
//!   (form-encoded requests, bearer auth).
//! - [`WebhookVerifier`] checks inbound webhook signatures.
//!
//! No call is retried. Failures surface to the customer, who resubmits.

mod client;
pub mod types;
pub mod webhook;

use std::collections::BTreeMap;

use async_trait::async_trait;
use bakehouse_core::{CustomerId, Email, PaymentIntentId, PaymentMethodId, SetupIntentId};
use mockall::automock;
use thiserror::Error;
use tracing::{debug, instrument};

pub use client::StripeClient;
pub use types::*;
pub use webhook::{WebhookError, WebhookEvent, WebhookVerifier};

/// Errors that can occur when calling the payments platform.
#[derive(Debug, Error)]
pub enum PaymentsError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Platform returned an error response.
    #[error("API error: {status} - {message}")]
    Api {
        status: u16,
        message: String,
        code: Option<String>,
    },

    /// Response body did not match the expected shape.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Client could not be configured.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Operations Bakehouse performs on the payments platform.
#[automock]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Look up a customer by email. `None` when no customer exists.
    async fn find_customer_by_email(
        &self,
        email: &Email,
    ) -> Result<Option<Customer>, PaymentsError>;

    /// Create a customer.
    async fn create_customer(&self, customer: &NewCustomer) -> Result<Customer, PaymentsError>;

    /// Fetch a customer by id.
    async fn get_customer(&self, id: &CustomerId) -> Result<Customer, PaymentsError>;

    /// Cards saved on a customer.
    async fn list_payment_methods(
        &self,
        customer: &CustomerId,
    ) -> Result<Vec<PaymentMethod>, PaymentsError>;

    /// Remove a saved card from its customer.
    async fn detach_payment_method(&self, id: &PaymentMethodId) -> Result<(), PaymentsError>;

    /// Make a saved card the customer's default.
    async fn set_default_payment_method(
        &self,
        customer: &CustomerId,
        id: &PaymentMethodId,
    ) -> Result<(), PaymentsError>;

    async fn create_payment_intent(
        &self,
        params: &CreatePaymentIntent,
    ) -> Result<PaymentIntent, PaymentsError>;

    /// Attach a payment method to an unconfirmed payment intent.
    async fn update_payment_intent(
        &self,
        id: &PaymentIntentId,
        payment_method: &PaymentMethodId,
    ) -> Result<PaymentIntent, PaymentsError>;

    async fn confirm_payment_intent(
        &self,
        id: &PaymentIntentId,
    ) -> Result<PaymentIntent, PaymentsError>;

    async fn get_payment_intent(&self, id: &PaymentIntentId)
    -> Result<PaymentIntent, PaymentsError>;

    async fn create_setup_intent(
        &self,
        params: &CreateSetupIntent,
    ) -> Result<SetupIntent, PaymentsError>;

    /// Attach a payment method to an unconfirmed setup intent.
    async fn update_setup_intent(
        &self,
        id: &SetupIntentId,
        payment_method: &PaymentMethodId,
    ) -> Result<SetupIntent, PaymentsError>;

    async fn confirm_setup_intent(&self, id: &SetupIntentId) -> Result<SetupIntent, PaymentsError>;

    async fn get_setup_intent(&self, id: &SetupIntentId) -> Result<SetupIntent, PaymentsError>;
}

/// Return the customer for `email`, creating one if none exists.
///
/// Calling twice with the same email yields the same customer id.
///
/// # Errors
///
/// Returns any platform error from the lookup or the creation.
#[instrument(skip(gateway, email, metadata), fields(email = %email))]
pub async fn create_or_find_customer(
    gateway: &dyn PaymentGateway,
    email: &Email,
    name: Option<&str>,
    metadata: BTreeMap<String, String>,
) -> Result<Customer, PaymentsError> {
    if let Some(existing) = gateway.find_customer_by_email(email).await? {
        debug!(customer_id = %existing.id, "Found existing customer");
        return Ok(existing);
    }

    let customer = gateway
        .create_customer(&NewCustomer {
            email: email.clone(),
            name: name.map(str::to_owned),
            metadata,
        })
        .await?;
    debug!(customer_id = %customer.id, "Created customer");
    Ok(customer)
}
