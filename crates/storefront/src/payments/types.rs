//! Payments platform resources and request parameters.

use std::collections::BTreeMap;

use bakehouse_core::{
    Cents, CustomerId, Email, IntentStatus, PaymentIntentId, PaymentMethodId, SetupIntentId,
};
use serde::{Deserialize, Serialize};

/// List envelope returned by list endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct List<T> {
    pub data: Vec<T>,
}

/// A customer on the payments platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_settings: Option<InvoiceSettings>,
}

impl Customer {
    /// The customer's default payment method, if set.
    #[must_use]
    pub fn default_payment_method(&self) -> Option<&PaymentMethodId> {
        self.invoice_settings
            .as_ref()
            .and_then(|s| s.default_payment_method.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceSettings {
    #[serde(default)]
    pub default_payment_method: Option<PaymentMethodId>,
}

/// Parameters for creating a customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCustomer {
    pub email: Email,
    pub name: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

/// A saved payment method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: PaymentMethodId,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub card: Option<CardDetails>,
    #[serde(default)]
    pub customer: Option<CustomerId>,
}

/// Display details of a card. Never includes the full number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDetails {
    pub brand: String,
    pub last4: String,
    pub exp_month: u32,
    pub exp_year: u32,
}

/// When an authorized payment is captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMethod {
    /// Captured as soon as it is confirmed.
    #[default]
    Automatic,
    /// Authorized now; captured later by the bakery.
    Manual,
}

impl CaptureMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Automatic => "automatic",
            Self::Manual => "manual",
        }
    }
}

/// Parameters for creating a payment intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePaymentIntent {
    pub amount: Cents,
    pub currency: String,
    pub customer: Option<CustomerId>,
    pub capture_method: CaptureMethod,
    /// Keep the card on the customer for later orders.
    pub save_payment_method: bool,
    pub description: Option<String>,
    pub receipt_email: Option<Email>,
    pub metadata: BTreeMap<String, String>,
}

/// A one-time payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: PaymentIntentId,
    /// Lets the browser confirm the intent. Not present on every response.
    #[serde(default)]
    pub client_secret: Option<String>,
    pub status: IntentStatus,
    pub amount: u64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub customer: Option<CustomerId>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethodId>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Parameters for creating a setup intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSetupIntent {
    pub customer: CustomerId,
    pub metadata: BTreeMap<String, String>,
}

/// Saves a payment method for future off-session charges. Carries no amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupIntent {
    pub id: SetupIntentId,
    #[serde(default)]
    pub client_secret: Option<String>,
    pub status: IntentStatus,
    #[serde(default)]
    pub customer: Option<CustomerId>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethodId>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}
