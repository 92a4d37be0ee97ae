//! Session-related types.
//!
//! Types stored in the session between requests.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use bakehouse_core::{CustomerId, Email, OrderDraft, PaymentFlow, PaymentIntentId, SetupIntentId, UserId};

/// How long a draft may wait for payment before the customer must start over.
pub const PENDING_ORDER_TTL_MINUTES: i64 = 60;

/// Session-stored user identity.
///
/// Minimal data stored in the session to identify the logged-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    /// User's database ID.
    pub id: UserId,
    /// User's email address.
    pub email: Email,
}

/// A payments-platform intent created for a pending order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum IntentRef {
    Payment(PaymentIntentId),
    Setup(SetupIntentId),
}

impl IntentRef {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Payment(id) => id.as_str(),
            Self::Setup(id) => id.as_str(),
        }
    }

    /// `"payment"` or `"setup"`.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Payment(_) => "payment",
            Self::Setup(_) => "setup",
        }
    }
}

/// Checkout progress recorded once an intent exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingIntent {
    pub flow: PaymentFlow,
    pub intent: IntentRef,
    pub customer_id: CustomerId,
}

/// An assembled order waiting for payment.
///
/// Held in the session between `POST /orders/draft` and a successful
/// checkout. Absence and expiry are both reported as "start again".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub draft: OrderDraft,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<PendingIntent>,
}

impl PendingOrder {
    #[must_use]
    pub fn new(draft: OrderDraft, now: DateTime<Utc>) -> Self {
        Self {
            draft,
            created_at: now,
            expires_at: now + Duration::minutes(PENDING_ORDER_TTL_MINUTES),
            intent: None,
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Session keys.
pub mod keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for the order awaiting payment.
    pub const PENDING_ORDER: &str = "pending_order";

    /// Key for the last checkout confirmation, read once.
    pub const CHECKOUT_CONFIRMATION: &str = "checkout_confirmation";
}
