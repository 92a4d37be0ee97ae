//! Recurring delivery subscriptions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bakehouse_core::{
    Cents, CustomerId, DeliveryAddress, Frequency, LineItem, PaymentMethodId, SetupIntentId,
    SubscriptionId, SubscriptionStatus, UserId,
};

/// A standing order delivered every `frequency` on `delivery_weekday`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub customer_id: CustomerId,
    /// Card saved by the setup intent. Unknown until the platform reports it.
    pub payment_method_id: Option<PaymentMethodId>,
    pub setup_intent_id: SetupIntentId,
    pub items: Vec<LineItem>,
    pub total: Cents,
    pub address: DeliveryAddress,
    /// 0 = Sunday.
    pub delivery_weekday: u8,
    pub frequency: Frequency,
    pub next_delivery: DateTime<Utc>,
    pub status: SubscriptionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
