//! Persisted orders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bakehouse_core::{
    Cents, CustomerDetails, DeliveryAddress, DeliveryChoice, IntentStatus, LineItem, OrderDraft,
    OrderId, OrderStatus, UserId,
};

use super::session::IntentRef;

/// An order whose payment or card setup succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    /// Owning account. `None` for guest orders, which are found by email.
    pub user_id: Option<UserId>,
    pub customer: CustomerDetails,
    pub items: Vec<LineItem>,
    pub total: Cents,
    pub address: DeliveryAddress,
    pub delivery: DeliveryChoice,
    pub comments: Option<String>,
    pub is_recurring: bool,
    pub status: OrderStatus,
    pub intent: IntentRef,
    /// Platform status at completion, or `setup_completed` for subscriptions.
    pub payment_status: String,
    pub created_at: DateTime<Utc>,
}

/// Stored in place of the intent status when a subscription's card setup succeeds.
pub const SETUP_COMPLETED: &str = "setup_completed";

impl Order {
    /// Snapshot a paid draft as a confirmed order.
    #[must_use]
    pub fn from_draft(
        draft: &OrderDraft,
        user_id: Option<UserId>,
        intent: IntentRef,
        status: &IntentStatus,
        now: DateTime<Utc>,
    ) -> Self {
        let payment_status = match intent {
            IntentRef::Setup(_) => SETUP_COMPLETED.to_owned(),
            IntentRef::Payment(_) => status.as_str().to_owned(),
        };

        Self {
            id: OrderId::new(),
            user_id,
            customer: draft.customer().clone(),
            items: draft.items().to_vec(),
            total: draft.total(),
            address: draft.address().clone(),
            delivery: draft.delivery(),
            comments: draft.comments().map(str::to_owned),
            is_recurring: draft.is_recurring(),
            status: OrderStatus::Confirmed,
            intent,
            payment_status,
            created_at: now,
        }
    }
}
