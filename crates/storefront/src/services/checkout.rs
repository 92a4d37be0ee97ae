//! Checkout orchestration.
//!
//! [`PaymentFlow::select`] decides which branch a pending order takes; this
//! module runs that branch's calls against the payments platform in causal
//! order (create, then attach a stored card, then confirm) and records the
//! order once the platform reports success. Nothing is retried.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use bakehouse_core::{
    CustomerId, DeliveryChoice, FlowError, IntentStatus, OrderDraft, PaymentFlow, PaymentMethodId,
    SubscriptionId, SubscriptionStatus, UserId, delivery::next_occurrence_of_weekday,
};

use crate::db::{DocumentStore, RepositoryError};
use crate::models::{IntentRef, Order, PendingIntent, PendingOrder, Subscription, UserProfile};
use crate::payments::{
    CaptureMethod, CreatePaymentIntent, CreateSetupIntent, PaymentGateway, PaymentsError,
    create_or_find_customer,
};

/// Why a checkout step failed.
///
/// The `Display` text of the customer-facing variants is shown as-is.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Your order has expired. Please start your order again.")]
    OrderExpired,

    #[error("That payment doesn't belong to your order. Please start your order again.")]
    IntentMismatch,

    #[error("Payment was not completed (status: {0}). Please try again.")]
    PaymentNotCompleted(IntentStatus),

    #[error("Please sign in to continue.")]
    AccountRequired,

    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error("payments platform error: {0}")]
    Payments(#[from] PaymentsError),

    #[error("store error: {0}")]
    Repository(#[from] RepositoryError),
}

/// What the browser needs to finish a card payment or card setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfirmation {
    pub client_secret: String,
    pub intent_id: String,
    /// `payment` or `setup`.
    pub intent_kind: &'static str,
    pub flow: PaymentFlow,
}

/// Success payload handed to the confirmation page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutConfirmation {
    pub order: Order,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<SubscriptionId>,
    pub intent_id: String,
    pub status: String,
    pub is_recurring: bool,
    pub completed_at: DateTime<Utc>,
}

/// Result of starting checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckoutOutcome {
    /// The browser must confirm the intent with card details.
    RequiresClientConfirmation(ClientConfirmation),
    /// A stored card was charged or saved server-side.
    Completed(CheckoutConfirmation),
}

/// Runs payment flows for pending orders.
pub struct CheckoutService<'a> {
    gateway: &'a dyn PaymentGateway,
    store: &'a dyn DocumentStore,
    currency: &'a str,
    timezone: Tz,
}

impl<'a> CheckoutService<'a> {
    #[must_use]
    pub const fn new(
        gateway: &'a dyn PaymentGateway,
        store: &'a dyn DocumentStore,
        currency: &'a str,
        timezone: Tz,
    ) -> Self {
        Self {
            gateway,
            store,
            currency,
            timezone,
        }
    }

    /// Select the flow for `pending` and run it as far as the server can.
    ///
    /// A stored card counts only when it is saved on the account's customer;
    /// any other id is ignored and the browser collects a card instead.
    /// The created intent is recorded on `pending` so that
    /// [`CheckoutService::complete`] can check it.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::OrderExpired`] for an expired order,
    /// [`CheckoutError::PaymentNotCompleted`] when a server-side confirmation
    /// ends in a non-success status, and platform or store errors as-is.
    #[instrument(skip(self, pending, user, payment_method), fields(flow))]
    pub async fn begin(
        &self,
        pending: &mut PendingOrder,
        user: Option<&UserProfile>,
        payment_method: Option<&PaymentMethodId>,
        now: DateTime<Utc>,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        if pending.is_expired(now) {
            return Err(CheckoutError::OrderExpired);
        }

        let customer_id = match user {
            Some(profile) => self.account_customer(profile).await?,
            None => self.guest_customer(&pending.draft).await?,
        };

        let stored_method = match (user, payment_method) {
            (Some(_), Some(id)) => {
                let saved = self.is_saved_card(&customer_id, id).await?;
                if !saved {
                    warn!(payment_method = %id, "Ignoring payment method not saved on customer");
                }
                saved.then_some(id)
            }
            _ => None,
        };

        let flow = PaymentFlow::select(
            user.is_some(),
            pending.draft.is_recurring(),
            stored_method.is_some(),
        )?;
        tracing::Span::current().record("flow", flow.as_str());
        let metadata = order_metadata(&pending.draft, flow, user.map(|u| u.id));

        let (intent, client_secret) = if flow.uses_setup_intent() {
            let setup = self
                .gateway
                .create_setup_intent(&CreateSetupIntent {
                    customer: customer_id.clone(),
                    metadata,
                })
                .await?;
            (IntentRef::Setup(setup.id), setup.client_secret)
        } else {
            let payment = self
                .gateway
                .create_payment_intent(&CreatePaymentIntent {
                    amount: pending.draft.total(),
                    currency: self.currency.to_owned(),
                    customer: Some(customer_id.clone()),
                    capture_method: if flow.captures_manually() {
                        CaptureMethod::Manual
                    } else {
                        CaptureMethod::Automatic
                    },
                    save_payment_method: user.is_some() && stored_method.is_none(),
                    description: Some(pending.draft.item_summary()),
                    receipt_email: Some(pending.draft.customer().email.clone()),
                    metadata,
                })
                .await?;
            (IntentRef::Payment(payment.id), payment.client_secret)
        };

        pending.intent = Some(PendingIntent {
            flow,
            intent: intent.clone(),
            customer_id,
        });

        if let Some(method) = stored_method {
            let (status, method) = self.confirm_with_stored_card(&intent, method).await?;
            let confirmation = self
                .finish(pending, user.map(|u| u.id), &status, method, now)
                .await?;
            return Ok(CheckoutOutcome::Completed(confirmation));
        }

        let client_secret = client_secret.ok_or_else(|| {
            PaymentsError::Parse(format!("intent {} has no client secret", intent.as_str()))
        })?;
        Ok(CheckoutOutcome::RequiresClientConfirmation(
            ClientConfirmation {
                client_secret,
                intent_id: intent.as_str().to_owned(),
                intent_kind: intent.kind(),
                flow,
            },
        ))
    }

    /// Record the order after the browser confirmed the intent.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::IntentMismatch`] if `intent_id` is not the
    /// intent created for `pending`, and
    /// [`CheckoutError::PaymentNotCompleted`] when the platform does not
    /// report success.
    #[instrument(skip(self, pending))]
    pub async fn complete(
        &self,
        pending: &PendingOrder,
        user_id: Option<UserId>,
        intent_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CheckoutConfirmation, CheckoutError> {
        let recorded = pending
            .intent
            .as_ref()
            .filter(|p| p.intent.as_str() == intent_id)
            .ok_or(CheckoutError::IntentMismatch)?;

        let (status, method) = match &recorded.intent {
            IntentRef::Payment(id) => {
                let intent = self.gateway.get_payment_intent(id).await?;
                (intent.status, intent.payment_method)
            }
            IntentRef::Setup(id) => {
                let intent = self.gateway.get_setup_intent(id).await?;
                (intent.status, intent.payment_method)
            }
        };

        self.finish(pending, user_id, &status, method, now).await
    }

    async fn confirm_with_stored_card(
        &self,
        intent: &IntentRef,
        method: &PaymentMethodId,
    ) -> Result<(IntentStatus, Option<PaymentMethodId>), CheckoutError> {
        Ok(match intent {
            IntentRef::Payment(id) => {
                self.gateway.update_payment_intent(id, method).await?;
                let confirmed = self.gateway.confirm_payment_intent(id).await?;
                (confirmed.status, confirmed.payment_method)
            }
            IntentRef::Setup(id) => {
                self.gateway.update_setup_intent(id, method).await?;
                let confirmed = self.gateway.confirm_setup_intent(id).await?;
                (confirmed.status, confirmed.payment_method)
            }
        })
    }

    /// Apply the success rule and persist the order (and subscription).
    async fn finish(
        &self,
        pending: &PendingOrder,
        user_id: Option<UserId>,
        status: &IntentStatus,
        payment_method: Option<PaymentMethodId>,
        now: DateTime<Utc>,
    ) -> Result<CheckoutConfirmation, CheckoutError> {
        let recorded = pending.intent.as_ref().ok_or(CheckoutError::IntentMismatch)?;

        let succeeded = match recorded.intent {
            IntentRef::Payment(_) => status.is_payment_success(),
            IntentRef::Setup(_) => status.is_setup_success(),
        };
        if !succeeded {
            warn!(intent_id = %recorded.intent.as_str(), %status, "Payment not completed");
            return Err(CheckoutError::PaymentNotCompleted(status.clone()));
        }

        let draft = &pending.draft;
        if draft.is_recurring() && user_id.is_none() {
            return Err(CheckoutError::AccountRequired);
        }
        let order = Order::from_draft(draft, user_id, recorded.intent.clone(), status, now);

        let subscription = match (
            &recorded.intent,
            draft.delivery(),
            draft.delivery().weekday(),
        ) {
            (
                IntentRef::Setup(setup_intent_id),
                DeliveryChoice::Recurring { weekday, frequency },
                Some(day),
            ) => {
                let user_id = user_id.ok_or(CheckoutError::AccountRequired)?;
                Some(Subscription {
                    id: SubscriptionId::new(),
                    user_id,
                    customer_id: recorded.customer_id.clone(),
                    payment_method_id: payment_method,
                    setup_intent_id: setup_intent_id.clone(),
                    items: draft.items().to_vec(),
                    total: draft.total(),
                    address: draft.address().clone(),
                    delivery_weekday: weekday,
                    frequency,
                    next_delivery: next_occurrence_of_weekday(day, frequency, now, self.timezone),
                    status: SubscriptionStatus::Active,
                    created_at: now,
                    updated_at: now,
                })
            }
            _ => None,
        };

        // The order and its schedule are recorded together or not at all
        match &subscription {
            Some(subscription) => {
                self.store
                    .create_recurring_order(&order, subscription)
                    .await?;
            }
            None => self.store.create_order(&order).await?,
        }
        let subscription_id = subscription.map(|s| s.id);

        info!(
            order_id = %order.id,
            intent_id = %recorded.intent.as_str(),
            flow = %recorded.flow,
            total = %order.total,
            "Checkout completed"
        );

        Ok(CheckoutConfirmation {
            intent_id: recorded.intent.as_str().to_owned(),
            status: order.payment_status.clone(),
            is_recurring: order.is_recurring,
            completed_at: now,
            subscription_id,
            order,
        })
    }

    async fn account_customer(&self, profile: &UserProfile) -> Result<CustomerId, CheckoutError> {
        Ok(linked_customer(self.gateway, self.store, profile).await?)
    }

    async fn guest_customer(&self, draft: &OrderDraft) -> Result<CustomerId, CheckoutError> {
        let details = draft.customer();
        let metadata = BTreeMap::from([("guest".to_owned(), "true".to_owned())]);
        let customer =
            create_or_find_customer(self.gateway, &details.email, Some(&details.name), metadata)
                .await?;
        Ok(customer.id)
    }

    async fn is_saved_card(
        &self,
        customer: &CustomerId,
        method: &PaymentMethodId,
    ) -> Result<bool, CheckoutError> {
        let saved = self.gateway.list_payment_methods(customer).await?;
        Ok(saved.iter().any(|m| &m.id == method))
    }
}

/// Errors from [`linked_customer`].
#[derive(Debug, Error)]
pub enum LinkCustomerError {
    #[error(transparent)]
    Payments(#[from] PaymentsError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<LinkCustomerError> for CheckoutError {
    fn from(err: LinkCustomerError) -> Self {
        match err {
            LinkCustomerError::Payments(e) => Self::Payments(e),
            LinkCustomerError::Repository(e) => Self::Repository(e),
        }
    }
}

/// The account's payments customer, creating and linking one on first use.
///
/// # Errors
///
/// Returns platform errors from the lookup or creation and store errors
/// from saving the link.
pub async fn linked_customer(
    gateway: &dyn PaymentGateway,
    store: &dyn DocumentStore,
    profile: &UserProfile,
) -> Result<CustomerId, LinkCustomerError> {
    if let Some(id) = &profile.customer_id {
        return Ok(id.clone());
    }
    let metadata = BTreeMap::from([("user_id".to_owned(), profile.id.to_string())]);
    let customer =
        create_or_find_customer(gateway, &profile.email, Some(&profile.name), metadata).await?;
    store.set_customer_id(profile.id, &customer.id).await?;
    info!(user_id = %profile.id, customer_id = %customer.id, "Linked payments customer");
    Ok(customer.id)
}

/// Platform metadata values are capped at 500 characters.
const METADATA_VALUE_LIMIT: usize = 500;

fn order_metadata(
    draft: &OrderDraft,
    flow: PaymentFlow,
    user_id: Option<UserId>,
) -> BTreeMap<String, String> {
    let delivery = match draft.delivery() {
        DeliveryChoice::OneTime { date } => date.to_string(),
        DeliveryChoice::Recurring { weekday, frequency } => format!("{frequency} on day {weekday}"),
    };
    let mut items = draft.item_summary();
    if items.chars().count() > METADATA_VALUE_LIMIT {
        items = items.chars().take(METADATA_VALUE_LIMIT).collect();
    }

    let mut metadata = BTreeMap::from([
        ("flow".to_owned(), flow.as_str().to_owned()),
        ("items".to_owned(), items),
        ("order_total".to_owned(), draft.total().get().to_string()),
        ("delivery".to_owned(), delivery),
        ("zip".to_owned(), draft.address().zip.clone()),
        ("is_recurring".to_owned(), draft.is_recurring().to_string()),
    ]);
    if let Some(user_id) = user_id {
        metadata.insert("user_id".to_owned(), user_id.to_string());
    }
    metadata
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bakehouse_core::{Cents, PaymentIntentId, SetupIntentId};
    use chrono::Duration;

    use super::*;
    use crate::db::memory::MemoryDocumentStore;
    use crate::payments::MockPaymentGateway;
    use crate::test_support::{
        TZ, card, customer, draft, now, one_time_request, payment_intent, profile,
        recurring_request, setup_intent,
    };

    fn service<'a>(
        gateway: &'a MockPaymentGateway,
        store: &'a MemoryDocumentStore,
    ) -> CheckoutService<'a> {
        CheckoutService::new(gateway, store, "usd", TZ)
    }

    fn pending_one_time() -> PendingOrder {
        PendingOrder::new(draft(&one_time_request()), now())
    }

    fn pending_recurring() -> PendingOrder {
        PendingOrder::new(draft(&recurring_request()), now())
    }

    #[tokio::test]
    async fn test_guest_one_time_creates_manual_capture_intent() {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_find_customer_by_email()
            .once()
            .returning(|_| Ok(None));
        gateway
            .expect_create_customer()
            .once()
            .returning(|_| Ok(customer("cus_guest")));
        gateway.expect_list_payment_methods().never();
        gateway
            .expect_create_payment_intent()
            .once()
            .withf(|params| {
                params.amount == Cents::new(1200)
                    && params.capture_method == CaptureMethod::Manual
                    && params.customer == Some(CustomerId::new("cus_guest"))
                    && !params.save_payment_method
                    && params.metadata.get("is_recurring").map(String::as_str) == Some("false")
            })
            .returning(|_| Ok(payment_intent("pi_guest", "requires_payment_method", 1200)));
        gateway.expect_create_setup_intent().never();
        gateway.expect_confirm_payment_intent().never();
        let store = MemoryDocumentStore::default();

        let mut pending = pending_one_time();
        let outcome = service(&gateway, &store)
            .begin(&mut pending, None, None, now())
            .await
            .unwrap();

        let CheckoutOutcome::RequiresClientConfirmation(client) = outcome else {
            panic!("expected client confirmation");
        };
        assert_eq!(client.intent_id, "pi_guest");
        assert_eq!(client.intent_kind, "payment");
        assert_eq!(client.flow, PaymentFlow::GuestOneTime);
        assert_eq!(
            pending.intent.as_ref().unwrap().intent,
            IntentRef::Payment(PaymentIntentId::new("pi_guest"))
        );
        assert!(store.orders().is_empty());
    }

    #[tokio::test]
    async fn test_guest_stored_method_is_ignored() {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_find_customer_by_email()
            .returning(|_| Ok(Some(customer("cus_guest"))));
        gateway.expect_list_payment_methods().never();
        gateway
            .expect_create_payment_intent()
            .once()
            .returning(|_| Ok(payment_intent("pi_guest", "requires_payment_method", 1200)));
        gateway.expect_update_payment_intent().never();
        let store = MemoryDocumentStore::default();

        let mut pending = pending_one_time();
        let outcome = service(&gateway, &store)
            .begin(
                &mut pending,
                None,
                Some(&PaymentMethodId::new("pm_1")),
                now(),
            )
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            CheckoutOutcome::RequiresClientConfirmation(ClientConfirmation {
                flow: PaymentFlow::GuestOneTime,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_signed_in_saved_card_is_updated_then_confirmed() {
        let mut seq = mockall::Sequence::new();
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_find_customer_by_email().never();
        gateway
            .expect_list_payment_methods()
            .once()
            .returning(|_| Ok(vec![card("pm_1")]));
        gateway
            .expect_create_payment_intent()
            .once()
            .in_sequence(&mut seq)
            .withf(|params| {
                params.amount == Cents::new(1200)
                    && params.capture_method == CaptureMethod::Automatic
                    && !params.save_payment_method
            })
            .returning(|_| Ok(payment_intent("pi_1", "requires_payment_method", 1200)));
        gateway
            .expect_update_payment_intent()
            .once()
            .in_sequence(&mut seq)
            .withf(|id, method| id.as_str() == "pi_1" && method.as_str() == "pm_1")
            .returning(|_, _| Ok(payment_intent("pi_1", "requires_confirmation", 1200)));
        gateway
            .expect_confirm_payment_intent()
            .once()
            .in_sequence(&mut seq)
            .returning(|_| Ok(payment_intent("pi_1", "succeeded", 1200)));
        let store = MemoryDocumentStore::default();
        let account = profile(Some("cus_jo"));

        let mut pending = pending_one_time();
        let outcome = service(&gateway, &store)
            .begin(
                &mut pending,
                Some(&account),
                Some(&PaymentMethodId::new("pm_1")),
                now(),
            )
            .await
            .unwrap();

        let CheckoutOutcome::Completed(confirmation) = outcome else {
            panic!("expected completed checkout");
        };
        assert!(!confirmation.is_recurring);
        assert_eq!(confirmation.status, "succeeded");
        assert_eq!(confirmation.intent_id, "pi_1");
        assert_eq!(confirmation.order.total, Cents::new(1200));
        assert_eq!(confirmation.order.user_id, Some(account.id));
        assert_eq!(store.orders().len(), 1);
        assert!(store.subscriptions().is_empty());
    }

    #[tokio::test]
    async fn test_requires_capture_is_payment_success() {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_get_payment_intent()
            .once()
            .returning(|_| Ok(payment_intent("pi_guest", "requires_capture", 1200)));
        let store = MemoryDocumentStore::default();

        let mut pending = pending_one_time();
        pending.intent = Some(PendingIntent {
            flow: PaymentFlow::GuestOneTime,
            intent: IntentRef::Payment(PaymentIntentId::new("pi_guest")),
            customer_id: CustomerId::new("cus_guest"),
        });

        let confirmation = service(&gateway, &store)
            .complete(&pending, None, "pi_guest", now())
            .await
            .unwrap();
        assert_eq!(confirmation.status, "requires_capture");
        assert!(confirmation.order.user_id.is_none());
        assert_eq!(store.orders().len(), 1);
    }

    #[tokio::test]
    async fn test_unsaved_card_falls_back_to_client_confirmation() {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_list_payment_methods()
            .once()
            .returning(|_| Ok(vec![card("pm_other")]));
        gateway
            .expect_create_payment_intent()
            .once()
            .withf(|params| params.save_payment_method)
            .returning(|_| Ok(payment_intent("pi_1", "requires_payment_method", 1200)));
        gateway.expect_update_payment_intent().never();
        let store = MemoryDocumentStore::default();
        let account = profile(Some("cus_jo"));

        let mut pending = pending_one_time();
        let outcome = service(&gateway, &store)
            .begin(
                &mut pending,
                Some(&account),
                Some(&PaymentMethodId::new("pm_stolen")),
                now(),
            )
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            CheckoutOutcome::RequiresClientConfirmation(ClientConfirmation {
                flow: PaymentFlow::SignedInOneTime,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_new_subscription_uses_setup_intent() {
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_create_payment_intent().never();
        gateway
            .expect_create_setup_intent()
            .once()
            .withf(|params| {
                params.customer.as_str() == "cus_jo"
                    && params.metadata.get("is_recurring").map(String::as_str) == Some("true")
            })
            .returning(|_| Ok(setup_intent("seti_1", "requires_payment_method")));
        gateway.expect_get_setup_intent().once().returning(|_| {
            let mut intent = setup_intent("seti_1", "succeeded");
            intent.payment_method = Some(PaymentMethodId::new("pm_new"));
            Ok(intent)
        });
        let store = MemoryDocumentStore::default();
        let account = profile(Some("cus_jo"));

        let mut pending = pending_recurring();
        let checkout = service(&gateway, &store);
        let outcome = checkout
            .begin(&mut pending, Some(&account), None, now())
            .await
            .unwrap();
        let CheckoutOutcome::RequiresClientConfirmation(client) = outcome else {
            panic!("expected client confirmation");
        };
        assert_eq!(client.intent_kind, "setup");
        assert_eq!(client.flow, PaymentFlow::NewSubscription);

        let confirmation = checkout
            .complete(&pending, Some(account.id), "seti_1", now())
            .await
            .unwrap();
        assert!(confirmation.is_recurring);
        assert_eq!(confirmation.status, "setup_completed");

        let subscriptions = store.subscriptions();
        assert_eq!(subscriptions.len(), 1);
        let subscription = &subscriptions[0];
        assert_eq!(Some(subscription.id), confirmation.subscription_id);
        assert_eq!(subscription.delivery_weekday, 3);
        assert_eq!(subscription.setup_intent_id, SetupIntentId::new("seti_1"));
        assert_eq!(
            subscription.payment_method_id,
            Some(PaymentMethodId::new("pm_new"))
        );
        assert_eq!(subscription.total, Cents::new(1200));
        // Monday 2024-03-04 -> Wednesday 2024-03-06, local midnight (PST)
        assert_eq!(
            subscription.next_delivery,
            "2024-03-06T08:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
    }

    fn pending_setup(intent_id: &str) -> PendingOrder {
        let mut pending = pending_recurring();
        pending.intent = Some(PendingIntent {
            flow: PaymentFlow::NewSubscription,
            intent: IntentRef::Setup(SetupIntentId::new(intent_id)),
            customer_id: CustomerId::new("cus_jo"),
        });
        pending
    }

    #[tokio::test]
    async fn test_failed_subscription_write_records_no_order() {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_get_setup_intent()
            .returning(|_| Ok(setup_intent("seti_1", "succeeded")));
        let account = profile(Some("cus_jo"));

        // A schedule already stored for this setup makes the subscription insert fail
        let earlier = MemoryDocumentStore::default();
        service(&gateway, &earlier)
            .complete(&pending_setup("seti_1"), Some(account.id), "seti_1", now())
            .await
            .unwrap();
        let store = MemoryDocumentStore::default();
        store
            .create_subscription(&earlier.subscriptions()[0])
            .await
            .unwrap();

        let err = service(&gateway, &store)
            .complete(&pending_setup("seti_1"), Some(account.id), "seti_1", now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::Repository(RepositoryError::Conflict(_))
        ));
        assert!(store.orders().is_empty());
        assert_eq!(store.subscriptions().len(), 1);
    }

    #[tokio::test]
    async fn test_setup_requires_capture_is_not_success() {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_get_setup_intent()
            .returning(|_| Ok(setup_intent("seti_1", "requires_capture")));
        let store = MemoryDocumentStore::default();

        let mut pending = pending_recurring();
        pending.intent = Some(PendingIntent {
            flow: PaymentFlow::NewSubscription,
            intent: IntentRef::Setup(SetupIntentId::new("seti_1")),
            customer_id: CustomerId::new("cus_jo"),
        });

        let err = service(&gateway, &store)
            .complete(&pending, Some(profile(None).id), "seti_1", now())
            .await
            .unwrap_err();
        assert!(
            matches!(&err, CheckoutError::PaymentNotCompleted(status) if status.as_str() == "requires_capture")
        );
        assert!(err.to_string().contains("requires_capture"));
        assert!(store.orders().is_empty());
        assert!(store.subscriptions().is_empty());
    }

    #[tokio::test]
    async fn test_subscription_with_saved_card_confirms_server_side() {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_list_payment_methods()
            .returning(|_| Ok(vec![card("pm_1")]));
        gateway
            .expect_create_setup_intent()
            .once()
            .returning(|_| Ok(setup_intent("seti_2", "requires_payment_method")));
        gateway
            .expect_update_setup_intent()
            .once()
            .withf(|id, method| id.as_str() == "seti_2" && method.as_str() == "pm_1")
            .returning(|_, _| Ok(setup_intent("seti_2", "requires_confirmation")));
        gateway.expect_confirm_setup_intent().once().returning(|_| {
            let mut intent = setup_intent("seti_2", "succeeded");
            intent.payment_method = Some(PaymentMethodId::new("pm_1"));
            Ok(intent)
        });
        let store = MemoryDocumentStore::default();
        let account = profile(Some("cus_jo"));

        let mut pending = pending_recurring();
        let outcome = service(&gateway, &store)
            .begin(
                &mut pending,
                Some(&account),
                Some(&PaymentMethodId::new("pm_1")),
                now(),
            )
            .await
            .unwrap();
        let CheckoutOutcome::Completed(confirmation) = outcome else {
            panic!("expected completed checkout");
        };
        assert_eq!(confirmation.status, "setup_completed");
        assert_eq!(store.subscriptions().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_confirmation_is_surfaced_verbatim() {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_list_payment_methods()
            .returning(|_| Ok(vec![card("pm_1")]));
        gateway
            .expect_create_payment_intent()
            .returning(|_| Ok(payment_intent("pi_1", "requires_payment_method", 1200)));
        gateway
            .expect_update_payment_intent()
            .returning(|_, _| Ok(payment_intent("pi_1", "requires_confirmation", 1200)));
        gateway
            .expect_confirm_payment_intent()
            .returning(|_| Ok(payment_intent("pi_1", "requires_action", 1200)));
        let store = MemoryDocumentStore::default();
        let account = profile(Some("cus_jo"));

        let mut pending = pending_one_time();
        let err = service(&gateway, &store)
            .begin(
                &mut pending,
                Some(&account),
                Some(&PaymentMethodId::new("pm_1")),
                now(),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Payment was not completed (status: requires_action). Please try again."
        );
        assert!(store.orders().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_stops_the_branch() {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_list_payment_methods()
            .returning(|_| Ok(vec![card("pm_1")]));
        gateway.expect_create_payment_intent().once().returning(|_| {
            Err(PaymentsError::Api {
                status: 502,
                message: "bad gateway".to_owned(),
                code: None,
            })
        });
        gateway.expect_update_payment_intent().never();
        gateway.expect_confirm_payment_intent().never();
        let store = MemoryDocumentStore::default();
        let account = profile(Some("cus_jo"));

        let mut pending = pending_one_time();
        let err = service(&gateway, &store)
            .begin(
                &mut pending,
                Some(&account),
                Some(&PaymentMethodId::new("pm_1")),
                now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Payments(_)));
        assert!(pending.intent.is_none());
    }

    #[tokio::test]
    async fn test_expired_order_is_rejected_before_any_call() {
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_find_customer_by_email().never();
        gateway.expect_create_payment_intent().never();
        let store = MemoryDocumentStore::default();

        let mut pending = pending_one_time();
        let later = now() + Duration::minutes(61);
        assert!(matches!(
            service(&gateway, &store)
                .begin(&mut pending, None, None, later)
                .await,
            Err(CheckoutError::OrderExpired)
        ));
    }

    #[tokio::test]
    async fn test_complete_rejects_foreign_intent() {
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_get_payment_intent().never();
        let store = MemoryDocumentStore::default();

        let mut pending = pending_one_time();
        assert!(matches!(
            service(&gateway, &store)
                .complete(&pending, None, "pi_other", now())
                .await,
            Err(CheckoutError::IntentMismatch)
        ));

        pending.intent = Some(PendingIntent {
            flow: PaymentFlow::GuestOneTime,
            intent: IntentRef::Payment(PaymentIntentId::new("pi_mine")),
            customer_id: CustomerId::new("cus_guest"),
        });
        assert!(matches!(
            service(&gateway, &store)
                .complete(&pending, None, "pi_other", now())
                .await,
            Err(CheckoutError::IntentMismatch)
        ));
    }

    #[tokio::test]
    async fn test_account_without_customer_is_linked_on_first_checkout() {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_find_customer_by_email()
            .once()
            .returning(|_| Ok(Some(customer("cus_jo"))));
        gateway
            .expect_create_payment_intent()
            .withf(|params| params.customer == Some(CustomerId::new("cus_jo")))
            .returning(|_| Ok(payment_intent("pi_1", "requires_payment_method", 1200)));
        let store = MemoryDocumentStore::default();
        let created = store
            .create_profile(&crate::models::NewProfile {
                email: bakehouse_core::Email::parse("jo@example.com").unwrap(),
                password_hash: "x".to_owned(),
                name: "Jo Baker".to_owned(),
                phone: None,
                street: None,
                zip: None,
            })
            .await
            .unwrap();

        let mut pending = pending_one_time();
        service(&gateway, &store)
            .begin(&mut pending, Some(&created), None, now())
            .await
            .unwrap();

        let linked = store.get_profile(created.id).await.unwrap().unwrap();
        assert_eq!(linked.customer_id, Some(CustomerId::new("cus_jo")));
    }
}
