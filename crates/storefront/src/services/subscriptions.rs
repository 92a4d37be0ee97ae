//! Subscription dashboard edits.
//!
//! Each edit is an independent single-record write that re-checks the rules
//! an order form would: the weekday must be a delivery day, the ZIP must be
//! in the delivery area, and totals are re-priced from the live catalog.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, instrument};

use bakehouse_core::{
    DeliveryAddress, Frequency, OrderDraftError, ProductId, StoreSettings, SubscriptionId,
    SubscriptionStatus, UserId, delivery::next_occurrence_of_weekday, order::price_line_items,
    weekday_from_number,
};

use crate::db::{DocumentStore, RepositoryError};
use crate::models::Subscription;

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("Subscription not found")]
    NotFound,

    #[error("This subscription has been cancelled")]
    Cancelled,

    #[error("We don't deliver on that day")]
    WeekdayUnavailable,

    #[error("We don't deliver to ZIP code {0}")]
    ZipNotDeliverable(String),

    #[error("Please enter a street address")]
    MissingStreet,

    #[error("Cannot change a {from} subscription to {to}")]
    InvalidTransition {
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    },

    #[error(transparent)]
    Items(#[from] OrderDraftError),

    #[error("store error: {0}")]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleUpdate {
    /// 0 = Sunday.
    pub weekday: u8,
    pub frequency: Frequency,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemsUpdate {
    pub quantities: BTreeMap<ProductId, u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddressUpdate {
    pub street: String,
    pub zip: String,
}

/// Edits to one account's subscriptions.
pub struct SubscriptionService<'a> {
    store: &'a dyn DocumentStore,
    user_id: UserId,
}

impl<'a> SubscriptionService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn DocumentStore, user_id: UserId) -> Self {
        Self { store, user_id }
    }

    /// Subscriptions owned by the account, newest first.
    ///
    /// # Errors
    ///
    /// Returns a store error if the lookup fails.
    pub async fn list(&self) -> Result<Vec<Subscription>, SubscriptionError> {
        Ok(self.store.list_subscriptions(self.user_id).await?)
    }

    /// Move deliveries to another weekday or frequency.
    ///
    /// The next delivery is recomputed from `now`.
    ///
    /// # Errors
    ///
    /// Fails if the subscription is not the account's, is cancelled, or the
    /// weekday is not a delivery day.
    #[instrument(skip(self, update, settings), fields(user_id = %self.user_id))]
    pub async fn update_schedule(
        &self,
        id: SubscriptionId,
        update: &ScheduleUpdate,
        settings: &StoreSettings,
        now: DateTime<Utc>,
        timezone: Tz,
    ) -> Result<Subscription, SubscriptionError> {
        self.editable(id).await?;

        let day = weekday_from_number(update.weekday)
            .filter(|day| settings.delivery_policy(timezone).allows_weekday(*day))
            .ok_or(SubscriptionError::WeekdayUnavailable)?;
        let next_delivery = next_occurrence_of_weekday(day, update.frequency, now, timezone);

        let updated = self
            .store
            .update_subscription_schedule(id, update.weekday, update.frequency, next_delivery)
            .await?;
        info!(subscription_id = %id, %next_delivery, "Subscription schedule changed");
        Ok(updated)
    }

    /// Replace the subscription's contents, re-priced from the catalog.
    ///
    /// # Errors
    ///
    /// Fails if the subscription is not editable, the selection is empty, or
    /// it names an unknown product.
    #[instrument(skip(self, update, settings), fields(user_id = %self.user_id))]
    pub async fn update_items(
        &self,
        id: SubscriptionId,
        update: &ItemsUpdate,
        settings: &StoreSettings,
    ) -> Result<Subscription, SubscriptionError> {
        self.editable(id).await?;
        let (items, total) = price_line_items(&update.quantities, settings)?;
        let updated = self.store.update_subscription_items(id, &items, total).await?;
        info!(subscription_id = %id, %total, "Subscription items changed");
        Ok(updated)
    }

    /// Change where deliveries go. City and state come from settings.
    ///
    /// # Errors
    ///
    /// Fails if the subscription is not editable, the street is blank, or
    /// the ZIP is outside the delivery area.
    #[instrument(skip(self, update, settings), fields(user_id = %self.user_id))]
    pub async fn update_address(
        &self,
        id: SubscriptionId,
        update: &AddressUpdate,
        settings: &StoreSettings,
    ) -> Result<Subscription, SubscriptionError> {
        self.editable(id).await?;

        let street = update.street.trim();
        if street.is_empty() {
            return Err(SubscriptionError::MissingStreet);
        }
        let zip = update.zip.trim();
        if zip.is_empty() {
            return Err(OrderDraftError::MissingZip.into());
        }
        if !settings.allowed_zips.is_deliverable(zip) {
            return Err(SubscriptionError::ZipNotDeliverable(zip.to_owned()));
        }

        let address = DeliveryAddress {
            street: street.to_owned(),
            city: settings.delivery_city.clone(),
            state: settings.delivery_state.clone(),
            zip: zip.to_owned(),
        };
        Ok(self.store.update_subscription_address(id, &address).await?)
    }

    /// Pause, resume, or cancel.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::InvalidTransition`] for moves the status
    /// machine forbids, including anything out of `cancelled`.
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn change_status(
        &self,
        id: SubscriptionId,
        status: SubscriptionStatus,
    ) -> Result<Subscription, SubscriptionError> {
        let current = self.owned(id).await?;
        if !current.status.can_transition_to(status) {
            return Err(SubscriptionError::InvalidTransition {
                from: current.status,
                to: status,
            });
        }
        let updated = self.store.update_subscription_status(id, status).await?;
        info!(subscription_id = %id, from = %current.status, to = %status, "Subscription status changed");
        Ok(updated)
    }

    /// Someone else's subscription is reported as missing.
    async fn owned(&self, id: SubscriptionId) -> Result<Subscription, SubscriptionError> {
        self.store
            .get_subscription(id)
            .await?
            .filter(|s| s.user_id == self.user_id)
            .ok_or(SubscriptionError::NotFound)
    }

    async fn editable(&self, id: SubscriptionId) -> Result<Subscription, SubscriptionError> {
        let subscription = self.owned(id).await?;
        if subscription.status == SubscriptionStatus::Cancelled {
            return Err(SubscriptionError::Cancelled);
        }
        Ok(subscription)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bakehouse_core::{Cents, CustomerId, SetupIntentId};

    use super::*;
    use crate::db::memory::MemoryDocumentStore;
    use crate::test_support::{TZ, draft, now, recurring_request};

    async fn seeded(store: &MemoryDocumentStore, owner: UserId) -> SubscriptionId {
        let draft = draft(&recurring_request());
        let subscription = Subscription {
            id: SubscriptionId::new(),
            user_id: owner,
            customer_id: CustomerId::new("cus_jo"),
            payment_method_id: None,
            setup_intent_id: SetupIntentId::new("seti_1"),
            items: draft.items().to_vec(),
            total: draft.total(),
            address: draft.address().clone(),
            delivery_weekday: 3,
            frequency: Frequency::Weekly,
            next_delivery: now(),
            status: SubscriptionStatus::Active,
            created_at: now(),
            updated_at: now(),
        };
        store.create_subscription(&subscription).await.unwrap();
        subscription.id
    }

    #[tokio::test]
    async fn test_schedule_change_recomputes_next_delivery() {
        let store = MemoryDocumentStore::default();
        let owner = UserId::new();
        let id = seeded(&store, owner).await;

        let updated = SubscriptionService::new(&store, owner)
            .update_schedule(
                id,
                &ScheduleUpdate {
                    weekday: 6,
                    frequency: Frequency::BiWeekly,
                },
                &StoreSettings::default(),
                now(),
                TZ,
            )
            .await
            .unwrap();
        assert_eq!(updated.delivery_weekday, 6);
        assert_eq!(updated.frequency, Frequency::BiWeekly);
        // Saturday 2024-03-09, local midnight (PST)
        assert_eq!(
            updated.next_delivery,
            "2024-03-09T08:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
    }

    #[tokio::test]
    async fn test_schedule_rejects_non_delivery_day() {
        let store = MemoryDocumentStore::default();
        let owner = UserId::new();
        let id = seeded(&store, owner).await;
        let service = SubscriptionService::new(&store, owner);

        for weekday in [1, 9] {
            let result = service
                .update_schedule(
                    id,
                    &ScheduleUpdate {
                        weekday,
                        frequency: Frequency::Weekly,
                    },
                    &StoreSettings::default(),
                    now(),
                    TZ,
                )
                .await;
            assert!(matches!(result, Err(SubscriptionError::WeekdayUnavailable)));
        }
    }

    #[tokio::test]
    async fn test_items_are_repriced() {
        let store = MemoryDocumentStore::default();
        let owner = UserId::new();
        let id = seeded(&store, owner).await;

        let updated = SubscriptionService::new(&store, owner)
            .update_items(
                id,
                &ItemsUpdate {
                    quantities: BTreeMap::from([(ProductId::new("sourdough"), 3)]),
                },
                &StoreSettings::default(),
            )
            .await
            .unwrap();
        assert_eq!(updated.total, Cents::new(1800));
        assert_eq!(updated.items.len(), 1);

        let empty = SubscriptionService::new(&store, owner)
            .update_items(
                id,
                &ItemsUpdate {
                    quantities: BTreeMap::from([(ProductId::new("sourdough"), 0)]),
                },
                &StoreSettings::default(),
            )
            .await;
        assert!(matches!(
            empty,
            Err(SubscriptionError::Items(OrderDraftError::EmptyCart))
        ));
    }

    #[tokio::test]
    async fn test_address_requires_deliverable_zip() {
        let store = MemoryDocumentStore::default();
        let owner = UserId::new();
        let id = seeded(&store, owner).await;
        let service = SubscriptionService::new(&store, owner);
        let settings = StoreSettings::default();

        let outside = service
            .update_address(
                id,
                &AddressUpdate {
                    street: "9 Elm St".to_owned(),
                    zip: "10001".to_owned(),
                },
                &settings,
            )
            .await;
        assert!(matches!(outside, Err(SubscriptionError::ZipNotDeliverable(zip)) if zip == "10001"));

        let blank = service
            .update_address(
                id,
                &AddressUpdate {
                    street: "9 Elm St".to_owned(),
                    zip: "   ".to_owned(),
                },
                &settings,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            blank,
            SubscriptionError::Items(OrderDraftError::MissingZip)
        ));
        assert_eq!(blank.to_string(), OrderDraftError::MissingZip.to_string());

        let updated = service
            .update_address(
                id,
                &AddressUpdate {
                    street: " 9 Elm St ".to_owned(),
                    zip: " 97201 ".to_owned(),
                },
                &settings,
            )
            .await
            .unwrap();
        assert_eq!(updated.address.street, "9 Elm St");
        assert_eq!(updated.address.zip, "97201");
        assert_eq!(updated.address.city, settings.delivery_city);
    }

    #[tokio::test]
    async fn test_status_machine_and_cancelled_edits() {
        let store = MemoryDocumentStore::default();
        let owner = UserId::new();
        let id = seeded(&store, owner).await;
        let service = SubscriptionService::new(&store, owner);

        let paused = service
            .change_status(id, SubscriptionStatus::Paused)
            .await
            .unwrap();
        assert_eq!(paused.status, SubscriptionStatus::Paused);

        service
            .change_status(id, SubscriptionStatus::Cancelled)
            .await
            .unwrap();
        assert!(matches!(
            service.change_status(id, SubscriptionStatus::Active).await,
            Err(SubscriptionError::InvalidTransition { .. })
        ));
        assert!(matches!(
            service
                .update_items(
                    id,
                    &ItemsUpdate {
                        quantities: BTreeMap::from([(ProductId::new("sourdough"), 1)]),
                    },
                    &StoreSettings::default(),
                )
                .await,
            Err(SubscriptionError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_other_accounts_subscription_is_not_found() {
        let store = MemoryDocumentStore::default();
        let id = seeded(&store, UserId::new()).await;

        let result = SubscriptionService::new(&store, UserId::new())
            .change_status(id, SubscriptionStatus::Paused)
            .await;
        assert!(matches!(result, Err(SubscriptionError::NotFound)));
    }
}
