//! In-memory [`DocumentStore`] for handler and service tests.

#![allow(clippy::unwrap_used)]

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use bakehouse_core::{
    Cents, CustomerId, DeliveryAddress, Email, Frequency, LineItem, OrderId, SubscriptionId,
    SubscriptionStatus, UserId,
};

use super::{DocumentStore, RepositoryError};
use crate::models::{
    NewProfile, Order, ProfileUpdate, StoredCredentials, Subscription, UserProfile,
};

#[derive(Default)]
pub struct MemoryDocumentStore {
    profiles: Mutex<Vec<(UserProfile, String)>>,
    orders: Mutex<Vec<Order>>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl MemoryDocumentStore {
    pub fn orders(&self) -> Vec<Order> {
        self.orders.lock().unwrap().clone()
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions.lock().unwrap().clone()
    }

    fn update_subscription(
        &self,
        id: SubscriptionId,
        apply: impl FnOnce(&mut Subscription),
    ) -> Result<Subscription, RepositoryError> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        let subscription = subscriptions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| RepositoryError::NotFound(format!("subscription {id}")))?;
        apply(subscription);
        subscription.updated_at = Utc::now();
        Ok(subscription.clone())
    }
}

fn newest_first<T>(mut records: Vec<T>, created_at: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    records.sort_by_key(|r| std::cmp::Reverse(created_at(r)));
    records
}

fn check_order(orders: &[Order], order: &Order) -> Result<(), RepositoryError> {
    if orders.iter().any(|o| o.intent == order.intent) {
        return Err(RepositoryError::Conflict(
            "order already recorded for this payment".to_owned(),
        ));
    }
    Ok(())
}

fn check_subscription(
    subscriptions: &[Subscription],
    subscription: &Subscription,
) -> Result<(), RepositoryError> {
    if subscriptions
        .iter()
        .any(|s| s.setup_intent_id == subscription.setup_intent_id)
    {
        return Err(RepositoryError::Conflict(
            "subscription already recorded for this setup".to_owned(),
        ));
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn create_profile(&self, profile: &NewProfile) -> Result<UserProfile, RepositoryError> {
        let mut profiles = self.profiles.lock().unwrap();
        if profiles.iter().any(|(p, _)| p.email == profile.email) {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }
        let now = Utc::now();
        let created = UserProfile {
            id: UserId::new(),
            email: profile.email.clone(),
            name: profile.name.clone(),
            phone: profile.phone.clone(),
            street: profile.street.clone(),
            zip: profile.zip.clone(),
            customer_id: None,
            created_at: now,
            updated_at: now,
        };
        profiles.push((created.clone(), profile.password_hash.clone()));
        Ok(created)
    }

    async fn get_profile(&self, id: UserId) -> Result<Option<UserProfile>, RepositoryError> {
        let profiles = self.profiles.lock().unwrap();
        Ok(profiles.iter().find(|(p, _)| p.id == id).map(|(p, _)| p.clone()))
    }

    async fn get_profile_by_email(
        &self,
        email: &Email,
    ) -> Result<Option<UserProfile>, RepositoryError> {
        let profiles = self.profiles.lock().unwrap();
        Ok(profiles
            .iter()
            .find(|(p, _)| &p.email == email)
            .map(|(p, _)| p.clone()))
    }

    async fn get_credentials(
        &self,
        email: &Email,
    ) -> Result<Option<StoredCredentials>, RepositoryError> {
        let profiles = self.profiles.lock().unwrap();
        Ok(profiles
            .iter()
            .find(|(p, _)| &p.email == email)
            .map(|(p, hash)| StoredCredentials {
                user_id: p.id,
                password_hash: hash.clone(),
            }))
    }

    async fn update_profile(
        &self,
        id: UserId,
        update: &ProfileUpdate,
    ) -> Result<UserProfile, RepositoryError> {
        let mut profiles = self.profiles.lock().unwrap();
        let (profile, _) = profiles
            .iter_mut()
            .find(|(p, _)| p.id == id)
            .ok_or_else(|| RepositoryError::NotFound(format!("profile {id}")))?;
        if let Some(name) = &update.name {
            profile.name.clone_from(name);
        }
        if let Some(phone) = &update.phone {
            profile.phone = Some(phone.clone()).filter(|v| !v.is_empty());
        }
        if let Some(street) = &update.street {
            profile.street = Some(street.clone()).filter(|v| !v.is_empty());
        }
        if let Some(zip) = &update.zip {
            profile.zip = Some(zip.clone()).filter(|v| !v.is_empty());
        }
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }

    async fn set_customer_id(
        &self,
        id: UserId,
        customer_id: &CustomerId,
    ) -> Result<(), RepositoryError> {
        let mut profiles = self.profiles.lock().unwrap();
        let (profile, _) = profiles
            .iter_mut()
            .find(|(p, _)| p.id == id)
            .ok_or_else(|| RepositoryError::NotFound(format!("profile {id}")))?;
        profile.customer_id = Some(customer_id.clone());
        Ok(())
    }

    async fn create_order(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut orders = self.orders.lock().unwrap();
        check_order(&orders, order)?;
        orders.push(order.clone());
        Ok(())
    }

    async fn list_orders_by_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let orders = self.orders.lock().unwrap();
        let mine = orders
            .iter()
            .filter(|o| o.user_id == Some(user_id))
            .cloned()
            .collect();
        Ok(newest_first(mine, |o| o.created_at))
    }

    async fn list_orders_by_email(&self, email: &Email) -> Result<Vec<Order>, RepositoryError> {
        let orders = self.orders.lock().unwrap();
        let mine = orders
            .iter()
            .filter(|o| &o.customer.email == email)
            .cloned()
            .collect();
        Ok(newest_first(mine, |o| o.created_at))
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.orders.lock().unwrap().iter().find(|o| o.id == id).cloned())
    }

    async fn create_subscription(
        &self,
        subscription: &Subscription,
    ) -> Result<(), RepositoryError> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        check_subscription(&subscriptions, subscription)?;
        subscriptions.push(subscription.clone());
        Ok(())
    }

    async fn create_recurring_order(
        &self,
        order: &Order,
        subscription: &Subscription,
    ) -> Result<(), RepositoryError> {
        let mut orders = self.orders.lock().unwrap();
        let mut subscriptions = self.subscriptions.lock().unwrap();
        check_subscription(&subscriptions, subscription)?;
        check_order(&orders, order)?;
        subscriptions.push(subscription.clone());
        orders.push(order.clone());
        Ok(())
    }

    async fn list_subscriptions(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Subscription>, RepositoryError> {
        let subscriptions = self.subscriptions.lock().unwrap();
        let mine = subscriptions
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(mine, |s| s.created_at))
    }

    async fn get_subscription(
        &self,
        id: SubscriptionId,
    ) -> Result<Option<Subscription>, RepositoryError> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .cloned())
    }

    async fn update_subscription_schedule(
        &self,
        id: SubscriptionId,
        weekday: u8,
        frequency: Frequency,
        next_delivery: DateTime<Utc>,
    ) -> Result<Subscription, RepositoryError> {
        self.update_subscription(id, |s| {
            s.delivery_weekday = weekday;
            s.frequency = frequency;
            s.next_delivery = next_delivery;
        })
    }

    async fn update_subscription_items(
        &self,
        id: SubscriptionId,
        items: &[LineItem],
        total: Cents,
    ) -> Result<Subscription, RepositoryError> {
        self.update_subscription(id, |s| {
            s.items = items.to_vec();
            s.total = total;
        })
    }

    async fn update_subscription_address(
        &self,
        id: SubscriptionId,
        address: &DeliveryAddress,
    ) -> Result<Subscription, RepositoryError> {
        self.update_subscription(id, |s| s.address = address.clone())
    }

    async fn update_subscription_status(
        &self,
        id: SubscriptionId,
        status: SubscriptionStatus,
    ) -> Result<Subscription, RepositoryError> {
        self.update_subscription(id, |s| s.status = status)
    }
}
