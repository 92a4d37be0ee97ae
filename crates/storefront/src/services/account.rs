//! Account dashboard: profile edits and order history.

use std::collections::HashSet;

use thiserror::Error;
use tracing::{info, instrument};

use bakehouse_core::{StoreSettings, UserId};

use crate::db::{DocumentStore, RepositoryError};
use crate::models::{Order, ProfileUpdate, UserProfile};

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Account not found")]
    NotFound,

    #[error("Name cannot be empty")]
    MissingName,

    #[error("We don't deliver to ZIP code {0}")]
    UndeliverableZip(String),

    #[error("Nothing to update")]
    EmptyUpdate,

    #[error("store error: {0}")]
    Repository(#[from] RepositoryError),
}

pub struct AccountService<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> AccountService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store }
    }

    /// # Errors
    ///
    /// Returns [`AccountError::NotFound`] if the account no longer exists.
    pub async fn profile(&self, user_id: UserId) -> Result<UserProfile, AccountError> {
        self.store
            .get_profile(user_id)
            .await?
            .ok_or(AccountError::NotFound)
    }

    /// Apply a partial edit. A new ZIP must be in the delivery area; blank
    /// optional fields clear the stored value.
    ///
    /// # Errors
    ///
    /// Fails on an empty edit, a blank name, or an undeliverable ZIP.
    #[instrument(skip(self, update, settings))]
    pub async fn update_profile(
        &self,
        user_id: UserId,
        update: &ProfileUpdate,
        settings: &StoreSettings,
    ) -> Result<UserProfile, AccountError> {
        if update.is_empty() {
            return Err(AccountError::EmptyUpdate);
        }

        let name = match update.name.as_deref().map(str::trim) {
            Some("") => return Err(AccountError::MissingName),
            other => other.map(str::to_owned),
        };
        let zip = update.zip.as_deref().map(str::trim).map(str::to_owned);
        if let Some(zip) = zip.as_deref()
            && !zip.is_empty()
            && !settings.allowed_zips.is_deliverable(zip)
        {
            return Err(AccountError::UndeliverableZip(zip.to_owned()));
        }

        let normalized = ProfileUpdate {
            name,
            phone: update.phone.as_deref().map(str::trim).map(str::to_owned),
            street: update.street.as_deref().map(str::trim).map(str::to_owned),
            zip,
        };
        let profile = self
            .store
            .update_profile(user_id, &normalized)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound(_) => AccountError::NotFound,
                other => AccountError::Repository(other),
            })?;
        info!(user_id = %user_id, "Profile updated");
        Ok(profile)
    }

    /// Orders placed while signed in plus guest orders under the account's
    /// email, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError::NotFound`] if the account no longer exists.
    pub async fn orders(&self, user_id: UserId) -> Result<Vec<Order>, AccountError> {
        let profile = self.profile(user_id).await?;
        let mut orders = self.store.list_orders_by_user(user_id).await?;
        let by_email = self.store.list_orders_by_email(&profile.email).await?;

        let mut seen: HashSet<_> = orders.iter().map(|o| o.id).collect();
        orders.extend(by_email.into_iter().filter(|o| seen.insert(o.id)));
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }
}
