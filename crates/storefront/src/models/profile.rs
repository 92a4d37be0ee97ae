//! Account profile types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bakehouse_core::{CustomerId, Email, UserId};

/// A storefront account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub email: Email,
    pub name: String,
    pub phone: Option<String>,
    pub street: Option<String>,
    pub zip: Option<String>,
    /// Linked customer on the payments platform.
    pub customer_id: Option<CustomerId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for a new account.
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub email: Email,
    pub password_hash: String,
    pub name: String,
    pub phone: Option<String>,
    pub street: Option<String>,
    pub zip: Option<String>,
}

/// Partial profile edit. `None` leaves the field unchanged; an empty string
/// clears an optional field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub street: Option<String>,
    pub zip: Option<String>,
}

impl ProfileUpdate {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none() && self.phone.is_none() && self.street.is_none() && self.zip.is_none()
    }
}

/// What login needs to check a password.
#[derive(Debug, Clone)]
pub struct StoredCredentials {
    pub user_id: UserId,
    pub password_hash: String,
}
