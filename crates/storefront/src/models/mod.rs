//! Domain models for the storefront.
//!
//! These are the records the document store persists and the values the
//! session carries between requests.

pub mod order;
pub mod profile;
pub mod session;
pub mod subscription;

pub use order::Order;
pub use profile::{NewProfile, ProfileUpdate, StoredCredentials, UserProfile};
pub use session::{CurrentUser, IntentRef, PendingIntent, PendingOrder, keys};
pub use subscription::Subscription;
