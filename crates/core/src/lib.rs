//! Bakehouse Core - Domain types and ordering policy.
//!
//! This crate provides the business rules shared by every Bakehouse component:
//! - `storefront` - HTTP service (ordering, checkout, account dashboard)
//! - `cli` - Operator tools (migrations, settings validation)
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. Every rule here can be tested without a network.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, money, emails, and statuses
//! - [`delivery`] - Delivery-date computation in the bakery's timezone
//! - [`zip`] - Delivery ZIP allow-list
//! - [`settings`] - Store settings snapshot (catalog, delivery days, ZIPs)
//! - [`order`] - Order draft assembly and validation
//! - [`payment_flow`] - Payment flow decision table and intent statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod delivery;
pub mod order;
pub mod payment_flow;
pub mod settings;
pub mod types;
pub mod zip;

pub use delivery::DeliveryPolicy;
pub use order::{
    CustomerDetails, DeliveryAddress, DeliveryChoice, LineItem, OrderDraft, OrderDraftError,
    OrderRequest,
};
pub use payment_flow::{FlowError, IntentStatus, PaymentFlow};
pub use settings::{CatalogProduct, SettingsError, StoreSettings};
pub use types::*;
pub use zip::ZipAllowList;
