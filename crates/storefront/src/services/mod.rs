//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `settings` - Live store settings snapshot with remote reload
//! - `captcha` - reCAPTCHA verification for signups
//! - `auth` - Email and password accounts
//! - `checkout` - Payment flow execution for a pending order
//! - `subscriptions` - Dashboard edits to recurring deliveries
//! - `account` - Profile edits and order history

pub mod account;
pub mod auth;
pub mod captcha;
pub mod checkout;
pub mod settings;
pub mod subscriptions;
