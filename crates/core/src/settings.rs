//! Store settings snapshot.
//!
//! The catalog, delivery days, and ZIP allow-list are operator-editable and
//! live in a JSON document fetched at startup. [`StoreSettings`] is that
//! document after parsing. Missing fields fall back to [`Default`], so a
//! document containing only `{"holiday_mode": true}` is valid.

use std::collections::{BTreeSet, HashSet};

use chrono::NaiveDate;
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::delivery::DeliveryPolicy;
use crate::types::{Cents, MoneyError, ProductId, weekday_from_number};
use crate::zip::ZipAllowList;

/// Default maximum length of order comments, in characters.
pub const DEFAULT_MAX_COMMENT_LENGTH: usize = 500;

/// Errors in a settings document.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// Document is not valid JSON for this shape.
    #[error("invalid settings document: {0}")]
    Parse(#[from] serde_json::Error),

    /// Catalog has no products.
    #[error("product catalog is empty")]
    EmptyCatalog,

    /// Two products share an id.
    #[error("duplicate product id: {0}")]
    DuplicateProduct(ProductId),

    /// A product price cannot be expressed in cents.
    #[error("invalid price for {product}: {source}")]
    InvalidPrice {
        product: ProductId,
        #[source]
        source: MoneyError,
    },

    /// Weekday outside 0 (Sunday) ..= 6 (Saturday).
    #[error("invalid delivery weekday: {0}")]
    InvalidWeekday(u8),
}

/// A product offered in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub id: ProductId,
    pub name: String,
    /// Unit price in dollars, e.g. `6.50`.
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CatalogProduct {
    /// Unit price in cents.
    ///
    /// # Errors
    ///
    /// Returns an error if the price is negative or has sub-cent precision.
    pub fn unit_price(&self) -> Result<Cents, MoneyError> {
        Cents::from_dollars(self.price)
    }
}

/// Everything the operator can change without a deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub products: Vec<CatalogProduct>,
    /// 0 = Sunday ..= 6 = Saturday.
    pub delivery_weekdays: BTreeSet<u8>,
    pub min_lead_hours: u32,
    pub blackout_dates: BTreeSet<NaiveDate>,
    pub allowed_zips: ZipAllowList,
    /// When set, no new orders are accepted.
    pub holiday_mode: bool,
    pub max_comment_length: usize,
    pub delivery_city: String,
    pub delivery_state: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        let product = |id: &str, name: &str, cents: i64| CatalogProduct {
            id: ProductId::new(id),
            name: name.to_owned(),
            price: Decimal::new(cents, 2),
            description: None,
        };

        Self {
            products: vec![
                product("sourdough", "Country Sourdough", 600),
                product("seeded-rye", "Seeded Rye", 700),
                product("baguette", "Baguette", 400),
                product("cinnamon-rolls", "Cinnamon Rolls (4)", 1200),
            ],
            // Wednesday and Saturday
            delivery_weekdays: BTreeSet::from([3, 6]),
            min_lead_hours: 24,
            blackout_dates: BTreeSet::new(),
            allowed_zips: ZipAllowList::new([
                "97201", "97202", "97205", "97209", "97210", "97211", "97212", "97213", "97214",
                "97215", "97217", "97227", "97232",
            ]),
            holiday_mode: false,
            max_comment_length: DEFAULT_MAX_COMMENT_LENGTH,
            delivery_city: "Portland".to_owned(),
            delivery_state: "OR".to_owned(),
        }
    }
}

impl StoreSettings {
    /// Parse and validate a settings document.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or fails [`Self::validate`].
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check the document for inconsistencies.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.products.is_empty() {
            return Err(SettingsError::EmptyCatalog);
        }

        let mut seen = HashSet::new();
        for product in &self.products {
            if !seen.insert(&product.id) {
                return Err(SettingsError::DuplicateProduct(product.id.clone()));
            }
            product
                .unit_price()
                .map_err(|source| SettingsError::InvalidPrice {
                    product: product.id.clone(),
                    source,
                })?;
        }

        if let Some(&day) = self
            .delivery_weekdays
            .iter()
            .find(|&&day| weekday_from_number(day).is_none())
        {
            return Err(SettingsError::InvalidWeekday(day));
        }

        Ok(())
    }

    /// Look up a catalog product.
    #[must_use]
    pub fn product(&self, id: &ProductId) -> Option<&CatalogProduct> {
        self.products.iter().find(|p| &p.id == id)
    }

    /// Delivery policy evaluated in `timezone`.
    #[must_use]
    pub fn delivery_policy(&self, timezone: Tz) -> DeliveryPolicy {
        DeliveryPolicy {
            allowed_weekdays: self.delivery_weekdays.clone(),
            min_lead_hours: self.min_lead_hours,
            blackout_dates: self.blackout_dates.clone(),
            timezone,
        }
    }
}
