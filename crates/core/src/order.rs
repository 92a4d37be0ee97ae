//! Order draft assembly.
//!
//! An [`OrderRequest`] is what the order form submits. [`OrderDraft::assemble`]
//! turns it into a priced, validated draft or reports the single most relevant
//! problem. Nothing here touches the payments platform; a draft that fails to
//! assemble never reaches checkout.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::delivery::is_delivery_date_available;
use crate::settings::StoreSettings;
use crate::types::{Cents, Email, EmailError, Frequency, MoneyError, ProductId, weekday_from_number};

/// Why an order request was rejected.
///
/// The `Display` text is shown to the customer as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderDraftError {
    #[error("We're taking a short break and aren't accepting orders right now.")]
    HolidayMode,

    #[error("Please sign in to set up a recurring order.")]
    RecurringRequiresAccount,

    #[error("Please choose a delivery date.")]
    MissingDeliveryDate,

    #[error("That delivery date isn't available. Please choose another.")]
    DeliveryDateUnavailable,

    #[error("Please enter your delivery address.")]
    MissingAddress,

    #[error("Please enter your ZIP code.")]
    MissingZip,

    #[error("Sorry, we don't deliver to {0} yet.")]
    ZipNotDeliverable(String),

    #[error("Please enter your name.")]
    MissingName,

    #[error("Please enter your email address.")]
    MissingEmail,

    #[error("Please enter a valid email address.")]
    InvalidEmail(#[source] EmailError),

    #[error("Please add at least one item to your order.")]
    EmptyCart,

    #[error("\"{0}\" is not on the menu.")]
    UnknownProduct(ProductId),

    #[error("Comments must be {max} characters or fewer.")]
    CommentsTooLong { max: usize },

    #[error("We couldn't total this order. Please reduce the quantities.")]
    Amount(#[source] MoneyError),
}

/// When the order is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryChoice {
    /// A single delivery on a calendar date.
    OneTime { date: NaiveDate },
    /// Repeating deliveries on a weekday (0 = Sunday).
    Recurring { weekday: u8, frequency: Frequency },
}

impl DeliveryChoice {
    /// The recurring weekday, if any.
    #[must_use]
    pub fn weekday(&self) -> Option<Weekday> {
        match self {
            Self::OneTime { .. } => None,
            Self::Recurring { weekday, .. } => weekday_from_number(*weekday),
        }
    }
}

/// Where the order goes. City and state come from store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

/// Who the order is for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub name: String,
    pub email: Email,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// One priced row of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Cents,
    pub quantity: u32,
    pub total: Cents,
}

/// Raw order form submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderRequest {
    /// Selected quantity per product. Zero entries are ignored.
    pub quantities: BTreeMap<ProductId, u32>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub street: String,
    pub zip: String,
    /// Delivery date for one-time orders.
    pub delivery_date: Option<NaiveDate>,
    /// Delivery weekday for recurring orders (0 = Sunday).
    pub delivery_weekday: Option<u8>,
    pub frequency: Option<Frequency>,
    pub comments: Option<String>,
    pub is_recurring: bool,
}

/// A validated, priced order awaiting payment.
///
/// Only [`OrderDraft::assemble`] builds one, so `total` always equals the sum
/// of the line totals and each line total equals price times quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDraft {
    items: Vec<LineItem>,
    total: Cents,
    customer: CustomerDetails,
    address: DeliveryAddress,
    delivery: DeliveryChoice,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    comments: Option<String>,
    is_recurring: bool,
}

fn blank(s: &str) -> bool {
    s.trim().is_empty()
}

/// Price the non-zero quantities against the catalog.
///
/// # Errors
///
/// [`OrderDraftError::EmptyCart`] when nothing has a positive quantity,
/// [`OrderDraftError::UnknownProduct`] for ids missing from the catalog.
pub fn price_line_items(
    quantities: &BTreeMap<ProductId, u32>,
    settings: &StoreSettings,
) -> Result<(Vec<LineItem>, Cents), OrderDraftError> {
    let selected: Vec<_> = quantities.iter().filter(|(_, q)| **q > 0).collect();
    if selected.is_empty() {
        return Err(OrderDraftError::EmptyCart);
    }

    let mut items = Vec::with_capacity(selected.len());
    for (id, &quantity) in selected {
        let product = settings
            .product(id)
            .ok_or_else(|| OrderDraftError::UnknownProduct(id.clone()))?;
        let unit_price = product.unit_price().map_err(OrderDraftError::Amount)?;
        let total = unit_price
            .checked_mul(quantity)
            .map_err(OrderDraftError::Amount)?;
        items.push(LineItem {
            product_id: id.clone(),
            name: product.name.clone(),
            unit_price,
            quantity,
            total,
        });
    }

    let total =
        Cents::checked_sum(items.iter().map(|item| item.total)).map_err(OrderDraftError::Amount)?;
    Ok((items, total))
}

impl OrderDraft {
    /// Validate and price an order request.
    ///
    /// Rules are checked in a fixed order and the first failure is returned:
    /// holiday mode, recurring without an account, delivery date (missing,
    /// then unavailable), address, ZIP (missing, then not deliverable), name,
    /// email (missing, then malformed), cart contents, comment length.
    ///
    /// # Errors
    ///
    /// Returns the first failing rule as an [`OrderDraftError`].
    pub fn assemble(
        request: &OrderRequest,
        settings: &StoreSettings,
        authenticated: bool,
        now: DateTime<Utc>,
        timezone: Tz,
    ) -> Result<Self, OrderDraftError> {
        if settings.holiday_mode {
            return Err(OrderDraftError::HolidayMode);
        }
        if request.is_recurring && !authenticated {
            return Err(OrderDraftError::RecurringRequiresAccount);
        }

        let delivery = if request.is_recurring {
            let weekday = request
                .delivery_weekday
                .ok_or(OrderDraftError::MissingDeliveryDate)?;
            if weekday_from_number(weekday).is_none()
                || !settings.delivery_weekdays.contains(&weekday)
            {
                return Err(OrderDraftError::DeliveryDateUnavailable);
            }
            DeliveryChoice::Recurring {
                weekday,
                frequency: request.frequency.unwrap_or_default(),
            }
        } else {
            let date = request
                .delivery_date
                .ok_or(OrderDraftError::MissingDeliveryDate)?;
            let policy = settings.delivery_policy(timezone);
            if !is_delivery_date_available(date, now, &policy) {
                return Err(OrderDraftError::DeliveryDateUnavailable);
            }
            DeliveryChoice::OneTime { date }
        };

        if blank(&request.street) {
            return Err(OrderDraftError::MissingAddress);
        }
        let zip = request.zip.trim();
        if zip.is_empty() {
            return Err(OrderDraftError::MissingZip);
        }
        if !settings.allowed_zips.is_deliverable(zip) {
            return Err(OrderDraftError::ZipNotDeliverable(zip.to_owned()));
        }

        if blank(&request.name) {
            return Err(OrderDraftError::MissingName);
        }
        if blank(&request.email) {
            return Err(OrderDraftError::MissingEmail);
        }
        let email = Email::parse(&request.email).map_err(OrderDraftError::InvalidEmail)?;

        let (items, total) = price_line_items(&request.quantities, settings)?;

        let comments = request
            .comments
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());
        if comments.is_some_and(|text| text.chars().count() > settings.max_comment_length) {
            return Err(OrderDraftError::CommentsTooLong {
                max: settings.max_comment_length,
            });
        }

        Ok(Self {
            items,
            total,
            customer: CustomerDetails {
                name: request.name.trim().to_owned(),
                email,
                phone: request
                    .phone
                    .as_deref()
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_owned),
            },
            address: DeliveryAddress {
                street: request.street.trim().to_owned(),
                city: settings.delivery_city.clone(),
                state: settings.delivery_state.clone(),
                zip: zip.to_owned(),
            },
            delivery,
            comments: comments.map(str::to_owned),
            is_recurring: request.is_recurring,
        })
    }

    #[must_use]
    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    #[must_use]
    pub const fn total(&self) -> Cents {
        self.total
    }

    #[must_use]
    pub const fn customer(&self) -> &CustomerDetails {
        &self.customer
    }

    #[must_use]
    pub const fn address(&self) -> &DeliveryAddress {
        &self.address
    }

    #[must_use]
    pub const fn delivery(&self) -> DeliveryChoice {
        self.delivery
    }

    #[must_use]
    pub fn comments(&self) -> Option<&str> {
        self.comments.as_deref()
    }

    #[must_use]
    pub const fn is_recurring(&self) -> bool {
        self.is_recurring
    }

    /// Short human summary such as `2 x Country Sourdough, 1 x Baguette`.
    #[must_use]
    pub fn item_summary(&self) -> String {
        let mut out = String::new();
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{} x {}", item.quantity, item.name);
        }
        out
    }
}
