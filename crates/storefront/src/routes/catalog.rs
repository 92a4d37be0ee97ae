//! Catalog and delivery lookups.
//!
//! Everything here is read from the live settings snapshot.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use bakehouse_core::{Cents, ProductId, delivery::available_delivery_dates};

use crate::error::{AppError, Result};
use crate::state::AppState;

/// Default number of dates offered on the order form.
const DEFAULT_DATE_COUNT: usize = 3;
const MAX_DATE_COUNT: usize = 20;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductView {
    pub id: ProductId,
    pub name: String,
    pub price: Cents,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogResponse {
    pub products: Vec<ProductView>,
    /// 0 = Sunday.
    pub delivery_weekdays: Vec<u8>,
    pub holiday_mode: bool,
    pub max_comment_length: usize,
    pub delivery_city: String,
    pub delivery_state: String,
}

/// List products and the ordering rules the form needs.
///
/// GET /products
///
/// # Errors
///
/// Returns `AppError::Internal` if a catalog price cannot be represented.
pub async fn products(State(state): State<AppState>) -> Result<Json<CatalogResponse>> {
    let settings = state.settings().snapshot();
    let products = settings
        .products
        .iter()
        .map(|p| {
            Ok(ProductView {
                id: p.id.clone(),
                name: p.name.clone(),
                price: p
                    .unit_price()
                    .map_err(|e| AppError::Internal(format!("product {}: {e}", p.id)))?,
                description: p.description.clone(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Json(CatalogResponse {
        products,
        delivery_weekdays: settings.delivery_weekdays.iter().copied().collect(),
        holiday_mode: settings.holiday_mode,
        max_comment_length: settings.max_comment_length,
        delivery_city: settings.delivery_city.clone(),
        delivery_state: settings.delivery_state.clone(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct DatesQuery {
    pub count: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct DatesResponse {
    pub dates: Vec<NaiveDate>,
}

/// Next deliverable dates in the bakery's timezone.
///
/// GET /delivery/dates?count=N
pub async fn delivery_dates(
    State(state): State<AppState>,
    Query(query): Query<DatesQuery>,
) -> Json<DatesResponse> {
    let count = query
        .count
        .unwrap_or(DEFAULT_DATE_COUNT)
        .clamp(1, MAX_DATE_COUNT);
    let settings = state.settings().snapshot();
    let policy = settings.delivery_policy(state.config().timezone);
    Json(DatesResponse {
        dates: available_delivery_dates(Utc::now(), &policy, count),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZipResponse {
    pub zip: String,
    pub deliverable: bool,
    pub city: String,
    pub state: String,
}

/// Whether a ZIP is in the delivery area.
///
/// GET /delivery/zip/{zip}
pub async fn check_zip(State(state): State<AppState>, Path(zip): Path<String>) -> Json<ZipResponse> {
    let settings = state.settings().snapshot();
    Json(ZipResponse {
        deliverable: settings.allowed_zips.is_deliverable(&zip),
        zip: zip.trim().to_owned(),
        city: settings.delivery_city.clone(),
        state: settings.delivery_state.clone(),
    })
}
