//! Fixtures shared by unit tests.

#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

use bakehouse_core::{
    CustomerId, Email, Frequency, IntentStatus, OrderDraft, OrderRequest, PaymentIntentId,
    PaymentMethodId, ProductId, SetupIntentId, StoreSettings, UserId,
};

use crate::models::UserProfile;
use crate::payments::{CardDetails, Customer, PaymentIntent, PaymentMethod, SetupIntent};

pub const TZ: Tz = chrono_tz::America::Los_Angeles;

/// Monday 2024-03-04, 10:00 in Portland.
pub fn now() -> DateTime<Utc> {
    "2024-03-04T18:00:00Z".parse().unwrap()
}

/// Two sourdough loaves ($12.00) to 97201 on Wednesday 2024-03-06.
pub fn one_time_request() -> OrderRequest {
    OrderRequest {
        quantities: BTreeMap::from([(ProductId::new("sourdough"), 2)]),
        name: "Jo Baker".to_owned(),
        email: "jo@example.com".to_owned(),
        phone: Some("503-555-0100".to_owned()),
        street: "1 Main St".to_owned(),
        zip: "97201".to_owned(),
        delivery_date: Some(NaiveDate::from_ymd_opt(2024, 3, 6).unwrap()),
        ..OrderRequest::default()
    }
}

/// Weekly Wednesday delivery of the same loaves.
pub fn recurring_request() -> OrderRequest {
    OrderRequest {
        delivery_date: None,
        delivery_weekday: Some(3),
        frequency: Some(Frequency::Weekly),
        is_recurring: true,
        ..one_time_request()
    }
}

pub fn draft(request: &OrderRequest) -> OrderDraft {
    OrderDraft::assemble(request, &StoreSettings::default(), true, now(), TZ).unwrap()
}

pub fn profile(customer: Option<&str>) -> UserProfile {
    UserProfile {
        id: UserId::new(),
        email: Email::parse("jo@example.com").unwrap(),
        name: "Jo Baker".to_owned(),
        phone: None,
        street: Some("1 Main St".to_owned()),
        zip: Some("97201".to_owned()),
        customer_id: customer.map(CustomerId::new),
        created_at: now(),
        updated_at: now(),
    }
}

pub fn customer(id: &str) -> Customer {
    Customer {
        id: CustomerId::new(id),
        email: Some("jo@example.com".to_owned()),
        name: Some("Jo Baker".to_owned()),
        metadata: BTreeMap::new(),
        invoice_settings: None,
    }
}

pub fn card(id: &str) -> PaymentMethod {
    PaymentMethod {
        id: PaymentMethodId::new(id),
        kind: "card".to_owned(),
        card: Some(CardDetails {
            brand: "visa".to_owned(),
            last4: "4242".to_owned(),
            exp_month: 12,
            exp_year: 2030,
        }),
        customer: Some(CustomerId::new("cus_jo")),
    }
}

pub fn payment_intent(id: &str, status: &str, amount: u64) -> PaymentIntent {
    PaymentIntent {
        id: PaymentIntentId::new(id),
        client_secret: Some(format!("{id}_secret_test")),
        status: IntentStatus::from(status),
        amount,
        currency: "usd".to_owned(),
        customer: Some(CustomerId::new("cus_jo")),
        payment_method: None,
        metadata: BTreeMap::new(),
    }
}

pub fn setup_intent(id: &str, status: &str) -> SetupIntent {
    SetupIntent {
        id: SetupIntentId::new(id),
        client_secret: Some(format!("{id}_secret_test")),
        status: IntentStatus::from(status),
        customer: Some(CustomerId::new("cus_jo")),
        payment_method: None,
        metadata: BTreeMap::new(),
    }
}
