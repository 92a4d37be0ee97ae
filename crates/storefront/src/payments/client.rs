//! REST client for the payments platform.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bakehouse_core::{CustomerId, Email, PaymentIntentId, PaymentMethodId, SetupIntentId};
use moka::future::Cache;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use super::types::{
    CreatePaymentIntent, CreateSetupIntent, Customer, List, NewCustomer, PaymentIntent,
    PaymentMethod, SetupIntent,
};
use super::{PaymentGateway, PaymentsError};
use crate::config::StripeConfig;

/// Form parameters in platform bracket notation (`metadata[key]`).
type Form = Vec<(String, String)>;

/// Error envelope returned on non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// Payments platform client.
///
/// Customers looked up or created by email are cached for ten minutes so
/// repeated checkouts from one shopper do not re-query the platform.
#[derive(Clone)]
pub struct StripeClient {
    inner: Arc<StripeClientInner>,
}

struct StripeClientInner {
    client: reqwest::Client,
    base_url: String,
    customers_by_email: Cache<String, Customer>,
}

impl StripeClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns error if the secret key is not a valid header value or the
    /// HTTP client fails to build.
    pub fn new(config: &StripeConfig) -> Result<Self, PaymentsError> {
        let mut headers = HeaderMap::new();

        let auth_value = format!("Bearer {}", config.secret_key.expose_secret());
        let mut auth = HeaderValue::from_str(&auth_value)
            .map_err(|e| PaymentsError::Config(format!("Invalid secret key format: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;

        let customers_by_email = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(Duration::from_secs(600))
            .build();

        Ok(Self {
            inner: Arc::new(StripeClientInner {
                client,
                base_url: format!("{}/v1", config.api_base.trim_end_matches('/')),
                customers_by_email,
            }),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.inner.base_url)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, PaymentsError> {
        let response = self
            .inner
            .client
            .get(self.url(path))
            .query(query)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, form: &Form) -> Result<T, PaymentsError> {
        let response = self
            .inner
            .client
            .post(self.url(path))
            .form(form)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, PaymentsError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let (message, code) = serde_json::from_str::<ErrorEnvelope>(&body).map_or_else(
                |_| (body.chars().take(200).collect(), None),
                |env| {
                    (
                        env.error.message.unwrap_or_else(|| status.to_string()),
                        env.error.code,
                    )
                },
            );
            tracing::warn!(status = %status, code = ?code, message = %message, "Payments API returned error");
            return Err(PaymentsError::Api {
                status: status.as_u16(),
                message,
                code,
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse payments API response"
            );
            PaymentsError::Parse(e.to_string())
        })
    }
}

fn customer_lookup_query(email: &Email) -> [(&'static str, &str); 2] {
    [("email", email.as_str()), ("limit", "1")]
}

fn customer_form(customer: &NewCustomer) -> Form {
    let mut form: Form = vec![("email".into(), customer.email.as_str().to_owned())];
    if let Some(name) = &customer.name {
        form.push(("name".into(), name.clone()));
    }
    push_metadata(&mut form, &customer.metadata);
    form
}

fn push_metadata(form: &mut Form, metadata: &std::collections::BTreeMap<String, String>) {
    for (key, value) in metadata {
        form.push((format!("metadata[{key}]"), value.clone()));
    }
}

pub(crate) fn payment_intent_form(params: &CreatePaymentIntent) -> Form {
    let mut form: Form = vec![
        ("amount".into(), params.amount.get().to_string()),
        ("currency".into(), params.currency.clone()),
        ("capture_method".into(), params.capture_method.as_str().into()),
        ("payment_method_types[0]".into(), "card".into()),
    ];
    if let Some(customer) = &params.customer {
        form.push(("customer".into(), customer.to_string()));
    }
    if params.save_payment_method {
        form.push(("setup_future_usage".into(), "off_session".into()));
    }
    if let Some(description) = &params.description {
        form.push(("description".into(), description.clone()));
    }
    if let Some(email) = &params.receipt_email {
        form.push(("receipt_email".into(), email.to_string()));
    }
    push_metadata(&mut form, &params.metadata);
    form
}

pub(crate) fn setup_intent_form(params: &CreateSetupIntent) -> Form {
    let mut form: Form = vec![
        ("customer".into(), params.customer.to_string()),
        ("usage".into(), "off_session".into()),
        ("payment_method_types[0]".into(), "card".into()),
    ];
    push_metadata(&mut form, &params.metadata);
    form
}

#[async_trait]
impl PaymentGateway for StripeClient {
    /// The platform's `email` filter is case-sensitive. Every customer this
    /// service creates carries the normalized (lowercase) address, so lookups
    /// use that form too; a customer created elsewhere with a mixed-case
    /// address is not found and gets a second, normalized record.
    #[instrument(skip(self, email), fields(email = %email))]
    async fn find_customer_by_email(
        &self,
        email: &Email,
    ) -> Result<Option<Customer>, PaymentsError> {
        if let Some(cached) = self.inner.customers_by_email.get(email.as_str()).await {
            debug!(customer_id = %cached.id, "Customer cache hit");
            return Ok(Some(cached));
        }

        let list: List<Customer> = self
            .get("customers", &customer_lookup_query(email))
            .await?;
        let found = list.data.into_iter().next();
        if let Some(customer) = &found {
            self.inner
                .customers_by_email
                .insert(email.as_str().to_owned(), customer.clone())
                .await;
        }
        Ok(found)
    }

    #[instrument(skip(self, customer), fields(email = %customer.email))]
    async fn create_customer(&self, customer: &NewCustomer) -> Result<Customer, PaymentsError> {
        let created: Customer = self.post("customers", &customer_form(customer)).await?;
        self.inner
            .customers_by_email
            .insert(customer.email.as_str().to_owned(), created.clone())
            .await;
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn get_customer(&self, id: &CustomerId) -> Result<Customer, PaymentsError> {
        self.get(&format!("customers/{id}"), &[]).await
    }

    #[instrument(skip(self))]
    async fn list_payment_methods(
        &self,
        customer: &CustomerId,
    ) -> Result<Vec<PaymentMethod>, PaymentsError> {
        let list: List<PaymentMethod> = self
            .get(
                "payment_methods",
                &[("customer", customer.as_str()), ("type", "card")],
            )
            .await?;
        Ok(list.data)
    }

    #[instrument(skip(self))]
    async fn detach_payment_method(&self, id: &PaymentMethodId) -> Result<(), PaymentsError> {
        let _: PaymentMethod = self
            .post(&format!("payment_methods/{id}/detach"), &Vec::new())
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn set_default_payment_method(
        &self,
        customer: &CustomerId,
        id: &PaymentMethodId,
    ) -> Result<(), PaymentsError> {
        let form: Form = vec![(
            "invoice_settings[default_payment_method]".into(),
            id.to_string(),
        )];
        let _: Customer = self.post(&format!("customers/{customer}"), &form).await?;
        Ok(())
    }

    #[instrument(skip(self, params), fields(amount = params.amount.get()))]
    async fn create_payment_intent(
        &self,
        params: &CreatePaymentIntent,
    ) -> Result<PaymentIntent, PaymentsError> {
        self.post("payment_intents", &payment_intent_form(params))
            .await
    }

    #[instrument(skip(self))]
    async fn update_payment_intent(
        &self,
        id: &PaymentIntentId,
        payment_method: &PaymentMethodId,
    ) -> Result<PaymentIntent, PaymentsError> {
        let form: Form = vec![("payment_method".into(), payment_method.to_string())];
        self.post(&format!("payment_intents/{id}"), &form).await
    }

    #[instrument(skip(self))]
    async fn confirm_payment_intent(
        &self,
        id: &PaymentIntentId,
    ) -> Result<PaymentIntent, PaymentsError> {
        self.post(&format!("payment_intents/{id}/confirm"), &Vec::new())
            .await
    }

    #[instrument(skip(self))]
    async fn get_payment_intent(
        &self,
        id: &PaymentIntentId,
    ) -> Result<PaymentIntent, PaymentsError> {
        self.get(&format!("payment_intents/{id}"), &[]).await
    }

    #[instrument(skip(self, params), fields(customer = %params.customer))]
    async fn create_setup_intent(
        &self,
        params: &CreateSetupIntent,
    ) -> Result<SetupIntent, PaymentsError> {
        self.post("setup_intents", &setup_intent_form(params)).await
    }

    #[instrument(skip(self))]
    async fn update_setup_intent(
        &self,
        id: &SetupIntentId,
        payment_method: &PaymentMethodId,
    ) -> Result<SetupIntent, PaymentsError> {
        let form: Form = vec![("payment_method".into(), payment_method.to_string())];
        self.post(&format!("setup_intents/{id}"), &form).await
    }

    #[instrument(skip(self))]
    async fn confirm_setup_intent(&self, id: &SetupIntentId) -> Result<SetupIntent, PaymentsError> {
        self.post(&format!("setup_intents/{id}/confirm"), &Vec::new())
            .await
    }

    #[instrument(skip(self))]
    async fn get_setup_intent(&self, id: &SetupIntentId) -> Result<SetupIntent, PaymentsError> {
        self.get(&format!("setup_intents/{id}"), &[]).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use bakehouse_core::Cents;

    use super::*;
    use crate::payments::CaptureMethod;

    fn value<'a>(form: &'a Form, key: &str) -> Option<&'a str> {
        form.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_customer_is_created_and_looked_up_by_the_same_address() {
        let email = Email::parse("  Jo.Baker@Example.COM ").unwrap();
        let form = customer_form(&NewCustomer {
            email: email.clone(),
            name: Some("Jo".to_owned()),
            metadata: BTreeMap::new(),
        });
        assert_eq!(value(&form, "email"), Some("jo.baker@example.com"));

        let query = customer_lookup_query(&email);
        assert_eq!(query[0], ("email", "jo.baker@example.com"));
        assert_eq!(value(&form, "email"), Some(query[0].1));
    }

    #[test]
    fn test_guest_intent_form_uses_manual_capture() {
        let params = CreatePaymentIntent {
            amount: Cents::new(1200),
            currency: "usd".to_owned(),
            customer: Some(CustomerId::new("cus_1")),
            capture_method: CaptureMethod::Manual,
            save_payment_method: false,
            description: Some("2 x Country Sourdough".to_owned()),
            receipt_email: Some(Email::parse("jo@example.com").unwrap()),
            metadata: BTreeMap::from([("is_recurring".to_owned(), "false".to_owned())]),
        };
        let form = payment_intent_form(&params);
        assert_eq!(value(&form, "amount"), Some("1200"));
        assert_eq!(value(&form, "capture_method"), Some("manual"));
        assert_eq!(value(&form, "customer"), Some("cus_1"));
        assert_eq!(value(&form, "receipt_email"), Some("jo@example.com"));
        assert_eq!(value(&form, "metadata[is_recurring]"), Some("false"));
        assert_eq!(value(&form, "setup_future_usage"), None);
    }

    #[test]
    fn test_setup_intent_form_is_off_session() {
        let form = setup_intent_form(&CreateSetupIntent {
            customer: CustomerId::new("cus_1"),
            metadata: BTreeMap::from([("frequency".to_owned(), "weekly".to_owned())]),
        });
        assert_eq!(value(&form, "usage"), Some("off_session"));
        assert_eq!(value(&form, "customer"), Some("cus_1"));
        assert_eq!(value(&form, "metadata[frequency]"), Some("weekly"));
        assert!(value(&form, "amount").is_none());
    }

    #[test]
    fn test_error_envelope_parses() {
        let body = r#"{"error": {"message": "Your card was declined.", "code": "card_declined", "type": "card_error"}}"#;
        let env: ErrorEnvelope = serde_json::from_str(body).unwrap();
        assert_eq!(env.error.message.as_deref(), Some("Your card was declined."));
        assert_eq!(env.error.code.as_deref(), Some("card_declined"));
    }
}
