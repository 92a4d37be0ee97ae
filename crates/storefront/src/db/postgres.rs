//! `PostgreSQL` implementation of [`DocumentStore`].
//!
//! Queries are built at runtime with `sqlx::query_as` so the crate compiles
//! without a live database. Line items and the delivery choice are stored as
//! JSONB; everything that is filtered on has its own column.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};
use sqlx::types::Json;
use tracing::instrument;
use uuid::Uuid;

use bakehouse_core::{
    Cents, CustomerDetails, CustomerId, DeliveryAddress, DeliveryChoice, Email, Frequency, LineItem, OrderId,
    PaymentIntentId, PaymentMethodId, SetupIntentId, SubscriptionId, SubscriptionStatus, UserId,
};

use super::{DocumentStore, RepositoryError};
use crate::models::{
    IntentRef, NewProfile, Order, ProfileUpdate, StoredCredentials, Subscription, UserProfile,
};

const PROFILE_COLUMNS: &str =
    "id, email, name, phone, street, zip, customer_id, created_at, updated_at";

const ORDER_COLUMNS: &str = "id, user_id, email, customer_name, phone, items, total_cents, \
     street, city, state, zip, delivery, comments, is_recurring, status, intent_kind, intent_id, \
     payment_status, created_at";

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, customer_id, payment_method_id, \
     setup_intent_id, items, total_cents, street, city, state, zip, delivery_weekday, frequency, \
     next_delivery, status, created_at, updated_at";

/// Document store backed by a `PostgreSQL` pool.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn corrupt(what: &str, err: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::DataCorruption(format!("invalid {what} in database: {err}"))
}

fn cents_to_db(amount: Cents) -> Result<i64, RepositoryError> {
    i64::try_from(amount.get()).map_err(|e| corrupt("amount", e))
}

fn cents_from_db(value: i64) -> Result<Cents, RepositoryError> {
    u64::try_from(value)
        .map(Cents::new)
        .map_err(|e| corrupt("amount", e))
}

fn parse_email(value: &str) -> Result<Email, RepositoryError> {
    Email::parse(value).map_err(|e| corrupt("email", e))
}

fn map_unique(err: sqlx::Error, message: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(message.to_owned());
    }
    RepositoryError::Database(err)
}

async fn insert_order(
    executor: impl PgExecutor<'_>,
    order: &Order,
) -> Result<(), RepositoryError> {
    let sql = format!(
        "INSERT INTO storefront.orders ({ORDER_COLUMNS}) VALUES \
         ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)"
    );
    sqlx::query(&sql)
        .bind(order.id.as_uuid())
        .bind(order.user_id.map(|id| id.as_uuid()))
        .bind(order.customer.email.as_str())
        .bind(&order.customer.name)
        .bind(&order.customer.phone)
        .bind(Json(&order.items))
        .bind(cents_to_db(order.total)?)
        .bind(&order.address.street)
        .bind(&order.address.city)
        .bind(&order.address.state)
        .bind(&order.address.zip)
        .bind(Json(order.delivery))
        .bind(&order.comments)
        .bind(order.is_recurring)
        .bind(order.status.as_str())
        .bind(order.intent.kind())
        .bind(order.intent.as_str())
        .bind(&order.payment_status)
        .bind(order.created_at)
        .execute(executor)
        .await
        .map_err(|e| map_unique(e, "order already recorded for this payment"))?;
    Ok(())
}

async fn insert_subscription(
    executor: impl PgExecutor<'_>,
    subscription: &Subscription,
) -> Result<(), RepositoryError> {
    let sql = format!(
        "INSERT INTO storefront.subscriptions ({SUBSCRIPTION_COLUMNS}) VALUES \
         ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)"
    );
    sqlx::query(&sql)
        .bind(subscription.id.as_uuid())
        .bind(subscription.user_id.as_uuid())
        .bind(subscription.customer_id.as_str())
        .bind(subscription.payment_method_id.as_ref().map(PaymentMethodId::as_str))
        .bind(subscription.setup_intent_id.as_str())
        .bind(Json(&subscription.items))
        .bind(cents_to_db(subscription.total)?)
        .bind(&subscription.address.street)
        .bind(&subscription.address.city)
        .bind(&subscription.address.state)
        .bind(&subscription.address.zip)
        .bind(i16::from(subscription.delivery_weekday))
        .bind(subscription.frequency.as_str())
        .bind(subscription.next_delivery)
        .bind(subscription.status.as_str())
        .bind(subscription.created_at)
        .bind(subscription.updated_at)
        .execute(executor)
        .await
        .map_err(|e| map_unique(e, "subscription already recorded for this setup"))?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    id: Uuid,
    email: String,
    name: String,
    phone: Option<String>,
    street: Option<String>,
    zip: Option<String>,
    customer_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProfileRow> for UserProfile {
    type Error = RepositoryError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: UserId::from_uuid(row.id),
            email: parse_email(&row.email)?,
            name: row.name,
            phone: row.phone,
            street: row.street,
            zip: row.zip,
            customer_id: row.customer_id.map(CustomerId::new),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: Option<Uuid>,
    email: String,
    customer_name: String,
    phone: Option<String>,
    items: Json<Vec<LineItem>>,
    total_cents: i64,
    street: String,
    city: String,
    state: String,
    zip: String,
    delivery: Json<DeliveryChoice>,
    comments: Option<String>,
    is_recurring: bool,
    status: String,
    intent_kind: String,
    intent_id: String,
    payment_status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let intent = match row.intent_kind.as_str() {
            "payment" => IntentRef::Payment(PaymentIntentId::new(row.intent_id)),
            "setup" => IntentRef::Setup(SetupIntentId::new(row.intent_id)),
            other => return Err(corrupt("intent kind", other)),
        };

        Ok(Self {
            id: OrderId::from_uuid(row.id),
            user_id: row.user_id.map(UserId::from_uuid),
            customer: CustomerDetails {
                name: row.customer_name,
                email: parse_email(&row.email)?,
                phone: row.phone,
            },
            items: row.items.0,
            total: cents_from_db(row.total_cents)?,
            address: DeliveryAddress {
                street: row.street,
                city: row.city,
                state: row.state,
                zip: row.zip,
            },
            delivery: row.delivery.0,
            comments: row.comments,
            is_recurring: row.is_recurring,
            status: row.status.parse().map_err(|e| corrupt("order status", e))?,
            intent,
            payment_status: row.payment_status,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    user_id: Uuid,
    customer_id: String,
    payment_method_id: Option<String>,
    setup_intent_id: String,
    items: Json<Vec<LineItem>>,
    total_cents: i64,
    street: String,
    city: String,
    state: String,
    zip: String,
    delivery_weekday: i16,
    frequency: String,
    next_delivery: DateTime<Utc>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = RepositoryError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let delivery_weekday = u8::try_from(row.delivery_weekday)
            .ok()
            .filter(|d| *d <= 6)
            .ok_or_else(|| corrupt("delivery weekday", row.delivery_weekday))?;

        Ok(Self {
            id: SubscriptionId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            customer_id: CustomerId::new(row.customer_id),
            payment_method_id: row.payment_method_id.map(PaymentMethodId::new),
            setup_intent_id: SetupIntentId::new(row.setup_intent_id),
            items: row.items.0,
            total: cents_from_db(row.total_cents)?,
            address: DeliveryAddress {
                street: row.street,
                city: row.city,
                state: row.state,
                zip: row.zip,
            },
            delivery_weekday,
            frequency: row
                .frequency
                .parse::<Frequency>()
                .map_err(|e| corrupt("frequency", e))?,
            next_delivery: row.next_delivery,
            status: row.status.parse().map_err(|e| corrupt("subscription status", e))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl PgDocumentStore {
    async fn fetch_orders<T>(&self, filter: &str, bind: T) -> Result<Vec<Order>, RepositoryError>
    where
        T: for<'q> sqlx::Encode<'q, sqlx::Postgres> + sqlx::Type<sqlx::Postgres> + Send + 'static,
    {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.orders WHERE {filter} ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, OrderRow>(&sql)
            .bind(bind)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Order::try_from)
            .collect()
    }

}

fn updated_subscription(
    id: SubscriptionId,
    row: Option<SubscriptionRow>,
) -> Result<Subscription, RepositoryError> {
    row.ok_or_else(|| RepositoryError::NotFound(format!("subscription {id}")))?
        .try_into()
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    #[instrument(skip(self, profile), fields(email = %profile.email))]
    async fn create_profile(&self, profile: &NewProfile) -> Result<UserProfile, RepositoryError> {
        let sql = format!(
            "INSERT INTO storefront.profiles (id, email, password_hash, name, phone, street, zip) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {PROFILE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(UserId::new().as_uuid())
            .bind(profile.email.as_str())
            .bind(&profile.password_hash)
            .bind(&profile.name)
            .bind(&profile.phone)
            .bind(&profile.street)
            .bind(&profile.zip)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_unique(e, "email already exists"))?;

        row.try_into()
    }

    #[instrument(skip(self))]
    async fn get_profile(&self, id: UserId) -> Result<Option<UserProfile>, RepositoryError> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM storefront.profiles WHERE id = $1");
        sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(UserProfile::try_from)
            .transpose()
    }

    #[instrument(skip(self, email))]
    async fn get_profile_by_email(
        &self,
        email: &Email,
    ) -> Result<Option<UserProfile>, RepositoryError> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM storefront.profiles WHERE email = $1");
        sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(email.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(UserProfile::try_from)
            .transpose()
    }

    #[instrument(skip(self, email))]
    async fn get_credentials(
        &self,
        email: &Email,
    ) -> Result<Option<StoredCredentials>, RepositoryError> {
        let row: Option<(Uuid, String)> =
            sqlx::query_as("SELECT id, password_hash FROM storefront.profiles WHERE email = $1")
                .bind(email.as_str())
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(id, password_hash)| StoredCredentials {
            user_id: UserId::from_uuid(id),
            password_hash,
        }))
    }

    #[instrument(skip(self, update))]
    async fn update_profile(
        &self,
        id: UserId,
        update: &ProfileUpdate,
    ) -> Result<UserProfile, RepositoryError> {
        let sql = format!(
            "UPDATE storefront.profiles SET \
                 name = COALESCE($2, name), \
                 phone = CASE WHEN $3::text IS NULL THEN phone ELSE NULLIF($3, '') END, \
                 street = CASE WHEN $4::text IS NULL THEN street ELSE NULLIF($4, '') END, \
                 zip = CASE WHEN $5::text IS NULL THEN zip ELSE NULLIF($5, '') END, \
                 updated_at = now() \
             WHERE id = $1 RETURNING {PROFILE_COLUMNS}"
        );
        sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(id.as_uuid())
            .bind(&update.name)
            .bind(&update.phone)
            .bind(&update.street)
            .bind(&update.zip)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("profile {id}")))?
            .try_into()
    }

    #[instrument(skip(self))]
    async fn set_customer_id(
        &self,
        id: UserId,
        customer_id: &CustomerId,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE storefront.profiles SET customer_id = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(customer_id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("profile {id}")));
        }
        Ok(())
    }

    #[instrument(skip(self, order), fields(order_id = %order.id))]
    async fn create_order(&self, order: &Order) -> Result<(), RepositoryError> {
        insert_order(&self.pool, order).await
    }

    #[instrument(skip(self))]
    async fn list_orders_by_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        self.fetch_orders("user_id = $1", user_id.as_uuid()).await
    }

    #[instrument(skip(self, email))]
    async fn list_orders_by_email(&self, email: &Email) -> Result<Vec<Order>, RepositoryError> {
        self.fetch_orders("email = $1", email.as_str().to_owned())
            .await
    }

    #[instrument(skip(self))]
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM storefront.orders WHERE id = $1");
        sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(Order::try_from)
            .transpose()
    }

    #[instrument(skip(self, subscription), fields(subscription_id = %subscription.id))]
    async fn create_subscription(
        &self,
        subscription: &Subscription,
    ) -> Result<(), RepositoryError> {
        insert_subscription(&self.pool, subscription).await
    }

    #[instrument(
        skip(self, order, subscription),
        fields(order_id = %order.id, subscription_id = %subscription.id)
    )]
    async fn create_recurring_order(
        &self,
        order: &Order,
        subscription: &Subscription,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        insert_subscription(&mut *tx, subscription).await?;
        insert_order(&mut *tx, order).await?;
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_subscriptions(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Subscription>, RepositoryError> {
        let sql = format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM storefront.subscriptions \
             WHERE user_id = $1 ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, SubscriptionRow>(&sql)
            .bind(user_id.as_uuid())
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Subscription::try_from)
            .collect()
    }

    #[instrument(skip(self))]
    async fn get_subscription(
        &self,
        id: SubscriptionId,
    ) -> Result<Option<Subscription>, RepositoryError> {
        let sql =
            format!("SELECT {SUBSCRIPTION_COLUMNS} FROM storefront.subscriptions WHERE id = $1");
        sqlx::query_as::<_, SubscriptionRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(Subscription::try_from)
            .transpose()
    }

    #[instrument(skip(self))]
    async fn update_subscription_schedule(
        &self,
        id: SubscriptionId,
        weekday: u8,
        frequency: Frequency,
        next_delivery: DateTime<Utc>,
    ) -> Result<Subscription, RepositoryError> {
        let sql = format!(
            "UPDATE storefront.subscriptions SET delivery_weekday = $2, frequency = $3, \
             next_delivery = $4, updated_at = now() WHERE id = $1 RETURNING {SUBSCRIPTION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, SubscriptionRow>(&sql)
            .bind(id.as_uuid())
            .bind(i16::from(weekday))
            .bind(frequency.as_str())
            .bind(next_delivery)
            .fetch_optional(&self.pool)
            .await?;
        updated_subscription(id, row)
    }

    #[instrument(skip(self, items))]
    async fn update_subscription_items(
        &self,
        id: SubscriptionId,
        items: &[LineItem],
        total: Cents,
    ) -> Result<Subscription, RepositoryError> {
        let sql = format!(
            "UPDATE storefront.subscriptions SET items = $2, total_cents = $3, updated_at = now() \
             WHERE id = $1 RETURNING {SUBSCRIPTION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, SubscriptionRow>(&sql)
            .bind(id.as_uuid())
            .bind(Json(items))
            .bind(cents_to_db(total)?)
            .fetch_optional(&self.pool)
            .await?;
        updated_subscription(id, row)
    }

    #[instrument(skip(self, address))]
    async fn update_subscription_address(
        &self,
        id: SubscriptionId,
        address: &DeliveryAddress,
    ) -> Result<Subscription, RepositoryError> {
        let sql = format!(
            "UPDATE storefront.subscriptions SET street = $2, city = $3, state = $4, zip = $5, \
             updated_at = now() WHERE id = $1 RETURNING {SUBSCRIPTION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, SubscriptionRow>(&sql)
            .bind(id.as_uuid())
            .bind(&address.street)
            .bind(&address.city)
            .bind(&address.state)
            .bind(&address.zip)
            .fetch_optional(&self.pool)
            .await?;
        updated_subscription(id, row)
    }

    #[instrument(skip(self))]
    async fn update_subscription_status(
        &self,
        id: SubscriptionId,
        status: SubscriptionStatus,
    ) -> Result<Subscription, RepositoryError> {
        let sql = format!(
            "UPDATE storefront.subscriptions SET status = $2, updated_at = now() \
             WHERE id = $1 RETURNING {SUBSCRIPTION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, SubscriptionRow>(&sql)
            .bind(id.as_uuid())
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await?;
        updated_subscription(id, row)
    }
}
