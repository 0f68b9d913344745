//! PostgreSQL implementation of SubscriptionRepository.
//!
//! The one-live-row-per-user invariant is enforced by a partial unique
//! index over trial/active rows; its violation surfaces as
//! `SubscriptionExists`. Updates run inside a database transaction that
//! re-reads the persisted row under lock, decides whether the mutation
//! is an on-schedule renewal, and writes an audit record for everything
//! else before the row changes.

use crate::domain::catalog::SubscriptionPeriod;
use crate::domain::foundation::{
    BuyableId, DomainError, ErrorCode, PurchaseId, SubscriptionId, Timestamp, UserId,
};
use crate::domain::subscription::{
    needs_change_record, SubscriptionChangeRecord, SubscriptionStatus, UserSubscription,
};
use crate::ports::SubscriptionRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

/// Name of the partial unique index enforcing one live row per user.
const ONE_ACTIVE_PER_USER_KEY: &str = "user_subscriptions_one_active_per_user_key";

/// PostgreSQL implementation of the SubscriptionRepository port.
pub struct PostgresSubscriptionRepository {
    pool: PgPool,
}

impl PostgresSubscriptionRepository {
    /// Creates a new PostgresSubscriptionRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a user subscription.
#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    user_id: String,
    buyable_id: Uuid,
    purchase_id: Uuid,
    start_date: DateTime<Utc>,
    expiration_date: DateTime<Utc>,
    status: String,
    used_trial_days: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for UserSubscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(UserSubscription {
            id: SubscriptionId::from_uuid(row.id),
            user_id: UserId::new(row.user_id).map_err(corrupt_row)?,
            buyable_id: BuyableId::from_uuid(row.buyable_id),
            purchase_id: PurchaseId::from_uuid(row.purchase_id),
            start_date: Timestamp::from_datetime(row.start_date),
            expiration_date: Timestamp::from_datetime(row.expiration_date),
            status: row
                .status
                .parse::<SubscriptionStatus>()
                .map_err(corrupt_row)?,
            used_trial_days: row.used_trial_days as u32,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

const SELECT_COLUMNS: &str = "id, user_id, buyable_id, purchase_id, start_date, expiration_date, \
                              status, used_trial_days, created_at, updated_at";

fn corrupt_row(e: impl std::fmt::Display) -> DomainError {
    DomainError::new(
        ErrorCode::DatabaseError,
        format!("Corrupt subscription row: {}", e),
    )
}

fn db_error(context: &'static str) -> impl Fn(sqlx::Error) -> DomainError {
    move |e| DomainError::new(ErrorCode::DatabaseError, format!("{}: {}", context, e))
}

/// Insert one subscription row through any executor.
pub(crate) async fn insert_subscription<'e, E>(
    executor: E,
    subscription: &UserSubscription,
) -> Result<(), DomainError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        "INSERT INTO user_subscriptions \
         (id, user_id, buyable_id, purchase_id, start_date, expiration_date, status, \
          used_trial_days, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(subscription.id.as_uuid())
    .bind(subscription.user_id.as_str())
    .bind(subscription.buyable_id.as_uuid())
    .bind(subscription.purchase_id.as_uuid())
    .bind(subscription.start_date.as_datetime())
    .bind(subscription.expiration_date.as_datetime())
    .bind(subscription.status.as_str())
    .bind(subscription.used_trial_days as i32)
    .bind(subscription.created_at.as_datetime())
    .bind(subscription.updated_at.as_datetime())
    .execute(executor)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(e)
            if e.as_database_error().and_then(|db_err| db_err.constraint())
                == Some(ONE_ACTIVE_PER_USER_KEY) =>
        {
            Err(DomainError::new(
                ErrorCode::SubscriptionExists,
                "User already has a live subscription",
            )
            .with_detail("user_id", subscription.user_id.as_str()))
        }
        Err(e) => Err(db_error("Failed to insert subscription")(e)),
    }
}

/// Audited subscription update inside a caller-owned transaction.
///
/// Re-reads the persisted row under lock, writes a change record when
/// the mutation is off-schedule, then updates the row. Returns whether
/// a change record was written. The caller commits.
pub(crate) async fn update_in_tx(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    subscription: &UserSubscription,
) -> Result<bool, DomainError> {
    let persisted_row: Option<SubscriptionRow> = sqlx::query_as(&format!(
        "SELECT {} FROM user_subscriptions \
         WHERE id = $1 AND deleted_at IS NULL \
         FOR UPDATE",
        SELECT_COLUMNS
    ))
    .bind(subscription.id.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_error("Failed to load subscription for update"))?;

    let persisted: UserSubscription = persisted_row
        .ok_or_else(|| {
            DomainError::new(ErrorCode::SubscriptionNotFound, "Subscription not found")
                .with_detail("subscription_id", subscription.id.to_string())
        })?
        .try_into()?;

    // The renewal-tick exemption is measured against the persisted
    // row's buyable. A missing or period-less buyable can't prove the
    // exemption, so those updates are always audited.
    let persisted_period: Option<SubscriptionPeriod> = sqlx::query_scalar::<_, Option<String>>(
        "SELECT period FROM buyables WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(persisted.buyable_id.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_error("Failed to load buyable period"))?
    .flatten()
    .and_then(|p| p.parse().ok());

    let audited = persisted_period
        .map(|period| needs_change_record(&persisted, subscription, period))
        .unwrap_or(true);

    if audited {
        let record = SubscriptionChangeRecord::capture(subscription, Timestamp::now());
        sqlx::query(
            "INSERT INTO user_subscription_change_records \
             (id, subscription_id, user_id, buyable_id, purchase_id, expiration_date, \
              start_date, status, used_trial_days, recorded_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(record.id.as_uuid())
        .bind(record.subscription_id.as_uuid())
        .bind(record.user_id.as_str())
        .bind(record.buyable_id.as_uuid())
        .bind(record.purchase_id.as_uuid())
        .bind(record.expiration_date.as_datetime())
        .bind(record.start_date.as_datetime())
        .bind(record.status.as_str())
        .bind(record.used_trial_days as i32)
        .bind(record.recorded_at.as_datetime())
        .execute(&mut **tx)
        .await
        .map_err(db_error("Failed to insert change record"))?;
    }

    sqlx::query(
        "UPDATE user_subscriptions \
         SET user_id = $2, buyable_id = $3, purchase_id = $4, start_date = $5, \
             expiration_date = $6, status = $7, used_trial_days = $8, updated_at = $9 \
         WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(subscription.id.as_uuid())
    .bind(subscription.user_id.as_str())
    .bind(subscription.buyable_id.as_uuid())
    .bind(subscription.purchase_id.as_uuid())
    .bind(subscription.start_date.as_datetime())
    .bind(subscription.expiration_date.as_datetime())
    .bind(subscription.status.as_str())
    .bind(subscription.used_trial_days as i32)
    .bind(Timestamp::now().as_datetime())
    .execute(&mut **tx)
    .await
    .map_err(db_error("Failed to update subscription"))?;

    Ok(audited)
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn insert(&self, subscription: &UserSubscription) -> Result<(), DomainError> {
        insert_subscription(&self.pool, subscription).await
    }

    async fn update(&self, subscription: &UserSubscription) -> Result<(), DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        let audited = update_in_tx(&mut tx, subscription).await?;

        tx.commit()
            .await
            .map_err(db_error("Failed to commit subscription update"))?;

        if audited {
            tracing::debug!(
                subscription_id = %subscription.id,
                status = %subscription.status,
                "Off-schedule subscription change audited"
            );
        }
        Ok(())
    }

    async fn save_all(
        &self,
        updates: &[UserSubscription],
        inserts: &[UserSubscription],
    ) -> Result<(), DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        // Retirements run before inserts so the one-live-row index sees
        // the freed slot within the same transaction.
        for subscription in updates {
            update_in_tx(&mut tx, subscription).await?;
        }
        for subscription in inserts {
            insert_subscription(&mut *tx, subscription).await?;
        }

        tx.commit()
            .await
            .map_err(db_error("Failed to commit subscription batch"))?;
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &SubscriptionId,
    ) -> Result<Option<UserSubscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM user_subscriptions WHERE id = $1 AND deleted_at IS NULL",
            SELECT_COLUMNS
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to find subscription"))?;

        row.map(UserSubscription::try_from).transpose()
    }

    async fn find_active_for_user(
        &self,
        user_id: &UserId,
        now: Timestamp,
    ) -> Result<Option<UserSubscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM user_subscriptions \
             WHERE user_id = $1 \
               AND deleted_at IS NULL \
               AND (status IN ('trial', 'active') \
                    OR (status = 'canceled' AND expiration_date > $2)) \
             ORDER BY created_at DESC \
             LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(user_id.as_str())
        .bind(now.as_datetime())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to find active subscription"))?;

        row.map(UserSubscription::try_from).transpose()
    }

    async fn find_latest_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<UserSubscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM user_subscriptions \
             WHERE user_id = $1 AND deleted_at IS NULL \
             ORDER BY (status IN ('trial', 'active')) DESC, created_at DESC \
             LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to find latest subscription"))?;

        row.map(UserSubscription::try_from).transpose()
    }

    async fn find_latest_for_purchase_and_buyable(
        &self,
        purchase_id: &PurchaseId,
        buyable_id: &BuyableId,
    ) -> Result<Option<UserSubscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM user_subscriptions \
             WHERE purchase_id = $1 AND buyable_id = $2 AND deleted_at IS NULL \
             ORDER BY created_at DESC \
             LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(purchase_id.as_uuid())
        .bind(buyable_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to find subscription for purchase"))?;

        row.map(UserSubscription::try_from).transpose()
    }

    async fn delete(&self, id: &SubscriptionId) -> Result<(), DomainError> {
        let result = sqlx::query(
            "UPDATE user_subscriptions SET deleted_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to delete subscription"))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::SubscriptionNotFound,
                "Subscription not found",
            )
            .with_detail("subscription_id", id.to_string()));
        }
        Ok(())
    }
}
