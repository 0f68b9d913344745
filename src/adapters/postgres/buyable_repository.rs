//! PostgreSQL implementation of BuyableRepository.
//!
//! Read-only catalog lookups. Soft-deleted buyables are invisible.

use crate::domain::catalog::{Buyable, BuyableType, SubscriptionPeriod};
use crate::domain::foundation::{BuyableId, Currency, DomainError, ErrorCode, Money, Timestamp};
use crate::ports::BuyableRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// PostgreSQL implementation of the BuyableRepository port.
pub struct PostgresBuyableRepository {
    pool: PgPool,
}

impl PostgresBuyableRepository {
    /// Creates a new PostgresBuyableRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a buyable.
#[derive(Debug, sqlx::FromRow)]
struct BuyableRow {
    id: Uuid,
    name: String,
    buyable_type: String,
    price_micros: i64,
    price_currency: String,
    period: Option<String>,
    trial_days: Option<i32>,
    special_offer_root: Option<Uuid>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BuyableRow> for Buyable {
    type Error = DomainError;

    fn try_from(row: BuyableRow) -> Result<Self, Self::Error> {
        let buyable_type: BuyableType = row.buyable_type.parse().map_err(db_parse_error)?;
        let period: Option<SubscriptionPeriod> = row
            .period
            .as_deref()
            .map(str::parse)
            .transpose()
            .map_err(db_parse_error)?;
        let currency = Currency::new(&row.price_currency).map_err(db_parse_error)?;

        Ok(Buyable {
            id: BuyableId::from_uuid(row.id),
            name: row.name,
            buyable_type,
            price: Money::from_micros(row.price_micros, currency),
            period,
            trial_days: row.trial_days.map(|d| d as u32),
            special_offer_root: row.special_offer_root.map(BuyableId::from_uuid),
            is_active: row.is_active,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

fn db_parse_error(e: impl std::fmt::Display) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("Corrupt buyable row: {}", e))
}

const SELECT_COLUMNS: &str = "id, name, buyable_type, price_micros, price_currency, period, \
                              trial_days, special_offer_root, is_active, created_at, updated_at";

#[async_trait]
impl BuyableRepository for PostgresBuyableRepository {
    async fn find_by_name(&self, name: &str) -> Result<Option<Buyable>, DomainError> {
        let row: Option<BuyableRow> = sqlx::query_as(&format!(
            "SELECT {} FROM buyables WHERE name = $1 AND deleted_at IS NULL",
            SELECT_COLUMNS
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Failed to find buyable: {}", e))
        })?;

        row.map(Buyable::try_from).transpose()
    }

    async fn find_by_id(&self, id: &BuyableId) -> Result<Option<Buyable>, DomainError> {
        let row: Option<BuyableRow> = sqlx::query_as(&format!(
            "SELECT {} FROM buyables WHERE id = $1 AND deleted_at IS NULL",
            SELECT_COLUMNS
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Failed to find buyable: {}", e))
        })?;

        row.map(Buyable::try_from).transpose()
    }

    async fn find_by_ids(&self, ids: &[BuyableId]) -> Result<Vec<Buyable>, DomainError> {
        let uuids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();

        let rows: Vec<BuyableRow> = sqlx::query_as(&format!(
            "SELECT {} FROM buyables WHERE id = ANY($1) AND deleted_at IS NULL \
             ORDER BY created_at ASC",
            SELECT_COLUMNS
        ))
        .bind(&uuids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Failed to find buyables: {}", e))
        })?;

        rows.into_iter().map(Buyable::try_from).collect()
    }
}
