//! PostgreSQL implementation of PurchaseLedger.
//!
//! Purchases span two tables (`purchases` plus `purchased_buyables`);
//! payment transactions live in `payment_transactions`. Idempotency
//! rests on the partial unique index over
//! `(vendor, vendor_transaction_id)`: a violation of it is reported as
//! [`CommitOutcome::DuplicateTransaction`], never as an error.

use crate::domain::foundation::{
    BuyableId, Currency, DomainError, ErrorCode, PurchaseId, Timestamp, TransactionId, UserId,
};
use crate::domain::ledger::{
    PaymentStatus, PaymentTransaction, PaymentVendor, Purchase, PurchasedBuyable,
    TransactionPricing,
};
use crate::domain::subscription::UserSubscription;
use crate::ports::{CommitOutcome, PurchaseLedger};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{Acquire, PgPool, Postgres};
use uuid::Uuid;

/// Name of the partial unique index backing transaction idempotency.
const TRANSACTION_IDEMPOTENCY_KEY: &str = "payment_transactions_vendor_transaction_id_key";

/// PostgreSQL implementation of the PurchaseLedger port.
pub struct PostgresPurchaseLedger {
    pool: PgPool,
}

impl PostgresPurchaseLedger {
    /// Creates a new PostgresPurchaseLedger with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_items(&self, purchase_id: Uuid) -> Result<Vec<PurchasedBuyable>, DomainError> {
        let rows: Vec<PurchaseItemRow> = sqlx::query_as(
            "SELECT buyable_id, quantity FROM purchased_buyables WHERE purchase_id = $1",
        )
        .bind(purchase_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to load purchase items"))?;

        Ok(rows
            .into_iter()
            .map(|row| PurchasedBuyable {
                buyable_id: BuyableId::from_uuid(row.buyable_id),
                quantity: row.quantity as u32,
            })
            .collect())
    }

    async fn hydrate(&self, row: Option<PurchaseRow>) -> Result<Option<Purchase>, DomainError> {
        let Some(row) = row else {
            return Ok(None);
        };
        let items = self.load_items(row.id).await?;
        row.into_purchase(items).map(Some)
    }
}

/// Database row representation of a purchase.
#[derive(Debug, sqlx::FromRow)]
struct PurchaseRow {
    id: Uuid,
    user_id: String,
    stored_payment_method_id: Option<String>,
    vendor: Option<String>,
    original_transaction_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PurchaseRow {
    fn into_purchase(self, items: Vec<PurchasedBuyable>) -> Result<Purchase, DomainError> {
        let vendor = self
            .vendor
            .as_deref()
            .map(str::parse::<PaymentVendor>)
            .transpose()
            .map_err(corrupt_row)?;

        Ok(Purchase {
            id: PurchaseId::from_uuid(self.id),
            user_id: UserId::new(self.user_id).map_err(corrupt_row)?,
            items,
            stored_payment_method_id: self.stored_payment_method_id,
            vendor,
            original_transaction_id: self.original_transaction_id,
            created_at: Timestamp::from_datetime(self.created_at),
            updated_at: Timestamp::from_datetime(self.updated_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PurchaseItemRow {
    buyable_id: Uuid,
    quantity: i32,
}

/// Database row representation of a payment transaction.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    purchase_id: Uuid,
    list_micros: i64,
    charge_micros: i64,
    credit_micros: i64,
    currency: String,
    tax_rate_millis: i32,
    vendor: String,
    payment_method: String,
    payer_id: Option<String>,
    ip_address: String,
    status: String,
    vendor_transaction_id: Option<String>,
    receipt: Option<JsonValue>,
    raw_product_data: Option<JsonValue>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for PaymentTransaction {
    type Error = DomainError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let currency = Currency::new(&row.currency).map_err(corrupt_row)?;
        let pricing = TransactionPricing {
            list: crate::domain::foundation::Money::from_micros(row.list_micros, currency.clone()),
            charge: crate::domain::foundation::Money::from_micros(
                row.charge_micros,
                currency.clone(),
            ),
            credit: crate::domain::foundation::Money::from_micros(row.credit_micros, currency),
            tax_rate_millis: row.tax_rate_millis as u32,
        };

        Ok(PaymentTransaction {
            id: TransactionId::from_uuid(row.id),
            purchase_id: PurchaseId::from_uuid(row.purchase_id),
            pricing,
            vendor: row.vendor.parse::<PaymentVendor>().map_err(corrupt_row)?,
            payment_method: row.payment_method,
            payer_id: row.payer_id,
            ip_address: row.ip_address,
            status: row.status.parse::<PaymentStatus>().map_err(corrupt_row)?,
            vendor_transaction_id: row.vendor_transaction_id,
            receipt: row.receipt,
            raw_product_data: row.raw_product_data,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

const TRANSACTION_COLUMNS: &str =
    "id, purchase_id, list_micros, charge_micros, credit_micros, currency, tax_rate_millis, \
     vendor, payment_method, payer_id, ip_address, status, vendor_transaction_id, receipt, \
     raw_product_data, created_at, updated_at";

const PURCHASE_COLUMNS: &str = "id, user_id, stored_payment_method_id, vendor, \
                                original_transaction_id, created_at, updated_at";

fn corrupt_row(e: impl std::fmt::Display) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("Corrupt ledger row: {}", e))
}

fn db_error(context: &'static str) -> impl Fn(sqlx::Error) -> DomainError {
    move |e| DomainError::new(ErrorCode::DatabaseError, format!("{}: {}", context, e))
}

fn violates_idempotency_key(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|db_err| db_err.constraint())
        == Some(TRANSACTION_IDEMPOTENCY_KEY)
}

/// Insert one transaction row through any executor.
async fn insert_transaction<'e, E>(
    executor: E,
    transaction: &PaymentTransaction,
) -> Result<CommitOutcome, DomainError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        "INSERT INTO payment_transactions \
         (id, purchase_id, list_micros, charge_micros, credit_micros, currency, \
          tax_rate_millis, vendor, payment_method, payer_id, ip_address, status, \
          vendor_transaction_id, receipt, raw_product_data, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
    )
    .bind(transaction.id.as_uuid())
    .bind(transaction.purchase_id.as_uuid())
    .bind(transaction.pricing.list.amount_micros())
    .bind(transaction.pricing.charge.amount_micros())
    .bind(transaction.pricing.credit.amount_micros())
    .bind(transaction.currency().as_str())
    .bind(transaction.pricing.tax_rate_millis as i32)
    .bind(transaction.vendor.as_str())
    .bind(&transaction.payment_method)
    .bind(&transaction.payer_id)
    .bind(&transaction.ip_address)
    .bind(transaction.status.as_str())
    .bind(&transaction.vendor_transaction_id)
    .bind(&transaction.receipt)
    .bind(&transaction.raw_product_data)
    .bind(transaction.created_at.as_datetime())
    .bind(transaction.updated_at.as_datetime())
    .execute(executor)
    .await;

    match result {
        Ok(_) => Ok(CommitOutcome::Committed),
        Err(e) if violates_idempotency_key(&e) => Ok(CommitOutcome::DuplicateTransaction),
        Err(e) => Err(db_error("Failed to insert transaction")(e)),
    }
}

#[async_trait]
impl PurchaseLedger for PostgresPurchaseLedger {
    async fn commit_purchase(
        &self,
        purchase: &Purchase,
        transaction: &PaymentTransaction,
    ) -> Result<CommitOutcome, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        // Reused purchases already exist; only first sightings insert rows.
        let inserted = sqlx::query(
            "INSERT INTO purchases \
             (id, user_id, stored_payment_method_id, vendor, original_transaction_id, \
              created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(purchase.id.as_uuid())
        .bind(purchase.user_id.as_str())
        .bind(&purchase.stored_payment_method_id)
        .bind(purchase.vendor.map(|v| v.as_str()))
        .bind(&purchase.original_transaction_id)
        .bind(purchase.created_at.as_datetime())
        .bind(purchase.updated_at.as_datetime())
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to insert purchase"))?;

        if inserted.rows_affected() > 0 {
            for item in &purchase.items {
                sqlx::query(
                    "INSERT INTO purchased_buyables (purchase_id, buyable_id, quantity) \
                     VALUES ($1, $2, $3)",
                )
                .bind(purchase.id.as_uuid())
                .bind(item.buyable_id.as_uuid())
                .bind(item.quantity as i32)
                .execute(&mut *tx)
                .await
                .map_err(db_error("Failed to insert purchase item"))?;
            }
        }

        let outcome = insert_transaction(&mut *tx, transaction).await?;
        match outcome {
            CommitOutcome::Committed => {
                tx.commit()
                    .await
                    .map_err(db_error("Failed to commit purchase"))?;
            }
            // Dropping the transaction rolls back the purchase insert too.
            CommitOutcome::DuplicateTransaction => {
                tracing::info!(
                    purchase_id = %purchase.id,
                    vendor = %transaction.vendor,
                    "Duplicate vendor transaction absorbed"
                );
            }
        }
        Ok(outcome)
    }

    async fn record_transaction(
        &self,
        transaction: &PaymentTransaction,
    ) -> Result<CommitOutcome, DomainError> {
        let outcome = insert_transaction(&self.pool, transaction).await?;
        if outcome == CommitOutcome::DuplicateTransaction {
            tracing::info!(
                purchase_id = %transaction.purchase_id,
                vendor = %transaction.vendor,
                "Duplicate vendor transaction absorbed"
            );
        }
        Ok(outcome)
    }

    async fn record_transaction_with_subscription(
        &self,
        transaction: &PaymentTransaction,
        subscription: &UserSubscription,
    ) -> Result<CommitOutcome, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        // The transaction insert runs under a savepoint: a duplicate
        // aborts the innermost transaction, and rolling back just the
        // savepoint keeps the subscription write viable.
        let outcome = {
            let mut savepoint = tx
                .begin()
                .await
                .map_err(db_error("Failed to open savepoint"))?;
            let outcome = insert_transaction(&mut *savepoint, transaction).await?;
            match outcome {
                CommitOutcome::Committed => {
                    savepoint
                        .commit()
                        .await
                        .map_err(db_error("Failed to release savepoint"))?;
                }
                CommitOutcome::DuplicateTransaction => {
                    savepoint
                        .rollback()
                        .await
                        .map_err(db_error("Failed to roll back savepoint"))?;
                }
            }
            outcome
        };

        super::subscription_repository::update_in_tx(&mut tx, subscription).await?;

        tx.commit()
            .await
            .map_err(db_error("Failed to commit renewal"))?;

        if outcome == CommitOutcome::DuplicateTransaction {
            tracing::info!(
                purchase_id = %transaction.purchase_id,
                vendor = %transaction.vendor,
                "Duplicate vendor transaction absorbed"
            );
        }
        Ok(outcome)
    }

    async fn find_purchase_by_id(&self, id: &PurchaseId) -> Result<Option<Purchase>, DomainError> {
        let row: Option<PurchaseRow> = sqlx::query_as(&format!(
            "SELECT {} FROM purchases WHERE id = $1 AND deleted_at IS NULL",
            PURCHASE_COLUMNS
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to find purchase"))?;

        self.hydrate(row).await
    }

    async fn find_reusable_purchase(
        &self,
        user_id: &UserId,
        buyable_id: &BuyableId,
        vendor: PaymentVendor,
    ) -> Result<Option<Purchase>, DomainError> {
        let row: Option<PurchaseRow> = sqlx::query_as(
            "SELECT p.id, p.user_id, p.stored_payment_method_id, p.vendor, \
                    p.original_transaction_id, p.created_at, p.updated_at \
             FROM purchases p \
             WHERE p.user_id = $1 \
               AND p.vendor = $2 \
               AND p.deleted_at IS NULL \
               AND EXISTS (SELECT 1 FROM purchased_buyables i \
                           WHERE i.purchase_id = p.id AND i.buyable_id = $3) \
             ORDER BY p.created_at DESC \
             LIMIT 1",
        )
        .bind(user_id.as_str())
        .bind(vendor.as_str())
        .bind(buyable_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to find reusable purchase"))?;

        self.hydrate(row).await
    }

    async fn find_purchase_by_original_transaction(
        &self,
        vendor: PaymentVendor,
        original_transaction_id: &str,
    ) -> Result<Option<Purchase>, DomainError> {
        let row: Option<PurchaseRow> = sqlx::query_as(&format!(
            "SELECT {} FROM purchases \
             WHERE vendor = $1 AND original_transaction_id = $2 AND deleted_at IS NULL \
             ORDER BY created_at DESC \
             LIMIT 1",
            PURCHASE_COLUMNS
        ))
        .bind(vendor.as_str())
        .bind(original_transaction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to find purchase by original transaction"))?;

        self.hydrate(row).await
    }

    async fn find_transaction(
        &self,
        vendor: PaymentVendor,
        vendor_transaction_id: &str,
    ) -> Result<Option<PaymentTransaction>, DomainError> {
        let row: Option<TransactionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payment_transactions \
             WHERE vendor = $1 AND vendor_transaction_id = $2 AND deleted_at IS NULL",
            TRANSACTION_COLUMNS
        ))
        .bind(vendor.as_str())
        .bind(vendor_transaction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to find transaction"))?;

        row.map(PaymentTransaction::try_from).transpose()
    }

    async fn latest_transaction_for_purchase(
        &self,
        purchase_id: &PurchaseId,
    ) -> Result<Option<PaymentTransaction>, DomainError> {
        let row: Option<TransactionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payment_transactions \
             WHERE purchase_id = $1 AND deleted_at IS NULL \
             ORDER BY created_at DESC \
             LIMIT 1",
            TRANSACTION_COLUMNS
        ))
        .bind(purchase_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to find latest transaction"))?;

        row.map(PaymentTransaction::try_from).transpose()
    }
}
