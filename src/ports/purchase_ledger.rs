//! Purchase ledger port (write side).
//!
//! Persists purchases and the payment transactions recorded against
//! them. The ledger is the idempotency backbone of billing: the
//! `(vendor, vendor_transaction_id)` uniqueness turns resubmitted
//! receipts and redelivered webhooks into harmless duplicates.
//!
//! # Design
//!
//! - **Append-heavy**: transactions are only ever inserted
//! - **Duplicate absorption**: resubmissions report `DuplicateTransaction`
//!   instead of failing, so callers can finish their flow quietly
//! - **Atomic commit**: a purchase and its first transaction land in one
//!   database transaction
//!
//! # Example
//!
//! ```ignore
//! match ledger.commit_purchase(&purchase, &transaction).await? {
//!     CommitOutcome::Committed => { /* first sighting, fire events */ }
//!     CommitOutcome::DuplicateTransaction => { /* retry, nothing to do */ }
//! }
//! ```

use crate::domain::foundation::{BuyableId, DomainError, PurchaseId, UserId};
use crate::domain::ledger::{PaymentTransaction, PaymentVendor, Purchase};
use crate::domain::subscription::UserSubscription;
use async_trait::async_trait;

/// Outcome of writing a transaction to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The rows were written.
    Committed,

    /// A transaction with the same `(vendor, vendor_transaction_id)`
    /// already exists; nothing was written.
    DuplicateTransaction,
}

impl CommitOutcome {
    /// True when the write landed new rows.
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed)
    }
}

/// Repository port for purchase and transaction persistence.
#[async_trait]
pub trait PurchaseLedger: Send + Sync {
    /// Atomically persist a purchase (when not already present) and its
    /// payment transaction.
    ///
    /// # Errors
    ///
    /// - `DatabaseError` on persistence failure
    async fn commit_purchase(
        &self,
        purchase: &Purchase,
        transaction: &PaymentTransaction,
    ) -> Result<CommitOutcome, DomainError>;

    /// Persist a transaction against an existing purchase.
    ///
    /// Used for vendor-reported renewals, which never create purchases.
    async fn record_transaction(
        &self,
        transaction: &PaymentTransaction,
    ) -> Result<CommitOutcome, DomainError>;

    /// Atomically persist a renewal transaction together with the
    /// subscription state it pays for. Either both land or neither does;
    /// a renewal must never exist on the ledger without its entitlement
    /// extension.
    ///
    /// The subscription write applies on `DuplicateTransaction` too, so
    /// a redelivered notification still converges the row.
    ///
    /// # Errors
    ///
    /// - `SubscriptionNotFound` if the subscription row doesn't exist
    /// - `DatabaseError` on persistence failure
    async fn record_transaction_with_subscription(
        &self,
        transaction: &PaymentTransaction,
        subscription: &UserSubscription,
    ) -> Result<CommitOutcome, DomainError>;

    /// Find a purchase by id.
    async fn find_purchase_by_id(&self, id: &PurchaseId) -> Result<Option<Purchase>, DomainError>;

    /// Find a purchase this user already holds for the given buyable and
    /// vendor, if any.
    ///
    /// Receipt resubmissions and plan renewals reuse the existing
    /// purchase instead of opening a new one.
    async fn find_reusable_purchase(
        &self,
        user_id: &UserId,
        buyable_id: &BuyableId,
        vendor: PaymentVendor,
    ) -> Result<Option<Purchase>, DomainError>;

    /// Find the purchase that anchors a vendor transaction lineage.
    ///
    /// App Store notifications identify the lineage by the original
    /// transaction id stamped on the purchase.
    async fn find_purchase_by_original_transaction(
        &self,
        vendor: PaymentVendor,
        original_transaction_id: &str,
    ) -> Result<Option<Purchase>, DomainError>;

    /// Find a transaction by its vendor-assigned id.
    async fn find_transaction(
        &self,
        vendor: PaymentVendor,
        vendor_transaction_id: &str,
    ) -> Result<Option<PaymentTransaction>, DomainError>;

    /// The most recently created transaction on a purchase, regardless
    /// of status.
    ///
    /// Used to resolve the transaction a vendor notification refers to
    /// when only the purchase lineage is known.
    async fn latest_transaction_for_purchase(
        &self,
        purchase_id: &PurchaseId,
    ) -> Result<Option<PaymentTransaction>, DomainError>;
}
