//! Subscription repository port (write side).
//!
//! Persists `UserSubscription` aggregates and the audit records that
//! shadow off-schedule mutations.
//!
//! # Design
//!
//! - **One live row per user**: a partial unique index rejects a second
//!   trial/active row; implementations surface that as
//!   `SubscriptionExists`
//! - **Audited updates**: implementations decide inside the update
//!   transaction whether the mutation needs a
//!   `SubscriptionChangeRecord`, using the persisted row as baseline
//! - **Date-aware activeness**: `canceled` rows count as active only
//!   until their expiration date
//!
//! # Example
//!
//! ```ignore
//! let mut subscription = repo
//!     .find_active_for_user(&user_id, now)
//!     .await?
//!     .ok_or_else(|| SubscriptionError::no_subscription(user_id.clone()))?;
//!
//! if subscription.reconcile(now) {
//!     repo.update(&subscription).await?;
//! }
//! ```

use crate::domain::foundation::{BuyableId, DomainError, PurchaseId, SubscriptionId, Timestamp, UserId};
use crate::domain::subscription::UserSubscription;
use async_trait::async_trait;

/// Repository port for UserSubscription persistence.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Insert a new subscription row.
    ///
    /// # Errors
    ///
    /// - `SubscriptionExists` if the user already holds a live row
    /// - `DatabaseError` on persistence failure
    async fn insert(&self, subscription: &UserSubscription) -> Result<(), DomainError>;

    /// Update an existing subscription, writing a change record in the
    /// same transaction when the mutation is off-schedule.
    ///
    /// # Errors
    ///
    /// - `SubscriptionNotFound` if the row doesn't exist
    /// - `DatabaseError` on persistence failure
    async fn update(&self, subscription: &UserSubscription) -> Result<(), DomainError>;

    /// Apply a batch of updates and inserts as one atomic unit.
    ///
    /// Plan changes retire one line and open another; a crash between
    /// the two must not leave the user with both or neither. Updates
    /// carry the same audit semantics as [`update`](Self::update).
    ///
    /// # Errors
    ///
    /// - `SubscriptionNotFound` if an updated row doesn't exist
    /// - `SubscriptionExists` if an insert collides with a live row
    /// - `DatabaseError` on persistence failure
    async fn save_all(
        &self,
        updates: &[UserSubscription],
        inserts: &[UserSubscription],
    ) -> Result<(), DomainError>;

    /// Find a subscription by id.
    async fn find_by_id(
        &self,
        id: &SubscriptionId,
    ) -> Result<Option<UserSubscription>, DomainError>;

    /// The user's newest active-equivalent subscription, if any.
    ///
    /// Trial and active rows qualify unconditionally; canceled rows
    /// qualify while their expiration is still ahead of `now`.
    async fn find_active_for_user(
        &self,
        user_id: &UserId,
        now: Timestamp,
    ) -> Result<Option<UserSubscription>, DomainError>;

    /// The user's most relevant subscription row for display: an active
    /// row when one exists, otherwise the newest row of any status.
    ///
    /// Entitlement reads use this so a lapsed subscriber still sees when
    /// their window closed.
    async fn find_latest_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<UserSubscription>, DomainError>;

    /// The newest subscription row tied to a purchase and buyable pair.
    ///
    /// Vendor notifications address subscriptions through the ledger,
    /// never by subscription id.
    async fn find_latest_for_purchase_and_buyable(
        &self,
        purchase_id: &PurchaseId,
        buyable_id: &BuyableId,
    ) -> Result<Option<UserSubscription>, DomainError>;

    /// Soft-delete a subscription row.
    ///
    /// Used when a vendor cancels a scheduled plan change before it
    /// takes effect.
    async fn delete(&self, id: &SubscriptionId) -> Result<(), DomainError>;
}
