//! Subscription change auditing.
//!
//! Every update to a subscription row is screened against the persisted
//! row: if anything besides a routine renewal tick happened, a change
//! record snapshots the new state. The one exempt shape is "expiration
//! advanced by exactly one period of the persisted buyable and nothing
//! else moved", which is what an on-schedule renewal looks like. Status
//! flips, plan changes, off-schedule expiration moves and trial edits all
//! leave a record.

use crate::domain::foundation::{
    BuyableId, ChangeRecordId, PurchaseId, SubscriptionId, Timestamp, UserId,
};
use serde::{Deserialize, Serialize};

use super::{SubscriptionStatus, UserSubscription};
use crate::domain::catalog::SubscriptionPeriod;

/// Decide whether updating `persisted` to `updated` needs an audit record.
///
/// `persisted_period` is the billing period of the persisted row's
/// buyable; the renewal-tick exemption is measured against it, so a plan
/// change always fails the exemption even when the new expiration happens
/// to line up.
pub fn needs_change_record(
    persisted: &UserSubscription,
    updated: &UserSubscription,
    persisted_period: SubscriptionPeriod,
) -> bool {
    let non_expiration_change = persisted.user_id != updated.user_id
        || persisted.buyable_id != updated.buyable_id
        || persisted.purchase_id != updated.purchase_id
        || persisted.status != updated.status
        || persisted.used_trial_days != updated.used_trial_days
        || persisted.start_date != updated.start_date;

    let off_schedule =
        persisted_period.advance(persisted.expiration_date) != updated.expiration_date;

    non_expiration_change || off_schedule
}

/// Snapshot of a subscription row taken when an audited change lands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionChangeRecord {
    pub id: ChangeRecordId,
    pub subscription_id: SubscriptionId,
    pub user_id: UserId,
    pub buyable_id: BuyableId,
    pub purchase_id: PurchaseId,
    pub expiration_date: Timestamp,
    pub start_date: Timestamp,
    pub status: SubscriptionStatus,
    pub used_trial_days: u32,
    pub recorded_at: Timestamp,
}

impl SubscriptionChangeRecord {
    /// Capture the state a subscription row is about to be saved with.
    pub fn capture(subscription: &UserSubscription, now: Timestamp) -> Self {
        Self {
            id: ChangeRecordId::new(),
            subscription_id: subscription.id,
            user_id: subscription.user_id.clone(),
            buyable_id: subscription.buyable_id,
            purchase_id: subscription.purchase_id,
            expiration_date: subscription.expiration_date,
            start_date: subscription.start_date,
            status: subscription.status,
            used_trial_days: subscription.used_trial_days,
            recorded_at: now,
        }
    }
}
