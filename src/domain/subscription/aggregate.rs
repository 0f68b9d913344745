//! UserSubscription aggregate entity.
//!
//! A UserSubscription tracks one user's entitlement to a subscription
//! buyable. The stored status is allowed to go stale: nothing runs at the
//! moment an expiration date passes. Instead, every reader reconciles the
//! row against the clock and persists the corrected status, so the truth
//! catches up the next time anyone looks.
//!
//! # Design Decisions
//!
//! - **Lazy reconciliation**: no background expiry job; `reconcile` is a
//!   pure status computation and callers persist when it reports a change
//! - **One active row per user**: enforced by a partial unique index over
//!   the trial/active statuses
//! - **Calendar renewals**: a renewal advances the expiration by calendar
//!   months, so billing anniversaries stay on the purchase day where the
//!   target month allows it

use crate::domain::foundation::{
    BuyableId, DomainError, PurchaseId, SubscriptionId, Timestamp, UserId,
};
use serde::{Deserialize, Serialize};

use super::SubscriptionStatus;
use crate::domain::catalog::{Buyable, SubscriptionPeriod};

/// UserSubscription aggregate - a user's entitlement window.
///
/// # Invariants
///
/// - At most one row per user holds a trial or active status
/// - `expiration_date` moves only through renewal, vendor-reported
///   expiry updates, or forced expiry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSubscription {
    /// Unique identifier for this subscription.
    pub id: SubscriptionId,

    /// User who holds the entitlement.
    pub user_id: UserId,

    /// Subscription buyable this entitles to.
    pub buyable_id: BuyableId,

    /// Purchase that established the subscription. Renewals keep pointing
    /// at the same purchase.
    pub purchase_id: PurchaseId,

    /// When the entitlement begins.
    pub start_date: Timestamp,

    /// When the entitlement lapses unless renewed.
    pub expiration_date: Timestamp,

    /// Stored status, possibly stale until reconciled.
    pub status: SubscriptionStatus,

    /// Trial days consumed when the subscription was created.
    pub used_trial_days: u32,

    /// When the row was created.
    pub created_at: Timestamp,

    /// When the row was last updated.
    pub updated_at: Timestamp,
}

impl UserSubscription {
    /// Create a subscription for a freshly paid purchase.
    ///
    /// A buyable granting a trial opens a trial window of `trial_days`;
    /// otherwise the first paid period starts immediately.
    ///
    /// # Errors
    ///
    /// Returns error if the buyable carries no billing period.
    pub fn create(
        id: SubscriptionId,
        user_id: UserId,
        buyable: &Buyable,
        purchase_id: PurchaseId,
        now: Timestamp,
    ) -> Result<Self, DomainError> {
        let period = buyable.period.ok_or_else(|| {
            DomainError::validation(
                "buyable",
                "Cannot subscribe to an item without a billing period",
            )
        })?;

        let (expiration_date, status) = if buyable.grants_trial() {
            (
                now.add_days(i64::from(buyable.trial_length_days())),
                SubscriptionStatus::Trial,
            )
        } else {
            (period.advance(now), SubscriptionStatus::Active)
        };

        Ok(Self {
            id,
            user_id,
            buyable_id: buyable.id,
            purchase_id,
            start_date: now,
            expiration_date,
            status,
            used_trial_days: buyable.trial_length_days(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Create a row scheduled to begin when the current entitlement ends.
    ///
    /// Used for vendor-reported downgrades: the new plan starts at the old
    /// plan's expiration, so the row sits in Initial until then.
    pub fn scheduled(
        id: SubscriptionId,
        user_id: UserId,
        buyable_id: BuyableId,
        purchase_id: PurchaseId,
        start_date: Timestamp,
        expiration_date: Timestamp,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            user_id,
            buyable_id,
            purchase_id,
            start_date,
            expiration_date,
            status: SubscriptionStatus::Initial,
            used_trial_days: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create an immediately active row from a vendor notification.
    ///
    /// Used when a store reports an entitlement we have no receipt-driven
    /// row for; the expiration comes from the store's signed payload.
    pub fn from_store_report(
        id: SubscriptionId,
        user_id: UserId,
        buyable_id: BuyableId,
        purchase_id: PurchaseId,
        expiration_date: Timestamp,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            user_id,
            buyable_id,
            purchase_id,
            start_date: now,
            expiration_date,
            status: SubscriptionStatus::Active,
            used_trial_days: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Compute what the status should be at `now`, without mutating.
    ///
    /// Three rules, applied in order to the running value:
    /// 1. expiration passed and not expired → expired
    /// 2. start in the future and not initial → initial
    /// 3. initial and now inside [start, expiration) → active
    pub fn reconciled_status(&self, now: Timestamp) -> SubscriptionStatus {
        let mut status = self.status;
        if self.expiration_date.is_before(&now) && status != SubscriptionStatus::Expired {
            status = SubscriptionStatus::Expired;
        }
        if self.start_date.is_after(&now) && status != SubscriptionStatus::Initial {
            status = SubscriptionStatus::Initial;
        }
        if status == SubscriptionStatus::Initial
            && self.start_date.is_before(&now)
            && now.is_before(&self.expiration_date)
        {
            status = SubscriptionStatus::Active;
        }
        status
    }

    /// Bring the stored status in line with the clock.
    ///
    /// Returns true when the status moved; the caller is expected to
    /// persist the row in that case.
    pub fn reconcile(&mut self, now: Timestamp) -> bool {
        let reconciled = self.reconciled_status(now);
        if reconciled != self.status {
            self.status = reconciled;
            self.updated_at = now;
            return true;
        }
        false
    }

    /// Extend the entitlement by one period from the current expiration.
    pub fn renew(&mut self, period: SubscriptionPeriod, now: Timestamp) {
        self.status = SubscriptionStatus::Active;
        self.expiration_date = period.advance(self.expiration_date);
        self.updated_at = now;
    }

    /// Extend the entitlement by one period counted from `now`.
    ///
    /// Used when a lapsed subscription recovers: the paid window restarts
    /// today rather than stacking onto an expiration already in the past.
    pub fn renew_from_now(&mut self, period: SubscriptionPeriod, now: Timestamp) {
        self.status = SubscriptionStatus::Active;
        self.expiration_date = period.advance(now);
        self.updated_at = now;
    }

    /// Adopt a vendor-reported expiration date.
    ///
    /// Reconciles against the new date first, then revives an expired row
    /// when the new date lies in the future. A past date therefore expires
    /// the subscription.
    pub fn update_expiration(&mut self, date: Timestamp, now: Timestamp) -> bool {
        let before = (self.status, self.expiration_date);
        self.expiration_date = date;
        self.reconcile(now);
        if self.status == SubscriptionStatus::Expired && date.is_after(&now) {
            self.status = SubscriptionStatus::Active;
        }
        let changed = before != (self.status, self.expiration_date);
        if changed {
            self.updated_at = now;
        }
        changed
    }

    /// Expire the entitlement right now unless already expired.
    pub fn force_expire(&mut self, now: Timestamp) -> bool {
        if self.reconciled_status(now) != SubscriptionStatus::Expired {
            self.expiration_date = now;
            self.status = SubscriptionStatus::Expired;
            self.updated_at = now;
            return true;
        }
        self.reconcile(now)
    }

    /// Put the row into active unless it already reconciles to active.
    pub fn ensure_active(&mut self, now: Timestamp) -> bool {
        let reconciled = self.reconciled_status(now);
        if reconciled != SubscriptionStatus::Active {
            self.status = SubscriptionStatus::Active;
            self.updated_at = now;
            return true;
        }
        self.reconcile(now)
    }

    /// Reactivate with a vendor-supplied expiration, if it is still ahead.
    ///
    /// Returns false without touching the row when the date has passed.
    pub fn reactivate_until(&mut self, expiration: Timestamp, now: Timestamp) -> bool {
        if !expiration.is_after(&now) {
            return false;
        }
        self.expiration_date = expiration;
        self.status = SubscriptionStatus::Active;
        self.updated_at = now;
        true
    }

    /// Record that the user turned off auto-renew. Access continues until
    /// the expiration date.
    pub fn cancel(&mut self, now: Timestamp) -> bool {
        self.set_status(SubscriptionStatus::Canceled, now)
    }

    /// Record a vendor-side billing pause.
    pub fn suspend(&mut self, now: Timestamp) -> bool {
        self.set_status(SubscriptionStatus::Suspended, now)
    }

    /// Mark expired without moving the expiration date. Used when another
    /// row supersedes this one, e.g. a plan upgrade.
    pub fn mark_expired(&mut self, now: Timestamp) -> bool {
        self.set_status(SubscriptionStatus::Expired, now)
    }

    /// Whether the stored status still grants access.
    pub fn grants_access(&self) -> bool {
        self.status.grants_access()
    }

    fn set_status(&mut self, status: SubscriptionStatus, now: Timestamp) -> bool {
        if self.status != status {
            self.status = status;
            self.updated_at = now;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::BuyableType;
    use crate::domain::foundation::{Currency, Money};
    use chrono::{DateTime, Utc};
    use proptest::prelude::*;

    fn ts(rfc3339: &str) -> Timestamp {
        let dt = DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc);
        Timestamp::from_datetime(dt)
    }

    fn test_user_id() -> UserId {
        UserId::new("user-7".to_string()).unwrap()
    }

    fn buyable(period: SubscriptionPeriod, trial_days: u32) -> Buyable {
        Buyable::subscription(
            BuyableId::new(),
            "premium".to_string(),
            BuyableType::PersonalSubscription,
            Money::from_major_str("69.99", Currency::new("TRY").unwrap()).unwrap(),
            period,
            trial_days,
        )
        .unwrap()
    }

    fn paid_subscription(now: Timestamp) -> UserSubscription {
        UserSubscription::create(
            SubscriptionId::new(),
            test_user_id(),
            &buyable(SubscriptionPeriod::Monthly, 0),
            PurchaseId::new(),
            now,
        )
        .unwrap()
    }

    // Creation tests

    #[test]
    fn create_without_trial_opens_paid_period() {
        let now = ts("2024-03-10T09:00:00Z");
        let sub = paid_subscription(now);

        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.start_date, now);
        assert_eq!(sub.expiration_date, SubscriptionPeriod::Monthly.advance(now));
        assert_eq!(sub.used_trial_days, 0);
    }

    #[test]
    fn create_with_trial_opens_trial_window() {
        let now = ts("2024-03-10T09:00:00Z");
        let sub = UserSubscription::create(
            SubscriptionId::new(),
            test_user_id(),
            &buyable(SubscriptionPeriod::Monthly, 7),
            PurchaseId::new(),
            now,
        )
        .unwrap();

        assert_eq!(sub.status, SubscriptionStatus::Trial);
        assert_eq!(sub.expiration_date, now.add_days(7));
        assert_eq!(sub.used_trial_days, 7);
    }

    #[test]
    fn create_rejects_one_time_buyable() {
        let one_time = Buyable::one_time(
            BuyableId::new(),
            "coin_pack".to_string(),
            Money::from_major_str("1.99", Currency::new("TRY").unwrap()).unwrap(),
        )
        .unwrap();

        let result = UserSubscription::create(
            SubscriptionId::new(),
            test_user_id(),
            &one_time,
            PurchaseId::new(),
            Timestamp::now(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn scheduled_row_starts_initial() {
        let now = ts("2024-03-10T09:00:00Z");
        let current_end = ts("2024-04-10T09:00:00Z");
        let sub = UserSubscription::scheduled(
            SubscriptionId::new(),
            test_user_id(),
            BuyableId::new(),
            PurchaseId::new(),
            current_end,
            ts("2024-05-10T09:00:00Z"),
            now,
        );

        assert_eq!(sub.status, SubscriptionStatus::Initial);
        assert_eq!(sub.start_date, current_end);
        assert_eq!(sub.used_trial_days, 0);
    }

    // Reconciliation tests

    #[test]
    fn reconcile_expires_past_expiration() {
        let now = ts("2024-03-10T09:00:00Z");
        let mut sub = paid_subscription(now);
        let later = ts("2024-05-01T00:00:00Z");

        assert!(sub.reconcile(later));
        assert_eq!(sub.status, SubscriptionStatus::Expired);
    }

    #[test]
    fn reconcile_moves_future_start_to_initial() {
        let now = ts("2024-03-10T09:00:00Z");
        let mut sub = paid_subscription(now);
        let earlier = ts("2024-03-01T00:00:00Z");

        assert!(sub.reconcile(earlier));
        assert_eq!(sub.status, SubscriptionStatus::Initial);
    }

    #[test]
    fn reconcile_activates_initial_inside_window() {
        let now = ts("2024-03-10T09:00:00Z");
        let mut sub = paid_subscription(now);
        sub.status = SubscriptionStatus::Initial;

        let inside = ts("2024-03-20T00:00:00Z");
        assert!(sub.reconcile(inside));
        assert_eq!(sub.status, SubscriptionStatus::Active);
    }

    #[test]
    fn reconcile_leaves_correct_status_alone() {
        let now = ts("2024-03-10T09:00:00Z");
        let mut sub = paid_subscription(now);

        let inside = ts("2024-03-20T00:00:00Z");
        assert!(!sub.reconcile(inside));
        assert_eq!(sub.status, SubscriptionStatus::Active);
    }

    #[test]
    fn reconcile_does_not_resurrect_canceled_inside_window() {
        let now = ts("2024-03-10T09:00:00Z");
        let mut sub = paid_subscription(now);
        sub.cancel(now);

        let inside = ts("2024-03-20T00:00:00Z");
        assert!(!sub.reconcile(inside));
        assert_eq!(sub.status, SubscriptionStatus::Canceled);
    }

    #[test]
    fn reconcile_expires_canceled_after_window() {
        let now = ts("2024-03-10T09:00:00Z");
        let mut sub = paid_subscription(now);
        sub.cancel(now);

        let later = ts("2024-05-01T00:00:00Z");
        assert!(sub.reconcile(later));
        assert_eq!(sub.status, SubscriptionStatus::Expired);
    }

    // Renewal tests

    #[test]
    fn renew_extends_from_expiration() {
        let now = ts("2024-01-31T12:00:00Z");
        let mut sub = paid_subscription(now);
        let first_expiration = sub.expiration_date;

        sub.renew(SubscriptionPeriod::Monthly, ts("2024-02-25T00:00:00Z"));

        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(
            sub.expiration_date,
            SubscriptionPeriod::Monthly.advance(first_expiration)
        );
    }

    #[test]
    fn renew_from_now_rebases_at_the_clock() {
        let now = ts("2024-03-10T09:00:00Z");
        let mut sub = paid_subscription(now);
        sub.force_expire(ts("2024-04-15T00:00:00Z"));

        let recovery = ts("2024-06-01T00:00:00Z");
        sub.renew_from_now(SubscriptionPeriod::Monthly, recovery);

        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.expiration_date, SubscriptionPeriod::Monthly.advance(recovery));
    }

    #[test]
    fn renew_reactivates_canceled() {
        let now = ts("2024-03-10T09:00:00Z");
        let mut sub = paid_subscription(now);
        sub.cancel(now);

        sub.renew(SubscriptionPeriod::Monthly, ts("2024-04-05T00:00:00Z"));
        assert_eq!(sub.status, SubscriptionStatus::Active);
    }

    // Expiration update tests

    #[test]
    fn update_expiration_revives_expired_row() {
        let now = ts("2024-03-10T09:00:00Z");
        let mut sub = paid_subscription(now);
        let later = ts("2024-05-01T00:00:00Z");
        sub.reconcile(later);
        assert_eq!(sub.status, SubscriptionStatus::Expired);

        let vendor_expiry = ts("2024-06-01T00:00:00Z");
        assert!(sub.update_expiration(vendor_expiry, later));
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.expiration_date, vendor_expiry);
    }

    #[test]
    fn update_expiration_with_past_date_expires() {
        let now = ts("2024-03-10T09:00:00Z");
        let mut sub = paid_subscription(now);

        let past = ts("2024-03-12T00:00:00Z");
        let today = ts("2024-03-20T00:00:00Z");
        assert!(sub.update_expiration(past, today));
        assert_eq!(sub.status, SubscriptionStatus::Expired);
        assert_eq!(sub.expiration_date, past);
    }

    #[test]
    fn force_expire_sets_expiration_to_now() {
        let now = ts("2024-03-10T09:00:00Z");
        let mut sub = paid_subscription(now);

        let when = ts("2024-03-15T00:00:00Z");
        assert!(sub.force_expire(when));
        assert_eq!(sub.status, SubscriptionStatus::Expired);
        assert_eq!(sub.expiration_date, when);
    }

    #[test]
    fn force_expire_is_idempotent() {
        let now = ts("2024-03-10T09:00:00Z");
        let mut sub = paid_subscription(now);

        let when = ts("2024-03-15T00:00:00Z");
        sub.force_expire(when);
        let expiration_after_first = sub.expiration_date;

        assert!(!sub.force_expire(ts("2024-03-16T00:00:00Z")));
        assert_eq!(sub.expiration_date, expiration_after_first);
    }

    #[test]
    fn reactivate_until_refuses_past_dates() {
        let now = ts("2024-03-10T09:00:00Z");
        let mut sub = paid_subscription(now);
        sub.force_expire(ts("2024-03-15T00:00:00Z"));

        let today = ts("2024-03-20T00:00:00Z");
        assert!(!sub.reactivate_until(ts("2024-03-18T00:00:00Z"), today));
        assert_eq!(sub.status, SubscriptionStatus::Expired);

        assert!(sub.reactivate_until(ts("2024-04-20T00:00:00Z"), today));
        assert_eq!(sub.status, SubscriptionStatus::Active);
    }

    // Direct status tests

    #[test]
    fn cancel_and_suspend_report_change_once() {
        let now = ts("2024-03-10T09:00:00Z");
        let mut sub = paid_subscription(now);

        assert!(sub.cancel(now));
        assert!(!sub.cancel(now));
        assert!(sub.suspend(now));
        assert!(!sub.suspend(now));
        assert!(sub.mark_expired(now));
        assert!(!sub.mark_expired(now));
    }

    proptest! {
        /// N renewals land exactly N periods past the first expiration.
        #[test]
        fn renewal_chain_is_monotonic(count in 1u32..36) {
            let start = ts("2024-01-15T12:00:00Z");
            let mut sub = paid_subscription(start);
            let first_expiration = sub.expiration_date;

            let mut previous = first_expiration;
            for _ in 0..count {
                sub.renew(SubscriptionPeriod::Monthly, start);
                prop_assert!(sub.expiration_date.is_after(&previous));
                previous = sub.expiration_date;
            }

            prop_assert_eq!(sub.expiration_date, first_expiration.add_calendar_months(count));
            prop_assert_eq!(sub.status, SubscriptionStatus::Active);
        }
    }
}
