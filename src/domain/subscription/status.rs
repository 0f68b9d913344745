//! Subscription status lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// Status of a user subscription.
///
/// Statuses are assigned, not negotiated: vendor notifications and the
/// lazy reconciliation in [`UserSubscription::reconcile`] both overwrite
/// the stored value directly, so there is no transition table to violate.
/// What matters is the access question, answered by
/// [`grants_access`](Self::grants_access).
///
/// [`UserSubscription::reconcile`]: super::UserSubscription::reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Start date lies in the future.
    Initial,
    /// Inside a free trial window.
    Trial,
    /// Paid and current.
    Active,
    /// Vendor paused billing, e.g. payment failure or account hold.
    Suspended,
    /// User turned off auto-renew but the paid window still runs.
    Canceled,
    /// Past the expiration date.
    Expired,
}

impl SubscriptionStatus {
    /// Whether this status still grants product access.
    ///
    /// Canceled counts: the user keeps what they paid for until the
    /// expiration date passes and reconciliation flips the row to
    /// Expired.
    pub fn grants_access(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Trial | SubscriptionStatus::Active | SubscriptionStatus::Canceled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Initial => "initial",
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Suspended => "suspended",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initial" => Ok(SubscriptionStatus::Initial),
            "trial" => Ok(SubscriptionStatus::Trial),
            "active" => Ok(SubscriptionStatus::Active),
            "suspended" => Ok(SubscriptionStatus::Suspended),
            "canceled" => Ok(SubscriptionStatus::Canceled),
            "expired" => Ok(SubscriptionStatus::Expired),
            other => Err(ValidationError::invalid_format(
                "status",
                format!("unknown subscription status '{}'", other),
            )),
        }
    }
}
