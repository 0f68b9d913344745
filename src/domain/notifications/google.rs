//! Google Play developer notification classification.
//!
//! A Pub/Sub push delivers one notification object per message. The
//! object key tells us the notification family; subscription
//! notifications additionally carry a numeric `notificationType` that
//! selects the concrete lifecycle change. Unknown or absent codes
//! normalize to `None` so that new vendor codes degrade to a logged
//! no-op instead of a parse failure.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// The notification family, determined by which object key is present
/// in the decoded Pub/Sub payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GooglePlayNotificationType {
    None,
    Subscription,
    OneTimeProduct,
    Test,
}

impl GooglePlayNotificationType {
    /// Classifies a decoded developer notification payload.
    ///
    /// Returns the family plus the embedded subtype code. `None` when
    /// no recognized notification object is present.
    pub fn classify(data: &JsonValue) -> Option<(Self, GooglePlayNotificationSubtype)> {
        for (key, family) in [
            ("oneTimeProductNotification", Self::OneTimeProduct),
            ("subscriptionNotification", Self::Subscription),
            ("testNotification", Self::Test),
        ] {
            if let Some(object) = data.get(key) {
                let subtype = object
                    .get("notificationType")
                    .and_then(JsonValue::as_i64)
                    .map(GooglePlayNotificationSubtype::from_code)
                    .unwrap_or(GooglePlayNotificationSubtype::None);
                return Some((family, subtype));
            }
        }
        Option::None
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GooglePlayNotificationType::None => "none",
            GooglePlayNotificationType::Subscription => "subscription",
            GooglePlayNotificationType::OneTimeProduct => "one_time_product",
            GooglePlayNotificationType::Test => "test",
        }
    }
}

impl fmt::Display for GooglePlayNotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Subscription lifecycle codes from
/// `subscriptionNotification.notificationType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GooglePlayNotificationSubtype {
    None,
    Recovered,
    Renewed,
    Canceled,
    Purchased,
    OnHold,
    InGracePeriod,
    Restarted,
    PriceChangeConfirmed,
    Deferred,
    Paused,
    PauseScheduleChanged,
    Revoked,
    Expired,
}

impl GooglePlayNotificationSubtype {
    /// Maps a vendor code to a subtype, normalizing unknown codes.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => GooglePlayNotificationSubtype::Recovered,
            2 => GooglePlayNotificationSubtype::Renewed,
            3 => GooglePlayNotificationSubtype::Canceled,
            4 => GooglePlayNotificationSubtype::Purchased,
            5 => GooglePlayNotificationSubtype::OnHold,
            6 => GooglePlayNotificationSubtype::InGracePeriod,
            7 => GooglePlayNotificationSubtype::Restarted,
            8 => GooglePlayNotificationSubtype::PriceChangeConfirmed,
            9 => GooglePlayNotificationSubtype::Deferred,
            10 => GooglePlayNotificationSubtype::Paused,
            11 => GooglePlayNotificationSubtype::PauseScheduleChanged,
            12 => GooglePlayNotificationSubtype::Revoked,
            13 => GooglePlayNotificationSubtype::Expired,
            _ => GooglePlayNotificationSubtype::None,
        }
    }

    /// Returns the vendor code, 0 for the normalized fallback.
    pub fn code(&self) -> i64 {
        match self {
            GooglePlayNotificationSubtype::None => 0,
            GooglePlayNotificationSubtype::Recovered => 1,
            GooglePlayNotificationSubtype::Renewed => 2,
            GooglePlayNotificationSubtype::Canceled => 3,
            GooglePlayNotificationSubtype::Purchased => 4,
            GooglePlayNotificationSubtype::OnHold => 5,
            GooglePlayNotificationSubtype::InGracePeriod => 6,
            GooglePlayNotificationSubtype::Restarted => 7,
            GooglePlayNotificationSubtype::PriceChangeConfirmed => 8,
            GooglePlayNotificationSubtype::Deferred => 9,
            GooglePlayNotificationSubtype::Paused => 10,
            GooglePlayNotificationSubtype::PauseScheduleChanged => 11,
            GooglePlayNotificationSubtype::Revoked => 12,
            GooglePlayNotificationSubtype::Expired => 13,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GooglePlayNotificationSubtype::None => "none",
            GooglePlayNotificationSubtype::Recovered => "recovered",
            GooglePlayNotificationSubtype::Renewed => "renewed",
            GooglePlayNotificationSubtype::Canceled => "canceled",
            GooglePlayNotificationSubtype::Purchased => "purchased",
            GooglePlayNotificationSubtype::OnHold => "on_hold",
            GooglePlayNotificationSubtype::InGracePeriod => "in_grace_period",
            GooglePlayNotificationSubtype::Restarted => "restarted",
            GooglePlayNotificationSubtype::PriceChangeConfirmed => "price_change_confirmed",
            GooglePlayNotificationSubtype::Deferred => "deferred",
            GooglePlayNotificationSubtype::Paused => "paused",
            GooglePlayNotificationSubtype::PauseScheduleChanged => "pause_schedule_changed",
            GooglePlayNotificationSubtype::Revoked => "revoked",
            GooglePlayNotificationSubtype::Expired => "expired",
        }
    }
}

impl fmt::Display for GooglePlayNotificationSubtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
