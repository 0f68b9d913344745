//! App Store server notification classification.
//!
//! V2 notifications identify themselves with a string `notificationType`
//! and, for some types, a `subtype` that picks the concrete action.
//! Unknown or absent values normalize to `None` variants so new vendor
//! strings degrade to a logged no-op instead of a parse failure.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level `notificationType` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppStoreNotificationType {
    ConsumptionRequest,
    DidChangeRenewalPref,
    DidChangeRenewalStatus,
    DidFailToRenew,
    DidRenew,
    Expired,
    GracePeriodExpired,
    OfferRedeemed,
    PriceIncrease,
    Refund,
    RefundDeclined,
    RefundReversed,
    RenewalExtended,
    RenewalExtension,
    Revoke,
    Subscribed,
    Test,
    #[serde(other)]
    None,
}

impl AppStoreNotificationType {
    /// Maps the wire string to a type, normalizing unknown values.
    pub fn from_wire(value: &str) -> Self {
        match value {
            "CONSUMPTION_REQUEST" => AppStoreNotificationType::ConsumptionRequest,
            "DID_CHANGE_RENEWAL_PREF" => AppStoreNotificationType::DidChangeRenewalPref,
            "DID_CHANGE_RENEWAL_STATUS" => AppStoreNotificationType::DidChangeRenewalStatus,
            "DID_FAIL_TO_RENEW" => AppStoreNotificationType::DidFailToRenew,
            "DID_RENEW" => AppStoreNotificationType::DidRenew,
            "EXPIRED" => AppStoreNotificationType::Expired,
            "GRACE_PERIOD_EXPIRED" => AppStoreNotificationType::GracePeriodExpired,
            "OFFER_REDEEMED" => AppStoreNotificationType::OfferRedeemed,
            "PRICE_INCREASE" => AppStoreNotificationType::PriceIncrease,
            "REFUND" => AppStoreNotificationType::Refund,
            "REFUND_DECLINED" => AppStoreNotificationType::RefundDeclined,
            "REFUND_REVERSED" => AppStoreNotificationType::RefundReversed,
            "RENEWAL_EXTENDED" => AppStoreNotificationType::RenewalExtended,
            "RENEWAL_EXTENSION" => AppStoreNotificationType::RenewalExtension,
            "REVOKE" => AppStoreNotificationType::Revoke,
            "SUBSCRIBED" => AppStoreNotificationType::Subscribed,
            "TEST" => AppStoreNotificationType::Test,
            _ => AppStoreNotificationType::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppStoreNotificationType::None => "NONE",
            AppStoreNotificationType::ConsumptionRequest => "CONSUMPTION_REQUEST",
            AppStoreNotificationType::DidChangeRenewalPref => "DID_CHANGE_RENEWAL_PREF",
            AppStoreNotificationType::DidChangeRenewalStatus => "DID_CHANGE_RENEWAL_STATUS",
            AppStoreNotificationType::DidFailToRenew => "DID_FAIL_TO_RENEW",
            AppStoreNotificationType::DidRenew => "DID_RENEW",
            AppStoreNotificationType::Expired => "EXPIRED",
            AppStoreNotificationType::GracePeriodExpired => "GRACE_PERIOD_EXPIRED",
            AppStoreNotificationType::OfferRedeemed => "OFFER_REDEEMED",
            AppStoreNotificationType::PriceIncrease => "PRICE_INCREASE",
            AppStoreNotificationType::Refund => "REFUND",
            AppStoreNotificationType::RefundDeclined => "REFUND_DECLINED",
            AppStoreNotificationType::RefundReversed => "REFUND_REVERSED",
            AppStoreNotificationType::RenewalExtended => "RENEWAL_EXTENDED",
            AppStoreNotificationType::RenewalExtension => "RENEWAL_EXTENSION",
            AppStoreNotificationType::Revoke => "REVOKE",
            AppStoreNotificationType::Subscribed => "SUBSCRIBED",
            AppStoreNotificationType::Test => "TEST",
        }
    }
}

impl fmt::Display for AppStoreNotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// `subtype` values nested under some notification types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppStoreNotificationSubtype {
    Upgrade,
    Downgrade,
    AutoRenewEnabled,
    AutoRenewDisabled,
    InitialBuy,
    Resubscribe,
    OfferRedeemed,
    Pending,
    Accepted,
    Summary,
    Failure,
    #[serde(other)]
    None,
}

impl AppStoreNotificationSubtype {
    /// Maps the wire string to a subtype, normalizing unknown values.
    pub fn from_wire(value: &str) -> Self {
        match value {
            "UPGRADE" => AppStoreNotificationSubtype::Upgrade,
            "DOWNGRADE" => AppStoreNotificationSubtype::Downgrade,
            "AUTO_RENEW_ENABLED" => AppStoreNotificationSubtype::AutoRenewEnabled,
            "AUTO_RENEW_DISABLED" => AppStoreNotificationSubtype::AutoRenewDisabled,
            "INITIAL_BUY" => AppStoreNotificationSubtype::InitialBuy,
            "RESUBSCRIBE" => AppStoreNotificationSubtype::Resubscribe,
            "OFFER_REDEEMED" => AppStoreNotificationSubtype::OfferRedeemed,
            "PENDING" => AppStoreNotificationSubtype::Pending,
            "ACCEPTED" => AppStoreNotificationSubtype::Accepted,
            "SUMMARY" => AppStoreNotificationSubtype::Summary,
            "FAILURE" => AppStoreNotificationSubtype::Failure,
            _ => AppStoreNotificationSubtype::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppStoreNotificationSubtype::None => "NONE",
            AppStoreNotificationSubtype::Upgrade => "UPGRADE",
            AppStoreNotificationSubtype::Downgrade => "DOWNGRADE",
            AppStoreNotificationSubtype::AutoRenewEnabled => "AUTO_RENEW_ENABLED",
            AppStoreNotificationSubtype::AutoRenewDisabled => "AUTO_RENEW_DISABLED",
            AppStoreNotificationSubtype::InitialBuy => "INITIAL_BUY",
            AppStoreNotificationSubtype::Resubscribe => "RESUBSCRIBE",
            AppStoreNotificationSubtype::OfferRedeemed => "OFFER_REDEEMED",
            AppStoreNotificationSubtype::Pending => "PENDING",
            AppStoreNotificationSubtype::Accepted => "ACCEPTED",
            AppStoreNotificationSubtype::Summary => "SUMMARY",
            AppStoreNotificationSubtype::Failure => "FAILURE",
        }
    }
}

impl fmt::Display for AppStoreNotificationSubtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
