//! Buyable aggregate entity.
//!
//! A Buyable is a sellable catalog item. Subscription buyables renew on a
//! billing period; one-time buyables are consumed by a single purchase.
//! Store listings (App Store products, Play Store SKUs) reference buyables
//! by `name`, which is the product key clients send with a receipt.
//!
//! # Design Decisions
//!
//! - **Name is the lookup key**: unique per catalog, matched against the
//!   `product_key` arriving from mobile clients
//! - **Money in micros**: catalog prices use i64 micro-units (not floats)
//! - **Subscription fields are conditional**: `period` and `trial_days`
//!   must be present for subscription types and absent for one-time items

use crate::domain::foundation::{BuyableId, DomainError, Money, Timestamp, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::SubscriptionPeriod;

/// Kind of catalog item, determining purchase and renewal behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuyableType {
    /// Seat-based subscription billed to an organization.
    CorporateSubscription,
    /// Subscription billed to an individual user.
    PersonalSubscription,
    /// Consumed by a single purchase, never renews.
    OneTimePurchase,
}

impl BuyableType {
    /// True for types that establish a renewing subscription.
    pub fn is_subscription(&self) -> bool {
        !matches!(self, BuyableType::OneTimePurchase)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BuyableType::CorporateSubscription => "corporate_subscription",
            BuyableType::PersonalSubscription => "personal_subscription",
            BuyableType::OneTimePurchase => "one_time_purchase",
        }
    }
}

impl fmt::Display for BuyableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BuyableType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "corporate_subscription" => Ok(BuyableType::CorporateSubscription),
            "personal_subscription" => Ok(BuyableType::PersonalSubscription),
            "one_time_purchase" => Ok(BuyableType::OneTimePurchase),
            other => Err(ValidationError::invalid_format(
                "buyable_type",
                format!("unknown buyable type '{}'", other),
            )),
        }
    }
}

/// Buyable aggregate - a sellable catalog item.
///
/// # Invariants
///
/// - `name` is unique among non-deleted buyables (database level)
/// - Subscription types carry `period` and `trial_days`; one-time items
///   carry neither
/// - `special_offer_root` points at a root buyable, never at another offer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Buyable {
    /// Unique identifier for this catalog item.
    pub id: BuyableId,

    /// Product key referenced by store listings and client requests.
    pub name: String,

    /// Kind of item: subscription or one-time.
    pub buyable_type: BuyableType,

    /// Catalog list price.
    pub price: Money,

    /// Billing period. Present iff this is a subscription type.
    pub period: Option<SubscriptionPeriod>,

    /// Free trial length granted on first subscription. Present iff this
    /// is a subscription type; zero means no trial.
    pub trial_days: Option<u32>,

    /// Root buyable this item discounts, if it is a special offer.
    pub special_offer_root: Option<BuyableId>,

    /// Whether the item is currently sellable.
    pub is_active: bool,

    /// When the item was added to the catalog.
    pub created_at: Timestamp,

    /// When the item was last updated.
    pub updated_at: Timestamp,
}

impl Buyable {
    /// Create a subscription catalog item.
    ///
    /// # Errors
    ///
    /// Returns error if the name is empty or `buyable_type` is not a
    /// subscription type.
    pub fn subscription(
        id: BuyableId,
        name: String,
        buyable_type: BuyableType,
        price: Money,
        period: SubscriptionPeriod,
        trial_days: u32,
    ) -> Result<Self, DomainError> {
        if name.trim().is_empty() {
            return Err(DomainError::validation("name", "Buyable name cannot be empty"));
        }
        if !buyable_type.is_subscription() {
            return Err(DomainError::validation(
                "buyable_type",
                "One-time items cannot carry a billing period",
            ));
        }

        let now = Timestamp::now();
        Ok(Self {
            id,
            name,
            buyable_type,
            price,
            period: Some(period),
            trial_days: Some(trial_days),
            special_offer_root: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// Create a one-time catalog item.
    ///
    /// # Errors
    ///
    /// Returns error if the name is empty.
    pub fn one_time(id: BuyableId, name: String, price: Money) -> Result<Self, DomainError> {
        if name.trim().is_empty() {
            return Err(DomainError::validation("name", "Buyable name cannot be empty"));
        }

        let now = Timestamp::now();
        Ok(Self {
            id,
            name,
            buyable_type: BuyableType::OneTimePurchase,
            price,
            period: None,
            trial_days: None,
            special_offer_root: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// Mark this item as a special offer discounting `root`.
    ///
    /// # Errors
    ///
    /// Returns error if the item would reference itself.
    pub fn mark_special_offer(&mut self, root: BuyableId) -> Result<(), DomainError> {
        if root == self.id {
            return Err(DomainError::validation(
                "special_offer_root",
                "A special offer cannot reference itself",
            ));
        }
        self.special_offer_root = Some(root);
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// True for items that establish a renewing subscription.
    pub fn is_subscription(&self) -> bool {
        self.buyable_type.is_subscription()
    }

    /// True for items consumed by a single purchase.
    pub fn is_one_time(&self) -> bool {
        self.buyable_type == BuyableType::OneTimePurchase
    }

    /// Price the store charges for this item.
    ///
    /// Currently the catalog list price; store-territory price lists are
    /// resolved by the vendor adapters when enrichment is enabled.
    pub fn store_price(&self) -> Money {
        self.price.clone()
    }

    /// Whether a first subscription to this item starts with a trial.
    pub fn grants_trial(&self) -> bool {
        self.trial_days.unwrap_or(0) > 0
    }

    /// Trial length in days, zero when the item grants none.
    pub fn trial_length_days(&self) -> u32 {
        self.trial_days.unwrap_or(0)
    }
}
