//! Purchase aggregate entity.
//!
//! A Purchase is a user's acquisition of one or more catalog items. Store
//! subscriptions keep appending renewal transactions to their original
//! purchase, so the purchase is the stable root that webhook notifications
//! are resolved against.
//!
//! # Design Decisions
//!
//! - **Subscriptions are never bundled**: a purchase containing a
//!   subscription item contains only that item
//! - **Apple's root id lives here**: App Store notifications reference an
//!   `originalTransactionId`; it is stamped on the purchase at first sale
//!   so later notifications can find their way back

use crate::domain::foundation::{BuyableId, DomainError, PurchaseId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

use super::PaymentVendor;
use crate::domain::catalog::Buyable;

/// Line item of a purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchasedBuyable {
    pub buyable_id: BuyableId,
    pub quantity: u32,
}

/// Purchase aggregate - a user's acquisition of catalog items.
///
/// # Invariants
///
/// - Contains at least one item
/// - If any item is a subscription, it is the only item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Purchase {
    /// Unique identifier for this purchase.
    pub id: PurchaseId,

    /// User who made the purchase.
    pub user_id: UserId,

    /// Items acquired.
    pub items: Vec<PurchasedBuyable>,

    /// Vendor reference to a stored payment instrument, if any.
    pub stored_payment_method_id: Option<String>,

    /// Vendor the purchase was made through.
    pub vendor: Option<PaymentVendor>,

    /// Apple's original transaction id for the subscription family this
    /// purchase started. Absent for Google and one-time purchases.
    pub original_transaction_id: Option<String>,

    /// When the purchase was made.
    pub created_at: Timestamp,

    /// When the purchase was last updated.
    pub updated_at: Timestamp,
}

impl Purchase {
    /// Create a purchase of the given catalog items.
    ///
    /// # Errors
    ///
    /// Returns error if `buyables` is empty, or a subscription item is
    /// bundled with anything else.
    pub fn create(
        id: PurchaseId,
        user_id: UserId,
        buyables: &[&Buyable],
        vendor: Option<PaymentVendor>,
        stored_payment_method_id: Option<String>,
        original_transaction_id: Option<String>,
    ) -> Result<Self, DomainError> {
        if buyables.is_empty() {
            return Err(DomainError::validation(
                "buyables",
                "A purchase must contain at least one item",
            ));
        }
        if buyables.iter().any(|b| b.is_subscription()) && buyables.len() > 1 {
            return Err(DomainError::validation(
                "buyables",
                "You cannot add additional buyables to subscriptions",
            ));
        }

        let now = Timestamp::now();
        Ok(Self {
            id,
            user_id,
            items: buyables
                .iter()
                .map(|b| PurchasedBuyable {
                    buyable_id: b.id,
                    quantity: 1,
                })
                .collect(),
            stored_payment_method_id,
            vendor,
            original_transaction_id,
            created_at: now,
            updated_at: now,
        })
    }

    /// Ids of the purchased items.
    pub fn buyable_ids(&self) -> impl Iterator<Item = BuyableId> + '_ {
        self.items.iter().map(|item| item.buyable_id)
    }

    /// Whether this purchase acquired the given catalog item.
    pub fn contains(&self, buyable_id: BuyableId) -> bool {
        self.items.iter().any(|item| item.buyable_id == buyable_id)
    }
}
