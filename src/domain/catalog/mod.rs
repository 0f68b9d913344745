//! Catalog domain module.
//!
//! Sellable items and their billing periods. Everything a store receipt
//! can reference lives here.
//!
//! # Module Structure
//!
//! - `buyable` - Buyable aggregate entity and item types
//! - `period` - SubscriptionPeriod billing cycles

mod buyable;
mod period;

pub use buyable::{Buyable, BuyableType};
pub use period::SubscriptionPeriod;
