//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (value objects, IDs, enums, errors)
//! - `catalog` - Buyables, billing periods, and trial rules
//! - `ledger` - Purchases, payment transactions, and vendors
//! - `subscription` - User subscription lifecycle and reconciliation
//! - `notifications` - Vendor webhook classification and events

pub mod catalog;
pub mod foundation;
pub mod ledger;
pub mod notifications;
pub mod subscription;
