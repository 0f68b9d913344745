//! Subsync - Subscription Reconciliation Engine
//!
//! Records mobile in-app purchases, verifies store receipts, and keeps
//! user subscriptions reconciled with what Apple and Google report.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
