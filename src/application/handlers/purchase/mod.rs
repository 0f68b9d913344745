//! Purchase handlers - receipt submission and verification strategies.

pub mod app_store;
pub mod google_play;
pub mod make_purchase;
pub mod strategy;

pub use app_store::AppStoreStrategy;
pub use google_play::GooglePlayStrategy;
pub use make_purchase::{
    MakePurchaseCommand, MakePurchaseHandler, MakePurchaseResult, PurchaseRecordedEvent,
};
pub use strategy::{
    PurchaseStrategy, PurchaseStrategyFactory, ReceiptSubmission, StagedPurchase,
    StrategyServices, VerifiedReceipt,
};
