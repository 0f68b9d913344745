//! Buyable repository port (catalog read side).
//!
//! The catalog is managed outside this service; billing only resolves
//! buyables by the product keys that receipts and notifications carry.
//!
//! # Design
//!
//! - **Read-only**: catalog writes happen through seeds and admin tooling
//! - **Soft-delete aware**: deleted buyables are invisible to lookups
//!
//! # Example
//!
//! ```ignore
//! async fn resolve_product(
//!     repo: &dyn BuyableRepository,
//!     product_key: &str,
//! ) -> Result<Buyable, PurchaseError> {
//!     repo.find_by_name(product_key)
//!         .await?
//!         .ok_or_else(|| PurchaseError::buyable_not_found(product_key))
//! }
//! ```

use crate::domain::catalog::Buyable;
use crate::domain::foundation::{BuyableId, DomainError};
use async_trait::async_trait;

/// Repository port for catalog lookups.
#[async_trait]
pub trait BuyableRepository: Send + Sync {
    /// Find a buyable by its unique product name.
    ///
    /// Returns `None` if no live buyable carries the name.
    async fn find_by_name(&self, name: &str) -> Result<Option<Buyable>, DomainError>;

    /// Find a buyable by id.
    async fn find_by_id(&self, id: &BuyableId) -> Result<Option<Buyable>, DomainError>;

    /// Fetch the buyables behind a purchase's line items.
    ///
    /// Missing ids are skipped; the result is ordered by creation time.
    async fn find_by_ids(&self, ids: &[BuyableId]) -> Result<Vec<Buyable>, DomainError>;
}
