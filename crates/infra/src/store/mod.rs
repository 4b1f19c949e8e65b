//! Persistence boundary for products and cached offers.
//!
//! - `in_memory`: map-backed store for tests/dev
//! - `postgres`: SQLx/Postgres store used in production

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryCatalogStore;
pub use postgres::PostgresCatalogStore;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use aggregator_core::{DomainError, OfferId, ProductId};
use aggregator_products::{ExternalOffer, Offer, Product, ProductUpdate, ReconcileSummary};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The product the operation is scoped to does not exist.
    #[error("product not found: {0}")]
    NotFound(ProductId),

    /// An offer id in the snapshot is already cached under a different product.
    #[error("offer {offer_id} already belongs to product {owner}")]
    Conflict { offer_id: OfferId, owner: ProductId },

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("database error: {0}")]
    Database(String),
}

/// Storage for products and their cached offers.
///
/// Listing order: products by creation time, offers by id.
#[async_trait::async_trait]
pub trait CatalogStore: Send + Sync {
    async fn insert_product(&self, product: &Product) -> Result<(), StoreError>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    async fn list_products(&self) -> Result<Vec<Product>, StoreError>;

    /// Products that carry an upstream reference.
    async fn list_registered_products(&self) -> Result<Vec<Product>, StoreError>;

    /// Replace name and description. `Ok(None)` when the product does not exist.
    async fn update_product(
        &self,
        id: ProductId,
        update: ProductUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<Product>, StoreError>;

    /// Delete a product and all of its offers. `Ok(false)` when it did not exist.
    async fn delete_product(&self, id: ProductId) -> Result<bool, StoreError>;

    async fn list_offers(&self, product_id: ProductId) -> Result<Vec<Offer>, StoreError>;

    /// Make the cached offers of `product_id` equal `incoming`, atomically.
    ///
    /// Only rows belonging to `product_id` are read or written. On any error
    /// nothing is changed.
    async fn reconcile_offers(
        &self,
        product_id: ProductId,
        incoming: &[ExternalOffer],
        now: DateTime<Utc>,
    ) -> Result<ReconcileSummary, StoreError>;

    /// Release connections. Idempotent.
    async fn close(&self) {}
}

#[async_trait::async_trait]
impl<S> CatalogStore for Arc<S>
where
    S: CatalogStore + ?Sized,
{
    async fn insert_product(&self, product: &Product) -> Result<(), StoreError> {
        (**self).insert_product(product).await
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        (**self).get_product(id).await
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        (**self).list_products().await
    }

    async fn list_registered_products(&self) -> Result<Vec<Product>, StoreError> {
        (**self).list_registered_products().await
    }

    async fn update_product(
        &self,
        id: ProductId,
        update: ProductUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<Product>, StoreError> {
        (**self).update_product(id, update, now).await
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool, StoreError> {
        (**self).delete_product(id).await
    }

    async fn list_offers(&self, product_id: ProductId) -> Result<Vec<Offer>, StoreError> {
        (**self).list_offers(product_id).await
    }

    async fn reconcile_offers(
        &self,
        product_id: ProductId,
        incoming: &[ExternalOffer],
        now: DateTime<Utc>,
    ) -> Result<ReconcileSummary, StoreError> {
        (**self).reconcile_offers(product_id, incoming, now).await
    }

    async fn close(&self) {
        (**self).close().await
    }
}
