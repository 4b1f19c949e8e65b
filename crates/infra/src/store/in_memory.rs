use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use aggregator_core::{OfferId, ProductId};
use aggregator_products::{ExternalOffer, Offer, Product, ProductUpdate, ReconcileSummary, reconcile};

use super::{CatalogStore, StoreError};

#[derive(Debug, Default)]
struct Catalog {
    products: HashMap<ProductId, Product>,
    /// Keyed by offer id across all products, like the primary key in Postgres.
    offers: HashMap<OfferId, Offer>,
}

/// In-memory catalog store for tests/dev.
///
/// A single lock covers products and offers, so every operation is atomic.
#[derive(Debug, Default)]
pub struct InMemoryCatalogStore {
    inner: RwLock<Catalog>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Catalog>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Database("in-memory catalog lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Catalog>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Database("in-memory catalog lock poisoned".to_string()))
    }
}

fn sorted_products<'a>(products: impl Iterator<Item = &'a Product>) -> Vec<Product> {
    let mut out: Vec<Product> = products.cloned().collect();
    out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    out
}

#[async_trait::async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn insert_product(&self, product: &Product) -> Result<(), StoreError> {
        let mut catalog = self.write()?;
        if catalog.products.contains_key(&product.id) {
            return Err(StoreError::Database(format!("duplicate product id {}", product.id)));
        }
        catalog.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.read()?.products.get(&id).cloned())
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        Ok(sorted_products(self.read()?.products.values()))
    }

    async fn list_registered_products(&self) -> Result<Vec<Product>, StoreError> {
        let catalog = self.read()?;
        Ok(sorted_products(catalog.products.values().filter(|p| p.is_registered())))
    }

    async fn update_product(
        &self,
        id: ProductId,
        update: ProductUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<Product>, StoreError> {
        let mut catalog = self.write()?;
        let Some(product) = catalog.products.get_mut(&id) else {
            return Ok(None);
        };
        product.apply_update(update, now)?;
        Ok(Some(product.clone()))
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool, StoreError> {
        let mut catalog = self.write()?;
        if catalog.products.remove(&id).is_none() {
            return Ok(false);
        }
        catalog.offers.retain(|_, offer| offer.product_id != id);
        Ok(true)
    }

    async fn list_offers(&self, product_id: ProductId) -> Result<Vec<Offer>, StoreError> {
        let catalog = self.read()?;
        let mut offers: Vec<Offer> = catalog
            .offers
            .values()
            .filter(|o| o.product_id == product_id)
            .cloned()
            .collect();
        offers.sort_by_key(|o| o.id);
        Ok(offers)
    }

    async fn reconcile_offers(
        &self,
        product_id: ProductId,
        incoming: &[ExternalOffer],
        now: DateTime<Utc>,
    ) -> Result<ReconcileSummary, StoreError> {
        let mut catalog = self.write()?;
        if !catalog.products.contains_key(&product_id) {
            return Err(StoreError::NotFound(product_id));
        }

        let plan = reconcile::plan(
            catalog.offers.values().filter(|o| o.product_id == product_id),
            incoming,
        );

        // Check every insert before mutating anything.
        for external in &plan.inserts {
            if let Some(existing) = catalog.offers.get(&external.id) {
                return Err(StoreError::Conflict {
                    offer_id: external.id,
                    owner: existing.product_id,
                });
            }
        }

        plan.apply(product_id, &mut catalog.offers, now);
        Ok(plan.summary())
    }
}
