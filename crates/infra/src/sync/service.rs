use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use aggregator_core::{ExternalProductId, ProductId};
use aggregator_products::{Offer, Product, ReconcileSummary};

use super::locks::ProductLocks;
use crate::offers_client::{OffersClientError, OffersProvider};
use crate::store::{CatalogStore, StoreError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("product not found: {0}")]
    NotFound(ProductId),

    #[error("product {0} is not registered with the offers service")]
    NotRegistered(ProductId),

    #[error(transparent)]
    Client(#[from] OffersClientError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of one scheduled pass over all registered products.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub products: usize,
    pub synced: usize,
    pub failed: Vec<ProductId>,
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl TickReport {
    fn record(&mut self, summary: &ReconcileSummary) {
        self.synced += 1;
        self.inserted += summary.inserted;
        self.updated += summary.updated;
        self.deleted += summary.deleted;
    }
}

/// What the request path did before serving cached offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed(ReconcileSummary),
    /// Local-only product; nothing to fetch.
    NotRegistered,
    /// Another sync of this product is running.
    Busy,
    /// Upstream or storage failed; cached data is served unchanged.
    Failed,
}

/// Fetches upstream snapshots and reconciles them into the catalog store.
///
/// Shared by the scheduler and the request path. Syncs of the same product
/// never overlap within the process.
pub struct OfferSync {
    store: Arc<dyn CatalogStore>,
    provider: Arc<dyn OffersProvider>,
    locks: ProductLocks,
}

impl OfferSync {
    pub fn new(store: Arc<dyn CatalogStore>, provider: Arc<dyn OffersProvider>) -> Self {
        Self {
            store,
            provider,
            locks: ProductLocks::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn CatalogStore> {
        &self.store
    }

    pub fn provider(&self) -> &Arc<dyn OffersProvider> {
        &self.provider
    }

    pub fn locks(&self) -> &ProductLocks {
        &self.locks
    }

    /// Sync one product, waiting for any running sync of it to finish first.
    pub async fn sync_product(&self, product: &Product) -> Result<ReconcileSummary, SyncError> {
        let external_id = product
            .external_id
            .ok_or(SyncError::NotRegistered(product.id))?;
        let _guard = self.locks.lock(product.id).await;
        self.fetch_and_reconcile(product.id, external_id).await
    }

    #[instrument(skip(self), fields(product_id = %product_id, external_id = %external_id), err)]
    async fn fetch_and_reconcile(
        &self,
        product_id: ProductId,
        external_id: ExternalProductId,
    ) -> Result<ReconcileSummary, SyncError> {
        let snapshot = self.provider.fetch_offers(external_id).await?;
        let summary = self
            .store
            .reconcile_offers(product_id, &snapshot, Utc::now())
            .await?;

        info!(
            inserted = summary.inserted,
            updated = summary.updated,
            deleted = summary.deleted,
            unchanged = summary.unchanged,
            "synced offers for product"
        );
        Ok(summary)
    }

    /// One scheduled pass: sync every registered product, sequentially.
    ///
    /// A failing product is logged and skipped. Only a failure to list
    /// products aborts the pass.
    pub async fn run_tick(&self) -> Result<TickReport, SyncError> {
        info!("starting offer sync");

        let products = match self.store.list_registered_products().await {
            Ok(products) => products,
            Err(e) => {
                error!(error = %e, "failed to list registered products, skipping sync cycle");
                return Err(e.into());
            }
        };

        let mut report = TickReport {
            products: products.len(),
            ..TickReport::default()
        };

        if products.is_empty() {
            info!("no registered products to sync");
            return Ok(report);
        }

        info!(products = products.len(), "syncing offers");
        for product in &products {
            match self.sync_product(product).await {
                Ok(summary) => report.record(&summary),
                Err(e) => {
                    error!(product_id = %product.id, error = %e, "failed to sync offers for product");
                    report.failed.push(product.id);
                }
            }
        }

        info!(
            synced = report.synced,
            failed = report.failed.len(),
            inserted = report.inserted,
            updated = report.updated,
            deleted = report.deleted,
            "offer sync complete"
        );
        Ok(report)
    }

    /// Best-effort refresh on the request path. Never fails.
    pub async fn refresh_if_registered(&self, product: &Product) -> RefreshOutcome {
        let Some(external_id) = product.external_id else {
            return RefreshOutcome::NotRegistered;
        };

        let Some(_guard) = self.locks.try_lock(product.id) else {
            debug!(product_id = %product.id, "sync already running, serving cached offers");
            return RefreshOutcome::Busy;
        };

        match self.fetch_and_reconcile(product.id, external_id).await {
            Ok(summary) => RefreshOutcome::Refreshed(summary),
            Err(e) => {
                warn!(product_id = %product.id, error = %e, "on-demand refresh failed, serving cached offers");
                RefreshOutcome::Failed
            }
        }
    }

    /// Offers for a product, refreshed from upstream first when possible.
    pub async fn offers_for_product(&self, product_id: ProductId) -> Result<Vec<Offer>, SyncError> {
        let product = self
            .store
            .get_product(product_id)
            .await?
            .ok_or(SyncError::NotFound(product_id))?;

        self.refresh_if_registered(&product).await;

        let offers = self.store.list_offers(product_id).await?;
        let in_stock = offers.iter().filter(|o| o.in_stock()).count();
        info!(
            product_id = %product_id,
            name = %product.name,
            offers = offers.len(),
            in_stock,
            out_of_stock = offers.len() - in_stock,
            "retrieved offers for product"
        );
        Ok(offers)
    }
}
