//! Composition root: store, upstream client, sync service and scheduler.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use aggregator_core::ProductId;
use aggregator_infra::config::AppConfig;
use aggregator_infra::store::{CatalogStore, InMemoryCatalogStore, PostgresCatalogStore};
use aggregator_infra::sync::{OfferSync, SchedulerError, SyncScheduler};
use aggregator_infra::{OffersClient, OffersProvider};
use aggregator_products::{NewProduct, Offer, Product, ProductUpdate};

use crate::app::errors::ApiError;

pub struct AppServices {
    store: Arc<dyn CatalogStore>,
    offers: Arc<dyn OffersProvider>,
    sync: Arc<OfferSync>,
    scheduler: SyncScheduler,
}

/// Build services from configuration.
///
/// `DATABASE_URL` selects Postgres; without it the in-memory store is used.
pub async fn build_services(config: &AppConfig) -> Result<AppServices, ApiError> {
    let client = Arc::new(OffersClient::new(&config.offers)?);

    let store: Arc<dyn CatalogStore> = match config.database_url.as_deref() {
        Some(url) => match PostgresCatalogStore::connect(url).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                OffersClient::close(&client);
                return Err(e.into());
            }
        },
        None => {
            warn!("DATABASE_URL not set; using in-memory store (data is lost on restart)");
            Arc::new(InMemoryCatalogStore::new())
        }
    };

    Ok(AppServices::new(store, client, config.sync_schedule.clone()))
}

impl AppServices {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        offers: Arc<dyn OffersProvider>,
        schedule: impl Into<String>,
    ) -> Self {
        let sync = Arc::new(OfferSync::new(store.clone(), offers.clone()));
        let scheduler = SyncScheduler::new(sync.clone(), schedule);
        Self {
            store,
            offers,
            sync,
            scheduler,
        }
    }

    pub fn sync(&self) -> &Arc<OfferSync> {
        &self.sync
    }

    pub fn scheduler(&self) -> &SyncScheduler {
        &self.scheduler
    }

    pub async fn start_background(&self) -> Result<(), SchedulerError> {
        self.scheduler.start().await
    }

    /// Stop scheduled syncs while requests may still be in flight. The
    /// upstream client and the store stay open.
    pub async fn stop_background(&self) {
        self.scheduler.stop().await;
    }

    /// Stop the scheduler, then release the upstream client and the store.
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        self.scheduler.stop().await;
        self.offers.close().await;
        self.store.close().await;
        info!("services shut down");
    }

    /// Register upstream first; nothing is persisted if registration fails.
    pub async fn create_product(&self, new: NewProduct) -> Result<Product, ApiError> {
        new.validate()?;

        let id = ProductId::new();
        let external_id = self
            .offers
            .register_product(id, &new.name, new.description.as_deref())
            .await?;

        let product = Product::create(id, new, Some(external_id), Utc::now())?;
        self.store.insert_product(&product).await?;

        info!(product_id = %product.id, external_id = %external_id, "product created");
        Ok(product)
    }

    pub async fn list_products(&self) -> Result<Vec<Product>, ApiError> {
        Ok(self.store.list_products().await?)
    }

    pub async fn get_product(&self, id: ProductId) -> Result<Product, ApiError> {
        self.store.get_product(id).await?.ok_or_else(ApiError::not_found)
    }

    pub async fn update_product(&self, id: ProductId, update: ProductUpdate) -> Result<Product, ApiError> {
        update.validate()?;
        self.store
            .update_product(id, update, Utc::now())
            .await?
            .ok_or_else(ApiError::not_found)
    }

    pub async fn delete_product(&self, id: ProductId) -> Result<(), ApiError> {
        if !self.store.delete_product(id).await? {
            return Err(ApiError::not_found());
        }
        self.sync.locks().forget(id);
        info!(product_id = %id, "product deleted");
        Ok(())
    }

    pub async fn product_offers(&self, id: ProductId) -> Result<Vec<Offer>, ApiError> {
        Ok(self.sync.offers_for_product(id).await?)
    }
}
