//! Infrastructure layer: configuration, upstream client, storage and sync.

pub mod config;
pub mod offers_client;
pub mod store;
pub mod sync;

pub use config::{AppConfig, ConfigError};
pub use offers_client::{OffersClient, OffersClientError, OffersProvider};
pub use store::{CatalogStore, InMemoryCatalogStore, PostgresCatalogStore, StoreError};
pub use sync::{OfferSync, RefreshOutcome, SyncError, SyncScheduler, TickReport};
