//! Client for the upstream offers service.
//!
//! The upstream issues short-lived access tokens in exchange for a long-lived
//! refresh credential. [`OffersClient`] caches the access token, re-authenticates
//! once when a request is rejected with `401`, and retries that request exactly once.

mod client;
mod error;

pub use client::OffersClient;
pub use error::OffersClientError;

use std::sync::Arc;

use aggregator_core::{ExternalProductId, ProductId};
use aggregator_products::ExternalOffer;

/// Upstream operations the rest of the system depends on.
///
/// Implemented by [`OffersClient`]; tests substitute their own providers.
#[async_trait::async_trait]
pub trait OffersProvider: Send + Sync {
    /// Register a locally created product and return the upstream reference.
    async fn register_product(
        &self,
        product_id: ProductId,
        name: &str,
        description: Option<&str>,
    ) -> Result<ExternalProductId, OffersClientError>;

    /// Fetch the complete current offer snapshot for a registered product.
    async fn fetch_offers(
        &self,
        external_id: ExternalProductId,
    ) -> Result<Vec<ExternalOffer>, OffersClientError>;

    /// Release the underlying connection pool. Later calls fail with
    /// [`OffersClientError::Closed`].
    async fn close(&self) {}
}

#[async_trait::async_trait]
impl<P> OffersProvider for Arc<P>
where
    P: OffersProvider + ?Sized,
{
    async fn register_product(
        &self,
        product_id: ProductId,
        name: &str,
        description: Option<&str>,
    ) -> Result<ExternalProductId, OffersClientError> {
        (**self).register_product(product_id, name, description).await
    }

    async fn fetch_offers(
        &self,
        external_id: ExternalProductId,
    ) -> Result<Vec<ExternalOffer>, OffersClientError> {
        (**self).fetch_offers(external_id).await
    }

    async fn close(&self) {
        (**self).close().await
    }
}
