use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use aggregator_core::ProductId;

/// Per-product mutual exclusion for offer syncs within this process.
///
/// The scheduled path waits for the lock; the request path only tries it.
#[derive(Debug, Default)]
pub struct ProductLocks {
    inner: Mutex<HashMap<ProductId, Arc<AsyncMutex<()>>>>,
}

pub type ProductGuard = OwnedMutexGuard<()>;

impl ProductLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, product_id: ProductId) -> Arc<AsyncMutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.entry(product_id).or_default().clone()
    }

    /// Wait until no other sync of `product_id` is running.
    pub async fn lock(&self, product_id: ProductId) -> ProductGuard {
        self.handle(product_id).lock_owned().await
    }

    /// `None` when a sync of `product_id` is already running.
    pub fn try_lock(&self, product_id: ProductId) -> Option<ProductGuard> {
        self.handle(product_id).try_lock_owned().ok()
    }

    /// Drop the entry for a deleted product. Holders of a guard are unaffected.
    pub fn forget(&self, product_id: ProductId) {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.remove(&product_id);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
