use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use aggregator_core::{Entity, OfferId, ProductId};

/// An offer as reported by the upstream offers service.
///
/// Transient: the unit the client returns and the reconciler consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalOffer {
    pub id: OfferId,
    /// Price in the smallest currency unit (e.g. cents).
    pub price: i64,
    pub items_in_stock: i64,
}

/// A cached offer belonging to exactly one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub product_id: ProductId,
    pub price: i64,
    pub items_in_stock: i64,
    pub last_seen_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Offer {
    pub fn from_external(product_id: ProductId, external: &ExternalOffer, now: DateTime<Utc>) -> Self {
        Self {
            id: external.id,
            product_id,
            price: external.price,
            items_in_stock: external.items_in_stock,
            last_seen_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when price and stock already equal the upstream values.
    pub fn matches(&self, external: &ExternalOffer) -> bool {
        self.price == external.price && self.items_in_stock == external.items_in_stock
    }

    pub fn apply_external(&mut self, external: &ExternalOffer, now: DateTime<Utc>) {
        self.price = external.price;
        self.items_in_stock = external.items_in_stock;
        self.last_seen_at = now;
        self.updated_at = now;
    }

    pub fn in_stock(&self) -> bool {
        self.items_in_stock > 0
    }
}

impl Entity for Offer {
    type Id = OfferId;

    fn id(&self) -> OfferId {
        self.id
    }
}

impl Entity for ExternalOffer {
    type Id = OfferId;

    fn id(&self) -> OfferId {
        self.id
    }
}
