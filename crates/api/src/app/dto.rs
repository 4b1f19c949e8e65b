use serde::Deserialize;

use aggregator_core::ProductId;
use aggregator_products::{NewProduct, Offer, Product, ProductUpdate};

use crate::app::errors::ApiError;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl From<CreateProductRequest> for NewProduct {
    fn from(req: CreateProductRequest) -> Self {
        NewProduct {
            name: req.name,
            description: req.description,
        }
    }
}

/// Full replacement; omitting `description` clears it.
#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl From<UpdateProductRequest> for ProductUpdate {
    fn from(req: UpdateProductRequest) -> Self {
        ProductUpdate {
            name: req.name,
            description: req.description,
        }
    }
}

// -------------------------
// Helpers
// -------------------------

pub fn parse_product_id(raw: &str) -> Result<ProductId, ApiError> {
    raw.parse::<ProductId>().map_err(ApiError::from)
}

// -------------------------
// Response mapping
// -------------------------

pub fn product_to_json(p: Product) -> serde_json::Value {
    serde_json::json!({
        "id": p.id.to_string(),
        "name": p.name,
        "description": p.description,
        "created_at": p.created_at.to_rfc3339(),
        "updated_at": p.updated_at.to_rfc3339(),
    })
}

pub fn offer_to_json(o: Offer) -> serde_json::Value {
    serde_json::json!({
        "id": o.id.to_string(),
        "product_id": o.product_id.to_string(),
        "price": o.price,
        "items_in_stock": o.items_in_stock,
    })
}
