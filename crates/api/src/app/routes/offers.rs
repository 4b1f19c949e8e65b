use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route("/:id/offers", get(get_product_offers))
}

/// Cached offers, refreshed from upstream first on a best-effort basis.
pub async fn get_product_offers(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = dto::parse_product_id(&id)?;
    let offers = services
        .product_offers(id)
        .await?
        .into_iter()
        .map(dto::offer_to_json)
        .collect::<Vec<_>>();
    Ok(Json(offers))
}
