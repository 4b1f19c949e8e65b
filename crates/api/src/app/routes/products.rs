use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_product).get(list_products))
        .route("/:id", get(get_product).put(update_product).delete(delete_product))
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateProductRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let product = services.create_product(body.into()).await?;
    Ok((StatusCode::CREATED, Json(dto::product_to_json(product))))
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
) -> Result<impl IntoResponse, ApiError> {
    let items = services
        .list_products()
        .await?
        .into_iter()
        .map(dto::product_to_json)
        .collect::<Vec<_>>();
    Ok(Json(items))
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = dto::parse_product_id(&id)?;
    let product = services.get_product(id).await?;
    Ok(Json(dto::product_to_json(product)))
}

pub async fn update_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateProductRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = dto::parse_product_id(&id)?;
    let product = services.update_product(id, body.into()).await?;
    Ok(Json(dto::product_to_json(product)))
}

pub async fn delete_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = dto::parse_product_id(&id)?;
    services.delete_product(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
