use axum::Router;

pub mod offers;
pub mod products;
pub mod system;

/// Router for all catalog endpoints.
pub fn router() -> Router {
    Router::new().nest("/products", products::router().merge(offers::router()))
}
