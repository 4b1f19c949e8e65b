use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use aggregator_core::DomainError;
use aggregator_infra::{OffersClientError, StoreError, SyncError};

/// Everything a handler can fail with.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Upstream(#[from] OffersClientError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl ApiError {
    pub fn not_found() -> Self {
        Self::Domain(DomainError::not_found())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Domain(e) => domain_error_to_response(e),
            ApiError::Upstream(e) => upstream_error_to_response(e),
            ApiError::Store(e) => store_error_to_response(e),
            ApiError::Sync(e) => match e {
                SyncError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", "product not found"),
                SyncError::NotRegistered(id) => json_error(
                    StatusCode::CONFLICT,
                    "not_registered",
                    format!("product {id} is not registered with the offers service"),
                ),
                SyncError::Client(e) => upstream_error_to_response(e),
                SyncError::Store(e) => store_error_to_response(e),
            },
        }
    }
}

fn domain_error_to_response(err: DomainError) -> Response {
    match err {
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "product not found"),
    }
}

fn upstream_error_to_response(err: OffersClientError) -> Response {
    error!(error = %err, "offers service call failed");
    json_error(StatusCode::BAD_GATEWAY, "upstream_error", err.to_string())
}

fn store_error_to_response(err: StoreError) -> Response {
    match err {
        StoreError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", "product not found"),
        StoreError::Conflict { .. } => json_error(StatusCode::CONFLICT, "conflict", err.to_string()),
        StoreError::Domain(e) => domain_error_to_response(e),
        StoreError::Database(msg) => {
            error!(error = %msg, "storage failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "storage unavailable")
        }
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
