//! SKU handlers.
//!
//! POST /generate_sku      generate one SKU (and barcode when enabled)
//! POST /generate_batch    generate a batch and export it as CSV
//! GET  /api/skus/:sku     look up a reserved SKU
//! GET  /api/health        liveness

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::Path;
use axum::{Extension, Json};
use serde_json::json;

use super::error::AppError;
use crate::error::SkuError;
use crate::registry::SkuRecord;
use crate::service::{BatchRequest, BatchResult, GeneratedSku, ProductRequest, SkuService};

pub async fn generate_sku(
    Extension(service): Extension<Arc<SkuService>>,
    payload: Result<Json<ProductRequest>, JsonRejection>,
) -> Result<Json<GeneratedSku>, AppError> {
    let Json(request) = payload.map_err(rejection)?;
    Ok(Json(service.generate(&request).await?))
}

pub async fn generate_batch(
    Extension(service): Extension<Arc<SkuService>>,
    payload: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<BatchResult>, AppError> {
    let Json(request) = payload.map_err(rejection)?;
    Ok(Json(service.generate_batch(&request).await?))
}

pub async fn get_sku(
    Extension(service): Extension<Arc<SkuService>>,
    Path(sku): Path<String>,
) -> Result<Json<SkuRecord>, AppError> {
    Ok(Json(service.lookup(&sku).await?))
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn rejection(err: JsonRejection) -> AppError {
    AppError(SkuError::InvalidInput(err.body_text()))
}
