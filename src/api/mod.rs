//! REST API for SKU generation.

pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Extension, Router};
use tower_http::services::ServeDir;

use crate::service::SkuService;

pub use error::AppError;

/// Build the router: generation endpoints plus static serving of rendered
/// barcodes and CSV exports.
pub fn create_router(service: Arc<SkuService>) -> Router {
    let mut router = Router::new()
        .route("/api/health", get(routes::health))
        .route("/generate_sku", post(routes::generate_sku))
        .route("/generate_batch", post(routes::generate_batch))
        .route("/api/skus/:sku", get(routes::get_sku));

    if let Some(renderer) = service.barcodes() {
        router = router.nest_service(renderer.url_prefix(), ServeDir::new(renderer.dir()));
    }
    let ledger = service.ledger();
    router = router.nest_service(ledger.url_prefix(), ServeDir::new(ledger.dir()));

    router.layer(Extension(service))
}
