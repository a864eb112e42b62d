//! SKU generation REST server.
//!
//! ## Usage
//!
//! ```bash
//! # In-memory registry, per-product uniqueness
//! cargo run --bin sku_server
//!
//! # Postgres registry, global uniqueness
//! DATABASE_URL=postgresql://localhost/skus cargo run --bin sku_server --features database
//!
//! curl -X POST http://localhost:5000/generate_sku \
//!   -H "Content-Type: application/json" \
//!   -d '{"name": "Super Gadget", "categories": {"Color": "Red", "Material": "Steel"}}'
//! ```

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use sku_forge::api::create_router;
use sku_forge::{
    BarcodeRenderer, CsvLedger, InMemorySkuStore, RandomSuffix, Registry, SkuConfig, SkuService,
    SkuStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sku_forge=debug,tower_http=debug".into()),
        )
        .init();

    let mut config = SkuConfig::from_env();
    config.validate().context("Invalid configuration")?;
    let store = connect_store(&mut config).await?;
    let policy = config.registry_policy();
    info!(
        scope = ?policy.scope,
        clear_on_generate = policy.clear_on_generate,
        max_attempts = policy.max_attempts,
        "Registry policy"
    );

    let registry = Registry::with_suffixes(
        store,
        Arc::new(RandomSuffix::new(config.suffix_len)),
        policy,
    );
    let ledger = CsvLedger::new(&config.export_dir, config.export_url_prefix.as_str())
        .context("Failed to prepare export directory")?;
    let mut service = SkuService::new(registry, ledger);
    if config.barcodes_enabled {
        let renderer = BarcodeRenderer::new(
            &config.barcode_dir,
            config.barcode_url_prefix.as_str(),
            config.barcode_height,
        )
        .context("Failed to prepare barcode directory")?;
        service = service.with_barcodes(renderer);
    }

    let app = create_router(Arc::new(service)).layer(
        ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        ),
    );

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;
    info!("sku_server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(feature = "database")]
async fn connect_store(config: &mut SkuConfig) -> anyhow::Result<Arc<dyn SkuStore>> {
    use sku_forge::PgSkuStore;
    use sqlx::postgres::PgPoolOptions;

    let Some(db) = &config.database else {
        info!("DATABASE_URL not set, using in-memory SKU registry");
        return Ok(Arc::new(InMemorySkuStore::new()));
    };

    info!("Connecting to database");
    let pool = PgPoolOptions::new()
        .max_connections(db.max_connections)
        .acquire_timeout(db.connection_timeout)
        .connect(&db.database_url)
        .await
        .context("Failed to connect to database")?;
    let store = PgSkuStore::new(pool);
    store.ensure_schema().await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "database"))]
async fn connect_store(config: &mut SkuConfig) -> anyhow::Result<Arc<dyn SkuStore>> {
    if config.database.is_some() {
        tracing::warn!(
            "DATABASE_URL is set but the `database` feature is disabled; using in-memory registry"
        );
        config.use_in_memory_store();
    }
    Ok(Arc::new(InMemorySkuStore::new()))
}
