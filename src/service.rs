//! SKU generation service.
//!
//! Validates request input, reserves SKUs through the [`Registry`], renders
//! barcodes and writes batch exports. Blocking file-system work runs on the
//! blocking thread pool.

use std::slice;
use std::sync::Arc;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::barcode::{BarcodeRenderer, RenderOutcome};
use crate::error::{Result, SkuError};
use crate::ledger::{CsvLedger, LedgerRow};
use crate::registry::{Generation, Registry, Reservation, SkuRecord};
use crate::sku::{category_codes, CategoryCodes, CategoryMap, Product};

/// One product to generate a SKU for.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProductRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub categories: CategoryMap,
}

impl ProductRequest {
    pub fn new(name: impl Into<String>, categories: CategoryMap) -> Self {
        Self {
            name: name.into(),
            categories,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub products: Vec<ProductRequest>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedSku {
    pub sku: String,
    pub category_heads: Vec<String>,
    pub category_codes: CategoryCodes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barcode_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub results: Vec<GeneratedSku>,
    pub csv_file: String,
}

pub struct SkuService {
    registry: Registry,
    barcodes: Option<Arc<BarcodeRenderer>>,
    ledger: Arc<CsvLedger>,
}

impl SkuService {
    pub fn new(registry: Registry, ledger: CsvLedger) -> Self {
        Self {
            registry,
            barcodes: None,
            ledger: Arc::new(ledger),
        }
    }

    pub fn with_barcodes(mut self, renderer: BarcodeRenderer) -> Self {
        self.barcodes = Some(Arc::new(renderer));
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn barcodes(&self) -> Option<&BarcodeRenderer> {
        self.barcodes.as_deref()
    }

    pub fn ledger(&self) -> &CsvLedger {
        &self.ledger
    }

    /// Generate one product. A failed barcode render releases the
    /// reservation again.
    pub async fn generate(&self, request: &ProductRequest) -> Result<GeneratedSku> {
        let product = Product::canonicalize(&request.name, &request.categories)?;
        let mut generation = self.registry.begin().await?;
        let result = self.generate_one(&mut generation, &product).await;
        generation.finish(result).await
    }

    /// Generate every product of a batch and export the result as CSV.
    ///
    /// All names are validated before anything is reserved. If any step
    /// fails, nothing the batch reserved stays reserved.
    pub async fn generate_batch(&self, request: &BatchRequest) -> Result<BatchResult> {
        if request.products.is_empty() {
            return Err(SkuError::InvalidInput(
                "At least one product is required".to_string(),
            ));
        }
        let products = request
            .products
            .iter()
            .map(|p| Product::canonicalize(&p.name, &p.categories))
            .collect::<Result<Vec<_>>>()?;

        let mut generation = self.registry.begin().await?;
        let result = self.generate_all(&mut generation, &products).await;
        generation.finish(result).await
    }

    pub async fn lookup(&self, sku: &str) -> Result<SkuRecord> {
        self.registry
            .lookup(sku)
            .await?
            .ok_or_else(|| SkuError::NotFound(sku.to_string()))
    }

    async fn generate_one(
        &self,
        generation: &mut Generation<'_>,
        product: &Product,
    ) -> Result<GeneratedSku> {
        let reservation = generation.reserve(product).await?;
        let barcode_url = self
            .render(slice::from_ref(product), slice::from_ref(&reservation))
            .await?
            .pop()
            .flatten();
        Ok(self.respond(product, &reservation, barcode_url))
    }

    async fn generate_all(
        &self,
        generation: &mut Generation<'_>,
        products: &[Product],
    ) -> Result<BatchResult> {
        let reservations = generation.reserve_all(products).await?;
        let barcode_urls = self.render(products, &reservations).await?;

        let mut results = Vec::with_capacity(products.len());
        let mut rows = Vec::with_capacity(products.len());
        for ((product, reservation), barcode_url) in
            products.iter().zip(&reservations).zip(barcode_urls)
        {
            results.push(self.respond(product, reservation, barcode_url));
            rows.push(LedgerRow {
                product_name: product.name.to_string(),
                sku: reservation.sku.clone(),
                categories: product.categories.clone(),
            });
        }

        let ledger = Arc::clone(&self.ledger);
        let file = tokio::task::spawn_blocking(move || ledger.write_batch(&rows))
            .await
            .map_err(|e| anyhow!("batch export task failed: {e}"))?
            .map_err(|e| {
                warn!(error = %e, "Batch export failed");
                e
            })?;

        info!(products = results.len(), csv = %file.url, "Generated SKU batch");
        Ok(BatchResult {
            results,
            csv_file: file.url,
        })
    }

    fn respond(
        &self,
        product: &Product,
        reservation: &Reservation,
        barcode_url: Option<String>,
    ) -> GeneratedSku {
        info!(
            product = %product.name,
            sku = %reservation.sku,
            disambiguated = reservation.disambiguated(),
            "Generated SKU"
        );
        GeneratedSku {
            sku: reservation.sku.clone(),
            category_heads: product.categories.labels().map(String::from).collect(),
            category_codes: category_codes(&product.categories),
            barcode_url,
        }
    }

    /// Render one barcode per reservation; all `None` when rendering is off.
    async fn render(
        &self,
        products: &[Product],
        reservations: &[Reservation],
    ) -> Result<Vec<Option<String>>> {
        let Some(renderer) = &self.barcodes else {
            return Ok(vec![None; reservations.len()]);
        };

        let renderer = Arc::clone(renderer);
        let items: Vec<(String, String)> = products
            .iter()
            .zip(reservations)
            .map(|(product, reservation)| (reservation.sku.clone(), product.name.to_string()))
            .collect();
        let rendered = tokio::task::spawn_blocking(move || {
            let pairs: Vec<(&str, &str)> = items
                .iter()
                .map(|(sku, name)| (sku.as_str(), name.as_str()))
                .collect();
            renderer.render_batch(&pairs)
        })
        .await
        .map_err(|e| anyhow!("barcode task failed: {e}"))?
        .map_err(|e| {
            warn!(products = products.len(), error = %e, "Barcode rendering failed");
            e
        })?;

        for (product, barcode) in products.iter().zip(&rendered) {
            if let RenderOutcome::Fallback { primary_error } = &barcode.outcome {
                warn!(
                    product = %product.name,
                    format = barcode.format,
                    primary_error = %primary_error,
                    "Barcode rendered with fallback strategy"
                );
            }
        }
        Ok(rendered.into_iter().map(|barcode| Some(barcode.url)).collect())
    }
}
