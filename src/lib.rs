//! SKU Forge - stock-keeping-unit codes from product names and categories.
//!
//! A SKU is the product name prefix (up to three words, three characters
//! each) followed by one abbreviation per category value, in category
//! order. Uniqueness is enforced by a [`registry::Registry`] over an
//! injected store; collisions get a random four-letter suffix.
//!
//! ## Quick Start
//!
//! ```rust
//! use sku_forge::sku::{build_sku, CategoryMap};
//!
//! let categories: CategoryMap = [("Color", "Red"), ("Material", "Steel")]
//!     .into_iter()
//!     .collect();
//! assert_eq!(build_sku("Super Gadget", &categories), "SUP-GAD-RED-STE");
//! ```

// Core error handling
pub mod error;

// Code generation
pub mod sku;

// Uniqueness registry and its stores
pub mod registry;

// Artifacts
pub mod barcode;
pub mod ledger;

pub mod config;
pub mod service;

// REST API (when enabled)
#[cfg(feature = "server")]
pub mod api;

pub use barcode::{BarcodeRenderer, RenderOutcome, RenderedBarcode};
pub use config::SkuConfig;
pub use error::{BarcodeError, ConfigError, LedgerError, SkuError};
pub use ledger::CsvLedger;
pub use registry::{
    Generation, InMemorySkuStore, RandomSuffix, Registry, RegistryPolicy, Reservation,
    ReservationScope, SkuRecord, SkuStore,
};
pub use service::{BatchRequest, BatchResult, GeneratedSku, ProductRequest, SkuService};
pub use sku::{abbreviate, build_sku, CategoryMap, Product, ProductName, SkuCandidate};

#[cfg(feature = "database")]
pub use registry::PgSkuStore;
