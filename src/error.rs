//! Error types for SKU generation, reservation and rendering.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type returned by the generation service.
#[derive(Debug, Error)]
pub enum SkuError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("SKU not found: {0}")]
    NotFound(String),

    #[error("could not disambiguate '{candidate}' after {attempts} attempts")]
    DisambiguationExhausted { candidate: String, attempts: u32 },

    #[error("registry store error: {0}")]
    Store(#[source] anyhow::Error),

    #[error("Failed to generate barcode: {0}")]
    Barcode(#[from] BarcodeError),

    #[error("Failed to write batch export: {0}")]
    Ledger(#[from] LedgerError),

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

impl SkuError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidInput(_) => 400,
            Self::NotFound(_) => 404,
            Self::DisambiguationExhausted { .. } => 409,
            Self::Store(_) | Self::Barcode(_) | Self::Ledger(_) | Self::Internal(_) => 500,
        }
    }

    pub(crate) fn store(err: impl Into<anyhow::Error>) -> Self {
        Self::Store(err.into())
    }
}

/// Barcode rendering failures.
#[derive(Debug, Error)]
pub enum BarcodeError {
    #[error("cannot encode '{sku}' as Code128: {reason}")]
    Encode { sku: String, reason: String },

    #[error("{format} generation failed: {reason}")]
    Generate { format: &'static str, reason: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("all rendering strategies failed (primary: {primary}; fallback: {fallback})")]
    AllStrategiesFailed { primary: String, fallback: String },

    #[error("invalid barcode URL prefix: {0}")]
    InvalidUrlPrefix(String),
}

/// CSV export failures.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid export URL prefix: {0}")]
    InvalidUrlPrefix(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Startup configuration that cannot be served.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}: {reason}")]
    InvalidUrlPrefix { key: &'static str, reason: String },

    #[error("barcode and export URL prefixes must differ (both '{0}')")]
    ConflictingUrlPrefixes(String),
}

pub type Result<T, E = SkuError> = std::result::Result<T, E>;
