//! CSV export of batch generations.
//!
//! One file per batch, named `skus_<unix millis>_<token>.csv`. Columns are `Product Name`, `SKU`, then one column
//! per category label in first-seen order across the batch.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::config::normalize_url_prefix;
use crate::error::LedgerError;
use crate::sku::CategoryMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRow {
    pub product_name: String,
    pub sku: String,
    pub categories: CategoryMap,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerFile {
    pub path: PathBuf,
    pub url: String,
    pub rows: usize,
}

pub struct CsvLedger {
    dir: PathBuf,
    url_prefix: String,
}

impl CsvLedger {
    pub fn new(dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Result<Self, LedgerError> {
        let url_prefix =
            normalize_url_prefix(&url_prefix.into()).map_err(LedgerError::InvalidUrlPrefix)?;
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| LedgerError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir, url_prefix })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    pub fn write_batch(&self, rows: &[LedgerRow]) -> Result<LedgerFile, LedgerError> {
        let token = Uuid::new_v4().simple().to_string();
        let filename = format!("skus_{}_{}.csv", Utc::now().timestamp_millis(), &token[..8]);
        let path = self.dir.join(&filename);

        let mut labels: Vec<&str> = Vec::new();
        for row in rows {
            for label in row.categories.labels() {
                if !labels.contains(&label) {
                    labels.push(label);
                }
            }
        }

        let mut writer = csv::Writer::from_path(&path)?;
        let mut header = vec!["Product Name", "SKU"];
        header.extend(labels.iter().copied());
        writer.write_record(&header)?;

        for row in rows {
            let mut record = vec![row.product_name.as_str(), row.sku.as_str()];
            record.extend(labels.iter().map(|l| row.categories.get(l).unwrap_or("")));
            writer.write_record(&record)?;
        }
        writer.flush().map_err(|source| LedgerError::Io {
            path: path.clone(),
            source,
        })?;

        info!(path = %path.display(), rows = rows.len(), "Wrote batch export");
        Ok(LedgerFile {
            url: format!("{}/{}", self.url_prefix, filename),
            path,
            rows: rows.len(),
        })
    }
}
