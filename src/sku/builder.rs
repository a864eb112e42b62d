//! Deterministic SKU candidate construction.

use std::fmt;

use super::abbreviate::{abbreviate, name_prefix};
use super::canonical::{CategoryCodes, CategoryMap};

/// A SKU computed from the name and categories, before uniqueness checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkuCandidate {
    prefix: String,
    segments: Vec<String>,
}

impl SkuCandidate {
    pub fn new(name: &str, categories: &CategoryMap) -> Self {
        Self {
            prefix: name_prefix(name),
            segments: categories.values().map(abbreviate).collect(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn category_segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of dash-separated segments in the rendered candidate.
    pub fn segment_count(&self) -> usize {
        self.to_string().split('-').count()
    }

    /// The candidate with a disambiguator segment appended.
    pub fn with_suffix(&self, suffix: &str) -> String {
        format!("{self}-{suffix}")
    }
}

impl fmt::Display for SkuCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prefix)?;
        for segment in &self.segments {
            write!(f, "-{segment}")?;
        }
        Ok(())
    }
}

/// Build the candidate SKU string for a name and its categories.
pub fn build_sku(name: &str, categories: &CategoryMap) -> String {
    SkuCandidate::new(name, categories).to_string()
}

/// Abbreviation of each category value, keyed by value, in map order.
pub fn category_codes(categories: &CategoryMap) -> CategoryCodes {
    let mut codes = CategoryCodes::default();
    for value in categories.values() {
        codes.push_unique(value, abbreviate(value));
    }
    codes
}
