//! SKU code generation: abbreviation rules, canonical input and the
//! candidate builder. Everything here is pure and synchronous.

pub mod abbreviate;
pub mod builder;
pub mod canonical;

pub use abbreviate::{abbreviate, name_prefix, FALLBACK_PREFIX};
pub use builder::{build_sku, category_codes, SkuCandidate};
pub use canonical::{title_case, CategoryCodes, CategoryMap, ProductName};

/// A product after canonicalisation, ready for reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub name: ProductName,
    pub categories: CategoryMap,
}

impl Product {
    /// Validate and canonicalise raw request input.
    pub fn canonicalize(raw_name: &str, raw_categories: &CategoryMap) -> crate::error::Result<Self> {
        Ok(Self {
            name: ProductName::parse(raw_name)?,
            categories: raw_categories.canonicalize(),
        })
    }

    pub fn candidate(&self) -> SkuCandidate {
        SkuCandidate::new(self.name.as_str(), &self.categories)
    }
}
