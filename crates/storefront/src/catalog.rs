//! The fixed product catalog.
//!
//! Products ship with the binary as JSON and are parsed once at startup.
//! Lookups and filtering run over the in-memory list; there is no remote
//! product source.

use std::path::Path;
use std::sync::Arc;

use aurora_core::filter::ALL_CATEGORIES;
use aurora_core::{Product, ProductFilter, ProductId};

const EMBEDDED: &str = include_str!("../catalog/products.json");

/// Error loading the catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid catalog JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("duplicate product id {0}")]
    DuplicateId(ProductId),
}

/// In-memory product list, cheap to clone.
#[derive(Debug, Clone)]
pub struct Catalog {
    products: Arc<Vec<Product>>,
}

impl Catalog {
    /// The catalog bundled with the crate.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundled JSON is malformed.
    pub fn embedded() -> Result<Self, CatalogError> {
        Self::from_json(EMBEDDED)
    }

    /// Load a catalog from a JSON file on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Parse a catalog from a JSON array of products.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed JSON or repeated product IDs.
    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let products: Vec<Product> = serde_json::from_str(raw)?;
        Self::from_products(products)
    }

    /// # Errors
    ///
    /// Returns an error if two products share an ID.
    pub fn from_products(products: Vec<Product>) -> Result<Self, CatalogError> {
        let mut seen = std::collections::HashSet::with_capacity(products.len());
        for product in &products {
            if !seen.insert(product.id) {
                return Err(CatalogError::DuplicateId(product.id));
            }
        }
        tracing::debug!(products = products.len(), "Loaded catalog");
        Ok(Self {
            products: Arc::new(products),
        })
    }

    #[must_use]
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    #[must_use]
    pub fn get(&self, id: ProductId) -> Option<&Product> {
        self.products.iter().find(|product| product.id == id)
    }

    /// Products matching the filter, in catalog order.
    #[must_use]
    pub fn search(&self, filter: &ProductFilter) -> Vec<&Product> {
        filter.apply(&self.products)
    }

    /// Category choices for the listing, led by [`ALL_CATEGORIES`].
    #[must_use]
    pub fn categories(&self) -> Vec<&str> {
        let mut categories = vec![ALL_CATEGORIES];
        for product in self.products.iter() {
            if !categories.contains(&product.category.as_str()) {
                categories.push(&product.category);
            }
        }
        categories
    }

    /// Distinct genders, in first-seen order.
    #[must_use]
    pub fn genders(&self) -> Vec<&str> {
        distinct(self.products.iter().map(|product| product.gender.as_str()))
    }

    /// Distinct garment types, in first-seen order.
    #[must_use]
    pub fn types(&self) -> Vec<&str> {
        distinct(self.products.iter().map(|product| product.kind.as_str()))
    }
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut out: Vec<&str> = Vec::new();
    for value in values {
        if !out.contains(&value) {
            out.push(value);
        }
    }
    out
}
