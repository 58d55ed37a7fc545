//! Catalog products.

use serde::{Deserialize, Serialize};

use crate::types::{Price, ProductId};

/// A product in the fixed storefront catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Product ID.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Plain text description.
    pub description: String,
    /// Unit price.
    pub price: Price,
    /// Image reference (URL or asset path).
    pub image: String,
    /// Style category (e.g. "Casual", "Formal").
    pub category: String,
    /// Target gender (e.g. "Hombre", "Mujer").
    pub gender: String,
    /// Garment type (e.g. "Camiseta", "Vestido").
    #[serde(rename = "type")]
    pub kind: String,
    /// Available sizes.
    #[serde(default)]
    pub sizes: Vec<String>,
    /// Available colors.
    #[serde(default)]
    pub colors: Vec<String>,
    /// Whether the product can currently be bought.
    #[serde(default = "default_in_stock")]
    pub in_stock: bool,
}

const fn default_in_stock() -> bool {
    true
}

impl Product {
    /// Size used when none is chosen explicitly (first listed, or "M").
    #[must_use]
    pub fn default_size(&self) -> &str {
        self.sizes.first().map_or("M", String::as_str)
    }

    /// Color used when none is chosen explicitly (first listed, or "black").
    #[must_use]
    pub fn default_color(&self) -> &str {
        self.colors.first().map_or("black", String::as_str)
    }
}
