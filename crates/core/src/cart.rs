//! Cart line items and the rules that keep a cart consistent.
//!
//! A cart is an ordered list of [`LineItem`]s. Two line items describe the same
//! merchandise when their [`LineKey`] (product, size, color) matches; a
//! consistent cart holds at most one line item per key.
//!
//! [`Cart`] applies mutations in memory only. Persistence and remote mirroring
//! live in the storefront crate.

use serde::{Deserialize, Serialize};

use crate::product::Product;
use crate::types::{LineItemId, Price, ProductId};

/// Identity of a line item for merge purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineKey {
    pub product_id: ProductId,
    pub size: String,
    pub color: String,
}

impl LineKey {
    #[must_use]
    pub fn new(product_id: ProductId, size: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            product_id,
            size: size.into(),
            color: color.into(),
        }
    }
}

/// One cart row carrying a quantity.
///
/// Serialized field names match the local storage snapshot format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    /// Local identifier, never shared with the remote store.
    pub id: LineItemId,
    pub product_id: ProductId,
    pub name: String,
    #[serde(rename = "price")]
    pub unit_price: Price,
    #[serde(rename = "image")]
    pub image_ref: String,
    pub size: String,
    pub color: String,
    /// Always at least 1.
    pub quantity: u32,
}

impl LineItem {
    /// Build a single-unit line item for a product variant.
    #[must_use]
    pub fn for_product(product: &Product, size: &str, color: &str) -> Self {
        Self {
            id: LineItemId::mint(),
            product_id: product.id,
            name: product.name.clone(),
            unit_price: product.price,
            image_ref: product.image.clone(),
            size: size.to_owned(),
            color: color.to_owned(),
            quantity: 1,
        }
    }

    /// The identity triple of this line item.
    #[must_use]
    pub fn key(&self) -> LineKey {
        LineKey::new(self.product_id, self.size.clone(), self.color.clone())
    }

    /// Whether this line item has the given identity.
    #[must_use]
    pub fn matches(&self, key: &LineKey) -> bool {
        self.product_id == key.product_id && self.size == key.size && self.color == key.color
    }

    /// `unit_price * quantity`.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.unit_price * self.quantity
    }
}

/// Result of a quantity change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuantityChange {
    /// The line item now has the requested quantity.
    Updated(LineItem),
    /// A non-positive quantity removed the line item.
    Removed(LineItem),
    /// No line item had that id.
    Missing,
}

/// An ordered, in-memory collection of line items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cart {
    items: Vec<LineItem>,
}

impl Cart {
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Build a cart from stored line items.
    ///
    /// Items with the same key are folded into the first one, summing their
    /// quantities, and zero-quantity items are dropped.
    #[must_use]
    pub fn from_items(items: impl IntoIterator<Item = LineItem>) -> Self {
        let mut folded: Vec<LineItem> = Vec::new();
        for item in items.into_iter().filter(|item| item.quantity > 0) {
            let key = item.key();
            match folded.iter_mut().find(|existing| existing.matches(&key)) {
                Some(existing) => {
                    existing.quantity = existing.quantity.saturating_add(item.quantity);
                }
                None => folded.push(item),
            }
        }
        Self { items: folded }
    }

    #[must_use]
    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    #[must_use]
    pub fn into_items(self) -> Vec<LineItem> {
        self.items
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: LineItemId) -> Option<&LineItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Add one unit of a product variant.
    ///
    /// Increments the existing line item with the same key, or appends a new
    /// line item with quantity 1. Returns the affected line item.
    pub fn add(&mut self, product: &Product, size: &str, color: &str) -> LineItem {
        let key = LineKey::new(product.id, size, color);
        if let Some(existing) = self.items.iter_mut().find(|item| item.matches(&key)) {
            existing.quantity = existing.quantity.saturating_add(1);
            return existing.clone();
        }
        let item = LineItem::for_product(product, size, color);
        self.items.push(item.clone());
        item
    }

    /// Remove a line item by id. Absent ids are a no-op.
    pub fn remove(&mut self, id: LineItemId) -> Option<LineItem> {
        let index = self.items.iter().position(|item| item.id == id)?;
        Some(self.items.remove(index))
    }

    /// Set the quantity of a line item; non-positive quantities remove it.
    pub fn set_quantity(&mut self, id: LineItemId, quantity: i64) -> QuantityChange {
        if quantity <= 0 {
            return self
                .remove(id)
                .map_or(QuantityChange::Missing, QuantityChange::Removed);
        }
        let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        match self.items.iter_mut().find(|item| item.id == id) {
            Some(item) => {
                item.quantity = quantity;
                QuantityChange::Updated(item.clone())
            }
            None => QuantityChange::Missing,
        }
    }

    /// Remove every line item.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Merge remote line items into this cart with [`merge_remote`].
    pub fn merge_remote(&mut self, remote: impl IntoIterator<Item = LineItem>) {
        merge_remote(&mut self.items, remote);
    }

    /// Sum of all quantities.
    #[must_use]
    pub fn total_items(&self) -> u64 {
        total_items(&self.items)
    }

    /// Sum of `unit_price * quantity`.
    #[must_use]
    pub fn total_price(&self) -> Price {
        total_price(&self.items)
    }
}

/// High-water-mark merge of remote line items into a local collection.
///
/// For each remote item, in remote order:
/// - no local item with the same key: the remote item is appended;
/// - a local item exists and the remote quantity is strictly greater: the
///   local item takes the remote quantity;
/// - otherwise the local item is left unchanged.
///
/// Local-only items are never touched, so every key ends up with
/// `max(local, remote)`.
pub fn merge_remote(local: &mut Vec<LineItem>, remote: impl IntoIterator<Item = LineItem>) {
    for remote_item in remote {
        let key = remote_item.key();
        match local.iter_mut().find(|item| item.matches(&key)) {
            Some(existing) => {
                if remote_item.quantity > existing.quantity {
                    existing.quantity = remote_item.quantity;
                }
            }
            None => local.push(remote_item),
        }
    }
}

/// Sum of all quantities.
#[must_use]
pub fn total_items(items: &[LineItem]) -> u64 {
    items.iter().map(|item| u64::from(item.quantity)).sum()
}

/// Sum of `unit_price * quantity`.
#[must_use]
pub fn total_price(items: &[LineItem]) -> Price {
    items.iter().map(LineItem::line_total).sum()
}
