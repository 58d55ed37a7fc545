//! Wishlist entries.

use serde::{Deserialize, Serialize};

use crate::types::{ProductId, WishlistEntryId};

/// A liked product for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WishlistEntry {
    /// Remote row identifier.
    pub id: WishlistEntryId,
    pub product_id: ProductId,
    /// Whether the user wants a notice when the product is restocked.
    pub notify_on_restock: bool,
}

/// Find the entry for a product.
#[must_use]
pub fn entry_for(entries: &[WishlistEntry], product_id: ProductId) -> Option<&WishlistEntry> {
    entries.iter().find(|entry| entry.product_id == product_id)
}
