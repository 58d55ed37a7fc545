//! Remote row store.
//!
//! Per-user rows live in a hosted Postgres behind a `PostgREST` API. Each
//! collection is reached through its own trait so the synchronizers can be
//! tested against [`MemoryStore`] and run against [`PostgrestClient`].
//!
//! # Tables
//!
//! - `cart_items` - one row per cart line item, keyed remotely by
//!   `(user_id, product_id, size, color)`
//! - `wishlist` - liked products with a restock notification flag
//! - `profiles` - display data for a signed-in identity
//! - `orders` - checkouts started by the user
//!
//! No call spans more than one request and nothing is transactional.

mod memory;
mod postgrest;

use async_trait::async_trait;
use aurora_core::checkout::OrderLine;
use aurora_core::{
    CartRowId, LineItem, LineItemId, LineKey, OrderId, OrderStatus, Price, ProductId, UserId,
    WishlistEntry, WishlistEntryId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::{Collection, MemoryStore};
pub use postgrest::PostgrestClient;

/// Errors from the remote row store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The addressed row does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The store could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

// =============================================================================
// Rows
// =============================================================================

/// A row of `cart_items`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartRow {
    pub id: CartRowId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub name: String,
    pub price: Price,
    pub size: String,
    pub color: String,
    pub image: String,
    pub quantity: u32,
    #[serde(default)]
    pub added_at: Option<DateTime<Utc>>,
}

impl CartRow {
    #[must_use]
    pub fn key(&self) -> LineKey {
        LineKey::new(self.product_id, self.size.clone(), self.color.clone())
    }

    /// Convert to a line item with a freshly minted local id.
    #[must_use]
    pub fn into_line_item(self) -> LineItem {
        LineItem {
            id: LineItemId::mint(),
            product_id: self.product_id,
            name: self.name,
            unit_price: self.price,
            image_ref: self.image,
            size: self.size,
            color: self.color,
            quantity: self.quantity,
        }
    }
}

/// Insert payload for `cart_items`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewCartRow {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub name: String,
    pub price: Price,
    pub size: String,
    pub color: String,
    pub image: String,
    pub quantity: u32,
}

impl NewCartRow {
    #[must_use]
    pub fn from_line_item(user_id: &UserId, item: &LineItem) -> Self {
        Self {
            user_id: user_id.clone(),
            product_id: item.product_id,
            name: item.name.clone(),
            price: item.unit_price,
            size: item.size.clone(),
            color: item.color.clone(),
            image: item.image_ref.clone(),
            quantity: item.quantity,
        }
    }
}

/// A row of `wishlist`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WishlistRow {
    pub id: WishlistEntryId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub notify_on_restock: bool,
    #[serde(default)]
    pub added_at: Option<DateTime<Utc>>,
}

impl WishlistRow {
    #[must_use]
    pub const fn to_entry(&self) -> WishlistEntry {
        WishlistEntry {
            id: self.id,
            product_id: self.product_id,
            notify_on_restock: self.notify_on_restock,
        }
    }
}

/// Insert payload for `wishlist`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewWishlistRow {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub notify_on_restock: bool,
}

/// A row of `profiles`. The id is the identity provider's user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub email: String,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Insert payload for `profiles`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewProfile {
    pub id: UserId,
    pub email: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Partial update of a profile. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl ProfileUpdate {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.full_name.is_none() && self.phone.is_none() && self.avatar_url.is_none()
    }

    /// Apply the present fields to a profile.
    pub fn apply_to(&self, profile: &mut Profile) {
        if let Some(full_name) = &self.full_name {
            profile.full_name = Some(full_name.clone());
        }
        if let Some(phone) = &self.phone {
            profile.phone = Some(phone.clone());
        }
        if let Some(avatar_url) = &self.avatar_url {
            profile.avatar_url = Some(avatar_url.clone());
        }
    }
}

/// A row of `orders`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    /// Reference assigned by the payment provider, once known.
    #[serde(rename = "stripe_payment_intent_id", default)]
    pub payment_reference: Option<String>,
    #[serde(default)]
    pub items: Vec<OrderLine>,
    pub total_amount: Price,
    pub status: OrderStatus,
    #[serde(default)]
    pub shipping_address: Option<serde_json::Value>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Insert payload for `orders`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewOrder {
    pub user_id: UserId,
    pub items: Vec<OrderLine>,
    pub total_amount: Price,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<serde_json::Value>,
}

// =============================================================================
// Collections
// =============================================================================

/// `cart_items` operations.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// All cart rows of a user, in insertion order.
    async fn list(&self, user_id: &UserId) -> Result<Vec<CartRow>, StoreError>;

    async fn insert(&self, row: &NewCartRow) -> Result<CartRow, StoreError>;

    /// Set the quantity of the row with the given key.
    async fn update_quantity(
        &self,
        user_id: &UserId,
        key: &LineKey,
        quantity: u32,
    ) -> Result<(), StoreError>;

    /// Delete the row with the given key. Deleting a missing row succeeds.
    async fn delete(&self, user_id: &UserId, key: &LineKey) -> Result<(), StoreError>;

    /// Delete every row of a user.
    async fn clear(&self, user_id: &UserId) -> Result<(), StoreError>;
}

/// `wishlist` operations.
#[async_trait]
pub trait WishlistStore: Send + Sync {
    async fn list(&self, user_id: &UserId) -> Result<Vec<WishlistRow>, StoreError>;

    async fn insert(&self, row: &NewWishlistRow) -> Result<WishlistRow, StoreError>;

    async fn delete(&self, id: WishlistEntryId) -> Result<(), StoreError>;

    async fn set_notify(&self, id: WishlistEntryId, notify: bool)
    -> Result<WishlistRow, StoreError>;
}

/// `profiles` operations.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// The profile of a user, or `None` when it was never created.
    async fn get(&self, user_id: &UserId) -> Result<Option<Profile>, StoreError>;

    async fn create(&self, profile: &NewProfile) -> Result<Profile, StoreError>;

    async fn update(&self, user_id: &UserId, update: &ProfileUpdate)
    -> Result<Profile, StoreError>;
}

/// `orders` operations.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Orders of a user, newest first.
    async fn list(&self, user_id: &UserId) -> Result<Vec<Order>, StoreError>;

    async fn insert(&self, order: &NewOrder) -> Result<Order, StoreError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn test_cart_row_parses_numeric_price() {
        let json = r#"{
            "id": 7,
            "user_id": "uid-1",
            "product_id": 3,
            "name": "Linen Shirt",
            "price": 39.99,
            "size": "M",
            "color": "white",
            "image": "/img/linen.jpg",
            "quantity": 2,
            "added_at": "2024-05-01T10:00:00Z"
        }"#;
        let row: CartRow = serde_json::from_str(json).unwrap();
        assert_eq!(row.id, CartRowId::new(7));
        assert_eq!(row.price.amount(), Decimal::new(3999, 2));
        assert_eq!(row.key(), LineKey::new(ProductId::new(3), "M", "white"));

        let item = row.into_line_item();
        assert_eq!(item.quantity, 2);
        assert_eq!(item.image_ref, "/img/linen.jpg");
    }

    #[test]
    fn test_new_cart_row_from_line_item() {
        let item = LineItem {
            id: LineItemId::mint(),
            product_id: ProductId::new(9),
            name: "Denim".to_string(),
            unit_price: Price::from_cents(5000),
            image_ref: "/img/denim.jpg".to_string(),
            size: "L".to_string(),
            color: "blue".to_string(),
            quantity: 3,
        };
        let row = NewCartRow::from_line_item(&UserId::new("uid-2"), &item);
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["user_id"], "uid-2");
        assert_eq!(json["image"], "/img/denim.jpg");
        assert_eq!(json["quantity"], 3);
        assert!(json.get("id").is_none());
    }

    #[test]
    fn test_profile_update_skips_absent_fields() {
        let update = ProfileUpdate {
            phone: Some("+54 11 5555".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, serde_json::json!({ "phone": "+54 11 5555" }));
        assert!(ProfileUpdate::default().is_empty());
    }

    #[test]
    fn test_order_reads_payment_reference_column() {
        let json = r#"{
            "id": 1,
            "user_id": "uid-1",
            "stripe_payment_intent_id": null,
            "items": [],
            "total_amount": "45.98",
            "status": "pending",
            "shipping_address": null,
            "created_at": "2024-05-01T10:00:00Z"
        }"#;
        let order: Order = serde_json::from_str(json).unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.payment_reference.is_none());
        assert_eq!(order.total_amount, Price::from_cents(4598));
    }
}
