//! In-process row store.
//!
//! Behaves like the hosted tables closely enough for the synchronizers: rows
//! get increasing ids, lists come back in insertion order (orders newest
//! first), and a missing row on update is an error. Reads and writes can be
//! made to fail per collection, and list reads can be slowed down.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use aurora_core::{CartRowId, LineKey, OrderId, ProductId, UserId, WishlistEntryId};
use chrono::Utc;

use super::{
    CartRow, CartStore, NewCartRow, NewOrder, NewProfile, NewWishlistRow, Order, OrderStore,
    Profile, ProfileStore, ProfileUpdate, StoreError, WishlistRow, WishlistStore,
};

/// A table of the row store, for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Cart,
    Wishlist,
    Profiles,
    Orders,
}

#[derive(Debug, Default)]
struct Tables {
    next_id: i64,
    cart: Vec<CartRow>,
    wishlist: Vec<WishlistRow>,
    profiles: Vec<Profile>,
    orders: Vec<Order>,
    failing_reads: HashSet<Collection>,
    failing_writes: HashSet<Collection>,
    read_delays: HashMap<Collection, Duration>,
}

impl Tables {
    const fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn check_read(&self, collection: Collection) -> Result<(), StoreError> {
        if self.failing_reads.contains(&collection) {
            return Err(StoreError::Unavailable(format!("{collection:?} read failed")));
        }
        Ok(())
    }

    fn check_write(&self, collection: Collection) -> Result<(), StoreError> {
        if self.failing_writes.contains(&collection) {
            return Err(StoreError::Unavailable(format!("{collection:?} write failed")));
        }
        Ok(())
    }
}

/// Row store held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make reads of a collection fail (or succeed again).
    pub fn fail_reads(&self, collection: Collection, fail: bool) {
        let mut tables = self.tables();
        if fail {
            tables.failing_reads.insert(collection);
        } else {
            tables.failing_reads.remove(&collection);
        }
    }

    /// Make writes to a collection fail (or succeed again).
    pub fn fail_writes(&self, collection: Collection, fail: bool) {
        let mut tables = self.tables();
        if fail {
            tables.failing_writes.insert(collection);
        } else {
            tables.failing_writes.remove(&collection);
        }
    }

    /// Make list reads of a collection wait before answering.
    pub fn delay_reads(&self, collection: Collection, delay: Duration) {
        self.tables().read_delays.insert(collection, delay);
    }

    async fn read_pause(&self, collection: Collection) {
        let delay = self.tables().read_delays.get(&collection).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    /// Insert a cart row directly, bypassing failure injection.
    pub fn seed_cart(&self, row: &NewCartRow) -> CartRow {
        let mut tables = self.tables();
        let row = new_cart_row(&mut tables, row);
        tables.cart.push(row.clone());
        row
    }

    /// Insert a wishlist row directly, bypassing failure injection.
    pub fn seed_wishlist(
        &self,
        user_id: &UserId,
        product_id: ProductId,
        notify: bool,
    ) -> WishlistRow {
        let mut tables = self.tables();
        let row = WishlistRow {
            id: WishlistEntryId::new(tables.next_id()),
            user_id: user_id.clone(),
            product_id,
            notify_on_restock: notify,
            added_at: Some(Utc::now()),
        };
        tables.wishlist.push(row.clone());
        row
    }

    /// Snapshot of a user's cart rows.
    #[must_use]
    pub fn cart_rows(&self, user_id: &UserId) -> Vec<CartRow> {
        self.tables()
            .cart
            .iter()
            .filter(|row| &row.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Snapshot of a user's wishlist rows.
    #[must_use]
    pub fn wishlist_rows(&self, user_id: &UserId) -> Vec<WishlistRow> {
        self.tables()
            .wishlist
            .iter()
            .filter(|row| &row.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Snapshot of a user's profile.
    #[must_use]
    pub fn profile(&self, user_id: &UserId) -> Option<Profile> {
        self.tables()
            .profiles
            .iter()
            .find(|profile| &profile.id == user_id)
            .cloned()
    }
}

fn new_cart_row(tables: &mut Tables, row: &NewCartRow) -> CartRow {
    CartRow {
        id: CartRowId::new(tables.next_id()),
        user_id: row.user_id.clone(),
        product_id: row.product_id,
        name: row.name.clone(),
        price: row.price,
        size: row.size.clone(),
        color: row.color.clone(),
        image: row.image.clone(),
        quantity: row.quantity,
        added_at: Some(Utc::now()),
    }
}

fn is_row(row: &CartRow, user_id: &UserId, key: &LineKey) -> bool {
    &row.user_id == user_id
        && row.product_id == key.product_id
        && row.size == key.size
        && row.color == key.color
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn list(&self, user_id: &UserId) -> Result<Vec<CartRow>, StoreError> {
        self.read_pause(Collection::Cart).await;
        self.tables().check_read(Collection::Cart)?;
        Ok(self.cart_rows(user_id))
    }

    async fn insert(&self, row: &NewCartRow) -> Result<CartRow, StoreError> {
        let mut tables = self.tables();
        tables.check_write(Collection::Cart)?;
        let row = new_cart_row(&mut tables, row);
        tables.cart.push(row.clone());
        Ok(row)
    }

    async fn update_quantity(
        &self,
        user_id: &UserId,
        key: &LineKey,
        quantity: u32,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables();
        tables.check_write(Collection::Cart)?;
        let row = tables
            .cart
            .iter_mut()
            .find(|row| is_row(row, user_id, key))
            .ok_or_else(|| {
                StoreError::NotFound(format!("cart row for product {}", key.product_id))
            })?;
        row.quantity = quantity;
        Ok(())
    }

    async fn delete(&self, user_id: &UserId, key: &LineKey) -> Result<(), StoreError> {
        let mut tables = self.tables();
        tables.check_write(Collection::Cart)?;
        tables.cart.retain(|row| !is_row(row, user_id, key));
        Ok(())
    }

    async fn clear(&self, user_id: &UserId) -> Result<(), StoreError> {
        let mut tables = self.tables();
        tables.check_write(Collection::Cart)?;
        tables.cart.retain(|row| &row.user_id != user_id);
        Ok(())
    }
}

#[async_trait]
impl WishlistStore for MemoryStore {
    async fn list(&self, user_id: &UserId) -> Result<Vec<WishlistRow>, StoreError> {
        self.read_pause(Collection::Wishlist).await;
        self.tables().check_read(Collection::Wishlist)?;
        Ok(self.wishlist_rows(user_id))
    }

    async fn insert(&self, row: &NewWishlistRow) -> Result<WishlistRow, StoreError> {
        let mut tables = self.tables();
        tables.check_write(Collection::Wishlist)?;
        let row = WishlistRow {
            id: WishlistEntryId::new(tables.next_id()),
            user_id: row.user_id.clone(),
            product_id: row.product_id,
            notify_on_restock: row.notify_on_restock,
            added_at: Some(Utc::now()),
        };
        tables.wishlist.push(row.clone());
        Ok(row)
    }

    async fn delete(&self, id: WishlistEntryId) -> Result<(), StoreError> {
        let mut tables = self.tables();
        tables.check_write(Collection::Wishlist)?;
        tables.wishlist.retain(|row| row.id != id);
        Ok(())
    }

    async fn set_notify(
        &self,
        id: WishlistEntryId,
        notify: bool,
    ) -> Result<WishlistRow, StoreError> {
        let mut tables = self.tables();
        tables.check_write(Collection::Wishlist)?;
        let row = tables
            .wishlist
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("wishlist entry {id}")))?;
        row.notify_on_restock = notify;
        Ok(row.clone())
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn get(&self, user_id: &UserId) -> Result<Option<Profile>, StoreError> {
        self.tables().check_read(Collection::Profiles)?;
        Ok(self.profile(user_id))
    }

    async fn create(&self, profile: &NewProfile) -> Result<Profile, StoreError> {
        let mut tables = self.tables();
        tables.check_write(Collection::Profiles)?;
        if tables.profiles.iter().any(|p| p.id == profile.id) {
            return Err(StoreError::Api {
                status: 409,
                message: format!("duplicate key value for profile {}", profile.id),
            });
        }
        let created = Profile {
            id: profile.id.clone(),
            email: profile.email.clone(),
            full_name: profile.full_name.clone(),
            phone: None,
            avatar_url: profile.avatar_url.clone(),
            created_at: Some(Utc::now()),
        };
        tables.profiles.push(created.clone());
        Ok(created)
    }

    async fn update(
        &self,
        user_id: &UserId,
        update: &ProfileUpdate,
    ) -> Result<Profile, StoreError> {
        let mut tables = self.tables();
        tables.check_write(Collection::Profiles)?;
        let profile = tables
            .profiles
            .iter_mut()
            .find(|p| &p.id == user_id)
            .ok_or_else(|| StoreError::NotFound(format!("profile {user_id}")))?;
        update.apply_to(profile);
        Ok(profile.clone())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn list(&self, user_id: &UserId) -> Result<Vec<Order>, StoreError> {
        let tables = self.tables();
        tables.check_read(Collection::Orders)?;
        Ok(tables
            .orders
            .iter()
            .rev()
            .filter(|order| &order.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn insert(&self, order: &NewOrder) -> Result<Order, StoreError> {
        let mut tables = self.tables();
        tables.check_write(Collection::Orders)?;
        let stored = Order {
            id: OrderId::new(tables.next_id()),
            user_id: order.user_id.clone(),
            payment_reference: None,
            items: order.items.clone(),
            total_amount: order.total_amount,
            status: order.status,
            shipping_address: order.shipping_address.clone(),
            created_at: Some(Utc::now()),
        };
        tables.orders.push(stored.clone());
        Ok(stored)
    }
}
