//! Cart synchronizer.
//!
//! Owns the in-memory cart. Every mutation is applied locally first, mirrored
//! to local storage before the call returns, and, while a session is active,
//! queued for the remote row store. Callers never wait on the remote store and
//! never see its failures: the cart keeps working when the store is down.
//!
//! On login, [`CartSynchronizer::sync_on_login`] reconciles the local cart with
//! the user's remote rows using a high-water-mark merge (see
//! [`aurora_core::cart::merge_remote`]). Until that reconciliation has queued
//! its merged cart, mutations stay local: a remote write issued earlier would
//! overwrite rows the merge has not read yet.

mod writer;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use aurora_core::cart::{Cart, QuantityChange};
use aurora_core::{LineItem, LineItemId, Price, Product, UserId};
use tokio::sync::watch;
use tracing::instrument;

pub use writer::{CartWrite, CartWriter};

use crate::error::add_breadcrumb;
use crate::local::{CART_KEY, LocalStorage};
use crate::remote::{CartRow, CartStore};
use crate::session::Session;

/// The cart, its local mirror and its remote mirror.
pub struct CartSynchronizer {
    cart: Mutex<Cart>,
    storage: Arc<dyn LocalStorage>,
    store: Option<Arc<dyn CartStore>>,
    writer: Option<CartWriter>,
    session: watch::Receiver<Option<Session>>,
    /// User whose remote rows have been reconciled with this cart.
    synced: Mutex<Option<UserId>>,
}

impl std::fmt::Debug for CartSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartSynchronizer")
            .field("items", &self.lock().items().len())
            .field("remote", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

impl CartSynchronizer {
    /// Load the cart from local storage and start the remote writer.
    ///
    /// A missing snapshot is an empty cart; an unreadable or malformed one is
    /// logged and also treated as empty. Without a `store` the cart is
    /// local-only. Must be called inside a tokio runtime when `store` is set.
    pub fn new(
        storage: Arc<dyn LocalStorage>,
        store: Option<Arc<dyn CartStore>>,
        session: watch::Receiver<Option<Session>>,
    ) -> Self {
        let cart = load_snapshot(storage.as_ref());
        let writer = store.clone().map(CartWriter::spawn);
        Self {
            cart: Mutex::new(cart),
            storage,
            store,
            writer,
            session,
            synced: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Cart> {
        self.cart.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_user(&self) -> Option<UserId> {
        self.session
            .borrow()
            .as_ref()
            .map(|session| session.user_id.clone())
    }

    /// Overwrite the local snapshot. Failures are logged.
    fn persist(&self, cart: &Cart) {
        let result = serde_json::to_string(cart)
            .map_err(|e| e.to_string())
            .and_then(|json| {
                self.storage
                    .set(CART_KEY, &json)
                    .map_err(|e| e.to_string())
            });
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to persist cart locally");
        }
    }

    fn synced_user(&self) -> MutexGuard<'_, Option<UserId>> {
        self.synced.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a remote write if the signed-in user's cart has been reconciled.
    ///
    /// Called with the cart lock held so writes queue in mutation order.
    fn mirror(&self, write: impl FnOnce(UserId) -> CartWrite) {
        let (Some(writer), Some(user_id)) = (&self.writer, self.current_user()) else {
            return;
        };
        if self.synced_user().as_ref() != Some(&user_id) {
            tracing::debug!(user_id = %user_id, "Cart not reconciled yet, change stays local");
            return;
        }
        writer.enqueue(write(user_id));
    }

    /// Stop mirroring until the next [`sync_on_login`](Self::sync_on_login).
    pub fn detach(&self) {
        self.synced_user().take();
    }

    /// Snapshot of the line items in cart order.
    #[must_use]
    pub fn items(&self) -> Vec<LineItem> {
        self.lock().items().to_vec()
    }

    /// Add one unit of a product variant.
    ///
    /// Increments the matching line item or appends a new one. When signed
    /// in, the whole cart is pushed to the remote store.
    pub fn add_item(&self, product: &Product, size: &str, color: &str) -> LineItem {
        let mut cart = self.lock();
        let item = cart.add(product, size, color);
        self.persist(&cart);
        self.mirror(|user_id| CartWrite::Replace {
            user_id,
            items: cart.items().to_vec(),
        });
        drop(cart);

        tracing::debug!(product_id = %item.product_id, quantity = item.quantity, "Added to cart");
        let product_id = item.product_id.to_string();
        add_breadcrumb("cart", "Added item", Some(&[("product_id", product_id.as_str())]));
        item
    }

    /// Remove a line item. Unknown ids are a no-op.
    pub fn remove_item(&self, id: LineItemId) -> Option<LineItem> {
        let mut cart = self.lock();
        let removed = cart.remove(id)?;
        self.persist(&cart);
        self.mirror(|user_id| CartWrite::Delete {
            user_id,
            key: removed.key(),
        });
        drop(cart);

        tracing::debug!(product_id = %removed.product_id, "Removed from cart");
        Some(removed)
    }

    /// Set a line item's quantity. Non-positive quantities remove it.
    pub fn update_quantity(&self, id: LineItemId, quantity: i64) -> QuantityChange {
        let mut cart = self.lock();
        let change = cart.set_quantity(id, quantity);
        match &change {
            QuantityChange::Updated(item) => {
                self.persist(&cart);
                self.mirror(|user_id| CartWrite::SetQuantity {
                    user_id,
                    key: item.key(),
                    quantity: item.quantity,
                });
            }
            QuantityChange::Removed(item) => {
                self.persist(&cart);
                self.mirror(|user_id| CartWrite::Delete {
                    user_id,
                    key: item.key(),
                });
            }
            QuantityChange::Missing => {}
        }
        change
    }

    /// Empty the cart, its local snapshot and the user's remote rows.
    pub fn clear(&self) {
        let mut cart = self.lock();
        cart.clear();
        if let Err(e) = self.storage.remove(CART_KEY) {
            tracing::warn!(error = %e, "Failed to clear local cart");
        }
        self.mirror(|user_id| CartWrite::Clear { user_id });
        drop(cart);

        add_breadcrumb("cart", "Cleared cart", None);
    }

    /// Sum of all quantities.
    #[must_use]
    pub fn total_items(&self) -> u64 {
        self.lock().total_items()
    }

    /// Sum of `unit_price * quantity`.
    #[must_use]
    pub fn total_price(&self) -> Price {
        self.lock().total_price()
    }

    /// Reconcile the local cart with the user's remote rows.
    ///
    /// With no remote rows, the local cart is pushed as is. Otherwise remote
    /// rows are merged in (missing ones appended, larger quantities win) and
    /// the merged cart replaces the remote rows. Later mutations are mirrored
    /// from then on.
    ///
    /// A failed fetch leaves the cart local-only until the next login. The
    /// merge is abandoned if `user_id` is no longer signed in once the rows
    /// arrive.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn sync_on_login(&self, user_id: &UserId) {
        let (Some(store), Some(writer)) = (&self.store, &self.writer) else {
            return;
        };

        let rows = match store.list(user_id).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load remote cart, staying local-only");
                return;
            }
        };

        let mut cart = self.lock();
        if self.current_user().as_ref() != Some(user_id) {
            tracing::info!("Session changed while loading remote cart, skipping merge");
            return;
        }
        if rows.is_empty() && cart.is_empty() {
            *self.synced_user() = Some(user_id.clone());
            return;
        }
        let remote_rows = rows.len();
        cart.merge_remote(rows.into_iter().map(CartRow::into_line_item));
        self.persist(&cart);
        writer.enqueue(CartWrite::Replace {
            user_id: user_id.clone(),
            items: cart.items().to_vec(),
        });
        *self.synced_user() = Some(user_id.clone());
        tracing::info!(
            remote_rows,
            merged_items = cart.items().len(),
            "Reconciled cart with remote store"
        );
    }

    /// Wait until every queued remote write has been attempted.
    pub async fn flush(&self) {
        if let Some(writer) = &self.writer {
            writer.flush().await;
        }
    }
}

fn load_snapshot(storage: &dyn LocalStorage) -> Cart {
    let stored = match storage.get(CART_KEY) {
        Ok(Some(stored)) => stored,
        Ok(None) => return Cart::new(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read local cart");
            return Cart::new();
        }
    };
    match serde_json::from_str::<Vec<LineItem>>(&stored) {
        Ok(items) => Cart::from_items(items),
        Err(e) => {
            tracing::warn!(error = %e, "Discarding malformed local cart");
            Cart::new()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use aurora_core::ProductId;

    use super::*;
    use crate::local::MemoryStorage;
    use crate::remote::{Collection, MemoryStore, NewCartRow};

    fn product(id: i64, cents: i64) -> Product {
        Product {
            id: ProductId::new(id),
            name: format!("Product {id}"),
            description: String::new(),
            price: Price::from_cents(cents),
            image: format!("/img/{id}.jpg"),
            category: "Casual".to_string(),
            gender: "Mujer".to_string(),
            kind: "Camiseta".to_string(),
            sizes: vec!["M".to_string()],
            colors: vec!["black".to_string()],
            in_stock: true,
        }
    }

    fn session(user: &str) -> Session {
        Session {
            user_id: UserId::new(user),
            email: None,
            display_name: None,
            avatar_url: None,
            id_token: String::new(),
        }
    }

    struct Fixture {
        storage: Arc<MemoryStorage>,
        store: Arc<MemoryStore>,
        session: watch::Sender<Option<Session>>,
        cart: CartSynchronizer,
    }

    fn fixture(signed_in: bool) -> Fixture {
        let storage = Arc::new(MemoryStorage::new());
        let store = Arc::new(MemoryStore::new());
        let (session, rx) = watch::channel(signed_in.then(|| session("uid-1")));
        let remote: Arc<dyn CartStore> = store.clone();
        let cart = CartSynchronizer::new(storage.clone(), Some(remote), rx);
        Fixture {
            storage,
            store,
            session,
            cart,
        }
    }

    fn stored_items(storage: &MemoryStorage) -> Vec<LineItem> {
        serde_json::from_str(&storage.get(CART_KEY).unwrap().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_add_item_persists_locally() {
        let f = fixture(false);
        let shirt = product(1, 1999);

        f.cart.add_item(&shirt, "M", "black");
        f.cart.add_item(&shirt, "M", "black");
        f.cart.add_item(&shirt, "L", "black");

        let items = f.cart.items();
        assert_eq!(items.len(), 2);
        assert_eq!(f.cart.total_items(), 3);
        assert_eq!(f.cart.total_price(), Price::from_cents(5997));
        assert_eq!(stored_items(&f.storage), items);

        // Signed out: nothing goes remote
        f.cart.flush().await;
        assert!(f.store.cart_rows(&UserId::new("uid-1")).is_empty());
    }

    #[tokio::test]
    async fn test_signed_in_mutations_reach_remote_store() {
        let f = fixture(true);
        let user = UserId::new("uid-1");
        f.cart.sync_on_login(&user).await;
        let item = f.cart.add_item(&product(1, 1000), "M", "black");
        f.cart.add_item(&product(2, 1000), "M", "black");

        f.cart.update_quantity(item.id, 7);
        f.cart.flush().await;
        let rows = f.store.cart_rows(&user);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.first().unwrap().quantity, 7);

        f.cart.remove_item(item.id);
        f.cart.flush().await;
        assert_eq!(f.store.cart_rows(&user).len(), 1);

        f.cart.clear();
        f.cart.flush().await;
        assert!(f.store.cart_rows(&user).is_empty());
        assert!(f.storage.get(CART_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_twice_is_noop() {
        let f = fixture(false);
        let item = f.cart.add_item(&product(1, 1000), "M", "black");
        f.cart.add_item(&product(2, 1000), "M", "black");

        assert!(f.cart.remove_item(item.id).is_some());
        let after_first = f.cart.items();
        assert!(f.cart.remove_item(item.id).is_none());
        assert_eq!(f.cart.items(), after_first);
    }

    #[tokio::test]
    async fn test_non_positive_quantity_removes() {
        let f = fixture(false);
        let a = f.cart.add_item(&product(1, 1000), "M", "black");
        let b = f.cart.add_item(&product(2, 1000), "M", "black");

        assert!(matches!(f.cart.update_quantity(a.id, 0), QuantityChange::Removed(_)));
        assert!(matches!(f.cart.update_quantity(b.id, -3), QuantityChange::Removed(_)));
        assert!(f.cart.items().is_empty());
        assert!(matches!(f.cart.update_quantity(a.id, 2), QuantityChange::Missing));
    }

    #[tokio::test]
    async fn test_remote_failure_keeps_local_state() {
        let f = fixture(true);
        f.cart.sync_on_login(&UserId::new("uid-1")).await;
        f.store.fail_writes(Collection::Cart, true);

        f.cart.add_item(&product(1, 1000), "M", "black");
        f.cart.flush().await;

        assert_eq!(f.cart.items().len(), 1);
        assert_eq!(stored_items(&f.storage).len(), 1);
    }

    #[tokio::test]
    async fn test_sync_on_login_high_water_mark() {
        let f = fixture(false);
        let user = UserId::new("uid-1");
        let x = product(1, 1000);
        let y = product(2, 500);

        let local_x = f.cart.add_item(&x, "M", "black");
        f.cart.update_quantity(local_x.id, 2);

        let remote_x = LineItem {
            quantity: 5,
            ..LineItem::for_product(&x, "M", "black")
        };
        let remote_y = LineItem::for_product(&y, "M", "black");
        f.store.seed_cart(&NewCartRow::from_line_item(&user, &remote_x));
        f.store.seed_cart(&NewCartRow::from_line_item(&user, &remote_y));

        f.session.send_replace(Some(session("uid-1")));
        f.cart.sync_on_login(&user).await;
        f.cart.flush().await;

        let items = f.cart.items();
        let quantities: Vec<_> = items.iter().map(|i| (i.product_id, i.quantity)).collect();
        assert_eq!(
            quantities,
            vec![(ProductId::new(1), 5), (ProductId::new(2), 1)]
        );
        // Local id of the surviving local item is kept
        assert_eq!(items.first().unwrap().id, local_x.id);
        assert_eq!(stored_items(&f.storage), items);

        let rows = f.store.cart_rows(&user);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.iter().map(|r| r.quantity).sum::<u32>(), 6);
    }

    #[tokio::test]
    async fn test_sync_on_login_pushes_local_when_remote_empty() {
        let f = fixture(false);
        let user = UserId::new("uid-1");
        f.cart.add_item(&product(1, 1000), "M", "black");

        f.session.send_replace(Some(session("uid-1")));
        f.cart.sync_on_login(&user).await;
        f.cart.flush().await;

        assert_eq!(f.store.cart_rows(&user).len(), 1);
    }

    #[tokio::test]
    async fn test_mutations_before_reconciliation_stay_local() {
        let f = fixture(false);
        let user = UserId::new("uid-1");
        let x = product(1, 1000);
        let remote_x = LineItem {
            quantity: 5,
            ..LineItem::for_product(&x, "M", "black")
        };
        f.store.seed_cart(&NewCartRow::from_line_item(&user, &remote_x));

        // Signed in but not yet reconciled
        f.session.send_replace(Some(session("uid-1")));
        f.cart.add_item(&product(2, 1000), "M", "black");
        f.cart.flush().await;
        assert_eq!(f.store.cart_rows(&user).len(), 1);
        assert_eq!(f.store.cart_rows(&user).first().unwrap().quantity, 5);

        f.cart.sync_on_login(&user).await;
        f.cart.add_item(&product(3, 1000), "M", "black");
        f.cart.flush().await;
        assert_eq!(f.store.cart_rows(&user).len(), 3);

        // Detached after sign-out: the next change waits for a new login
        f.cart.detach();
        f.cart.add_item(&product(3, 1000), "M", "black");
        f.cart.flush().await;
        let rows = f.store.cart_rows(&user);
        assert_eq!(rows.iter().map(|r| r.quantity).sum::<u32>(), 7);
    }

    #[tokio::test]
    async fn test_sync_on_login_skips_stale_user() {
        let f = fixture(false);
        let user = UserId::new("uid-1");
        f.cart.add_item(&product(1, 1000), "M", "black");

        f.session.send_replace(Some(session("uid-2")));
        f.cart.sync_on_login(&user).await;
        f.cart.flush().await;

        assert!(f.store.cart_rows(&user).is_empty());
    }

    #[tokio::test]
    async fn test_sync_on_login_read_failure_stays_local() {
        let f = fixture(false);
        let user = UserId::new("uid-1");
        f.cart.add_item(&product(1, 1000), "M", "black");
        f.store.fail_reads(Collection::Cart, true);

        f.cart.sync_on_login(&user).await;
        f.cart.flush().await;

        assert_eq!(f.cart.items().len(), 1);
        assert!(f.store.cart_rows(&user).is_empty());
    }

    #[tokio::test]
    async fn test_malformed_snapshot_loads_empty() {
        let storage = Arc::new(MemoryStorage::new().with_slot(CART_KEY, "{\"oops\":"));
        let (_tx, rx) = watch::channel(None);
        let cart = CartSynchronizer::new(storage, None, rx);
        assert!(cart.items().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_duplicates_fold_into_one_line() {
        let shirt = product(1, 1000);
        let first = LineItem {
            quantity: 2,
            ..LineItem::for_product(&shirt, "M", "black")
        };
        let second = LineItem {
            quantity: 3,
            ..LineItem::for_product(&shirt, "M", "black")
        };
        let empty = LineItem {
            quantity: 0,
            ..LineItem::for_product(&product(2, 1000), "M", "black")
        };
        let json = serde_json::to_string(&vec![first.clone(), second, empty]).unwrap();
        let storage = Arc::new(MemoryStorage::new().with_slot(CART_KEY, &json));
        let (_tx, rx) = watch::channel(None);

        let cart = CartSynchronizer::new(storage, None, rx);
        let items = cart.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items.first().unwrap().id, first.id);
        assert_eq!(cart.total_items(), 5);
    }

    #[tokio::test]
    async fn test_snapshot_survives_restart() {
        let storage = Arc::new(MemoryStorage::new());
        let (_tx, rx) = watch::channel(None);
        let first = CartSynchronizer::new(storage.clone(), None, rx.clone());
        first.add_item(&product(1, 1000), "M", "black");
        let items = first.items();
        drop(first);

        let second = CartSynchronizer::new(storage, None, rx);
        assert_eq!(second.items(), items);
    }
}
