//! Application state and the session listener.
//!
//! `AppState` owns every service for the lifetime of the process and runs a
//! background task that reacts to sign-in and sign-out: on sign-in it tags
//! Sentry with the user, ensures the profile row, reconciles the cart and
//! loads the wishlist; on sign-out it forgets the per-user state.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::catalog::Catalog;
use crate::cart::CartSynchronizer;
use crate::checkout::{CheckoutProvider, CheckoutService, VexorClient};
use crate::config::StorefrontConfig;
use crate::error::{self, AppError};
use crate::local::{FileStorage, LocalStorage};
use crate::notice::Notices;
use crate::orders::OrderService;
use crate::profile::ProfileService;
use crate::remote::{CartStore, OrderStore, PostgrestClient, ProfileStore, WishlistStore};
use crate::session::{FirebaseAuthClient, IdentityProvider, Session, SessionManager};
use crate::wishlist::WishlistManager;

/// The external collaborators the services are built on.
///
/// Every remote collaborator is optional; a missing one degrades the matching
/// feature instead of failing startup.
#[derive(Clone)]
pub struct Collaborators {
    pub storage: Arc<dyn LocalStorage>,
    pub cart_store: Option<Arc<dyn CartStore>>,
    pub wishlist_store: Option<Arc<dyn WishlistStore>>,
    pub profile_store: Option<Arc<dyn ProfileStore>>,
    pub order_store: Option<Arc<dyn OrderStore>>,
    pub identity: Option<Arc<dyn IdentityProvider>>,
    pub checkout: Option<Arc<dyn CheckoutProvider>>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("row_store", &self.cart_store.is_some())
            .field("identity", &self.identity.is_some())
            .field("checkout", &self.checkout.is_some())
            .finish_non_exhaustive()
    }
}

impl Collaborators {
    /// Only local storage; every remote feature is disabled.
    #[must_use]
    pub fn local(storage: Arc<dyn LocalStorage>) -> Self {
        Self {
            storage,
            cart_store: None,
            wishlist_store: None,
            profile_store: None,
            order_store: None,
            identity: None,
            checkout: None,
        }
    }

    /// Use one row store for carts, wishlists, profiles and orders.
    #[must_use]
    pub fn with_store<S>(mut self, store: &Arc<S>) -> Self
    where
        S: CartStore + WishlistStore + ProfileStore + OrderStore + 'static,
    {
        self.cart_store = Some(store.clone() as Arc<dyn CartStore>);
        self.wishlist_store = Some(store.clone() as Arc<dyn WishlistStore>);
        self.profile_store = Some(store.clone() as Arc<dyn ProfileStore>);
        self.order_store = Some(store.clone() as Arc<dyn OrderStore>);
        self
    }

    #[must_use]
    pub fn with_identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    #[must_use]
    pub fn with_checkout(mut self, checkout: Arc<dyn CheckoutProvider>) -> Self {
        self.checkout = Some(checkout);
        self
    }

    /// Build the HTTP collaborators named by the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be created or an HTTP
    /// client fails to build.
    pub fn from_config(config: &StorefrontConfig) -> Result<Self, AppError> {
        let storage: Arc<dyn LocalStorage> = Arc::new(FileStorage::open(&config.data_dir)?);
        let mut collaborators = Self::local(storage);

        if let Some(supabase) = &config.supabase {
            let client = Arc::new(PostgrestClient::new(supabase)?);
            collaborators = collaborators.with_store(&client);
        } else {
            tracing::info!("Row store not configured, cart is local-only");
        }

        if let Some(firebase) = &config.firebase {
            collaborators =
                collaborators.with_identity(Arc::new(FirebaseAuthClient::new(firebase)?));
        } else {
            tracing::info!("Identity provider not configured, sign-in disabled");
        }

        match &config.vexor {
            Some(vexor) if vexor.is_complete() => {
                collaborators = collaborators.with_checkout(Arc::new(VexorClient::new(vexor)?));
            }
            Some(_) => {
                tracing::warn!("Checkout provider configuration is incomplete, checkout disabled");
            }
            None => tracing::info!("Checkout provider not configured, checkout disabled"),
        }

        Ok(collaborators)
    }
}

/// Application state shared by every front end.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    notices: Notices,
    session: SessionManager,
    cart: Arc<CartSynchronizer>,
    wishlist: Arc<WishlistManager>,
    profile: Arc<ProfileService>,
    orders: Arc<OrderService>,
    checkout: CheckoutService,
    catalog: Catalog,
    settle: mpsc::UnboundedSender<oneshot::Sender<()>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("session", &self.inner.session)
            .field("cart", &self.inner.cart)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Build every service and start the session listener.
    ///
    /// A session restored from local storage is handled like a fresh sign-in.
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn start(collaborators: Collaborators, catalog: Catalog) -> Self {
        let notices = Notices::new();
        let session = SessionManager::new(
            collaborators.identity,
            collaborators.storage.clone(),
            notices.clone(),
        );

        let cart = Arc::new(CartSynchronizer::new(
            collaborators.storage,
            collaborators.cart_store,
            session.subscribe(),
        ));
        let wishlist = Arc::new(WishlistManager::new(
            collaborators.wishlist_store,
            session.subscribe(),
            notices.clone(),
        ));
        let profile = Arc::new(ProfileService::new(
            collaborators.profile_store,
            session.subscribe(),
            notices.clone(),
        ));
        let orders = Arc::new(OrderService::new(
            collaborators.order_store,
            session.subscribe(),
        ));
        let checkout = CheckoutService::new(
            cart.clone(),
            orders.clone(),
            collaborators.checkout,
            session.subscribe(),
            notices.clone(),
        );

        let (settle, settle_rx) = mpsc::unbounded_channel();
        let listener = SessionListener {
            cart: cart.clone(),
            wishlist: wishlist.clone(),
            profile: profile.clone(),
        };
        let handle = tokio::spawn(listener.run(session.subscribe(), settle_rx));

        Self {
            inner: Arc::new(AppStateInner {
                notices,
                session,
                cart,
                wishlist,
                profile,
                orders,
                checkout,
                catalog,
                settle,
                listener: Mutex::new(Some(handle)),
            }),
        }
    }

    /// Build the configured collaborators, load the bundled catalog and start.
    ///
    /// # Errors
    ///
    /// Returns an error if a collaborator or the catalog fails to load.
    pub fn from_config(config: &StorefrontConfig) -> Result<Self, AppError> {
        let collaborators = Collaborators::from_config(config)?;
        let catalog = Catalog::embedded()?;
        Ok(Self::start(collaborators, catalog))
    }

    #[must_use]
    pub fn notices(&self) -> &Notices {
        &self.inner.notices
    }

    #[must_use]
    pub fn session(&self) -> &SessionManager {
        &self.inner.session
    }

    #[must_use]
    pub fn cart(&self) -> &CartSynchronizer {
        &self.inner.cart
    }

    #[must_use]
    pub fn wishlist(&self) -> &WishlistManager {
        &self.inner.wishlist
    }

    #[must_use]
    pub fn profile(&self) -> &ProfileService {
        &self.inner.profile
    }

    #[must_use]
    pub fn orders(&self) -> &OrderService {
        &self.inner.orders
    }

    #[must_use]
    pub fn checkout(&self) -> &CheckoutService {
        &self.inner.checkout
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    /// Wait until the listener has handled every session change published so
    /// far. Returns immediately once the listener has stopped.
    pub async fn settle(&self) {
        let (ack, done) = oneshot::channel();
        if self.inner.settle.send(ack).is_ok() {
            let _ = done.await;
        }
    }

    /// Stop the listener and wait for queued cart writes.
    pub async fn shutdown(&self) {
        let handle = self
            .inner
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
        self.inner.cart.flush().await;
        tracing::debug!("Storefront state shut down");
    }
}

/// Reacts to session changes on behalf of the per-user services.
struct SessionListener {
    cart: Arc<CartSynchronizer>,
    wishlist: Arc<WishlistManager>,
    profile: Arc<ProfileService>,
}

impl SessionListener {
    async fn run(
        self,
        mut session: watch::Receiver<Option<Session>>,
        mut settle: mpsc::UnboundedReceiver<oneshot::Sender<()>>,
    ) {
        let mut handled: Option<Session> = None;
        let initial = session.borrow_and_update().clone();
        self.transition(&mut handled, initial).await;

        loop {
            tokio::select! {
                biased;
                changed = session.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let next = session.borrow_and_update().clone();
                    self.transition(&mut handled, next).await;
                }
                Some(ack) = settle.recv() => {
                    // Drain a change that raced the request before answering.
                    if session.has_changed().unwrap_or(false) {
                        let next = session.borrow_and_update().clone();
                        self.transition(&mut handled, next).await;
                    }
                    let _ = ack.send(());
                }
                else => break,
            }
        }
        tracing::debug!("Session listener stopped");
    }

    async fn transition(&self, handled: &mut Option<Session>, next: Option<Session>) {
        let previous_user = handled.as_ref().map(|s| s.user_id.clone());
        let next_user = next.as_ref().map(|s| s.user_id.clone());
        if previous_user == next_user {
            *handled = next;
            return;
        }

        if let Some(user_id) = &previous_user {
            tracing::info!(user_id = %user_id, "Session ended");
            self.cart.detach();
            self.wishlist.clear();
            self.profile.clear();
            error::clear_sentry_user();
        }

        if let Some(session) = &next {
            tracing::info!(user_id = %session.user_id, "Session started");
            error::set_sentry_user(&session.user_id, session.email.as_deref());
            self.profile.ensure_profile(session).await;
            self.cart.sync_on_login(&session.user_id).await;
            self.wishlist.load(&session.user_id).await;
        }

        *handled = next;
    }
}
