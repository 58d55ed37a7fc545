//! Wishlist manager.
//!
//! Unlike the cart, the wishlist has no local-only mode. It is loaded from the
//! row store when a session starts and dropped when it ends, and every
//! mutation waits for the store to confirm before the in-memory set changes.
//! Failures are reported to the caller and published as notices.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use aurora_core::wishlist::entry_for;
use aurora_core::{ProductId, UserId, WishlistEntry, WishlistEntryId};
use thiserror::Error;
use tokio::sync::watch;
use tracing::instrument;

use crate::notice::Notices;
use crate::remote::{NewWishlistRow, StoreError, WishlistRow, WishlistStore};
use crate::session::Session;

/// Errors from wishlist operations.
#[derive(Debug, Error)]
pub enum WishlistError {
    /// No active session.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The session ended or changed while the request was in flight.
    #[error("session changed during request")]
    SessionChanged,

    /// Remote row store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl WishlistError {
    /// Text safe to show the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NotAuthenticated => "You must sign in to save favorites".to_string(),
            Self::SessionChanged => "Your session changed, please try again".to_string(),
            Self::Store(_) => "Could not update your favorites".to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct Loaded {
    /// Owner of `entries`; `None` while signed out.
    user_id: Option<UserId>,
    entries: Vec<WishlistEntry>,
}

/// The signed-in user's liked products.
pub struct WishlistManager {
    state: Mutex<Loaded>,
    store: Option<Arc<dyn WishlistStore>>,
    session: watch::Receiver<Option<Session>>,
    notices: Notices,
}

impl std::fmt::Debug for WishlistManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WishlistManager")
            .field("state", &*self.lock())
            .finish_non_exhaustive()
    }
}

impl WishlistManager {
    /// Create an empty manager. Without a store every mutation fails.
    #[must_use]
    pub fn new(
        store: Option<Arc<dyn WishlistStore>>,
        session: watch::Receiver<Option<Session>>,
        notices: Notices,
    ) -> Self {
        Self {
            state: Mutex::new(Loaded::default()),
            store,
            session,
            notices,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Loaded> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_user(&self) -> Option<UserId> {
        self.session
            .borrow()
            .as_ref()
            .map(|session| session.user_id.clone())
    }

    fn store(&self) -> Result<&dyn WishlistStore, WishlistError> {
        self.store.as_deref().ok_or_else(|| {
            WishlistError::Store(StoreError::Unavailable(
                "row store not configured".to_string(),
            ))
        })
    }

    /// The signed-in user, or a reported `NotAuthenticated`.
    fn require_user(&self) -> Result<UserId, WishlistError> {
        self.current_user().ok_or_else(|| {
            let err = WishlistError::NotAuthenticated;
            self.notices.error(err.user_message());
            err
        })
    }

    /// Report a failure as a notice and hand it back.
    fn fail(&self, action: &str, err: WishlistError) -> WishlistError {
        tracing::warn!(error = %err, action, "Wishlist operation failed");
        self.notices.error(err.user_message());
        err
    }

    /// Apply `f` to the set if `user_id` is still signed in and the set is
    /// not another user's. An unloaded set is claimed for `user_id`.
    fn apply_for(
        &self,
        user_id: &UserId,
        f: impl FnOnce(&mut Vec<WishlistEntry>),
    ) -> Result<(), WishlistError> {
        if self.current_user().as_ref() != Some(user_id) {
            return Err(WishlistError::SessionChanged);
        }
        let mut state = self.lock();
        if state.user_id.get_or_insert_with(|| user_id.clone()) != user_id {
            return Err(WishlistError::SessionChanged);
        }
        f(&mut state.entries);
        Ok(())
    }

    /// Replace the set with the user's remote rows.
    ///
    /// A failed fetch is logged and leaves the set empty.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn load(&self, user_id: &UserId) {
        let entries = match &self.store {
            Some(store) => match store.list(user_id).await {
                Ok(rows) => rows.iter().map(WishlistRow::to_entry).collect(),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to load wishlist");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        if self.current_user().as_ref() != Some(user_id) {
            tracing::debug!("Session changed while loading wishlist, discarding");
            return;
        }
        tracing::debug!(entries = entries.len(), "Loaded wishlist");
        *self.lock() = Loaded {
            user_id: Some(user_id.clone()),
            entries,
        };
    }

    /// Forget the loaded set.
    pub fn clear(&self) {
        *self.lock() = Loaded::default();
    }

    #[must_use]
    pub fn entries(&self) -> Vec<WishlistEntry> {
        self.lock().entries.clone()
    }

    #[must_use]
    pub fn is_in_wishlist(&self, product_id: ProductId) -> bool {
        entry_for(&self.lock().entries, product_id).is_some()
    }

    #[must_use]
    pub fn entry_id(&self, product_id: ProductId) -> Option<WishlistEntryId> {
        entry_for(&self.lock().entries, product_id).map(|entry| entry.id)
    }

    /// Like a product.
    ///
    /// A product that is already liked returns its existing entry without
    /// touching the store.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` without a session; `Store` if the insert fails;
    /// `SessionChanged` if the user signed out meanwhile.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn add_item(
        &self,
        product_id: ProductId,
        notify_on_restock: bool,
    ) -> Result<WishlistEntry, WishlistError> {
        let user_id = self.require_user()?;

        let existing = entry_for(&self.lock().entries, product_id).cloned();
        if let Some(existing) = existing {
            self.notices.info("Already in your favorites");
            return Ok(existing);
        }

        let store = self.store().map_err(|e| self.fail("add", e))?;
        let row = store
            .insert(&NewWishlistRow {
                user_id: user_id.clone(),
                product_id,
                notify_on_restock,
            })
            .await
            .map_err(|e| self.fail("add", e.into()))?;

        let entry = row.to_entry();
        self.apply_for(&user_id, |entries| entries.push(entry.clone()))
            .map_err(|e| self.fail("add", e))?;
        self.notices.success("Added to favorites");
        Ok(entry)
    }

    /// Unlike a product.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` without a session; `Store` if the delete fails;
    /// `SessionChanged` if the user signed out meanwhile.
    #[instrument(skip(self), fields(entry_id = %id))]
    pub async fn remove_item(&self, id: WishlistEntryId) -> Result<(), WishlistError> {
        let user_id = self.require_user()?;
        let store = self.store().map_err(|e| self.fail("remove", e))?;

        store
            .delete(id)
            .await
            .map_err(|e| self.fail("remove", e.into()))?;

        self.apply_for(&user_id, |entries| entries.retain(|entry| entry.id != id))
            .map_err(|e| self.fail("remove", e))?;
        self.notices.success("Removed from favorites");
        Ok(())
    }

    /// Turn restock notifications on or off for an entry.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` without a session; `Store` if the update fails;
    /// `SessionChanged` if the user signed out meanwhile.
    #[instrument(skip(self), fields(entry_id = %id))]
    pub async fn toggle_notification(
        &self,
        id: WishlistEntryId,
        notify: bool,
    ) -> Result<(), WishlistError> {
        let user_id = self.require_user()?;
        let store = self.store().map_err(|e| self.fail("toggle", e))?;

        let row = store
            .set_notify(id, notify)
            .await
            .map_err(|e| self.fail("toggle", e.into()))?;

        self.apply_for(&user_id, |entries| {
            if let Some(entry) = entries.iter_mut().find(|entry| entry.id == id) {
                entry.notify_on_restock = row.notify_on_restock;
            }
        })
        .map_err(|e| self.fail("toggle", e))?;

        if notify {
            self.notices
                .success("You will be notified when this product is back in stock");
        } else {
            self.notices.info("Notifications turned off");
        }
        Ok(())
    }
}
