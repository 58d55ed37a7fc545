//! Integration tests for Aurora.
//!
//! The tests drive a full [`AppState`] wired to in-memory collaborators: the
//! row store is a [`MemoryStore`], local storage is a [`MemoryStorage`], the
//! identity provider accepts a fixed password, and the payment provider hands
//! out fake URLs. No network or database is needed.
//!
//! ```bash
//! cargo test -p aurora-integration-tests
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use aurora_core::checkout::{OrderDescription, PaymentProvider};
use aurora_core::{Product, ProductId, UserId};
use aurora_storefront::catalog::Catalog;
use aurora_storefront::checkout::{CheckoutError, CheckoutProvider, CheckoutSession};
use aurora_storefront::local::MemoryStorage;
use aurora_storefront::notice::Notice;
use aurora_storefront::remote::MemoryStore;
use aurora_storefront::session::{AuthError, Credentials, IdentityProvider, Session};
use aurora_storefront::{AppState, Collaborators};
use tokio::sync::broadcast;

/// The only password [`FixedPasswordProvider`] accepts.
pub const PASSWORD: &str = "correct horse";

/// Signs in any email with [`PASSWORD`]; the user id is derived from the
/// email so repeated sign-ins map to the same user.
#[derive(Debug, Default)]
pub struct FixedPasswordProvider;

#[async_trait]
impl IdentityProvider for FixedPasswordProvider {
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        use secrecy::ExposeSecret;

        if credentials.password.expose_secret() != PASSWORD {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(Session {
            user_id: user_id_for(&credentials.email),
            email: Some(credentials.email.clone()),
            display_name: credentials.email.split('@').next().map(str::to_owned),
            avatar_url: None,
            id_token: format!("token-{}", credentials.email),
        })
    }

    async fn sign_out(&self, _session: &Session) -> Result<(), AuthError> {
        Ok(())
    }
}

/// The user id [`FixedPasswordProvider`] issues for an email.
#[must_use]
pub fn user_id_for(email: &str) -> UserId {
    UserId::new(format!("uid-{email}"))
}

/// Payment provider that always succeeds with a predictable URL.
#[derive(Debug, Default)]
pub struct FakePayments;

#[async_trait]
impl CheckoutProvider for FakePayments {
    async fn create_checkout(
        &self,
        provider: PaymentProvider,
        description: &OrderDescription,
    ) -> Result<CheckoutSession, CheckoutError> {
        let url = format!(
            "https://pay.example.test/{}?items={}",
            provider.as_str(),
            description.items.len()
        );
        Ok(CheckoutSession {
            payment_url: url.parse().map_err(|e| CheckoutError::Parse(format!("{e}")))?,
            provider,
        })
    }
}

/// A running storefront over shared in-memory collaborators.
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub storage: Arc<MemoryStorage>,
    pub state: AppState,
}

impl TestContext {
    /// Start with an empty store and empty local storage.
    ///
    /// # Panics
    ///
    /// Panics if the bundled catalog does not parse.
    #[must_use]
    pub fn start() -> Self {
        Self::with(Arc::new(MemoryStore::new()), Arc::new(MemoryStorage::new()))
    }

    /// Start over existing collaborators, as a fresh process would.
    ///
    /// # Panics
    ///
    /// Panics if the bundled catalog does not parse.
    #[must_use]
    pub fn with(store: Arc<MemoryStore>, storage: Arc<MemoryStorage>) -> Self {
        let collaborators = Collaborators::local(storage.clone())
            .with_store(&store)
            .with_identity(Arc::new(FixedPasswordProvider))
            .with_checkout(Arc::new(FakePayments));
        let catalog = match Catalog::embedded() {
            Ok(catalog) => catalog,
            Err(e) => panic!("bundled catalog must parse: {e}"),
        };
        Self {
            state: AppState::start(collaborators, catalog),
            store,
            storage,
        }
    }

    /// Shut this instance down and start another over the same collaborators.
    pub async fn restart(self) -> Self {
        self.state.shutdown().await;
        let next = Self::with(self.store, self.storage);
        next.state.settle().await;
        next
    }

    /// A catalog product.
    ///
    /// # Panics
    ///
    /// Panics if the product is not in the bundled catalog.
    #[must_use]
    pub fn product(&self, id: i64) -> Product {
        match self.state.catalog().get(ProductId::new(id)) {
            Some(product) => product.clone(),
            None => panic!("product {id} is not in the catalog"),
        }
    }

    /// Sign in and wait for the session listener to finish reconciling.
    ///
    /// # Errors
    ///
    /// Returns the provider's error for a wrong password.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let session = self
            .state
            .session()
            .sign_in(&Credentials::new(email, password))
            .await?;
        self.state.settle().await;
        Ok(session)
    }

    /// Sign out and wait for the session listener.
    ///
    /// # Errors
    ///
    /// Returns the provider's error.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.state.session().sign_out().await?;
        self.state.settle().await;
        Ok(())
    }

    /// Wait for queued cart writes to reach the store.
    pub async fn flush(&self) {
        self.state.settle().await;
        self.state.cart().flush().await;
    }
}

/// Every notice received so far.
pub fn drain_notices(notices: &mut broadcast::Receiver<Notice>) -> Vec<Notice> {
    let mut received = Vec::new();
    loop {
        match notices.try_recv() {
            Ok(notice) => received.push(notice),
            Err(broadcast::error::TryRecvError::Lagged(_)) => {}
            Err(_) => return received,
        }
    }
}
