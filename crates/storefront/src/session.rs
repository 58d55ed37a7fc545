//! Sessions and the identity provider.
//!
//! The identity provider is a black box that turns credentials into a
//! [`Session`]. [`SessionManager`] owns the current session, persists it to
//! local storage so a restart stays signed in, and broadcasts every change on a
//! `watch` channel. Dropping a receiver unsubscribes.

use std::sync::Arc;

use async_trait::async_trait;
use aurora_core::UserId;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::instrument;
use url::Url;

use crate::config::FirebaseConfig;
use crate::local::{LocalStorage, SESSION_KEY};
use crate::notice::Notices;

/// Identity Toolkit base URL.
const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/";

/// Errors from signing in or out.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No identity provider is configured.
    #[error("identity provider not configured")]
    NotConfigured,

    /// Email or password rejected.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Account exists but cannot sign in.
    #[error("account disabled")]
    AccountDisabled,

    /// Provider refused the request for another reason.
    #[error("provider error: {0}")]
    Provider(String),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl AuthError {
    /// Text safe to show the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NotConfigured => "Sign-in is not available right now".to_string(),
            Self::InvalidCredentials => "Invalid email or password".to_string(),
            Self::AccountDisabled => "This account has been disabled".to_string(),
            Self::Provider(_) | Self::Http(_) | Self::Parse(_) => {
                "Unexpected error while signing in".to_string()
            }
        }
    }
}

/// An authenticated identity.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    /// Provider-issued token, never logged.
    pub id_token: String,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("display_name", &self.display_name)
            .field("id_token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// Email and password.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: SecretString,
}

impl Credentials {
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: SecretString::from(password.into()),
        }
    }
}

/// Issues and revokes sessions.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange credentials for a session.
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, AuthError>;

    /// End a session on the provider side.
    async fn sign_out(&self, session: &Session) -> Result<(), AuthError>;
}

// =============================================================================
// Firebase
// =============================================================================

/// Identity Toolkit REST client (email + password accounts).
#[derive(Clone)]
pub struct FirebaseAuthClient {
    client: reqwest::Client,
    base_url: Url,
    api_key: SecretString,
}

impl std::fmt::Debug for FirebaseAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseAuthClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    profile_picture: Option<String>,
    id_token: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl FirebaseAuthClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &FirebaseConfig) -> Result<Self, AuthError> {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;
        let base_url = Url::parse(IDENTITY_TOOLKIT_URL)
            .map_err(|e| AuthError::Parse(format!("Invalid base URL: {e}")))?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    /// Point the client at another Identity Toolkit host (e.g. the emulator).
    #[must_use]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    fn endpoint(&self, method: &str) -> Result<Url, AuthError> {
        let mut url = self
            .base_url
            .join(&format!("v1/accounts:{method}"))
            .map_err(|e| AuthError::Parse(format!("Invalid endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("key", self.api_key.expose_secret());
        Ok(url)
    }
}

/// Map an Identity Toolkit error code to an [`AuthError`].
fn classify_error(message: &str) -> AuthError {
    // Codes may carry a suffix: "TOO_MANY_ATTEMPTS_TRY_LATER : ..."
    let code = message.split(':').next().unwrap_or_default().trim();
    match code {
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "INVALID_EMAIL" => {
            AuthError::InvalidCredentials
        }
        "USER_DISABLED" => AuthError::AccountDisabled,
        other => AuthError::Provider(other.to_string()),
    }
}

#[async_trait]
impl IdentityProvider for FirebaseAuthClient {
    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        let url = self.endpoint("signInWithPassword")?;
        let body = SignInRequest {
            email: &credentials.email,
            password: credentials.password.expose_secret(),
            return_secure_token: true,
        };

        // The key travels in the query string, keep it out of error messages
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(serde_json::from_str::<ErrorEnvelope>(&text).map_or_else(
                |_| AuthError::Provider(format!("HTTP {}", status.as_u16())),
                |envelope| classify_error(&envelope.error.message),
            ));
        }

        let signed_in: SignInResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Parse(e.without_url().to_string()))?;

        Ok(Session {
            user_id: UserId::new(signed_in.local_id),
            email: signed_in.email.filter(|e| !e.is_empty()),
            display_name: signed_in.display_name.filter(|n| !n.is_empty()),
            avatar_url: signed_in.profile_picture.filter(|p| !p.is_empty()),
            id_token: signed_in.id_token,
        })
    }

    async fn sign_out(&self, _session: &Session) -> Result<(), AuthError> {
        // Password sessions are client-held tokens; dropping them is enough.
        Ok(())
    }
}

// =============================================================================
// SessionManager
// =============================================================================

/// Owner of the current session.
pub struct SessionManager {
    provider: Option<Arc<dyn IdentityProvider>>,
    storage: Arc<dyn LocalStorage>,
    notices: Notices,
    sender: watch::Sender<Option<Session>>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("configured", &self.provider.is_some())
            .field("session", &*self.sender.borrow())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Create a manager, restoring a persisted session if one is stored.
    ///
    /// An unreadable or malformed stored session is discarded.
    #[must_use]
    pub fn new(
        provider: Option<Arc<dyn IdentityProvider>>,
        storage: Arc<dyn LocalStorage>,
        notices: Notices,
    ) -> Self {
        let restored = restore_session(storage.as_ref());
        if let Some(session) = &restored {
            tracing::info!(user_id = %session.user_id, "Restored session");
        }
        let (sender, _) = watch::channel(restored);
        Self {
            provider,
            storage,
            notices,
            sender,
        }
    }

    /// Observe session changes. The receiver starts at the current value.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.sender.subscribe()
    }

    #[must_use]
    pub fn current(&self) -> Option<Session> {
        self.sender.borrow().clone()
    }

    /// Sign in and publish the new session.
    ///
    /// # Errors
    ///
    /// Returns the provider's error after publishing it as a notice.
    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        let result = match &self.provider {
            Some(provider) => provider.sign_in(credentials).await,
            None => Err(AuthError::NotConfigured),
        };

        match result {
            Ok(session) => {
                self.persist(Some(&session));
                self.sender.send_replace(Some(session.clone()));
                tracing::info!(user_id = %session.user_id, "Signed in");
                self.notices.success("Welcome! You are now signed in.");
                Ok(session)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Sign-in failed");
                self.notices
                    .error(format!("Could not sign in: {}", e.user_message()));
                Err(e)
            }
        }
    }

    /// Sign out and publish the absent session.
    ///
    /// Signing out with no session is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the provider's error after publishing it as a notice; the
    /// session is kept in that case.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let Some(session) = self.current() else {
            return Ok(());
        };

        if let Some(provider) = &self.provider
            && let Err(e) = provider.sign_out(&session).await
        {
            tracing::warn!(error = %e, user_id = %session.user_id, "Sign-out failed");
            self.notices.error("Could not sign out");
            return Err(e);
        }

        self.persist(None);
        self.sender.send_replace(None);
        tracing::info!(user_id = %session.user_id, "Signed out");
        self.notices.success("You have signed out.");
        Ok(())
    }

    fn persist(&self, session: Option<&Session>) {
        let result = match session {
            Some(session) => match serde_json::to_string(session) {
                Ok(json) => self.storage.set(SESSION_KEY, &json),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to serialize session");
                    return;
                }
            },
            None => self.storage.remove(SESSION_KEY),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to persist session");
        }
    }
}

fn restore_session(storage: &dyn LocalStorage) -> Option<Session> {
    let stored = match storage.get(SESSION_KEY) {
        Ok(stored) => stored?,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read stored session");
            return None;
        }
    };
    match serde_json::from_str(&stored) {
        Ok(session) => Some(session),
        Err(e) => {
            tracing::warn!(error = %e, "Discarding malformed stored session");
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::local::MemoryStorage;
    use crate::notice::NoticeLevel;

    struct StaticProvider {
        accept_password: &'static str,
    }

    #[async_trait]
    impl IdentityProvider for StaticProvider {
        async fn sign_in(&self, credentials: &Credentials) -> Result<Session, AuthError> {
            if credentials.password.expose_secret() != self.accept_password {
                return Err(AuthError::InvalidCredentials);
            }
            Ok(Session {
                user_id: UserId::new("uid-1"),
                email: Some(credentials.email.clone()),
                display_name: None,
                avatar_url: None,
                id_token: "token".to_string(),
            })
        }

        async fn sign_out(&self, _session: &Session) -> Result<(), AuthError> {
            Ok(())
        }
    }

    fn manager(storage: Arc<MemoryStorage>) -> (SessionManager, Notices) {
        let notices = Notices::new();
        let provider: Arc<dyn IdentityProvider> = Arc::new(StaticProvider {
            accept_password: "hunter2",
        });
        (
            SessionManager::new(Some(provider), storage, notices.clone()),
            notices,
        )
    }

    #[tokio::test]
    async fn test_sign_in_publishes_and_persists() {
        let storage = Arc::new(MemoryStorage::new());
        let (manager, notices) = manager(Arc::clone(&storage));
        let mut rx = manager.subscribe();
        let mut notice_rx = notices.subscribe();

        manager
            .sign_in(&Credentials::new("ana@example.com", "hunter2"))
            .await
            .unwrap();

        assert!(rx.has_changed().unwrap());
        let session = rx.borrow_and_update().clone().unwrap();
        assert_eq!(session.user_id, UserId::new("uid-1"));
        assert!(storage.get(SESSION_KEY).unwrap().is_some());
        assert_eq!(notice_rx.recv().await.unwrap().level, NoticeLevel::Success);
    }

    #[tokio::test]
    async fn test_failed_sign_in_reports_notice() {
        let storage = Arc::new(MemoryStorage::new());
        let (manager, notices) = manager(storage);
        let mut notice_rx = notices.subscribe();

        let result = manager
            .sign_in(&Credentials::new("ana@example.com", "wrong"))
            .await;

        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
        assert!(manager.current().is_none());
        let notice = notice_rx.recv().await.unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert!(notice.message.contains("Invalid email or password"));
    }

    #[tokio::test]
    async fn test_sign_out_clears_persisted_session() {
        let storage = Arc::new(MemoryStorage::new());
        let (manager, _notices) = manager(Arc::clone(&storage));
        manager
            .sign_in(&Credentials::new("ana@example.com", "hunter2"))
            .await
            .unwrap();

        manager.sign_out().await.unwrap();

        assert!(manager.current().is_none());
        assert!(storage.get(SESSION_KEY).unwrap().is_none());
        // Second sign-out is a no-op
        manager.sign_out().await.unwrap();
    }

    #[tokio::test]
    async fn test_restores_persisted_session() {
        let storage = Arc::new(MemoryStorage::new());
        {
            let (manager, _notices) = manager(Arc::clone(&storage));
            manager
                .sign_in(&Credentials::new("ana@example.com", "hunter2"))
                .await
                .unwrap();
        }
        let (restored, _notices) = manager(storage);
        assert_eq!(restored.current().unwrap().user_id, UserId::new("uid-1"));
    }

    #[test]
    fn test_malformed_session_is_discarded() {
        let storage = Arc::new(MemoryStorage::new().with_slot(SESSION_KEY, "{not json"));
        let (manager, _notices) = manager(storage);
        assert!(manager.current().is_none());
    }

    #[tokio::test]
    async fn test_sign_in_without_provider() {
        let manager = SessionManager::new(None, Arc::new(MemoryStorage::new()), Notices::new());
        assert!(matches!(
            manager.sign_in(&Credentials::new("a@b.c", "x")).await,
            Err(AuthError::NotConfigured)
        ));
    }

    #[test]
    fn test_classify_error() {
        assert!(matches!(
            classify_error("INVALID_LOGIN_CREDENTIALS"),
            AuthError::InvalidCredentials
        ));
        assert!(matches!(classify_error("USER_DISABLED"), AuthError::AccountDisabled));
        assert!(matches!(
            classify_error("TOO_MANY_ATTEMPTS_TRY_LATER : Access disabled"),
            AuthError::Provider(code) if code == "TOO_MANY_ATTEMPTS_TRY_LATER"
        ));
    }

    #[test]
    fn test_session_debug_redacts_token() {
        let session = Session {
            user_id: UserId::new("uid-1"),
            email: None,
            display_name: None,
            avatar_url: None,
            id_token: "secret-token".to_string(),
        };
        assert!(!format!("{session:?}").contains("secret-token"));
    }

    #[test]
    fn test_endpoint_carries_key() {
        let client = FirebaseAuthClient::new(&FirebaseConfig {
            api_key: SecretString::from("AIzaTest"),
        })
        .unwrap();
        let url = client.endpoint("signInWithPassword").unwrap();
        assert_eq!(
            url.as_str(),
            "https://identitytoolkit.googleapis.com/v1/accounts:signInWithPassword?key=AIzaTest"
        );
    }
}
