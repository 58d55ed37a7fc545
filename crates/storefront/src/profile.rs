//! Profile of the signed-in user.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::instrument;

use crate::error::AppError;
use crate::notice::Notices;
use crate::remote::{NewProfile, Profile, ProfileStore, ProfileUpdate, StoreError};
use crate::session::Session;

/// Keeps the profile row in step with the session.
pub struct ProfileService {
    profile: Mutex<Option<Profile>>,
    store: Option<Arc<dyn ProfileStore>>,
    session: watch::Receiver<Option<Session>>,
    notices: Notices,
}

impl std::fmt::Debug for ProfileService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileService")
            .field("profile", &*self.lock())
            .finish_non_exhaustive()
    }
}

impl ProfileService {
    #[must_use]
    pub fn new(
        store: Option<Arc<dyn ProfileStore>>,
        session: watch::Receiver<Option<Session>>,
        notices: Notices,
    ) -> Self {
        Self {
            profile: Mutex::new(None),
            store,
            session,
            notices,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Profile>> {
        self.profile.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetch the session's profile, creating it from the session identity when
    /// it does not exist yet.
    ///
    /// A failed fetch is treated like a missing profile. A failed create is
    /// logged and leaves no profile loaded.
    #[instrument(skip(self, session), fields(user_id = %session.user_id))]
    pub async fn ensure_profile(&self, session: &Session) -> Option<Profile> {
        let store = self.store.as_ref()?;

        let existing = match store.get(&session.user_id).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch profile");
                None
            }
        };

        let profile = match existing {
            Some(profile) => profile,
            None => {
                let new_profile = NewProfile {
                    id: session.user_id.clone(),
                    email: session.email.clone().unwrap_or_default(),
                    full_name: Some(session.display_name.clone().unwrap_or_default()),
                    avatar_url: session.avatar_url.clone(),
                };
                match store.create(&new_profile).await {
                    Ok(profile) => {
                        tracing::info!("Created profile");
                        profile
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to create profile");
                        return None;
                    }
                }
            }
        };

        *self.lock() = Some(profile.clone());
        Some(profile)
    }

    /// The loaded profile, if any.
    #[must_use]
    pub fn current(&self) -> Option<Profile> {
        self.lock().clone()
    }

    /// Forget the loaded profile.
    pub fn clear(&self) {
        *self.lock() = None;
    }

    /// Update the signed-in user's profile.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` without a session, `BadRequest` for an empty
    /// update, `Store` if the row store rejects it.
    #[instrument(skip(self, changes))]
    pub async fn update(&self, changes: &ProfileUpdate) -> Result<Profile, AppError> {
        let Some(user_id) = self
            .session
            .borrow()
            .as_ref()
            .map(|session| session.user_id.clone())
        else {
            return Err(AppError::NotAuthenticated);
        };
        if changes.is_empty() {
            return Err(AppError::BadRequest("Nothing to update".to_string()));
        }
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| StoreError::Unavailable("row store not configured".to_string()))?;

        match store.update(&user_id, changes).await {
            Ok(profile) => {
                *self.lock() = Some(profile.clone());
                self.notices.success("Profile updated");
                Ok(profile)
            }
            Err(e) => {
                tracing::warn!(error = %e, user_id = %user_id, "Failed to update profile");
                self.notices.error("Could not update your profile");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use aurora_core::UserId;

    use super::*;
    use crate::remote::{Collection, MemoryStore};

    fn session() -> Session {
        Session {
            user_id: UserId::new("uid-1"),
            email: Some("ana@example.com".to_string()),
            display_name: Some("Ana".to_string()),
            avatar_url: None,
            id_token: String::new(),
        }
    }

    fn service(store: &Arc<MemoryStore>, signed_in: bool) -> ProfileService {
        let (_tx, rx) = watch::channel(signed_in.then(session));
        let remote: Arc<dyn ProfileStore> = store.clone();
        ProfileService::new(Some(remote), rx, Notices::new())
    }

    #[tokio::test]
    async fn test_ensure_profile_creates_once() {
        let store = Arc::new(MemoryStore::new());
        let profiles = service(&store, true);

        let created = profiles.ensure_profile(&session()).await.unwrap();
        assert_eq!(created.email, "ana@example.com");
        assert_eq!(created.full_name.as_deref(), Some("Ana"));

        let again = profiles.ensure_profile(&session()).await.unwrap();
        assert_eq!(again, created);
        assert_eq!(profiles.current(), Some(created));
    }

    #[tokio::test]
    async fn test_ensure_profile_create_failure() {
        let store = Arc::new(MemoryStore::new());
        store.fail_writes(Collection::Profiles, true);
        let profiles = service(&store, true);

        assert!(profiles.ensure_profile(&session()).await.is_none());
        assert!(profiles.current().is_none());
    }

    #[tokio::test]
    async fn test_update_requires_session() {
        let store = Arc::new(MemoryStore::new());
        let profiles = service(&store, false);
        let changes = ProfileUpdate {
            phone: Some("555".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            profiles.update(&changes).await,
            Err(AppError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_update_patches_fields() {
        let store = Arc::new(MemoryStore::new());
        let profiles = service(&store, true);
        profiles.ensure_profile(&session()).await.unwrap();

        let updated = profiles
            .update(&ProfileUpdate {
                phone: Some("555-0100".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(updated.phone.as_deref(), Some("555-0100"));
        assert_eq!(updated.full_name.as_deref(), Some("Ana"));
        assert!(matches!(
            profiles.update(&ProfileUpdate::default()).await,
            Err(AppError::BadRequest(_))
        ));
    }
}
