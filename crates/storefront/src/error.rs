//! Unified error handling with Sentry integration.
//!
//! Each concern has its own error enum next to the code that raises it.
//! `AppError` unifies them for callers that handle many concerns at once (the
//! CLI, the session listener) and knows which failures are worth a Sentry
//! event and what the user may be told about each.

use aurora_core::checkout::PricingError;
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::checkout::CheckoutError;
use crate::config::ConfigError;
use crate::local::LocalStorageError;
use crate::remote::StoreError;
use crate::session::AuthError;
use crate::wishlist::WishlistError;

/// Application-level error type for the storefront client.
#[derive(Debug, Error)]
pub enum AppError {
    /// Remote row store operation failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Local storage operation failed.
    #[error("Local storage error: {0}")]
    Storage(#[from] LocalStorageError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Wishlist operation failed.
    #[error("Wishlist error: {0}")]
    Wishlist(#[from] WishlistError),

    /// Checkout could not be started.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Invalid coupon, shipping method or provider.
    #[error("Pricing error: {0}")]
    Pricing(#[from] PricingError),

    /// Configuration is invalid.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Product catalog could not be loaded.
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Operation needs a signed-in user.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad input from the user.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    /// Whether this failure points at a broken collaborator rather than at
    /// something the user did.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        match self {
            Self::Store(_) | Self::Storage(_) | Self::Config(_) | Self::Catalog(_) => true,
            Self::Auth(err) => matches!(
                err,
                AuthError::Http(_) | AuthError::Parse(_) | AuthError::Provider(_)
            ),
            Self::Wishlist(err) => matches!(err, WishlistError::Store(_)),
            Self::Checkout(err) => err.is_internal(),
            Self::Pricing(_) | Self::NotAuthenticated | Self::NotFound(_) | Self::BadRequest(_) => {
                false
            }
        }
    }

    /// Text safe to show the user.
    ///
    /// Internal details (status codes, URLs, SQL) are never included.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Store(_) | Self::Storage(_) => {
                "Something went wrong, please try again".to_string()
            }
            Self::Config(_) | Self::Catalog(_) => "The store is misconfigured".to_string(),
            Self::Auth(err) => err.user_message(),
            Self::Wishlist(err) => err.user_message(),
            Self::Checkout(err) => err.user_message(),
            Self::Pricing(err) => err.to_string(),
            Self::NotAuthenticated => "You need to sign in first".to_string(),
            Self::NotFound(what) => format!("{what} not found"),
            Self::BadRequest(msg) => msg.clone(),
        }
    }

    /// Log the error and, for internal failures, capture it to Sentry.
    pub fn report(&self) {
        if self.is_internal() {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Operation failed"
            );
        } else {
            tracing::warn!(error = %self, "Operation rejected");
        }
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added item", Some(&[("product_id", "12")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("Product 123".to_string());
        assert_eq!(err.to_string(), "Not found: Product 123");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_user_message_hides_internals() {
        let err = AppError::Store(StoreError::Api {
            status: 500,
            message: "relation \"cart_items\" does not exist".to_string(),
        });
        assert!(err.is_internal());
        assert!(!err.user_message().contains("cart_items"));
        assert!(!err.user_message().contains("500"));
    }

    #[test]
    fn test_user_errors_are_not_internal() {
        assert!(!AppError::NotAuthenticated.is_internal());
        assert!(!AppError::Auth(AuthError::InvalidCredentials).is_internal());
        assert!(!AppError::Wishlist(WishlistError::NotAuthenticated).is_internal());
        assert!(!AppError::Pricing(PricingError::InvalidCoupon("NOPE".to_string())).is_internal());
        assert!(AppError::Wishlist(WishlistError::Store(StoreError::Unavailable(
            "down".to_string()
        )))
        .is_internal());
    }

    #[test]
    fn test_report_without_sentry_client() {
        // No client bound: capture is a no-op and must not panic.
        AppError::NotAuthenticated.report();
        AppError::Store(StoreError::Unavailable("down".to_string())).report();
    }
}
