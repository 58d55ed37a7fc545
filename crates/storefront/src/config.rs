//! Storefront client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `AURORA_DATA_DIR` - Directory for local durable storage (default: `.aurora`)
//! - `SUPABASE_URL` - Remote row store base URL (e.g., `https://xyz.supabase.co`)
//! - `SUPABASE_ANON_KEY` - Remote row store anonymous API key (required with `SUPABASE_URL`)
//! - `FIREBASE_API_KEY` - Identity provider web API key
//! - `VEXOR_PROJECT_ID` - Checkout provider project ID
//! - `VEXOR_PUBLISHABLE_KEY` - Checkout provider publishable key (required with `VEXOR_PROJECT_ID`)
//! - `VEXOR_API_URL` - Checkout provider API base URL (default: `https://api.vexor.io`)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//!
//! Every remote collaborator is optional: without `SUPABASE_URL` the cart runs
//! local-only, without `FIREBASE_API_KEY` nobody can sign in, and without the
//! Vexor pair checkout reports that payments are not configured.

use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

const DEFAULT_DATA_DIR: &str = ".aurora";
const DEFAULT_VEXOR_API_URL: &str = "https://api.vexor.io";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "your_",
    "changeme",
    "replace",
    "placeholder",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront client configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Directory backing local durable storage
    pub data_dir: PathBuf,
    /// Remote row store, if configured
    pub supabase: Option<SupabaseConfig>,
    /// Identity provider, if configured
    pub firebase: Option<FirebaseConfig>,
    /// Checkout provider, if configured
    pub vexor: Option<VexorConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Remote row store configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct SupabaseConfig {
    /// Project base URL
    pub url: Url,
    /// Anonymous API key (sent as `apikey` and bearer token)
    pub anon_key: SecretString,
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url.as_str())
            .field("anon_key", &"[REDACTED]")
            .finish()
    }
}

/// Identity provider configuration.
#[derive(Clone)]
pub struct FirebaseConfig {
    /// Web API key
    pub api_key: SecretString,
}

impl std::fmt::Debug for FirebaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseConfig")
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Checkout provider configuration.
#[derive(Clone)]
pub struct VexorConfig {
    /// Project identifier (safe to log)
    pub project_id: String,
    /// Publishable key
    pub publishable_key: SecretString,
    /// API base URL
    pub api_url: Url,
}

impl std::fmt::Debug for VexorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VexorConfig")
            .field("project_id", &self.project_id)
            .field("publishable_key", &"[REDACTED]")
            .field("api_url", &self.api_url.as_str())
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid, if one half
    /// of a required pair is missing, or if a secret looks like a placeholder.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let data_dir = PathBuf::from(get_env_or_default("AURORA_DATA_DIR", DEFAULT_DATA_DIR));

        Ok(Self {
            data_dir,
            supabase: SupabaseConfig::from_env()?,
            firebase: FirebaseConfig::from_env()?,
            vexor: VexorConfig::from_env()?,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// A configuration with no remote collaborators, storing data under `data_dir`.
    #[must_use]
    pub fn local_only(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            supabase: None,
            firebase: None,
            vexor: None,
            sentry_dsn: None,
            sentry_environment: None,
        }
    }
}

impl SupabaseConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(url) = get_optional_env("SUPABASE_URL") else {
            return Ok(None);
        };
        Ok(Some(Self {
            url: parse_url("SUPABASE_URL", &url)?,
            anon_key: get_validated_secret("SUPABASE_ANON_KEY")?,
        }))
    }
}

impl FirebaseConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        if get_optional_env("FIREBASE_API_KEY").is_none() {
            return Ok(None);
        }
        Ok(Some(Self {
            api_key: get_validated_secret("FIREBASE_API_KEY")?,
        }))
    }
}

impl VexorConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(project_id) = get_optional_env("VEXOR_PROJECT_ID") else {
            return Ok(None);
        };
        let api_url = get_env_or_default("VEXOR_API_URL", DEFAULT_VEXOR_API_URL);
        Ok(Some(Self {
            project_id,
            publishable_key: get_validated_secret("VEXOR_PUBLISHABLE_KEY")?,
            api_url: parse_url("VEXOR_API_URL", &api_url)?,
        }))
    }

    /// Whether both identifiers are non-empty.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.project_id.trim().is_empty()
            && !self.publishable_key.expose_secret().trim().is_empty()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable, treating empty values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

fn parse_url(key: &str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    Ok(url)
}

/// Validate that a secret is not a placeholder.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-anon-key-here", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_changeme() {
        assert!(validate_secret_strength("CHANGEME123", "TEST_VAR").is_err());
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("pk_live_9f3Kq2LmZx81", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_parse_url_rejects_other_schemes() {
        assert!(parse_url("SUPABASE_URL", "https://abc.supabase.co").is_ok());
        assert!(matches!(
            parse_url("SUPABASE_URL", "ftp://abc.supabase.co"),
            Err(ConfigError::InvalidEnvVar(_, _))
        ));
        assert!(parse_url("SUPABASE_URL", "not a url").is_err());
    }

    #[test]
    fn test_local_only_has_no_collaborators() {
        let config = StorefrontConfig::local_only("/tmp/aurora");
        assert!(config.supabase.is_none());
        assert!(config.firebase.is_none());
        assert!(config.vexor.is_none());
        assert_eq!(config.data_dir, PathBuf::from("/tmp/aurora"));
    }

    #[test]
    fn test_vexor_is_complete() {
        let config = VexorConfig {
            project_id: "proj_123".to_string(),
            publishable_key: SecretString::from(String::new()),
            api_url: Url::parse(DEFAULT_VEXOR_API_URL).unwrap(),
        };
        assert!(!config.is_complete());
    }

    #[test]
    fn test_supabase_config_debug_redacts_secrets() {
        let config = SupabaseConfig {
            url: Url::parse("https://abc.supabase.co").unwrap(),
            anon_key: SecretString::from("super_secret_anon_key"),
        };

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("abc.supabase.co"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_anon_key"));
    }

    #[test]
    fn test_vexor_config_debug_redacts_secrets() {
        let config = VexorConfig {
            project_id: "proj_visible".to_string(),
            publishable_key: SecretString::from("pk_super_secret"),
            api_url: Url::parse(DEFAULT_VEXOR_API_URL).unwrap(),
        };

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("proj_visible"));
        assert!(!debug_output.contains("pk_super_secret"));
    }
}
