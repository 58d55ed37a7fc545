//! Local durable storage.
//!
//! A small string-keyed slot store, the client's equivalent of browser local
//! storage. Each key holds one serialized value that is overwritten wholesale
//! on every save; there are no partial writes and no transactions.
//!
//! # Keys
//!
//! - [`CART_KEY`] - JSON snapshot of the cart line items
//! - [`SESSION_KEY`] - JSON of the signed-in session, so it survives restarts

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;

/// Slot holding the cart snapshot.
pub const CART_KEY: &str = "aurora_cart";

/// Slot holding the persisted session.
pub const SESSION_KEY: &str = "aurora_session";

/// Errors from the local storage backend.
#[derive(Debug, Error)]
pub enum LocalStorageError {
    /// Filesystem operation failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Key contains characters that cannot be used as a slot name.
    #[error("invalid storage key: {0}")]
    InvalidKey(String),
}

/// String-keyed durable slots.
pub trait LocalStorage: Send + Sync {
    /// Read a slot. Missing slots are `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, LocalStorageError>;

    /// Overwrite a slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), LocalStorageError>;

    /// Delete a slot. Deleting a missing slot is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), LocalStorageError>;
}

fn validate_key(key: &str) -> Result<(), LocalStorageError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(LocalStorageError::InvalidKey(key.to_owned()))
    }
}

// =============================================================================
// FileStorage
// =============================================================================

/// One file per key under a data directory.
///
/// Writes go to a temporary file that is then renamed over the slot, so a
/// crash mid-write leaves either the old or the new value.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Use `dir` as the storage root, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, LocalStorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| LocalStorageError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn slot_path(&self, key: &str) -> Result<PathBuf, LocalStorageError> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl LocalStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, LocalStorageError> {
        let path = self.slot_path(key)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(LocalStorageError::Io { path, source }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), LocalStorageError> {
        let path = self.slot_path(key)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).map_err(|source| LocalStorageError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| LocalStorageError::Io { path, source })
    }

    fn remove(&self, key: &str) -> Result<(), LocalStorageError> {
        let path = self.slot_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(LocalStorageError::Io { path, source }),
        }
    }
}

// =============================================================================
// MemoryStorage
// =============================================================================

/// Process-local storage, lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    slots: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a slot.
    #[must_use]
    pub fn with_slot(self, key: &str, value: &str) -> Self {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value.to_owned());
        self
    }
}

impl LocalStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, LocalStorageError> {
        validate_key(key)?;
        Ok(self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), LocalStorageError> {
        validate_key(key)?;
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), LocalStorageError> {
        validate_key(key)?;
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}
