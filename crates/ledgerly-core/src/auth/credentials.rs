//! Secure storage for session tokens.
//!
//! `CredentialStore` abstracts over the host's secret storage so the session
//! layer can run against the OS keychain (`KeyringStore`), a
//! passphrase-encrypted file
//! ([`EncryptedFileStore`](super::EncryptedFileStore)), or plain memory in
//! tests (`MemoryStore`).

use std::collections::HashMap;
use std::sync::Mutex;

use keyring::Entry;
use thiserror::Error;

/// Keychain service namespace all Ledgerly entries live under.
const SERVICE_NAME: &str = "ledgerly";

/// Storage key for the bearer access token.
pub(crate) const KEY_ACCESS_TOKEN: &str = "access-token";

/// Storage key for the refresh token.
pub(crate) const KEY_REFRESH_TOKEN: &str = "refresh-token";

/// Storage key for the access-token expiry, as an RFC 3339 timestamp.
pub(crate) const KEY_EXPIRES_AT: &str = "expires-at";

/// Errors from a credential store backend. The `reason` fields carry the
/// backend's own status/detail text for debugging.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("credential keys and values must be non-empty")]
    InvalidInput,

    #[error("failed to save '{key}': {reason}")]
    SaveFailed { key: String, reason: String },

    #[error("failed to read '{key}': {reason}")]
    RetrievalFailed { key: String, reason: String },

    #[error("failed to delete '{key}': {reason}")]
    DeletionFailed { key: String, reason: String },

    #[error("stored value for '{key}' is not valid text")]
    DecodingFailed { key: String },
}

/// Key-value storage for session tokens.
///
/// Implementations must treat `get` of an absent key as `Ok(None)` and
/// `delete` of an absent key as success, so callers stay idempotent.
/// `set` overwrites, but not atomically; callers must not race writes to
/// the same key (the session layer serializes its own store access).
pub trait CredentialStore: Send + Sync {
    /// Store or overwrite a value.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Fetch a value, `None` when absent.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Remove a value. Succeeds when the key is already absent.
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

fn check_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(StoreError::InvalidInput);
    }
    Ok(())
}

// ============================================================================
// OS keychain backend
// ============================================================================

/// Credential store backed by the OS keychain via the `keyring` crate.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    /// Store entries under the default `ledgerly` service namespace.
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    /// Store entries under a custom service namespace.
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, keyring::Error> {
        Entry::new(&self.service, key)
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeyringStore {
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        check_key(key)?;
        if value.is_empty() {
            return Err(StoreError::InvalidInput);
        }

        let save_failed = |e: keyring::Error| StoreError::SaveFailed {
            key: key.to_string(),
            reason: e.to_string(),
        };
        let entry = self.entry(key).map_err(save_failed)?;

        // Delete-then-add sidesteps the duplicate-item errors some platform
        // keychains return on overwrite.
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => {}
            Err(e) => return Err(save_failed(e)),
        }
        entry.set_password(value).map_err(save_failed)
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        check_key(key)?;

        let entry = self.entry(key).map_err(|e| StoreError::RetrievalFailed {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(keyring::Error::BadEncoding(_)) => Err(StoreError::DecodingFailed {
                key: key.to_string(),
            }),
            Err(e) => Err(StoreError::RetrievalFailed {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        check_key(key)?;

        let deletion_failed = |e: keyring::Error| StoreError::DeletionFailed {
            key: key.to_string(),
            reason: e.to_string(),
        };
        let entry = self.entry(key).map_err(deletion_failed)?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(deletion_failed(e)),
        }
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

/// In-memory credential store for tests and previews.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryStore {
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        check_key(key)?;
        if value.is_empty() {
            return Err(StoreError::InvalidInput);
        }
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        check_key(key)?;
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        check_key(key)?;
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trips() {
        let store = MemoryStore::new();

        store.set(KEY_ACCESS_TOKEN, "AT1").unwrap();
        assert_eq!(store.get(KEY_ACCESS_TOKEN).unwrap().as_deref(), Some("AT1"));

        // Overwrite: the second value wins.
        store.set(KEY_ACCESS_TOKEN, "AT2").unwrap();
        assert_eq!(store.get(KEY_ACCESS_TOKEN).unwrap().as_deref(), Some("AT2"));
    }

    #[test]
    fn absent_key_reads_as_none() {
        let store = MemoryStore::new();
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn delete_is_idempotent() {
        let store = MemoryStore::new();
        store.set(KEY_REFRESH_TOKEN, "RT1").unwrap();

        store.delete(KEY_REFRESH_TOKEN).unwrap();
        store.delete(KEY_REFRESH_TOKEN).unwrap();
        assert_eq!(store.get(KEY_REFRESH_TOKEN).unwrap(), None);
    }

    #[test]
    fn rejects_empty_keys_and_values() {
        let store = MemoryStore::new();

        assert!(matches!(store.set("", "v"), Err(StoreError::InvalidInput)));
        assert!(matches!(store.set("k", ""), Err(StoreError::InvalidInput)));
        assert!(matches!(store.get(""), Err(StoreError::InvalidInput)));
        assert!(matches!(store.delete(""), Err(StoreError::InvalidInput)));
    }
}
