//! Encrypted file-backed credential store.
//!
//! Fallback backend for hosts without a usable OS keychain (headless Linux,
//! CI). All entries live in one file laid out as
//! `[16-byte salt][12-byte nonce][ChaCha20-Poly1305 ciphertext]`, where the
//! ciphertext seals a JSON map of key/value pairs. The file key derives
//! from a passphrase with Argon2id; every write uses a fresh nonce.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use argon2::Argon2;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;

use super::credentials::{CredentialStore, StoreError};

/// Salt length at the head of the store file.
const SALT_LEN: usize = 16;

/// ChaCha20-Poly1305 nonce length.
const NONCE_LEN: usize = 12;

/// Derived file-key length.
const KEY_LEN: usize = 32;

/// Credential store sealed inside a single passphrase-protected file.
pub struct EncryptedFileStore {
    path: PathBuf,
    cipher: ChaCha20Poly1305,
    salt: [u8; SALT_LEN],
}

impl EncryptedFileStore {
    /// Open the store at `path`, creating an empty one when the file does
    /// not exist yet. The passphrase is only verified on the first read of
    /// an existing file.
    pub fn open(path: impl Into<PathBuf>, passphrase: &str) -> Result<Self, StoreError> {
        let path = path.into();
        if passphrase.is_empty() {
            return Err(StoreError::InvalidInput);
        }

        match fs::read(&path) {
            Ok(raw) => {
                if raw.len() < SALT_LEN + NONCE_LEN {
                    return Err(StoreError::RetrievalFailed {
                        key: path.display().to_string(),
                        reason: "store file is truncated".to_string(),
                    });
                }
                let mut salt = [0u8; SALT_LEN];
                salt.copy_from_slice(&raw[..SALT_LEN]);
                let cipher = Self::derive_cipher(&path, passphrase, &salt)?;
                Ok(Self { path, cipher, salt })
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let mut salt = [0u8; SALT_LEN];
                OsRng.fill_bytes(&mut salt);
                let cipher = Self::derive_cipher(&path, passphrase, &salt)?;
                let store = Self { path, cipher, salt };
                let label = store.path.display().to_string();
                store.write_entries(&HashMap::new(), &label)?;
                Ok(store)
            }
            Err(e) => Err(StoreError::RetrievalFailed {
                key: path.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }

    fn derive_cipher(
        path: &Path,
        passphrase: &str,
        salt: &[u8],
    ) -> Result<ChaCha20Poly1305, StoreError> {
        let mut key_bytes = [0u8; KEY_LEN];
        Argon2::default()
            .hash_password_into(passphrase.as_bytes(), salt, &mut key_bytes)
            .map_err(|e| StoreError::RetrievalFailed {
                key: path.display().to_string(),
                reason: format!("key derivation failed: {}", e),
            })?;
        Ok(ChaCha20Poly1305::new(Key::from_slice(&key_bytes)))
    }

    /// Decrypt the whole entry map. A missing file reads as empty; `key`
    /// only labels errors.
    fn read_entries(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => {
                return Err(StoreError::RetrievalFailed {
                    key: key.to_string(),
                    reason: e.to_string(),
                })
            }
        };
        if raw.len() < SALT_LEN + NONCE_LEN {
            return Err(StoreError::RetrievalFailed {
                key: key.to_string(),
                reason: "store file is truncated".to_string(),
            });
        }

        let nonce = Nonce::from_slice(&raw[SALT_LEN..SALT_LEN + NONCE_LEN]);
        let plaintext = self
            .cipher
            .decrypt(nonce, &raw[SALT_LEN + NONCE_LEN..])
            .map_err(|_| StoreError::RetrievalFailed {
                key: key.to_string(),
                reason: "could not decrypt store (wrong passphrase or corrupt file)".to_string(),
            })?;

        serde_json::from_slice(&plaintext).map_err(|_| StoreError::DecodingFailed {
            key: key.to_string(),
        })
    }

    /// Re-encrypt and rewrite the whole entry map under a fresh nonce.
    fn write_entries(
        &self,
        entries: &HashMap<String, String>,
        key: &str,
    ) -> Result<(), StoreError> {
        let save_failed = |reason: String| StoreError::SaveFailed {
            key: key.to_string(),
            reason,
        };

        let plaintext = serde_json::to_vec(entries).map_err(|e| save_failed(e.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_slice())
            .map_err(|_| save_failed("encryption failed".to_string()))?;

        let mut raw = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
        raw.extend_from_slice(&self.salt);
        raw.extend_from_slice(&nonce_bytes);
        raw.extend_from_slice(&ciphertext);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| save_failed(e.to_string()))?;
        }
        fs::write(&self.path, &raw).map_err(|e| save_failed(e.to_string()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600)) {
                tracing::warn!(error = %e, "failed to restrict credential file permissions");
            }
        }

        Ok(())
    }
}

impl CredentialStore for EncryptedFileStore {
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if key.is_empty() || value.is_empty() {
            return Err(StoreError::InvalidInput);
        }
        let mut entries = self.read_entries(key)?;
        entries.insert(key.to_string(), value.to_string());
        self.write_entries(&entries, key)
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if key.is_empty() {
            return Err(StoreError::InvalidInput);
        }
        Ok(self.read_entries(key)?.remove(key))
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        if key.is_empty() {
            return Err(StoreError::InvalidInput);
        }
        let mut entries = self.read_entries(key)?;
        if entries.remove(key).is_none() {
            return Ok(());
        }
        self.write_entries(&entries, key).map_err(|e| match e {
            StoreError::SaveFailed { key, reason } => StoreError::DeletionFailed { key, reason },
            other => other,
        })
    }
}
