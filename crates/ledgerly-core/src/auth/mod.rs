//! Authentication module for managing the session and credentials.
//!
//! This module provides:
//! - `Session`: token lifecycle management with coalesced refresh
//! - `CredentialStore`: pluggable secure storage (OS keychain, encrypted
//!   file, or in-memory)
//! - `SessionEvent`: change notifications for UI shells
//!
//! Tokens are persisted across restarts and refreshed with a 60-second
//! expiry leeway.

pub mod credentials;
pub mod encrypted_file;
pub mod events;
pub mod session;

pub use credentials::{CredentialStore, KeyringStore, MemoryStore, StoreError};
pub use encrypted_file::EncryptedFileStore;
pub use events::SessionEvent;
pub use session::{Session, SessionError};
