//! Core library for Ledgerly, a personal-finance client.
//!
//! This crate owns everything the UI shells share: the REST API client, the
//! session and token lifecycle, secure credential storage, and the account
//! models. Feature screens (accounts, categories, transactions, budgets)
//! live in the shells and talk to the server through [`ApiClient`]'s generic
//! JSON helpers, authenticated by tokens the [`Session`] manages.
//!
//! Typical wiring at app start:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use ledgerly_core::{ApiClient, Config, KeyringStore, Session};
//!
//! # async fn wire() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let api = Arc::new(ApiClient::with_base_url(config.base_url())?);
//! let store = Arc::new(KeyringStore::new());
//! let session = Session::new(api, store);
//!
//! if session.refresh_tokens_if_needed().await {
//!     // straight to the main screens
//! } else {
//!     // show the login form
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError, AuthApi};
pub use auth::{
    CredentialStore, EncryptedFileStore, KeyringStore, MemoryStore, Session, SessionError,
    SessionEvent, StoreError,
};
pub use config::Config;
pub use models::{AuthResponse, Profile, ProfileUpdate, User};
