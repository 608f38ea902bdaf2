//! REST API client module for the Ledgerly backend.
//!
//! This module provides the `ApiClient` for the auth and account endpoints,
//! generic JSON helpers for the feature endpoints, and the `AuthApi` trait
//! the session layer consumes.
//!
//! The API uses JWT bearer token authentication; tokens are issued and
//! rotated by the session layer.

pub mod client;
pub mod error;
pub mod transport;

pub use client::ApiClient;
pub use error::ApiError;
pub use transport::AuthApi;
