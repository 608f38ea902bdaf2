//! The transport contract the session layer depends on.

use async_trait::async_trait;

use crate::models::{AuthResponse, Profile, ProfileUpdate, User};

use super::ApiError;

/// HTTP operations the session layer consumes.
///
/// [`ApiClient`](super::ApiClient) is the production implementation; tests
/// substitute scripted mocks, and app shells can wrap a transport to add
/// middleware without touching session logic.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchange credentials for a token pair and the account owner.
    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError>;

    /// Create an account. Callers follow up with [`login`](Self::login).
    async fn register(&self, name: &str, email: &str, password: &str) -> Result<User, ApiError>;

    /// Invalidate the refresh token server-side.
    async fn logout(&self, refresh_token: &str) -> Result<(), ApiError>;

    /// Exchange a refresh token for a rotated token pair.
    async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, ApiError>;

    /// Fetch the signed-in account's profile.
    async fn fetch_profile(&self, access_token: &str) -> Result<Profile, ApiError>;

    /// Apply a partial profile update, returning the canonical profile.
    async fn update_profile(
        &self,
        access_token: &str,
        update: &ProfileUpdate,
    ) -> Result<Profile, ApiError>;

    /// Change the account password.
    async fn change_password(
        &self,
        access_token: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), ApiError>;
}
