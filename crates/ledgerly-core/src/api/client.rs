//! API client for the Ledgerly REST API.
//!
//! This module provides the `ApiClient` struct implementing the auth and
//! account endpoints behind [`AuthApi`], plus generic JSON helpers the
//! feature view-models use for their own endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;

use crate::models::{AuthResponse, Profile, ProfileUpdate, User};

use super::{ApiError, AuthApi};

// ============================================================================
// Constants
// ============================================================================

/// Base URL for the production Ledgerly API.
pub const DEFAULT_BASE_URL: &str = "https://api.ledgerly.app";

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
/// 3 retries with exponential backoff usually succeeds without excessive delay.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
/// 1 second is polite to the server while not making users wait too long.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// API client for the Ledgerly backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a client against the production base URL.
    pub fn new() -> Result<Self, ApiError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Create a client against a custom base URL (staging, local dev).
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        let base_url = base_url.into();
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Single-attempt request used by the auth flows, which never retry.
    async fn send_once<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        access_token: Option<&str>,
        body: Option<&B>,
    ) -> Result<reqwest::Response, ApiError> {
        let mut request = self.client.request(method, self.endpoint(path));
        if let Some(token) = access_token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        Self::check_response(response).await
    }

    /// Send a request, retrying rate-limited responses with exponential
    /// backoff. Used by the generic JSON helpers below.
    async fn send_with_retry<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        access_token: Option<&str>,
        body: Option<&B>,
    ) -> Result<reqwest::Response, ApiError> {
        let url = self.endpoint(path);
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let mut request = self.client.request(method.clone(), &url);
            if let Some(token) = access_token {
                request = request.bearer_auth(token);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await?;
            if response.status().as_u16() != 429 {
                return Self::check_response(response).await;
            }

            retries += 1;
            if retries > MAX_RATE_LIMIT_RETRIES {
                return Err(ApiError::RateLimited);
            }
            warn!(url = %url, retry = retries, backoff_ms, "Rate limited, backing off");
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            backoff_ms *= 2; // Exponential backoff
        }
    }

    // ===== Generic JSON Helpers =====

    /// GET a JSON resource, optionally authenticated.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        access_token: Option<&str>,
    ) -> Result<T, ApiError> {
        let response = self
            .send_with_retry(Method::GET, path, access_token, None::<&serde_json::Value>)
            .await?;
        Ok(response.json().await?)
    }

    /// POST a JSON body and parse the JSON response.
    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        access_token: Option<&str>,
    ) -> Result<T, ApiError> {
        let response = self
            .send_with_retry(Method::POST, path, access_token, Some(body))
            .await?;
        Ok(response.json().await?)
    }

    /// PATCH a JSON body and parse the JSON response.
    pub async fn patch_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        access_token: Option<&str>,
    ) -> Result<T, ApiError> {
        let response = self
            .send_with_retry(Method::PATCH, path, access_token, Some(body))
            .await?;
        Ok(response.json().await?)
    }

    /// DELETE a resource, discarding any response body.
    pub async fn delete(&self, path: &str, access_token: Option<&str>) -> Result<(), ApiError> {
        self.send_with_retry(Method::DELETE, path, access_token, None::<&serde_json::Value>)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AuthApi for ApiClient {
    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let body = serde_json::json!({ "email": email, "password": password });
        let response = self
            .send_once(Method::POST, "/auth/login", None, Some(&body))
            .await?;
        Ok(response.json().await?)
    }

    async fn register(&self, name: &str, email: &str, password: &str) -> Result<User, ApiError> {
        let body = serde_json::json!({ "name": name, "email": email, "password": password });
        let response = self
            .send_once(Method::POST, "/auth/register", None, Some(&body))
            .await?;
        Ok(response.json().await?)
    }

    async fn logout(&self, refresh_token: &str) -> Result<(), ApiError> {
        let body = serde_json::json!({ "refreshToken": refresh_token });
        self.send_once(Method::POST, "/auth/logout", None, Some(&body))
            .await?;
        Ok(())
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, ApiError> {
        let body = serde_json::json!({ "refreshToken": refresh_token });
        let response = self
            .send_once(Method::POST, "/auth/refresh", None, Some(&body))
            .await?;
        Ok(response.json().await?)
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<Profile, ApiError> {
        let response = self
            .send_once(
                Method::GET,
                "/users/me",
                Some(access_token),
                None::<&serde_json::Value>,
            )
            .await?;
        Ok(response.json().await?)
    }

    async fn update_profile(
        &self,
        access_token: &str,
        update: &ProfileUpdate,
    ) -> Result<Profile, ApiError> {
        let response = self
            .send_once(Method::PATCH, "/users/me", Some(access_token), Some(update))
            .await?;
        Ok(response.json().await?)
    }

    async fn change_password(
        &self,
        access_token: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), ApiError> {
        let body = serde_json::json!({
            "currentPassword": current_password,
            "newPassword": new_password,
        });
        self.send_once(
            Method::PATCH,
            "/users/me/password",
            Some(access_token),
            Some(&body),
        )
        .await?;
        Ok(())
    }
}
