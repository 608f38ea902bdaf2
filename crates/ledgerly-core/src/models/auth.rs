//! Wire types for the auth endpoints.

use serde::{Deserialize, Serialize};

use super::User;

/// Response body shared by `POST /auth/login` and `POST /auth/refresh`.
///
/// The token fields stay optional here so a response missing one of them is
/// rejected by the session layer as a session error, not buried in a
/// deserialization failure.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    #[serde(rename = "accessToken")]
    pub access_token: Option<String>,
    #[serde(rename = "refreshToken")]
    pub refresh_token: Option<String>,
    /// Access-token lifetime in seconds.
    #[serde(rename = "expiresIn")]
    pub expires_in: i64,
    pub user: User,
}

/// Partial-update body for `PATCH /users/me`.
///
/// `name` always serializes; an explicit null clears the stored name
/// server-side. `email` is omitted entirely when it is not being changed.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_response_tolerates_missing_tokens() {
        let json = r#"{"expiresIn": 3600, "user": {"id": "u1", "name": "Ana", "email": null}}"#;
        let response: AuthResponse = serde_json::from_str(json).unwrap();

        assert!(response.access_token.is_none());
        assert!(response.refresh_token.is_none());
        assert_eq!(response.expires_in, 3600);
        assert_eq!(response.user.id, "u1");
    }

    #[test]
    fn auth_response_parses_full_body() {
        let json = r#"{
            "accessToken": "AT1",
            "refreshToken": "RT1",
            "expiresIn": 900,
            "user": {"id": "u1", "name": "Ana", "email": "ana@example.com"}
        }"#;
        let response: AuthResponse = serde_json::from_str(json).unwrap();

        assert_eq!(response.access_token.as_deref(), Some("AT1"));
        assert_eq!(response.refresh_token.as_deref(), Some("RT1"));
        assert_eq!(response.user.email.as_deref(), Some("ana@example.com"));
    }

    #[test]
    fn profile_update_serializes_null_name_and_skips_absent_email() {
        let body = ProfileUpdate {
            name: None,
            email: None,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({ "name": null })
        );

        let body = ProfileUpdate {
            name: Some("Ana".to_string()),
            email: Some("ana@example.com".to_string()),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({ "name": "Ana", "email": "ana@example.com" })
        );
    }
}
