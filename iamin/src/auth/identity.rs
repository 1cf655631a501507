//! Identity provider client (GoTrue-compatible HTTP API).
//!
//! Hosts sign in with email/password or Google. Sessions are the
//! provider's access/refresh token pair; this service never stores
//! credentials.

use crate::types::OwnerId;
use chrono::{DateTime, Duration, Utc};
use futures::future::BoxFuture;
use rand::Rng;
use rand::distributions::Alphanumeric;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identity provider failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// Email/password pair rejected
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Access or refresh token no longer valid
    #[error("Session expired")]
    SessionExpired,

    /// The provider refused the request with a user-facing reason
    #[error("Identity provider rejected request ({status}): {message}")]
    Rejected {
        /// HTTP status
        status: u16,
        /// Provider message
        message: String,
    },

    /// Network failure
    #[error("Identity provider unreachable: {0}")]
    Transport(String),

    /// Unexpected response body
    #[error("Unexpected identity provider response: {0}")]
    Decode(String),
}

/// Authenticated host.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    /// Provider user id; also the event owner id
    pub id: OwnerId,
    /// Email address
    #[serde(default)]
    pub email: Option<String>,
}

/// Token pair plus the user it belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthSession {
    /// Bearer token
    pub access_token: String,
    /// Token used to obtain a new access token
    pub refresh_token: String,
    /// When the access token expires
    pub expires_at: DateTime<Utc>,
    /// Signed-in user
    pub user: AuthUser,
}

impl AuthSession {
    /// Whether the access token is expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Result of a sign-up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignUp {
    /// Signed in straight away
    Session(AuthSession),
    /// Account created; the user must confirm their email first
    ConfirmationSent,
}

/// Start of an OAuth sign-in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OAuthStart {
    /// Where to send the browser
    pub url: String,
    /// PKCE verifier; keep it until the callback
    pub code_verifier: String,
}

/// Identity operations used by the HTTP layer.
pub trait IdentityProvider: Send + Sync {
    /// Email/password sign-in.
    fn sign_in_with_password<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<AuthSession, IdentityError>>;

    /// Create an account.
    fn sign_up<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
        redirect_to: &'a str,
    ) -> BoxFuture<'a, Result<SignUp, IdentityError>>;

    /// Google authorization URL with a fresh PKCE verifier.
    ///
    /// # Errors
    ///
    /// [`IdentityError::Decode`] if the URL cannot be encoded.
    fn google_authorize(&self, redirect_to: &str) -> Result<OAuthStart, IdentityError>;

    /// Exchange an OAuth callback code for a session.
    fn exchange_code<'a>(
        &'a self,
        auth_code: &'a str,
        code_verifier: &'a str,
    ) -> BoxFuture<'a, Result<AuthSession, IdentityError>>;

    /// Trade a refresh token for a new session.
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, Result<AuthSession, IdentityError>>;

    /// Resolve an access token to its user.
    fn user<'a>(&'a self, access_token: &'a str) -> BoxFuture<'a, Result<AuthUser, IdentityError>>;

    /// Revoke the session behind `access_token`.
    fn sign_out<'a>(&'a self, access_token: &'a str) -> BoxFuture<'a, Result<(), IdentityError>>;
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> AuthSession {
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or_else(|| self.expires_in.map(|secs| now + Duration::seconds(secs)))
            .unwrap_or(now + Duration::hours(1));
        AuthSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    User(AuthUser),
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
}

impl ErrorBody {
    fn text(self) -> String {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .unwrap_or_else(|| "Request failed".to_string())
    }
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

// ============================================================================
// HTTP client
// ============================================================================

const VERIFIER_LEN: usize = 64;

/// GoTrue HTTP client.
#[derive(Clone, Debug)]
pub struct GoTrueClient {
    base_url: String,
    api_key: String,
    http: Client,
}

impl GoTrueClient {
    /// Create a client for the API rooted at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            http: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post_token<B: Serialize + Sync>(
        &self,
        grant_type: &str,
        body: &B,
    ) -> Result<AuthSession, IdentityError> {
        let query = serde_urlencoded::to_string([("grant_type", grant_type)])
            .map_err(|e| IdentityError::Decode(e.to_string()))?;
        let response = self
            .http
            .post(self.url(&format!("/token?{query}")))
            .header("apikey", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| IdentityError::Transport(e.to_string()))?;

        let response = ensure_success(response, grant_type).await?;
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| IdentityError::Decode(e.to_string()))?;
        Ok(token.into_session(Utc::now()))
    }
}

/// Map a non-2xx response to an [`IdentityError`], logging the body.
async fn ensure_success(response: Response, operation: &str) -> Result<Response, IdentityError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body: ErrorBody = response.json().await.unwrap_or_default();
    let message = body.text();
    tracing::warn!(operation, status = status.as_u16(), %message, "Identity provider request failed");

    Err(match (operation, status.as_u16()) {
        ("password", 400) => IdentityError::InvalidCredentials,
        ("refresh_token", 400 | 401) | ("user", 401 | 403) => IdentityError::SessionExpired,
        _ => IdentityError::Rejected {
            status: status.as_u16(),
            message,
        },
    })
}

/// Random PKCE verifier, `[A-Za-z0-9]{64}`.
#[must_use]
pub fn code_verifier() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .map(char::from)
        .take(VERIFIER_LEN)
        .collect()
}

impl IdentityProvider for GoTrueClient {
    fn sign_in_with_password<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<AuthSession, IdentityError>> {
        Box::pin(async move {
            self.post_token("password", &Credentials { email, password })
                .await
        })
    }

    fn sign_up<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
        redirect_to: &'a str,
    ) -> BoxFuture<'a, Result<SignUp, IdentityError>> {
        Box::pin(async move {
            let query = serde_urlencoded::to_string([("redirect_to", redirect_to)])
                .map_err(|e| IdentityError::Decode(e.to_string()))?;
            let response = self
                .http
                .post(self.url(&format!("/signup?{query}")))
                .header("apikey", &self.api_key)
                .json(&Credentials { email, password })
                .send()
                .await
                .map_err(|e| IdentityError::Transport(e.to_string()))?;

            let response = ensure_success(response, "signup").await?;
            let body: SignUpResponse = response
                .json()
                .await
                .map_err(|e| IdentityError::Decode(e.to_string()))?;

            Ok(match body {
                SignUpResponse::Session(token) => SignUp::Session(token.into_session(Utc::now())),
                SignUpResponse::User(user) => {
                    tracing::info!(user_id = %user.id, "Sign-up awaiting email confirmation");
                    SignUp::ConfirmationSent
                },
            })
        })
    }

    fn google_authorize(&self, redirect_to: &str) -> Result<OAuthStart, IdentityError> {
        let code_verifier = code_verifier();
        let query = serde_urlencoded::to_string([
            ("provider", "google"),
            ("redirect_to", redirect_to),
            ("code_challenge", code_verifier.as_str()),
            ("code_challenge_method", "plain"),
        ])
        .map_err(|e| IdentityError::Decode(e.to_string()))?;

        Ok(OAuthStart {
            url: self.url(&format!("/authorize?{query}")),
            code_verifier,
        })
    }

    fn exchange_code<'a>(
        &'a self,
        auth_code: &'a str,
        code_verifier: &'a str,
    ) -> BoxFuture<'a, Result<AuthSession, IdentityError>> {
        #[derive(Serialize)]
        struct Pkce<'a> {
            auth_code: &'a str,
            code_verifier: &'a str,
        }

        Box::pin(async move {
            self.post_token(
                "pkce",
                &Pkce {
                    auth_code,
                    code_verifier,
                },
            )
            .await
        })
    }

    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, Result<AuthSession, IdentityError>> {
        #[derive(Serialize)]
        struct Refresh<'a> {
            refresh_token: &'a str,
        }

        Box::pin(async move {
            self.post_token("refresh_token", &Refresh { refresh_token })
                .await
        })
    }

    fn user<'a>(&'a self, access_token: &'a str) -> BoxFuture<'a, Result<AuthUser, IdentityError>> {
        Box::pin(async move {
            let response = self
                .http
                .get(self.url("/user"))
                .header("apikey", &self.api_key)
                .bearer_auth(access_token)
                .send()
                .await
                .map_err(|e| IdentityError::Transport(e.to_string()))?;

            ensure_success(response, "user")
                .await?
                .json()
                .await
                .map_err(|e| IdentityError::Decode(e.to_string()))
        })
    }

    fn sign_out<'a>(&'a self, access_token: &'a str) -> BoxFuture<'a, Result<(), IdentityError>> {
        Box::pin(async move {
            let response = self
                .http
                .post(self.url("/logout"))
                .header("apikey", &self.api_key)
                .bearer_auth(access_token)
                .send()
                .await
                .map_err(|e| IdentityError::Transport(e.to_string()))?;
            ensure_success(response, "logout").await.map(|_| ())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn authorize_url_carries_pkce_challenge() {
        let client = GoTrueClient::new("https://auth.example.com/auth/v1/", "anon");
        let start = client
            .google_authorize("https://iamin.app/api/auth/callback")
            .unwrap();

        assert!(start.url.starts_with("https://auth.example.com/auth/v1/authorize?provider=google&"));
        assert!(start.url.contains("redirect_to=https%3A%2F%2Fiamin.app%2Fapi%2Fauth%2Fcallback"));
        assert!(start.url.contains(&format!("code_challenge={}", start.code_verifier)));
        assert!(start.url.contains("code_challenge_method=plain"));
        assert_eq!(start.code_verifier.len(), VERIFIER_LEN);
    }

    #[test]
    fn verifiers_are_random() {
        assert_ne!(code_verifier(), code_verifier());
    }

    #[test]
    fn token_response_prefers_absolute_expiry() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let body = serde_json::json!({
            "access_token": "a",
            "refresh_token": "r",
            "expires_in": 3600,
            "expires_at": 1_700_000_100,
            "user": { "id": "7f0c3c52-9c1e-4d8e-9e43-3c3f1b7c2f10", "email": "host@example.com" }
        });
        let token: TokenResponse = serde_json::from_value(body).unwrap();
        let session = token.into_session(now);

        assert_eq!(session.expires_at.timestamp(), 1_700_000_100);
        assert_eq!(session.user.email.as_deref(), Some("host@example.com"));
        assert!(!session.is_expired(now));
    }

    #[test]
    fn sign_up_without_session_means_confirmation() {
        let body = serde_json::json!({
            "id": "7f0c3c52-9c1e-4d8e-9e43-3c3f1b7c2f10",
            "email": "host@example.com",
            "confirmation_sent_at": "2025-01-01T00:00:00Z"
        });
        let parsed: SignUpResponse = serde_json::from_value(body).unwrap();
        assert!(matches!(parsed, SignUpResponse::User(_)));
    }

    #[test]
    fn error_body_picks_first_message() {
        let body: ErrorBody = serde_json::from_value(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "Invalid login credentials"
        }))
        .unwrap();
        assert_eq!(body.text(), "Invalid login credentials");
        assert_eq!(ErrorBody::default().text(), "Request failed");
    }
}
