//! Host authentication endpoints.
//!
//! - POST /api/auth/sign-in    email/password
//! - POST /api/auth/sign-up    create an account
//! - GET  /api/auth/google     redirect to Google through the provider
//! - GET  /api/auth/callback   OAuth code exchange
//! - POST /api/auth/sign-out   revoke and clear cookies
//! - GET  /api/auth/me         current session
//!
//! Tokens never reach the browser as JSON; they travel as `HttpOnly`
//! cookies set here and refreshed by the session middleware.

use crate::auth::session::{
    ACCESS_COOKIE, VERIFIER_COOKIE, append_cookies, cleared_cookies, expired, session_cookies,
    verifier_cookie,
};
use crate::auth::{AuthUser, SessionContext, SignUp};
use crate::error::DomainError;
use crate::server::AppState;
use axum::{
    Json,
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
};
use iamin_web::{ActionResult, AppError, Cookies};
use serde::{Deserialize, Serialize};

/// Where the provider sends the browser back after OAuth or email confirmation.
pub const CALLBACK_PATH: &str = "/api/auth/callback";

/// Landing page after a successful OAuth sign-in.
pub const DASHBOARD_PATH: &str = "/dashboard";

/// Email and password.
#[derive(Debug, Deserialize)]
pub struct Credentials {
    /// Account email
    pub email: String,
    /// Account password
    pub password: String,
}

impl Credentials {
    fn validated(&self) -> Result<(&str, &str), DomainError> {
        let email = self.email.trim();
        if !email.contains('@') {
            return Err(DomainError::validation("email", "Please enter a valid email"));
        }
        if self.password.is_empty() {
            return Err(DomainError::validation("password", "Please enter a password"));
        }
        Ok((email, &self.password))
    }
}

/// Result of a sign-up.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SignUpOutcome {
    /// Signed in right away
    SignedIn {
        /// The new host
        user: AuthUser,
    },
    /// The provider emailed a confirmation link
    ConfirmationSent,
}

/// Query string of the OAuth callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    /// Authorization code
    pub code: Option<String>,
}

/// The signed-in host, if any.
#[derive(Debug, Serialize)]
pub struct Me {
    /// Current user
    pub user: Option<AuthUser>,
}

fn with_cookies<T: Serialize>(result: ActionResult<T>, headers: HeaderMap) -> Response {
    (headers, result).into_response()
}

/// Email/password sign-in.
pub async fn sign_in(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<Response, AppError> {
    let (email, password) = credentials.validated()?;
    let session = state
        .identity
        .sign_in_with_password(email, password)
        .await
        .map_err(DomainError::from)?;

    tracing::info!(user_id = %session.user.id, "Signed in");
    let mut headers = HeaderMap::new();
    append_cookies(
        &mut headers,
        session_cookies(&session, &state.settings.session),
    );
    Ok(with_cookies(ActionResult::ok(session.user), headers))
}

/// Create a host account.
pub async fn sign_up(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<Response, AppError> {
    let (email, password) = credentials.validated()?;
    let redirect_to = state.public_url(CALLBACK_PATH);
    let signed_up = state
        .identity
        .sign_up(email, password, &redirect_to)
        .await
        .map_err(DomainError::from)?;

    let mut headers = HeaderMap::new();
    let outcome = match signed_up {
        SignUp::Session(session) => {
            tracing::info!(user_id = %session.user.id, "Signed up");
            append_cookies(
                &mut headers,
                session_cookies(&session, &state.settings.session),
            );
            SignUpOutcome::SignedIn { user: session.user }
        },
        SignUp::ConfirmationSent => {
            tracing::info!("Sign-up awaiting email confirmation");
            SignUpOutcome::ConfirmationSent
        },
    };
    Ok(with_cookies(ActionResult::created(outcome), headers))
}

/// Start Google sign-in: stash the PKCE verifier and redirect.
pub async fn google(State(state): State<AppState>) -> Result<Response, AppError> {
    let start = state
        .identity
        .google_authorize(&state.public_url(CALLBACK_PATH))
        .map_err(DomainError::from)?;

    let mut headers = HeaderMap::new();
    append_cookies(
        &mut headers,
        [verifier_cookie(&start.code_verifier, &state.settings.session)],
    );
    Ok((headers, Redirect::to(&start.url)).into_response())
}

/// Finish an OAuth or email-confirmation round trip.
pub async fn callback(
    State(state): State<AppState>,
    cookies: Cookies,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, AppError> {
    let code = query
        .code
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| DomainError::validation("code", "Missing authorization code"))?;
    let verifier = cookies
        .get(VERIFIER_COOKIE)
        .ok_or_else(|| DomainError::validation("code", "Sign-in expired. Please try again."))?;

    let session = state
        .identity
        .exchange_code(code, verifier)
        .await
        .map_err(DomainError::from)?;

    tracing::info!(user_id = %session.user.id, "Signed in with OAuth");
    let mut headers = HeaderMap::new();
    append_cookies(
        &mut headers,
        session_cookies(&session, &state.settings.session)
            .into_iter()
            .chain([expired(VERIFIER_COOKIE, &state.settings.session)]),
    );
    Ok((headers, Redirect::to(&state.public_url(DASHBOARD_PATH))).into_response())
}

/// Revoke the session and clear cookies. Succeeds even if the provider is
/// unreachable.
pub async fn sign_out(State(state): State<AppState>, cookies: Cookies) -> Response {
    if let Some(token) = cookies.get(ACCESS_COOKIE) {
        if let Err(error) = state.identity.sign_out(token).await {
            tracing::warn!(%error, "Sign-out not acknowledged by identity provider");
        }
    }

    let mut headers = HeaderMap::new();
    append_cookies(&mut headers, cleared_cookies(&state.settings.session));
    with_cookies(ActionResult::done(), headers)
}

/// Who is signed in.
pub async fn me(session: SessionContext) -> Json<Me> {
    Json(Me { user: session.user })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_need_an_email_and_password() {
        let bad_email = Credentials {
            email: "host".to_string(),
            password: "secret".to_string(),
        };
        assert!(matches!(
            bad_email.validated(),
            Err(DomainError::Validation { field: "email", .. })
        ));

        let no_password = Credentials {
            email: "host@example.com".to_string(),
            password: String::new(),
        };
        assert!(matches!(
            no_password.validated(),
            Err(DomainError::Validation { field: "password", .. })
        ));

        let ok = Credentials {
            email: " host@example.com ".to_string(),
            password: "secret".to_string(),
        };
        assert_eq!(ok.validated().ok(), Some(("host@example.com", "secret")));
    }
}
