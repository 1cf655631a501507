//! Per-request session context.
//!
//! Sessions travel as two `HttpOnly` cookies. [`resolve_session`] runs in
//! front of the API: it turns the cookies into a [`SessionContext`], stores
//! it in the request extensions and, when the access token had to be
//! refreshed, writes the new pair back on the response. Handlers read the
//! context through the [`SessionContext`] or [`CurrentUser`] extractors;
//! nothing about the session is global.

use super::identity::{AuthSession, AuthUser, IdentityError, IdentityProvider};
use crate::config::SessionConfig;
use crate::error::DomainError;
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, HeaderValue, header, request::Parts},
    middleware::Next,
    response::Response,
};
use cookie::{Cookie, SameSite};
use iamin_web::{AppError, Cookies};
use std::convert::Infallible;
use std::sync::Arc;

/// Access token cookie.
pub const ACCESS_COOKIE: &str = "iamin-access-token";
/// Refresh token cookie.
pub const REFRESH_COOKIE: &str = "iamin-refresh-token";
/// PKCE verifier cookie, alive only during an OAuth round trip.
pub const VERIFIER_COOKIE: &str = "iamin-pkce-verifier";

const VERIFIER_MAX_AGE_SECS: i64 = 600;

/// Who is making the request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionContext {
    /// Signed-in host, if any
    pub user: Option<AuthUser>,
    /// New token pair obtained while resolving
    pub renewed: Option<AuthSession>,
    /// Stored cookies are dead and should be removed
    pub clear: bool,
}

impl SessionContext {
    /// Anonymous request.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Signed-in request without token changes.
    #[must_use]
    pub fn signed_in(user: AuthUser) -> Self {
        Self {
            user: Some(user),
            ..Self::default()
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for SessionContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Self>()
            .cloned()
            .unwrap_or_default())
    }
}

/// Signed-in host; rejects anonymous requests with 401.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CurrentUser(pub AuthUser);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionContext>()
            .and_then(|ctx| ctx.user.clone())
            .map(Self)
            .ok_or_else(|| DomainError::Unauthorized.into())
    }
}

/// Resolves cookies into a [`SessionContext`].
#[derive(Clone)]
pub struct SessionResolver {
    identity: Arc<dyn IdentityProvider>,
    config: SessionConfig,
}

impl SessionResolver {
    /// Create a resolver.
    #[must_use]
    pub fn new(identity: Arc<dyn IdentityProvider>, config: SessionConfig) -> Self {
        Self { identity, config }
    }

    /// Cookie settings.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Validate the access token, falling back to the refresh token.
    ///
    /// Provider outages degrade to an anonymous request without clearing
    /// cookies; only a definitive rejection clears them.
    pub async fn resolve(&self, access: Option<&str>, refresh: Option<&str>) -> SessionContext {
        if let Some(token) = access {
            match self.identity.user(token).await {
                Ok(user) => return SessionContext::signed_in(user),
                Err(IdentityError::SessionExpired) => {
                    tracing::debug!("Access token expired");
                },
                Err(error) => {
                    tracing::warn!(%error, "Could not validate access token");
                    return SessionContext::anonymous();
                },
            }
        }

        let Some(token) = refresh else {
            return SessionContext {
                clear: access.is_some(),
                ..SessionContext::default()
            };
        };

        match self.identity.refresh(token).await {
            Ok(session) => {
                tracing::debug!(user_id = %session.user.id, "Session refreshed");
                SessionContext {
                    user: Some(session.user.clone()),
                    renewed: Some(session),
                    clear: false,
                }
            },
            Err(IdentityError::SessionExpired) => SessionContext {
                clear: true,
                ..SessionContext::default()
            },
            Err(error) => {
                tracing::warn!(%error, "Could not refresh session");
                SessionContext::anonymous()
            },
        }
    }
}

impl std::fmt::Debug for SessionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionResolver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Middleware: resolve the session, run the handler, persist token changes.
pub async fn resolve_session(
    State(resolver): State<SessionResolver>,
    mut request: Request,
    next: Next,
) -> Response {
    let cookies = Cookies::from_headers(request.headers());
    let context = if cookies.get(ACCESS_COOKIE).is_none() && cookies.get(REFRESH_COOKIE).is_none() {
        SessionContext::anonymous()
    } else {
        resolver
            .resolve(cookies.get(ACCESS_COOKIE), cookies.get(REFRESH_COOKIE))
            .await
    };

    let renewed = context.renewed.clone();
    let clear = context.clear;
    request.extensions_mut().insert(context);

    let mut response = next.run(request).await;
    // Cookies written by the handler (sign-in, sign-out) take precedence.
    if response.headers().contains_key(header::SET_COOKIE) {
        return response;
    }
    if let Some(session) = renewed {
        append_cookies(response.headers_mut(), session_cookies(&session, resolver.config()));
    } else if clear {
        append_cookies(response.headers_mut(), cleared_cookies(resolver.config()));
    }
    response
}

fn base_cookie(name: &'static str, value: String, config: &SessionConfig) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, value);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_secure(config.cookie_secure);
    cookie
}

/// Cookies carrying `session`, each capped at the configured lifetime.
#[must_use]
pub fn session_cookies(session: &AuthSession, config: &SessionConfig) -> Vec<Cookie<'static>> {
    let max_age = cookie::time::Duration::seconds(config.cookie_max_age().num_seconds());
    [
        (ACCESS_COOKIE, session.access_token.clone()),
        (REFRESH_COOKIE, session.refresh_token.clone()),
    ]
    .into_iter()
    .map(|(name, value)| {
        let mut cookie = base_cookie(name, value, config);
        cookie.set_max_age(max_age);
        cookie
    })
    .collect()
}

/// Expired, empty session cookies.
#[must_use]
pub fn cleared_cookies(config: &SessionConfig) -> Vec<Cookie<'static>> {
    [ACCESS_COOKIE, REFRESH_COOKIE]
        .into_iter()
        .map(|name| expired(name, config))
        .collect()
}

/// Short-lived cookie holding the PKCE verifier.
#[must_use]
pub fn verifier_cookie(verifier: &str, config: &SessionConfig) -> Cookie<'static> {
    let mut cookie = base_cookie(VERIFIER_COOKIE, verifier.to_string(), config);
    cookie.set_max_age(cookie::time::Duration::seconds(VERIFIER_MAX_AGE_SECS));
    cookie
}

/// Remove the cookie named `name`.
#[must_use]
pub fn expired(name: &'static str, config: &SessionConfig) -> Cookie<'static> {
    let mut cookie = base_cookie(name, String::new(), config);
    cookie.set_max_age(cookie::time::Duration::ZERO);
    cookie
}

/// Append `Set-Cookie` headers.
pub fn append_cookies(headers: &mut HeaderMap, cookies: impl IntoIterator<Item = Cookie<'static>>) {
    for cookie in cookies {
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                headers.append(header::SET_COOKIE, value);
            },
            Err(error) => tracing::error!(%error, name = cookie.name(), "Unencodable cookie"),
        }
    }
}
