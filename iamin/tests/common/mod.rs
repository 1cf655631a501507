//! Shared fixtures for the HTTP integration tests.

#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header};
use chrono::{TimeZone, Utc};
use futures::future::BoxFuture;
use iamin::auth::{AuthSession, AuthUser, IdentityError, IdentityProvider, OAuthStart, SignUp};
use iamin::config::SessionConfig;
use iamin::notify::ConsoleNotifier;
use iamin::store::{EventRepository, MemoryRepository};
use iamin::types::{Event, EventId, OwnerId, PaymentMethods};
use iamin::{AppSettings, AppState, build_router};
use iamin_testing::stepping_clock;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// Access token the fake provider accepts for [`Harness::host`].
pub const HOST_TOKEN: &str = "host-token";

/// Access token for a signed-in user who hosts nothing.
pub const STRANGER_TOKEN: &str = "stranger-token";

/// Identity provider with two fixed users.
pub struct FakeIdentity {
    pub host: AuthUser,
    pub stranger: AuthUser,
}

impl FakeIdentity {
    fn session(&self, user: &AuthUser, token: &str) -> AuthSession {
        AuthSession {
            access_token: token.to_string(),
            refresh_token: format!("{token}-refresh"),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            user: user.clone(),
        }
    }
}

impl IdentityProvider for FakeIdentity {
    fn sign_in_with_password<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<AuthSession, IdentityError>> {
        Box::pin(async move {
            if Some(email) == self.host.email.as_deref() && password == "correct horse" {
                Ok(self.session(&self.host, HOST_TOKEN))
            } else {
                Err(IdentityError::InvalidCredentials)
            }
        })
    }

    fn sign_up<'a>(
        &'a self,
        _email: &'a str,
        _password: &'a str,
        _redirect_to: &'a str,
    ) -> BoxFuture<'a, Result<SignUp, IdentityError>> {
        Box::pin(async { Ok(SignUp::ConfirmationSent) })
    }

    fn google_authorize(&self, redirect_to: &str) -> Result<OAuthStart, IdentityError> {
        Ok(OAuthStart {
            url: format!("https://auth.example.com/authorize?redirect_to={redirect_to}"),
            code_verifier: "verifier".to_string(),
        })
    }

    fn exchange_code<'a>(
        &'a self,
        auth_code: &'a str,
        code_verifier: &'a str,
    ) -> BoxFuture<'a, Result<AuthSession, IdentityError>> {
        Box::pin(async move {
            if auth_code == "code" && code_verifier == "verifier" {
                Ok(self.session(&self.host, HOST_TOKEN))
            } else {
                Err(IdentityError::SessionExpired)
            }
        })
    }

    fn refresh<'a>(
        &'a self,
        _refresh_token: &'a str,
    ) -> BoxFuture<'a, Result<AuthSession, IdentityError>> {
        Box::pin(async { Err(IdentityError::SessionExpired) })
    }

    fn user<'a>(&'a self, access_token: &'a str) -> BoxFuture<'a, Result<AuthUser, IdentityError>> {
        Box::pin(async move {
            match access_token {
                HOST_TOKEN => Ok(self.host.clone()),
                STRANGER_TOKEN => Ok(self.stranger.clone()),
                _ => Err(IdentityError::SessionExpired),
            }
        })
    }

    fn sign_out<'a>(&'a self, _access_token: &'a str) -> BoxFuture<'a, Result<(), IdentityError>> {
        Box::pin(async { Ok(()) })
    }
}

/// A router over a memory store, plus handles to inspect it.
pub struct Harness {
    pub router: Router,
    pub repo: MemoryRepository,
    pub host: AuthUser,
}

impl Harness {
    pub fn new() -> Self {
        let repo = MemoryRepository::default();
        let identity = FakeIdentity {
            host: AuthUser {
                id: OwnerId::new(),
                email: Some("host@example.com".to_string()),
            },
            stranger: AuthUser {
                id: OwnerId::new(),
                email: Some("someone@example.com".to_string()),
            },
        };
        let host = identity.host.clone();

        let settings = AppSettings {
            session: SessionConfig {
                cookie_secure: false,
                ..SessionConfig::default()
            },
            spin_interval: Duration::from_millis(5),
            ..AppSettings::default()
        };
        let state = AppState::new(
            Arc::new(repo.clone()),
            Arc::new(repo.change_feed().clone()),
            Arc::new(identity),
            Arc::new(ConsoleNotifier),
            Arc::new(stepping_clock()),
            settings,
        );

        Self {
            router: build_router(state),
            repo,
            host,
        }
    }

    /// Store an event hosted by [`Self::host`].
    pub async fn event(&self, slug: &str, max_spots: Option<u32>) -> Event {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 18, 0, 0).unwrap();
        self.repo
            .insert_event(Event {
                id: EventId::new(),
                slug: slug.to_string(),
                owner_id: self.host.id,
                owner_email: "host@example.com".to_string(),
                title: "Rooftop Party".to_string(),
                description: String::new(),
                starts_at: at,
                location: "Rooftop".to_string(),
                price: None,
                max_spots,
                password: None,
                enabled: true,
                payment_methods: PaymentMethods::default(),
                created_at: at,
            })
            .await
            .unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> (Response<Body>, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let (parts, body) = response.into_parts();
        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (Response::from_parts(parts, Body::empty()), json)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (Response<Body>, Value) {
        self.send(request("GET", uri, token, None)).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (Response<Body>, Value) {
        self.send(request("POST", uri, token, Some(body))).await
    }

    pub async fn patch(&self, uri: &str, token: Option<&str>, body: Value) -> (Response<Body>, Value) {
        self.send(request("PATCH", uri, token, Some(body))).await
    }
}

pub fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::COOKIE, format!("iamin-access-token={token}"));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}
