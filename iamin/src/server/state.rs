//! Application state shared by every handler.
//!
//! Cloned per request; everything inside is behind an `Arc` or is a
//! cheap handle.

use crate::auth::{AuthUser, IdentityProvider, SessionResolver};
use crate::config::{Config, SessionConfig};
use crate::error::DomainError;
use crate::event_page::EventPageCache;
use crate::notify::OwnerNotifier;
use crate::realtime::RealtimeChannel;
use crate::registration::RegistrationHandler;
use crate::store::Repository;
use crate::types::{Event, EventId};
use crate::waitlist::SpotRequestEnvironment;
use axum::extract::FromRef;
use iamin_core::Clock;
use iamin_core::change_feed::ChangeFeed;
use std::sync::Arc;
use std::time::Duration;

/// Tunables that are not services.
#[derive(Debug, Clone)]
pub struct AppSettings {
    /// Session cookie settings
    pub session: SessionConfig,
    /// Public origin used in links
    pub public_base_url: String,
    /// Pause between reel spins
    pub spin_interval: Duration,
    /// How long a rendered public page is reused
    pub page_ttl: chrono::Duration,
}

impl AppSettings {
    /// Settings from the loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            session: config.session.clone(),
            public_base_url: config.public_base_url.clone(),
            spin_interval: config.waitlist.spin_interval(),
            ..Self::default()
        }
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            public_base_url: "http://localhost:8080".to_string(),
            spin_interval: Duration::from_millis(700),
            page_ttl: chrono::Duration::seconds(30),
        }
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// Backing store
    pub repo: Arc<dyn Repository>,
    /// Roster change subscriptions
    pub realtime: RealtimeChannel,
    /// Identity provider
    pub identity: Arc<dyn IdentityProvider>,
    /// Cookie → session resolution
    pub sessions: SessionResolver,
    /// Host notifications
    pub notifier: Arc<dyn OwnerNotifier>,
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Rendered public pages
    pub pages: EventPageCache,
    /// Guest registration
    pub registration: RegistrationHandler,
    /// Tunables
    pub settings: Arc<AppSettings>,
}

impl AppState {
    /// Wire the services together.
    #[must_use]
    pub fn new(
        repo: Arc<dyn Repository>,
        feed: Arc<dyn ChangeFeed<crate::types::Attendee>>,
        identity: Arc<dyn IdentityProvider>,
        notifier: Arc<dyn OwnerNotifier>,
        clock: Arc<dyn Clock>,
        settings: AppSettings,
    ) -> Self {
        let pages = EventPageCache::new(settings.page_ttl, Arc::clone(&clock));
        let registration =
            RegistrationHandler::new(Arc::clone(&repo), Arc::clone(&clock), pages.clone());
        let sessions = SessionResolver::new(Arc::clone(&identity), settings.session.clone());

        Self {
            repo,
            realtime: RealtimeChannel::new(feed),
            identity,
            sessions,
            notifier,
            clock,
            pages,
            registration,
            settings: Arc::new(settings),
        }
    }

    /// Environment for one request-a-spot flow.
    #[must_use]
    pub fn spot_request_env(&self) -> SpotRequestEnvironment {
        SpotRequestEnvironment {
            repo: Arc::clone(&self.repo),
            notifier: Arc::clone(&self.notifier),
            spin_interval: self.settings.spin_interval,
        }
    }

    /// Absolute URL of `path` on the public origin.
    #[must_use]
    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}{path}",
            self.settings.public_base_url.trim_end_matches('/')
        )
    }

    /// Shareable link of an event.
    #[must_use]
    pub fn event_url(&self, slug: &str) -> String {
        self.public_url(&format!("/e/{slug}"))
    }

    /// Load an event that `user` hosts.
    ///
    /// # Errors
    ///
    /// [`DomainError::NotFound`] if it does not exist, [`DomainError::Forbidden`]
    /// if someone else hosts it.
    pub async fn owned_event(&self, id: EventId, user: &AuthUser) -> Result<Event, DomainError> {
        let event = self
            .repo
            .event_by_id(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Event", id))?;
        if !event.is_owned_by(user.id) {
            tracing::warn!(event_id = %id, user_id = %user.id, "Access to foreign event refused");
            return Err(DomainError::Forbidden);
        }
        Ok(event)
    }
}

impl FromRef<AppState> for SessionResolver {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
