//! Public event page: what a guest sees behind the shared link.

use crate::capacity::GateStatus;
use crate::page_cache::PageCache;
use crate::store::{Repository, RepositoryError};
use crate::types::{Attendee, Event};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Guest as listed publicly. Phone numbers stay private.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PublicGuest {
    /// Full name
    pub full_name: String,
    /// Registration time
    pub registered_at: DateTime<Utc>,
}

impl From<&Attendee> for PublicGuest {
    fn from(attendee: &Attendee) -> Self {
        Self {
            full_name: attendee.full_name.clone(),
            registered_at: attendee.registered_at,
        }
    }
}

/// Rendered public page for one event.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PublicEventPage {
    /// The event
    pub event: Event,
    /// Whether the form asks for an access password
    pub requires_password: bool,
    /// Guests, newest first
    pub guests: Vec<PublicGuest>,
    /// Capacity gate at render time
    pub gate: GateStatus,
}

/// Cache of rendered public pages.
pub type EventPageCache = PageCache<PublicEventPage>;

/// Load the public page for `slug`, serving from `cache` when fresh.
///
/// Returns `None` when no event has that slug.
///
/// # Errors
///
/// Propagates store errors.
pub async fn load(
    repo: &dyn Repository,
    cache: &EventPageCache,
    slug: &str,
) -> Result<Option<PublicEventPage>, RepositoryError> {
    if let Some(page) = cache.get(slug).await {
        return Ok(Some(page));
    }

    let Some(event) = repo.event_by_slug(slug.to_string()).await? else {
        return Ok(None);
    };
    let attendees = repo.attendees_for_event(event.id).await?;
    let page = PublicEventPage {
        requires_password: event.requires_password(),
        guests: attendees.iter().map(PublicGuest::from).collect(),
        gate: GateStatus::new(event.max_spots, attendees.len() as u64),
        event,
    };

    cache.put(slug, page.clone()).await;
    Ok(Some(page))
}
