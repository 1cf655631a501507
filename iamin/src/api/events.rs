//! Event endpoints.
//!
//! - GET    /api/events                public catalog, paginated
//! - POST   /api/events                create (host)
//! - GET    /api/events/mine           hosted events with counts (host)
//! - GET    /api/events/by-slug/:slug  public page
//! - PATCH  /api/events/:id            edit (owner)
//! - DELETE /api/events/:id            delete with attendees and waitlist (owner)
//! - GET    /api/events/:id/gate       capacity gate

use super::parse_id;
use crate::auth::CurrentUser;
use crate::capacity::{self, GateStatus};
use crate::error::DomainError;
use crate::event_page::{self, PublicEventPage};
use crate::server::AppState;
use crate::slug;
use crate::store::{EVENT_SLUG_UNIQUE, PageRange};
use crate::types::{Event, EventId, EventUpdate, NewEvent, Price};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use iamin_web::{ActionResult, AppError};
use serde::{Deserialize, Serialize};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Catalog pagination.
#[derive(Debug, Deserialize)]
pub struct CatalogQuery {
    /// Zero-based page
    #[serde(default)]
    pub page: u32,
    /// Rows per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

const fn default_page_size() -> u32 {
    20
}

/// One catalog page.
#[derive(Debug, Serialize)]
pub struct CatalogPage {
    /// Events on this page
    pub events: Vec<Event>,
    /// Page number
    pub page: u32,
    /// Page size actually used
    pub page_size: u32,
}

/// A hosted event with its live numbers.
#[derive(Debug, Serialize)]
pub struct HostedEvent {
    /// The event
    #[serde(flatten)]
    pub event: Event,
    /// Capacity gate
    pub gate: GateStatus,
}

// ============================================================================
// Validation
// ============================================================================

fn check_title(title: &str) -> Result<String, DomainError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(DomainError::validation("title", "Please enter a title"));
    }
    Ok(title.to_string())
}

fn check_capacity(max_spots: Option<u32>) -> Result<(), DomainError> {
    if max_spots == Some(0) {
        return Err(DomainError::validation(
            "max_spots",
            "Capacity must be at least 1",
        ));
    }
    Ok(())
}

fn check_price(price: Option<&Price>) -> Result<(), DomainError> {
    if price.is_some_and(|p| p.amount_cents < 0) {
        return Err(DomainError::validation("price", "Price cannot be negative"));
    }
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// Enabled events by start time.
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<CatalogQuery>,
) -> Result<Json<CatalogPage>, AppError> {
    let range = PageRange::page(query.page, query.page_size);
    let events = state
        .repo
        .public_events(range)
        .await
        .map_err(DomainError::from)?;

    Ok(Json(CatalogPage {
        events,
        page: query.page,
        page_size: range.limit,
    }))
}

/// Create an event owned by the signed-in host.
///
/// A host-chosen slug that is taken fails with `SLUG_TAKEN`; generated
/// slugs are retried a few times.
pub async fn create_event(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(request): Json<NewEvent>,
) -> Result<ActionResult<Event>, AppError> {
    let title = check_title(&request.title)?;
    check_capacity(request.max_spots)?;
    check_price(request.price.as_ref())?;

    let custom = request
        .slug
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(slug::validate_custom)
        .transpose()?;

    let mut event = Event {
        id: EventId::new(),
        slug: String::new(),
        owner_id: user.id,
        owner_email: user.email.clone().unwrap_or_default(),
        title,
        description: request.description,
        starts_at: request.starts_at,
        location: request.location,
        price: request.price,
        max_spots: request.max_spots,
        password: request.password.map(|p| p.trim().to_string()).filter(|p| !p.is_empty()),
        enabled: true,
        payment_methods: request.payment_methods,
        created_at: state.clock.now(),
    };

    let attempts = if custom.is_some() { 1 } else { slug::GENERATE_ATTEMPTS };
    for _ in 0..attempts {
        event.slug = custom.clone().unwrap_or_else(|| slug::generate(&event.title));
        match state.repo.insert_event(event.clone()).await {
            Ok(stored) => {
                tracing::info!(event_id = %stored.id, slug = %stored.slug, user_id = %user.id, "Event created");
                return Ok(ActionResult::created(stored));
            },
            Err(e) if e.is_unique_violation(EVENT_SLUG_UNIQUE) => {
                tracing::debug!(slug = %event.slug, "Slug collision");
            },
            Err(e) => return Err(DomainError::from(e).into()),
        }
    }

    Err(DomainError::SlugTaken.into())
}

/// Events the signed-in host owns, newest first.
pub async fn my_events(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<HostedEvent>>, AppError> {
    let events = state
        .repo
        .events_by_owner(user.id)
        .await
        .map_err(DomainError::from)?;

    let mut hosted = Vec::with_capacity(events.len());
    for event in events {
        let count = state
            .repo
            .count_attendees(event.id)
            .await
            .map_err(DomainError::from)?;
        hosted.push(HostedEvent {
            gate: GateStatus::new(event.max_spots, count),
            event,
        });
    }
    Ok(Json(hosted))
}

/// Public page behind a shared link.
pub async fn event_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<PublicEventPage>, AppError> {
    event_page::load(state.repo.as_ref(), &state.pages, &slug)
        .await
        .map_err(DomainError::from)?
        .map(Json)
        .ok_or_else(|| DomainError::not_found("Event", slug).into())
}

/// Edit an event. The slug never changes.
pub async fn update_event(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<EventUpdate>,
) -> Result<ActionResult<Event>, AppError> {
    let id: EventId = parse_id(&id, "event_id")?;
    let mut event = state.owned_event(id, &user).await?;

    if let Some(title) = &update.title {
        check_title(title)?;
    }
    if let Some(max_spots) = update.max_spots {
        check_capacity(max_spots)?;
    }
    if let Some(price) = &update.price {
        check_price(price.as_ref())?;
    }

    update.apply(&mut event);
    let event = state
        .repo
        .update_event(event)
        .await
        .map_err(DomainError::from)?;
    state.pages.invalidate(&event.slug).await;

    tracing::info!(event_id = %event.id, user_id = %user.id, "Event updated");
    Ok(ActionResult::ok(event))
}

/// Delete an event and everything attached to it.
pub async fn delete_event(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ActionResult<()>, AppError> {
    let id: EventId = parse_id(&id, "event_id")?;
    let event = state.owned_event(id, &user).await?;

    state
        .repo
        .delete_event(id)
        .await
        .map_err(DomainError::from)?;
    state.pages.invalidate(&event.slug).await;

    tracing::info!(event_id = %id, user_id = %user.id, "Event deleted");
    Ok(ActionResult::done())
}

/// Live capacity gate.
pub async fn event_gate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<GateStatus>, AppError> {
    let id: EventId = parse_id(&id, "event_id")?;
    let event = state
        .repo
        .event_by_id(id)
        .await
        .map_err(DomainError::from)?
        .ok_or_else(|| DomainError::not_found("Event", id))?;

    let status = capacity::check(state.repo.as_ref(), &event)
        .await
        .map_err(DomainError::from)?;
    Ok(Json(status))
}
