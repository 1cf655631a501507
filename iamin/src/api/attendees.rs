//! Attendee endpoints.
//!
//! - POST   /api/events/:id/register   guest registration
//! - GET    /api/events/:id/attendees  host dashboard listing (owner)
//! - PATCH  /api/attendees/:id/paid    set the payment flag (owner)
//! - DELETE /api/attendees/:id         remove a registration (owner)

use super::parse_id;
use crate::auth::{AuthUser, CurrentUser};
use crate::error::DomainError;
use crate::registration::{RegistrationForm, RegistrationOutcome};
use crate::roster::{RosterCounts, RosterQuery, RosterState};
use crate::server::AppState;
use crate::types::{Attendee, AttendeeId, Event, EventId};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use iamin_web::{ActionResult, AppError, ClientIp};
use serde::{Deserialize, Serialize};

/// Dashboard listing.
#[derive(Debug, Serialize)]
pub struct RosterListing {
    /// Matching attendees
    pub attendees: Vec<Attendee>,
    /// Counts over the whole roster, not just the matches
    pub counts: RosterCounts,
}

/// Body of a payment-flag change.
#[derive(Debug, Deserialize)]
pub struct SetPaid {
    /// New value
    pub paid: bool,
}

/// Register a guest. A full event answers with the waitlist route instead.
pub async fn register(
    ClientIp(client_ip): ClientIp,
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Json(form): Json<RegistrationForm>,
) -> Result<ActionResult<RegistrationOutcome>, AppError> {
    let outcome = state.registration.register(&event_id, form).await?;
    tracing::debug!(
        %event_id,
        %client_ip,
        full = matches!(outcome, RegistrationOutcome::Full { .. }),
        "Registration handled"
    );
    Ok(match outcome {
        RegistrationOutcome::Registered { .. } => ActionResult::created(outcome),
        RegistrationOutcome::Full { .. } => ActionResult::ok(outcome),
    })
}

/// Filtered, sorted roster of an event for its host.
pub async fn list_attendees(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Query(query): Query<RosterQuery>,
) -> Result<Json<RosterListing>, AppError> {
    let event_id: EventId = parse_id(&event_id, "event_id")?;
    state.owned_event(event_id, &user).await?;

    let roster = RosterState::from_snapshot(
        state
            .repo
            .attendees_for_event(event_id)
            .await
            .map_err(DomainError::from)?,
    );

    Ok(Json(RosterListing {
        attendees: roster.view(&query).into_iter().cloned().collect(),
        counts: roster.counts(),
    }))
}

/// Load an attendee and the event it belongs to, checking ownership.
async fn owned_attendee(
    state: &AppState,
    raw_id: &str,
    user: &AuthUser,
) -> Result<(Attendee, Event), DomainError> {
    let id: AttendeeId = parse_id(raw_id, "attendee_id")?;
    let attendee = state
        .repo
        .attendee_by_id(id)
        .await?
        .ok_or_else(|| DomainError::not_found("Attendee", id))?;
    let event = state.owned_event(attendee.event_id, user).await?;
    Ok((attendee, event))
}

/// Mark an attendee as paid or unpaid.
pub async fn set_paid(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(attendee_id): Path<String>,
    Json(body): Json<SetPaid>,
) -> Result<ActionResult<Attendee>, AppError> {
    let (attendee, event) = owned_attendee(&state, &attendee_id, &user).await?;

    let updated = state
        .repo
        .set_paid(attendee.id, body.paid)
        .await
        .map_err(DomainError::from)?;
    state.pages.invalidate(&event.slug).await;

    tracing::info!(attendee_id = %updated.id, paid = updated.paid, "Payment flag changed");
    Ok(ActionResult::ok(updated))
}

/// Remove a registration.
pub async fn delete_attendee(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(attendee_id): Path<String>,
) -> Result<ActionResult<()>, AppError> {
    let (attendee, event) = owned_attendee(&state, &attendee_id, &user).await?;

    state
        .repo
        .delete_attendee(attendee.id)
        .await
        .map_err(DomainError::from)?;
    state.pages.invalidate(&event.slug).await;

    tracing::info!(attendee_id = %attendee.id, event_id = %event.id, "Attendee removed");
    Ok(ActionResult::done())
}
