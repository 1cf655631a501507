//! Waitlist endpoints.
//!
//! - POST /api/events/:id/waitlist  request a spot on a full event
//! - GET  /api/events/:id/waitlist  requests received (owner)

use super::parse_id;
use crate::auth::CurrentUser;
use crate::error::DomainError;
use crate::server::AppState;
use crate::types::{EventId, WaitlistEntry};
use crate::waitlist::{self, SpotRequestForm, SpotRequestOutcome};
use axum::{
    Json,
    extract::{Path, State},
};
use iamin_web::{ActionResult, AppError, ClientIp};

/// Ask for a spot. Runs the reel animation server-side and always ends in
/// a polite refusal; the request itself is stored for the host.
pub async fn request_spot(
    ClientIp(client_ip): ClientIp,
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Json(form): Json<SpotRequestForm>,
) -> Result<ActionResult<SpotRequestOutcome>, AppError> {
    let event_id: EventId = parse_id(&event_id, "event_id")?;
    let event = state
        .repo
        .event_by_id(event_id)
        .await
        .map_err(DomainError::from)?
        .ok_or_else(|| DomainError::not_found("Event", event_id))?;

    let outcome = waitlist::request_spot(
        state.spot_request_env(),
        state.clock.as_ref(),
        &event,
        state.event_url(&event.slug),
        form,
    )
    .await?;

    tracing::info!(event_id = %event.id, entry_id = %outcome.entry_id, %client_ip, "Spot requested");
    Ok(ActionResult::created(outcome))
}

/// Waitlist requests of an event, newest first.
pub async fn list_waitlist(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<Json<Vec<WaitlistEntry>>, AppError> {
    let event_id: EventId = parse_id(&event_id, "event_id")?;
    state.owned_event(event_id, &user).await?;

    let entries = state
        .repo
        .waitlist_for_event(event_id)
        .await
        .map_err(DomainError::from)?;
    Ok(Json(entries))
}
