//! GET /api/events/:id/payment-links

use super::parse_id;
use crate::error::DomainError;
use crate::payments::{self, PaymentOptions};
use crate::server::AppState;
use crate::types::EventId;
use axum::{
    Json,
    extract::{Path, State},
};
use iamin_web::AppError;

/// Deep links for paying the host of a priced event.
pub async fn payment_links(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<Json<PaymentOptions>, AppError> {
    let event_id: EventId = parse_id(&event_id, "event_id")?;
    let event = state
        .repo
        .event_by_id(event_id)
        .await
        .map_err(DomainError::from)?
        .ok_or_else(|| DomainError::not_found("Event", event_id))?;

    Ok(Json(payments::options_for(&event)))
}
