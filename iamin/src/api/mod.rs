//! JSON API handlers, mounted under `/api`.
//!
//! Mutations answer with `{"success": true, "data": ...}` or the
//! [`iamin_web::AppError`] body `{"success": false, "error": ..., "field": ...}`.

pub mod attendees;
pub mod auth;
pub mod events;
pub mod payments;
pub mod waitlist;
pub mod websocket;

use crate::error::DomainError;
use std::str::FromStr;

/// Parse a path identifier, reporting a malformed one as a field error.
pub(crate) fn parse_id<T: FromStr>(raw: &str, field: &'static str) -> Result<T, DomainError> {
    raw.parse()
        .map_err(|_| DomainError::validation(field, format!("Invalid {field}")))
}
