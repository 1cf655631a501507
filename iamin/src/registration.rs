//! Guest registration.
//!
//! One attempt per submission; no retry. Checks run in this order and the
//! first failure wins:
//!
//! 1. name non-empty after trimming
//! 2. country code + local number, whitespace stripped, at least 5 chars
//! 3. event id is a well-formed UUID
//! 4. the event exists, is enabled, and the access password matches
//! 5. the capacity gate is open; otherwise the guest is sent to the waitlist
//!
//! The store's `(event_id, phone)` constraint resolves concurrent duplicate
//! submissions; a violation becomes [`DomainError::AlreadyRegistered`].

use crate::capacity::{self, Gate};
use crate::error::DomainError;
use crate::event_page::EventPageCache;
use crate::store::{ATTENDEE_PHONE_UNIQUE, Repository};
use crate::types::{Attendee, AttendeeId, Event, EventId, combine_phone};
use iamin_core::Clock;
use iamin_runtime::metrics::RegistrationMetrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shortest accepted phone number, country code included.
pub const MIN_PHONE_LEN: usize = 5;

/// Registration form as submitted by a guest.
#[derive(Clone, Debug, Deserialize)]
pub struct RegistrationForm {
    /// Full name
    pub full_name: String,
    /// Dialling prefix, e.g. `+1`
    pub country_code: String,
    /// Local number
    pub phone: String,
    /// Access password, for protected events
    #[serde(default)]
    pub password: Option<String>,
}

/// What happened to a registration attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RegistrationOutcome {
    /// The guest is on the roster
    Registered {
        /// The stored row
        attendee: Attendee,
    },
    /// The event is at capacity; nothing was stored
    Full {
        /// Where to request a spot instead
        waitlist_url: String,
    },
}

/// Route of the request-a-spot flow for an event.
#[must_use]
pub fn waitlist_path(event_id: EventId) -> String {
    format!("/api/events/{event_id}/waitlist")
}

/// Validates and stores registrations.
#[derive(Clone)]
pub struct RegistrationHandler {
    repo: Arc<dyn Repository>,
    clock: Arc<dyn Clock>,
    pages: EventPageCache,
}

impl RegistrationHandler {
    /// Create a handler.
    #[must_use]
    pub fn new(repo: Arc<dyn Repository>, clock: Arc<dyn Clock>, pages: EventPageCache) -> Self {
        Self { repo, clock, pages }
    }

    /// Register a guest for `event_id`.
    ///
    /// # Errors
    ///
    /// - [`DomainError::Validation`] for bad input, a disabled event or a wrong password
    /// - [`DomainError::NotFound`] when the event does not exist
    /// - [`DomainError::AlreadyRegistered`] when the phone is already on the roster
    /// - [`DomainError::Repository`] for any other store failure
    #[tracing::instrument(skip(self, form), fields(event_id = %event_id))]
    pub async fn register(
        &self,
        event_id: &str,
        form: RegistrationForm,
    ) -> Result<RegistrationOutcome, DomainError> {
        let full_name = form.full_name.trim();
        if full_name.is_empty() {
            return Err(DomainError::validation("full_name", "Please enter your name"));
        }

        let phone = combine_phone(&form.country_code, &form.phone);
        if phone.chars().count() < MIN_PHONE_LEN {
            return Err(DomainError::validation(
                "phone",
                "Please enter a valid phone number",
            ));
        }

        let event_id: EventId = event_id
            .parse()
            .map_err(|_| DomainError::validation("event_id", "Invalid event"))?;

        let event = self
            .repo
            .event_by_id(event_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Event", event_id))?;
        check_access(&event, form.password.as_deref())?;

        let status = capacity::check(self.repo.as_ref(), &event).await?;
        if status.gate == Gate::Full {
            RegistrationMetrics::record_full();
            tracing::info!(attendees = status.attendees, "Event full, routing to waitlist");
            return Ok(RegistrationOutcome::Full {
                waitlist_url: waitlist_path(event_id),
            });
        }

        let attendee = Attendee {
            id: AttendeeId::new(),
            event_id,
            full_name: full_name.to_string(),
            phone,
            paid: false,
            registered_at: self.clock.now(),
        };

        let attendee = match self.repo.insert_attendee(attendee).await {
            Ok(attendee) => attendee,
            Err(e) if e.is_unique_violation(ATTENDEE_PHONE_UNIQUE) => {
                RegistrationMetrics::record_duplicate();
                tracing::info!("Duplicate registration rejected");
                return Err(DomainError::AlreadyRegistered);
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to store registration");
                return Err(e.into());
            },
        };

        self.pages.invalidate(&event.slug).await;
        RegistrationMetrics::record_registered();
        tracing::info!(attendee_id = %attendee.id, "Guest registered");

        Ok(RegistrationOutcome::Registered { attendee })
    }
}

/// Disabled events and wrong passwords are refused before the gate runs.
pub(crate) fn check_access(event: &Event, supplied: Option<&str>) -> Result<(), DomainError> {
    if !event.enabled {
        return Err(DomainError::validation(
            "event_id",
            "Registration for this event is closed",
        ));
    }
    match event.password.as_deref() {
        Some(expected) if supplied.map(str::trim) != Some(expected) => Err(
            DomainError::validation("password", "Incorrect event password"),
        ),
        _ => Ok(()),
    }
}

impl std::fmt::Debug for RegistrationHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationHandler").finish_non_exhaustive()
    }
}
