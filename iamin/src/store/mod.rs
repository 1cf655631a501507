//! Repository traits over the `events`, `attendees` and `waitlist_entries`
//! tables.
//!
//! The backing store owns uniqueness: `(event_id, phone)` for attendees and
//! `slug` for events. Violations surface as
//! [`RepositoryError::UniqueViolation`] carrying the constraint name, so
//! callers can translate them into domain errors.
//!
//! Two implementations: [`PostgresRepository`] and [`MemoryRepository`].

use crate::types::{Attendee, AttendeeId, Event, EventId, OwnerId, WaitlistEntry};
use futures::future::BoxFuture;
use thiserror::Error;

pub mod memory;
pub mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;

/// Unique constraint on `attendees (event_id, phone)`.
pub const ATTENDEE_PHONE_UNIQUE: &str = "attendees_event_phone_key";

/// Unique constraint on `events (slug)`.
pub const EVENT_SLUG_UNIQUE: &str = "events_slug_key";

/// Errors from repository operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// A unique constraint rejected the write
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation {
        /// Constraint name
        constraint: String,
    },

    /// The row to update or delete does not exist
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// A stored row could not be decoded
    #[error("Corrupt row: {0}")]
    Decode(String),

    /// Connection or query failure
    #[error("Database error: {0}")]
    Database(String),
}

impl RepositoryError {
    /// Whether this is a violation of `constraint`.
    #[must_use]
    pub fn is_unique_violation(&self, constraint: &str) -> bool {
        matches!(self, Self::UniqueViolation { constraint: c } if c == constraint)
    }
}

/// Page of the public catalog: `offset..offset + limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    /// First row
    pub offset: u32,
    /// Maximum number of rows
    pub limit: u32,
}

impl PageRange {
    /// Largest page a caller may request.
    pub const MAX_LIMIT: u32 = 100;

    /// Zero-based `page` of `page_size` rows, clamped to [`Self::MAX_LIMIT`].
    #[must_use]
    pub fn page(page: u32, page_size: u32) -> Self {
        let limit = page_size.clamp(1, Self::MAX_LIMIT);
        Self {
            offset: page.saturating_mul(limit),
            limit,
        }
    }
}

/// Event rows.
pub trait EventRepository: Send + Sync {
    /// Insert a new event.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::UniqueViolation`] on [`EVENT_SLUG_UNIQUE`].
    fn insert_event(&self, event: Event) -> BoxFuture<'_, Result<Event, RepositoryError>>;

    /// Overwrite the mutable columns of an event. The slug is never changed.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::NotFound`] if the event does not exist.
    fn update_event(&self, event: Event) -> BoxFuture<'_, Result<Event, RepositoryError>>;

    /// Delete an event and, by cascade, its attendees and waitlist entries.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::NotFound`] if the event does not exist.
    fn delete_event(&self, id: EventId) -> BoxFuture<'_, Result<(), RepositoryError>>;

    /// Look up an event by id.
    fn event_by_id(&self, id: EventId) -> BoxFuture<'_, Result<Option<Event>, RepositoryError>>;

    /// Look up an event by its public slug.
    fn event_by_slug(
        &self,
        slug: String,
    ) -> BoxFuture<'_, Result<Option<Event>, RepositoryError>>;

    /// Events hosted by `owner`, newest first.
    fn events_by_owner(
        &self,
        owner: OwnerId,
    ) -> BoxFuture<'_, Result<Vec<Event>, RepositoryError>>;

    /// Enabled events ordered by start time, then id.
    fn public_events(&self, range: PageRange)
    -> BoxFuture<'_, Result<Vec<Event>, RepositoryError>>;
}

/// Attendee rows.
pub trait AttendeeRepository: Send + Sync {
    /// Insert a registration.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::UniqueViolation`] on [`ATTENDEE_PHONE_UNIQUE`].
    fn insert_attendee(
        &self,
        attendee: Attendee,
    ) -> BoxFuture<'_, Result<Attendee, RepositoryError>>;

    /// Look up an attendee by id.
    fn attendee_by_id(
        &self,
        id: AttendeeId,
    ) -> BoxFuture<'_, Result<Option<Attendee>, RepositoryError>>;

    /// All attendees of an event, most recent registration first.
    fn attendees_for_event(
        &self,
        event_id: EventId,
    ) -> BoxFuture<'_, Result<Vec<Attendee>, RepositoryError>>;

    /// Live attendee count for an event.
    fn count_attendees(&self, event_id: EventId) -> BoxFuture<'_, Result<u64, RepositoryError>>;

    /// Set the payment flag.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::NotFound`] if the attendee does not exist.
    fn set_paid(
        &self,
        id: AttendeeId,
        paid: bool,
    ) -> BoxFuture<'_, Result<Attendee, RepositoryError>>;

    /// Remove a registration.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::NotFound`] if the attendee does not exist.
    fn delete_attendee(&self, id: AttendeeId) -> BoxFuture<'_, Result<(), RepositoryError>>;
}

/// Waitlist rows.
pub trait WaitlistRepository: Send + Sync {
    /// Persist a request for a spot.
    fn insert_waitlist_entry(
        &self,
        entry: WaitlistEntry,
    ) -> BoxFuture<'_, Result<WaitlistEntry, RepositoryError>>;

    /// Requests for an event, newest first.
    fn waitlist_for_event(
        &self,
        event_id: EventId,
    ) -> BoxFuture<'_, Result<Vec<WaitlistEntry>, RepositoryError>>;
}

/// Everything the application needs from the backing store.
pub trait Repository: EventRepository + AttendeeRepository + WaitlistRepository {
    /// Cheap connectivity probe for readiness checks.
    fn ping(&self) -> BoxFuture<'_, Result<(), RepositoryError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_range_clamps_size() {
        assert_eq!(PageRange::page(2, 20), PageRange { offset: 40, limit: 20 });
        assert_eq!(PageRange::page(0, 0).limit, 1);
        assert_eq!(PageRange::page(1, 10_000).limit, PageRange::MAX_LIMIT);
    }

    #[test]
    fn unique_violation_matches_constraint() {
        let err = RepositoryError::UniqueViolation {
            constraint: ATTENDEE_PHONE_UNIQUE.to_string(),
        };
        assert!(err.is_unique_violation(ATTENDEE_PHONE_UNIQUE));
        assert!(!err.is_unique_violation(EVENT_SLUG_UNIQUE));
    }
}
