//! Capacity gate: register or request a spot.
//!
//! Evaluated per attempt against the live attendee count. There is no
//! cached gate state and no transition back from `Full`; deleting an
//! attendee simply makes the next evaluation come out `Open`.

use crate::store::{AttendeeRepository, RepositoryError};
use crate::types::Event;
use serde::{Deserialize, Serialize};

/// Outcome of a gate evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Gate {
    /// Registration proceeds
    Open,
    /// Guests are routed to the request-a-spot flow
    Full,
}

impl Gate {
    /// `max_spots` unset is permanently open.
    #[must_use]
    pub const fn evaluate(max_spots: Option<u32>, attendee_count: u64) -> Self {
        match max_spots {
            Some(max) if attendee_count >= max as u64 => Self::Full,
            _ => Self::Open,
        }
    }

    /// `true` for [`Gate::Open`].
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

/// Gate decision together with the numbers it was made from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct GateStatus {
    /// Decision
    pub gate: Gate,
    /// Live attendee count
    pub attendees: u64,
    /// Remaining spots, `None` when uncapped
    pub spots_left: Option<u64>,
}

impl GateStatus {
    /// Build a status from an event's capacity and the live count.
    #[must_use]
    pub fn new(max_spots: Option<u32>, attendees: u64) -> Self {
        Self {
            gate: Gate::evaluate(max_spots, attendees),
            attendees,
            spots_left: max_spots.map(|max| u64::from(max).saturating_sub(attendees)),
        }
    }
}

/// Evaluate the gate for `event` against the store.
///
/// Uncapped events skip the count query.
///
/// # Errors
///
/// Propagates the store error if counting fails.
pub async fn check<R>(repo: &R, event: &Event) -> Result<GateStatus, RepositoryError>
where
    R: AttendeeRepository + ?Sized,
{
    let attendees = match event.max_spots {
        Some(_) => repo.count_attendees(event.id).await?,
        None => 0,
    };
    let status = GateStatus::new(event.max_spots, attendees);
    tracing::debug!(
        event_id = %event.id,
        attendees,
        max_spots = ?event.max_spots,
        gate = ?status.gate,
        "Capacity gate evaluated"
    );
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncapped_events_are_always_open() {
        assert_eq!(Gate::evaluate(None, 0), Gate::Open);
        assert_eq!(Gate::evaluate(None, 10_000), Gate::Open);
    }

    #[test]
    fn full_once_count_reaches_capacity() {
        assert_eq!(Gate::evaluate(Some(2), 1), Gate::Open);
        assert_eq!(Gate::evaluate(Some(2), 2), Gate::Full);
        assert_eq!(Gate::evaluate(Some(2), 3), Gate::Full);
    }

    #[test]
    fn status_reports_spots_left() {
        let status = GateStatus::new(Some(5), 3);
        assert!(status.gate.is_open());
        assert_eq!(status.spots_left, Some(2));

        let over = GateStatus::new(Some(2), 4);
        assert_eq!(over.gate, Gate::Full);
        assert_eq!(over.spots_left, Some(0));

        assert_eq!(GateStatus::new(None, 7).spots_left, None);
    }

    #[test]
    fn gate_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Gate::Full).ok().as_deref(), Some("\"FULL\""));
    }
}
