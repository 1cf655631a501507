//! Attendee roster view.
//!
//! A roster starts from a snapshot and then merges change events one at a
//! time, without refetching. Attendees are kept newest first by
//! `registered_at`; counts are recomputed after every mutation.
//!
//! Delivery is at-least-once, so merging is idempotent:
//!
//! - an insert for an id already present replaces that row
//! - an update for an unknown id is inserted (a missed insert would
//!   otherwise leave the roster permanently out of sync)

use crate::types::{Attendee, AttendeeId};
use iamin_core::change_feed::ChangeEvent;
use iamin_core::{Effect, Reducer, SmallVec};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Aggregate counts shown above the roster.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterCounts {
    /// All registrations
    pub total: usize,
    /// Payment confirmed
    pub paid: usize,
    /// Payment pending
    pub unpaid: usize,
}

/// Ordered attendee list plus derived counts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RosterState {
    attendees: Vec<Attendee>,
    counts: RosterCounts,
}

impl RosterState {
    /// Attendees, newest first.
    #[must_use]
    pub fn attendees(&self) -> &[Attendee] {
        &self.attendees
    }

    /// Current counts.
    #[must_use]
    pub const fn counts(&self) -> RosterCounts {
        self.counts
    }

    /// Number of attendees.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attendees.len()
    }

    /// `true` when nobody is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attendees.is_empty()
    }

    fn position(&self, id: AttendeeId) -> Option<usize> {
        self.attendees.iter().position(|a| a.id == id)
    }

    /// Insert keeping newest-first order; ties go in front.
    fn insert_ordered(&mut self, attendee: Attendee) {
        let at = self
            .attendees
            .partition_point(|a| a.registered_at > attendee.registered_at);
        self.attendees.insert(at, attendee);
    }

    fn upsert(&mut self, attendee: Attendee) {
        match self.position(attendee.id) {
            Some(index) if self.attendees[index].registered_at == attendee.registered_at => {
                self.attendees[index] = attendee;
            },
            Some(index) => {
                self.attendees.remove(index);
                self.insert_ordered(attendee);
            },
            None => self.insert_ordered(attendee),
        }
    }

    fn recount(&mut self) {
        let paid = self.attendees.iter().filter(|a| a.paid).count();
        self.counts = RosterCounts {
            total: self.attendees.len(),
            paid,
            unpaid: self.attendees.len() - paid,
        };
    }

    /// Filtered, searched and sorted listing for the host dashboard.
    #[must_use]
    pub fn view(&self, query: &RosterQuery) -> Vec<&Attendee> {
        let needle = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut rows: Vec<&Attendee> = self
            .attendees
            .iter()
            .filter(|a| match query.payment {
                PaymentFilter::All => true,
                PaymentFilter::Paid => a.paid,
                PaymentFilter::Unpaid => !a.paid,
            })
            .filter(|a| {
                needle.as_ref().is_none_or(|n| {
                    a.full_name.to_lowercase().contains(n.as_str()) || a.phone.contains(n.as_str())
                })
            })
            .collect();

        match query.sort {
            RosterSort::Newest => {},
            RosterSort::Oldest => rows.reverse(),
            RosterSort::Name => rows.sort_by_key(|a| a.full_name.to_lowercase()),
        }
        rows
    }
}

/// Payment-status filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentFilter {
    /// Everyone
    #[default]
    All,
    /// Payment confirmed
    Paid,
    /// Payment pending
    Unpaid,
}

/// Dashboard sort order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RosterSort {
    /// Most recent registration first
    #[default]
    Newest,
    /// Earliest registration first
    Oldest,
    /// Alphabetical by name
    Name,
}

/// Dashboard listing parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct RosterQuery {
    /// Payment filter
    #[serde(default)]
    pub payment: PaymentFilter,
    /// Case-insensitive match on name or phone
    #[serde(default)]
    pub search: Option<String>,
    /// Sort order
    #[serde(default)]
    pub sort: RosterSort,
}

/// Roster mutations.
#[derive(Clone, Debug, PartialEq)]
pub enum RosterAction {
    /// Replace everything with a fresh server snapshot
    Snapshot(Vec<Attendee>),
    /// Merge one change from the feed
    Change(ChangeEvent<Attendee>),
}

/// Applies [`RosterAction`]s. Pure; never produces effects.
#[derive(Clone, Copy, Debug, Default)]
pub struct RosterReducer;

impl Reducer for RosterReducer {
    type State = RosterState;
    type Action = RosterAction;
    type Environment = ();

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            RosterAction::Snapshot(mut attendees) => {
                attendees.sort_by(|a, b| b.registered_at.cmp(&a.registered_at));
                let mut seen = HashSet::with_capacity(attendees.len());
                attendees.retain(|a| seen.insert(a.id));
                state.attendees = attendees;
            },
            RosterAction::Change(ChangeEvent::Inserted(attendee)) => {
                if state.position(attendee.id).is_some() {
                    tracing::debug!(attendee_id = %attendee.id, "Duplicate insert merged as update");
                }
                state.upsert(attendee);
            },
            RosterAction::Change(ChangeEvent::Updated(attendee)) => {
                if state.position(attendee.id).is_none() {
                    tracing::debug!(attendee_id = %attendee.id, "Update for unknown attendee inserted");
                }
                state.upsert(attendee);
            },
        }
        state.recount();
        SmallVec::new()
    }
}

impl RosterState {
    /// Build a roster from a snapshot.
    #[must_use]
    pub fn from_snapshot(attendees: Vec<Attendee>) -> Self {
        let mut state = Self::default();
        RosterReducer.reduce(&mut state, RosterAction::Snapshot(attendees), &());
        state
    }

    /// Merge one change event.
    pub fn apply(&mut self, change: ChangeEvent<Attendee>) {
        RosterReducer.reduce(self, RosterAction::Change(change), &());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::EventId;
    use chrono::{Duration, TimeZone, Utc};
    use iamin_testing::{ReducerTest, assertions};
    use proptest::prelude::*;

    fn guest(name: &str, minutes: i64, paid: bool) -> Attendee {
        Attendee {
            id: AttendeeId::new(),
            event_id: EventId::from_uuid(uuid::Uuid::nil()),
            full_name: name.to_string(),
            phone: format!("+1555{minutes:04}"),
            paid,
            registered_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
                + Duration::minutes(minutes),
        }
    }

    fn names(state: &RosterState) -> Vec<&str> {
        state.attendees().iter().map(|a| a.full_name.as_str()).collect()
    }

    #[test]
    fn snapshot_keeps_one_copy_of_a_repeated_id() {
        let ana = guest("Ana", 1, false);
        let bo = guest("Bo", 2, false);
        let mut ana_later = ana.clone();
        ana_later.registered_at += Duration::minutes(5);

        let state = RosterState::from_snapshot(vec![ana, bo, ana_later]);

        assert_eq!(names(&state), ["Ana", "Bo"]);
        assert_eq!(state.counts().total, 2);
    }

    #[test]
    fn inserts_land_newest_first() {
        let (a, b, c) = (guest("A", 1, false), guest("B", 2, false), guest("C", 3, false));

        ReducerTest::new(RosterReducer)
            .with_env(())
            .given_state(RosterState::default())
            .when_actions([
                RosterAction::Change(ChangeEvent::Inserted(a)),
                RosterAction::Change(ChangeEvent::Inserted(b)),
                RosterAction::Change(ChangeEvent::Inserted(c)),
            ])
            .then_state(|state| {
                assert_eq!(names(state), ["C", "B", "A"]);
                assert_eq!(state.counts().total, 3);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn inserts_with_equal_timestamps_still_prepend() {
        let mut state = RosterState::default();
        for name in ["A", "B", "C"] {
            state.apply(ChangeEvent::Inserted(guest(name, 0, false)));
        }
        assert_eq!(names(&state), ["C", "B", "A"]);
    }

    #[test]
    fn update_flips_paid_in_place() {
        let (a, b, c) = (guest("A", 1, false), guest("B", 2, false), guest("C", 3, false));
        let mut paid_b = b.clone();
        paid_b.paid = true;

        ReducerTest::new(RosterReducer)
            .with_env(())
            .given_state(RosterState::from_snapshot(vec![a, b, c]))
            .when_action(RosterAction::Change(ChangeEvent::Updated(paid_b.clone())))
            .then_state(move |state| {
                assert_eq!(names(state), ["C", "B", "A"]);
                assert_eq!(state.attendees()[1], paid_b);
                assert_eq!(
                    state.counts(),
                    RosterCounts {
                        total: 3,
                        paid: 1,
                        unpaid: 2
                    }
                );
            })
            .run();
    }

    #[test]
    fn update_for_unknown_id_is_inserted() {
        let known = guest("Known", 1, false);
        let missed = guest("Missed", 5, true);

        let mut state = RosterState::from_snapshot(vec![known]);
        state.apply(ChangeEvent::Updated(missed));

        assert_eq!(names(&state), ["Missed", "Known"]);
        assert_eq!(state.counts().paid, 1);
    }

    #[test]
    fn redelivered_insert_does_not_duplicate() {
        let a = guest("A", 1, false);
        let mut state = RosterState::default();
        state.apply(ChangeEvent::Inserted(a.clone()));
        state.apply(ChangeEvent::Inserted(a));

        assert_eq!(state.len(), 1);
        assert_eq!(state.counts().total, 1);
    }

    #[test]
    fn snapshot_is_sorted_and_counted() {
        let state = RosterState::from_snapshot(vec![
            guest("Old", 1, true),
            guest("New", 9, false),
            guest("Mid", 5, true),
        ]);

        assert_eq!(names(&state), ["New", "Mid", "Old"]);
        assert_eq!(
            state.counts(),
            RosterCounts {
                total: 3,
                paid: 2,
                unpaid: 1
            }
        );
    }

    #[test]
    fn dashboard_view_filters_searches_and_sorts() {
        let state = RosterState::from_snapshot(vec![
            guest("zoe", 1, true),
            guest("Adam", 2, false),
            guest("Mia", 3, true),
        ]);

        let paid = state.view(&RosterQuery {
            payment: PaymentFilter::Paid,
            sort: RosterSort::Name,
            ..RosterQuery::default()
        });
        let paid: Vec<&str> = paid.iter().map(|a| a.full_name.as_str()).collect();
        assert_eq!(paid, ["Mia", "zoe"]);

        let search = state.view(&RosterQuery {
            search: Some(" ADA ".to_string()),
            ..RosterQuery::default()
        });
        assert_eq!(search.len(), 1);
        assert_eq!(search[0].full_name, "Adam");

        let oldest = state.view(&RosterQuery {
            sort: RosterSort::Oldest,
            ..RosterQuery::default()
        });
        assert_eq!(oldest[0].full_name, "zoe");
    }

    proptest! {
        #[test]
        fn roster_stays_ordered_and_counted(
            changes in prop::collection::vec((0usize..8, 0i64..50, any::<bool>(), any::<bool>()), 0..40)
        ) {
            let pool: Vec<Attendee> = (0..8).map(|i| guest(&format!("G{i}"), 0, false)).collect();
            let mut state = RosterState::default();

            for (index, minutes, paid, is_update) in changes {
                let mut attendee = pool[index].clone();
                attendee.registered_at += Duration::minutes(minutes);
                attendee.paid = paid;
                let change = if is_update {
                    ChangeEvent::Updated(attendee)
                } else {
                    ChangeEvent::Inserted(attendee)
                };
                state.apply(change);

                let rows = state.attendees();
                prop_assert!(rows.windows(2).all(|w| w[0].registered_at >= w[1].registered_at));

                let mut ids: Vec<AttendeeId> = rows.iter().map(|a| a.id).collect();
                ids.sort();
                ids.dedup();
                prop_assert_eq!(ids.len(), rows.len());

                let counts = state.counts();
                prop_assert_eq!(counts.total, rows.len());
                prop_assert_eq!(counts.paid + counts.unpaid, counts.total);
                prop_assert_eq!(counts.paid, rows.iter().filter(|a| a.paid).count());
            }
        }
    }
}
