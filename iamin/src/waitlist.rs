//! Request-a-spot flow for full events.
//!
//! A scripted state machine that always ends in rejection:
//!
//! ```text
//! Idle ─Submit─► Captured ─Persisted─► Spinning(1) ─► Spinning(2) ─► Spinning(3) ─Reveal─► Rejected
//!                    │
//!                    └─PersistFailed─► Failed
//! ```
//!
//! Capturing persists a [`WaitlistEntry`]; once stored, the owner is
//! notified out-of-band while the reel spins. A notification failure is
//! logged and does not affect the outcome. Entries are never promoted to
//! attendees.

use crate::capacity::{self, Gate};
use crate::error::DomainError;
use crate::notify::{OwnerNotifier, WaitlistNotice};
use crate::store::Repository;
use crate::types::{Event, WaitlistEntry, WaitlistEntryId, combine_phone};
use iamin_core::{Clock, Effect, Reducer, SmallVec, smallvec};
use iamin_runtime::Store;
use iamin_runtime::metrics::WaitlistMetrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Number of reel spins before the reveal.
pub const SPIN_ROUNDS: u8 = 3;

/// Symbols shown per spin. Every frame is a near miss.
pub const REEL_FRAMES: [[&str; 3]; SPIN_ROUNDS as usize] = [
    ["🎟️", "🎟️", "🎈"],
    ["🎉", "🎉", "🍕"],
    ["⭐", "⭐", "💫"],
];

// ============================================================================
// State
// ============================================================================

/// Where the flow is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    /// Nothing submitted
    #[default]
    Idle,
    /// Request accepted, entry being stored
    Captured,
    /// Reel spinning
    Spinning {
        /// 1-based spin number
        round: u8,
    },
    /// Terminal: the spot was not granted
    Rejected,
    /// Terminal: the entry could not be stored
    Failed,
}

/// One reel frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ReelFrame {
    /// 1-based spin number
    pub round: u8,
    /// Symbols left to right
    pub symbols: [&'static str; 3],
}

/// Flow state for one submission.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpotRequestState {
    /// Current phase
    pub phase: Phase,
    /// Stored entry, once persisted
    pub entry: Option<WaitlistEntry>,
    /// Notice sent once the entry is stored
    pub pending_notice: Option<WaitlistNotice>,
    /// Frames shown so far
    pub frames: Vec<ReelFrame>,
    /// Whether the owner was reached; `None` until the notifier answers
    pub owner_notified: Option<bool>,
}

/// Flow inputs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpotRequestAction {
    /// Guest submits a request
    Submit {
        /// Entry to store
        entry: WaitlistEntry,
        /// Notice for the host
        notice: WaitlistNotice,
    },
    /// The entry was stored
    Persisted {
        /// Stored row
        entry: WaitlistEntry,
    },
    /// Storing failed
    PersistFailed {
        /// Logged cause
        reason: String,
    },
    /// Notice delivered
    OwnerNotified,
    /// Notice not delivered
    NotifyFailed {
        /// Logged cause
        reason: String,
    },
    /// Advance the reel
    Spin,
    /// Show the result
    Reveal,
}

impl SpotRequestAction {
    /// Whether the flow ends with this action.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Reveal | Self::PersistFailed { .. })
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Dependencies of the flow.
#[derive(Clone)]
pub struct SpotRequestEnvironment {
    /// Where entries are stored
    pub repo: Arc<dyn Repository>,
    /// Host notifications
    pub notifier: Arc<dyn OwnerNotifier>,
    /// Pause between spins
    pub spin_interval: Duration,
}

impl std::fmt::Debug for SpotRequestEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpotRequestEnvironment")
            .field("spin_interval", &self.spin_interval)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Drives the request-a-spot script.
#[derive(Clone, Copy, Debug, Default)]
pub struct SpotRequestReducer;

impl SpotRequestReducer {
    fn persist(env: &SpotRequestEnvironment, entry: WaitlistEntry) -> Effect<SpotRequestAction> {
        let repo = Arc::clone(&env.repo);
        Effect::future(async move {
            match repo.insert_waitlist_entry(entry).await {
                Ok(entry) => {
                    WaitlistMetrics::record_captured();
                    tracing::info!(entry_id = %entry.id, event_id = %entry.event_id, "Spot request stored");
                    Some(SpotRequestAction::Persisted { entry })
                },
                Err(e) => {
                    tracing::error!(error = %e, "Failed to store spot request");
                    Some(SpotRequestAction::PersistFailed {
                        reason: e.to_string(),
                    })
                },
            }
        })
    }

    fn notify(env: &SpotRequestEnvironment, notice: WaitlistNotice) -> Effect<SpotRequestAction> {
        let notifier = Arc::clone(&env.notifier);
        Effect::future(async move {
            match notifier.notify(notice).await {
                Ok(()) => Some(SpotRequestAction::OwnerNotified),
                Err(e) => {
                    WaitlistMetrics::record_notify_failed();
                    tracing::warn!(error = %e, "Owner notification failed");
                    Some(SpotRequestAction::NotifyFailed {
                        reason: e.to_string(),
                    })
                },
            }
        })
    }

    fn after(env: &SpotRequestEnvironment, action: SpotRequestAction) -> Effect<SpotRequestAction> {
        Effect::after(env.spin_interval, action)
    }
}

impl Reducer for SpotRequestReducer {
    type State = SpotRequestState;
    type Action = SpotRequestAction;
    type Environment = SpotRequestEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match (state.phase, action) {
            (Phase::Idle, SpotRequestAction::Submit { entry, notice }) => {
                state.phase = Phase::Captured;
                state.pending_notice = Some(notice);
                smallvec![Self::persist(env, entry)]
            },

            (Phase::Captured, SpotRequestAction::Persisted { entry }) => {
                state.entry = Some(entry);
                let mut effects: SmallVec<[Effect<Self::Action>; 4]> =
                    smallvec![Self::after(env, SpotRequestAction::Spin)];
                if let Some(notice) = state.pending_notice.take() {
                    effects.push(Self::notify(env, notice));
                }
                effects
            },

            (Phase::Captured, SpotRequestAction::PersistFailed { .. }) => {
                state.phase = Phase::Failed;
                state.pending_notice = None;
                SmallVec::new()
            },

            (Phase::Captured, SpotRequestAction::Spin) => {
                state.phase = Phase::Spinning { round: 1 };
                state.frames.push(frame(1));
                smallvec![Self::after(env, SpotRequestAction::Spin)]
            },

            (Phase::Spinning { round }, SpotRequestAction::Spin) if round < SPIN_ROUNDS => {
                let next = round + 1;
                state.phase = Phase::Spinning { round: next };
                state.frames.push(frame(next));
                let then = if next < SPIN_ROUNDS {
                    SpotRequestAction::Spin
                } else {
                    SpotRequestAction::Reveal
                };
                smallvec![Self::after(env, then)]
            },

            (Phase::Spinning { round }, SpotRequestAction::Reveal) if round == SPIN_ROUNDS => {
                state.phase = Phase::Rejected;
                SmallVec::new()
            },

            (_, SpotRequestAction::OwnerNotified) => {
                state.owner_notified = Some(true);
                SmallVec::new()
            },

            (_, SpotRequestAction::NotifyFailed { .. }) => {
                state.owner_notified = Some(false);
                SmallVec::new()
            },

            (phase, action) => {
                tracing::debug!(?phase, ?action, "Ignored spot request action");
                SmallVec::new()
            },
        }
    }
}

fn frame(round: u8) -> ReelFrame {
    let index = usize::from(round.clamp(1, SPIN_ROUNDS) - 1);
    ReelFrame {
        round,
        symbols: REEL_FRAMES[index],
    }
}

// ============================================================================
// Submission
// ============================================================================

/// Spot request form.
#[derive(Clone, Debug, Deserialize)]
pub struct SpotRequestForm {
    /// Guest name
    pub name: String,
    /// Dialling prefix
    pub country_code: String,
    /// Local number
    pub phone: String,
    /// Optional note to the host
    #[serde(default)]
    pub message: Option<String>,
    /// Event password, when the host set one
    #[serde(default)]
    pub password: Option<String>,
}

/// Result shown to the guest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SpotRequestOutcome {
    /// Always [`Phase::Rejected`]
    pub result: Phase,
    /// Reel frames in order
    pub frames: Vec<ReelFrame>,
    /// Stored request
    pub entry_id: WaitlistEntryId,
}

/// Upper bound on how long a submission may take beyond the reel itself.
const SETTLE_GRACE: Duration = Duration::from_secs(10);

/// Run the flow for one request against `event`.
///
/// # Errors
///
/// - [`DomainError::Validation`] for a blank name or short phone
/// - [`DomainError::SpotsAvailable`] when the event is not full
/// - [`DomainError::Internal`] when the entry cannot be stored
/// - [`DomainError::Timeout`] when the flow does not settle
#[tracing::instrument(skip_all, fields(event_id = %event.id))]
pub async fn request_spot(
    env: SpotRequestEnvironment,
    clock: &dyn Clock,
    event: &Event,
    event_url: String,
    form: SpotRequestForm,
) -> Result<SpotRequestOutcome, DomainError> {
    crate::registration::check_access(event, form.password.as_deref())?;
    let name = form.name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("name", "Please enter your name"));
    }
    let phone = combine_phone(&form.country_code, &form.phone);
    if phone.chars().count() < crate::registration::MIN_PHONE_LEN {
        return Err(DomainError::validation(
            "phone",
            "Please enter a valid phone number",
        ));
    }
    let message = form
        .message
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty());

    let status = capacity::check(env.repo.as_ref(), event).await?;
    if status.gate == Gate::Open {
        return Err(DomainError::SpotsAvailable);
    }

    let entry = WaitlistEntry {
        id: WaitlistEntryId::new(),
        event_id: event.id,
        name: name.to_string(),
        phone: phone.clone(),
        message: message.clone(),
        created_at: clock.now(),
    };
    let notice = WaitlistNotice {
        owner_email: event.owner_email.clone(),
        event_title: event.title.clone(),
        event_url,
        name: name.to_string(),
        phone,
        message,
    };
    let entry_id = entry.id;

    let timeout = env.spin_interval * (u32::from(SPIN_ROUNDS) + 1) + SETTLE_GRACE;
    let store = Store::new(SpotRequestState::default(), SpotRequestReducer, env);

    let terminal = store
        .send_and_wait_for(
            SpotRequestAction::Submit { entry, notice },
            SpotRequestAction::is_terminal,
            timeout,
        )
        .await
        .map_err(|e| DomainError::Timeout(format!("spot request: {e}")))?;

    match terminal {
        SpotRequestAction::PersistFailed { reason } => Err(DomainError::Internal(reason)),
        _ => {
            let frames = store.state(|s| s.frames.clone()).await;
            Ok(SpotRequestOutcome {
                result: Phase::Rejected,
                frames,
                entry_id,
            })
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::notify::{ConsoleNotifier, NotifyError};
    use crate::store::{AttendeeRepository, EventRepository, MemoryRepository, WaitlistRepository};
    use crate::test_support::sample_event;
    use crate::types::{Attendee, AttendeeId, EventId};
    use chrono::Utc;
    use futures::future::BoxFuture;
    use iamin_testing::{ReducerTest, assertions, test_clock};

    struct FailingNotifier;

    impl OwnerNotifier for FailingNotifier {
        fn notify(&self, _notice: WaitlistNotice) -> BoxFuture<'_, Result<(), NotifyError>> {
            Box::pin(async { Err(NotifyError::Transport("relay down".to_string())) })
        }
    }

    fn env(repo: &MemoryRepository, notifier: Arc<dyn OwnerNotifier>) -> SpotRequestEnvironment {
        SpotRequestEnvironment {
            repo: Arc::new(repo.clone()),
            notifier,
            spin_interval: Duration::from_millis(1),
        }
    }

    fn entry(event_id: EventId) -> WaitlistEntry {
        WaitlistEntry {
            id: WaitlistEntryId::new(),
            event_id,
            name: "Jane".to_string(),
            phone: "+1234567890".to_string(),
            message: None,
            created_at: Utc::now(),
        }
    }

    fn notice() -> WaitlistNotice {
        WaitlistNotice {
            owner_email: "host@example.com".to_string(),
            event_title: "Rooftop Party".to_string(),
            event_url: "http://localhost/e/party".to_string(),
            name: "Jane".to_string(),
            phone: "+1234567890".to_string(),
            message: None,
        }
    }

    fn form() -> SpotRequestForm {
        SpotRequestForm {
            name: "Jane".to_string(),
            country_code: "+1".to_string(),
            phone: "234567890".to_string(),
            message: Some("  ".to_string()),
            password: None,
        }
    }

    async fn full_event(repo: &MemoryRepository, max_spots: u32) -> Event {
        let mut event = sample_event("full-party");
        event.max_spots = Some(max_spots);
        let event = repo.insert_event(event).await.unwrap();
        for i in 0..max_spots {
            repo.insert_attendee(Attendee {
                id: AttendeeId::new(),
                event_id: event.id,
                full_name: format!("Guest {i}"),
                phone: format!("+1555000{i}"),
                paid: false,
                registered_at: Utc::now(),
            })
            .await
            .unwrap();
        }
        event
    }

    #[test]
    fn submit_captures_and_persists() {
        let repo = MemoryRepository::default();
        let event_id = EventId::new();

        ReducerTest::new(SpotRequestReducer)
            .with_env(env(&repo, Arc::new(ConsoleNotifier)))
            .given_state(SpotRequestState::default())
            .when_action(SpotRequestAction::Submit {
                entry: entry(event_id),
                notice: notice(),
            })
            .then_state(|state| {
                assert_eq!(state.phase, Phase::Captured);
                assert!(state.pending_notice.is_some());
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn persisted_notifies_and_starts_spinning() {
        let repo = MemoryRepository::default();
        let stored = entry(EventId::new());

        ReducerTest::new(SpotRequestReducer)
            .with_env(env(&repo, Arc::new(ConsoleNotifier)))
            .given_state(SpotRequestState::default())
            .when_actions([
                SpotRequestAction::Submit {
                    entry: stored.clone(),
                    notice: notice(),
                },
                SpotRequestAction::Persisted {
                    entry: stored.clone(),
                },
            ])
            .then_state(move |state| {
                assert_eq!(state.entry.as_ref(), Some(&stored));
                assert!(state.pending_notice.is_none());
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 2);
                let next = assertions::assert_delayed(effects, Duration::from_millis(1));
                assert_eq!(*next, SpotRequestAction::Spin);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn script_always_ends_rejected() {
        let repo = MemoryRepository::default();
        let stored = entry(EventId::new());

        ReducerTest::new(SpotRequestReducer)
            .with_env(env(&repo, Arc::new(ConsoleNotifier)))
            .given_state(SpotRequestState::default())
            .when_actions([
                SpotRequestAction::Submit {
                    entry: stored.clone(),
                    notice: notice(),
                },
                SpotRequestAction::Persisted { entry: stored },
                SpotRequestAction::Spin,
                SpotRequestAction::Spin,
                SpotRequestAction::Spin,
                SpotRequestAction::Reveal,
            ])
            .then_state(|state| {
                assert_eq!(state.phase, Phase::Rejected);
                let rounds: Vec<u8> = state.frames.iter().map(|f| f.round).collect();
                assert_eq!(rounds, [1, 2, 3]);
                assert!(state.frames.iter().all(|f| f.symbols[0] == f.symbols[1]
                    && f.symbols[1] != f.symbols[2]));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn early_reveal_is_ignored() {
        let repo = MemoryRepository::default();
        let stored = entry(EventId::new());

        ReducerTest::new(SpotRequestReducer)
            .with_env(env(&repo, Arc::new(ConsoleNotifier)))
            .given_state(SpotRequestState::default())
            .when_actions([
                SpotRequestAction::Submit {
                    entry: stored.clone(),
                    notice: notice(),
                },
                SpotRequestAction::Persisted { entry: stored },
                SpotRequestAction::Spin,
                SpotRequestAction::Reveal,
            ])
            .then_state(|state| assert_eq!(state.phase, Phase::Spinning { round: 1 }))
            .run();
    }

    #[test]
    fn persist_failure_is_terminal() {
        let repo = MemoryRepository::default();

        ReducerTest::new(SpotRequestReducer)
            .with_env(env(&repo, Arc::new(ConsoleNotifier)))
            .given_state(SpotRequestState::default())
            .when_actions([
                SpotRequestAction::Submit {
                    entry: entry(EventId::new()),
                    notice: notice(),
                },
                SpotRequestAction::PersistFailed {
                    reason: "db down".to_string(),
                },
                SpotRequestAction::Spin,
            ])
            .then_state(|state| {
                assert_eq!(state.phase, Phase::Failed);
                assert!(state.frames.is_empty());
            })
            .run();
    }

    #[tokio::test]
    async fn full_event_request_stores_one_entry_and_no_attendee() {
        let repo = MemoryRepository::default();
        let event = full_event(&repo, 2).await;

        let outcome = request_spot(
            env(&repo, Arc::new(ConsoleNotifier)),
            &test_clock(),
            &event,
            "http://localhost/e/full-party".to_string(),
            form(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.result, Phase::Rejected);
        assert_eq!(outcome.frames.len(), usize::from(SPIN_ROUNDS));

        let entries = repo.waitlist_for_event(event.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Jane");
        assert_eq!(entries[0].phone, "+1234567890");
        assert_eq!(entries[0].message, None);
        assert_eq!(repo.count_attendees(event.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn notification_failure_does_not_fail_the_request() {
        let repo = MemoryRepository::default();
        let event = full_event(&repo, 1).await;

        let outcome = request_spot(
            env(&repo, Arc::new(FailingNotifier)),
            &test_clock(),
            &event,
            "http://localhost/e/full-party".to_string(),
            form(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.result, Phase::Rejected);
        assert_eq!(repo.waitlist_len().await, 1);
    }

    #[tokio::test]
    async fn protected_event_needs_its_password_to_queue() {
        let repo = MemoryRepository::default();
        let mut event = full_event(&repo, 1).await;
        event.password = Some("hunter2".to_string());
        let event = repo.update_event(event).await.unwrap();

        for supplied in [None, Some("wrong")] {
            let mut guess = form();
            guess.password = supplied.map(str::to_string);
            let err = request_spot(
                env(&repo, Arc::new(ConsoleNotifier)),
                &test_clock(),
                &event,
                String::new(),
                guess,
            )
            .await
            .unwrap_err();
            assert!(matches!(err, DomainError::Validation { field: "password", .. }));
        }
        assert_eq!(repo.waitlist_len().await, 0);

        let mut known = form();
        known.password = Some(" hunter2 ".to_string());
        request_spot(
            env(&repo, Arc::new(ConsoleNotifier)),
            &test_clock(),
            &event,
            String::new(),
            known,
        )
        .await
        .unwrap();
        assert_eq!(repo.waitlist_len().await, 1);
    }

    #[tokio::test]
    async fn disabled_event_refuses_waitlist() {
        let repo = MemoryRepository::default();
        let mut event = full_event(&repo, 1).await;
        event.enabled = false;

        let err = request_spot(
            env(&repo, Arc::new(ConsoleNotifier)),
            &test_clock(),
            &event,
            String::new(),
            form(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DomainError::Validation { field: "event_id", .. }));
        assert_eq!(repo.waitlist_len().await, 0);
    }

    #[tokio::test]
    async fn open_event_refuses_waitlist() {
        let repo = MemoryRepository::default();
        let event = repo.insert_event(sample_event("open")).await.unwrap();

        let err = request_spot(
            env(&repo, Arc::new(ConsoleNotifier)),
            &test_clock(),
            &event,
            String::new(),
            form(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DomainError::SpotsAvailable));
        assert_eq!(repo.waitlist_len().await, 0);
    }
}
