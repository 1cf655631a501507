//! # iamin Runtime
//!
//! A [`Store`] owns one reducer's state and runs the effects the reducer
//! returns. Actions produced by effects are reduced and then published, so a
//! request handler can drive a scripted flow to its end with
//! [`Store::send_and_wait_for`].
//!
//! ```ignore
//! use iamin_runtime::Store;
//!
//! let store = Store::new(SpotRequestState::default(), SpotRequestReducer, env);
//!
//! let last = store
//!     .send_and_wait_for(submit, SpotRequestAction::is_terminal, Duration::from_secs(5))
//!     .await?;
//! let frames = store.state(|s| s.frames.clone()).await;
//! ```

use iamin_core::{effect::Effect, reducer::Reducer};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, broadcast};

/// Prometheus exporter and metric descriptions
pub mod metrics;

/// Store errors
pub mod error {
    use thiserror::Error;

    /// Why a [`Store`](crate::Store) could not deliver a result
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// No matching action arrived in time
        #[error("Timeout waiting for action")]
        Timeout,

        /// Every sender of the action broadcast is gone
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;

/// Room for actions published while a waiter is busy matching.
const ACTION_BROADCAST_CAPACITY: usize = 16;

/// Runtime for one reducer instance.
///
/// Cloning is cheap and every clone shares state and the action broadcast;
/// spawned effects hold a clone to feed their actions back.
pub struct Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    state: Arc<RwLock<S>>,
    reducer: R,
    environment: E,
    reduced: broadcast::Sender<A>,
}

impl<S, A, E, R> Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E> + Clone + Send + Sync + 'static,
    A: Clone + Send + 'static,
    S: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Create a store around `initial_state`
    #[must_use]
    pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
        let (reduced, _) = broadcast::channel(ACTION_BROADCAST_CAPACITY);
        Self {
            state: Arc::new(RwLock::new(initial_state)),
            reducer,
            environment,
            reduced,
        }
    }

    /// Reduce `action` and start its effects.
    ///
    /// Returns once the effects are spawned, not when they finish.
    #[tracing::instrument(skip_all, name = "store_send")]
    pub async fn send(&self, action: A) {
        metrics::counter!("store.actions.total").increment(1);

        let effects = {
            let mut state = self.state.write().await;
            let start = Instant::now();
            let effects = self.reducer.reduce(&mut state, action, &self.environment);
            metrics::histogram!("store.reducer.duration_seconds")
                .record(start.elapsed().as_secs_f64());
            effects
        };

        tracing::trace!(effects = effects.len(), "Reduced");
        for effect in effects {
            self.run(effect);
        }
    }

    /// Send `action`, then wait for the first effect-produced action that
    /// matches `predicate`.
    ///
    /// The matching action has already been reduced when this returns, so
    /// [`Store::state`] reflects it.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Timeout`] when nothing matches within `timeout`
    /// - [`StoreError::ChannelClosed`] when the broadcast closes
    pub async fn send_and_wait_for<F>(
        &self,
        action: A,
        predicate: F,
        timeout: Duration,
    ) -> Result<A, StoreError>
    where
        F: Fn(&A) -> bool,
    {
        // Subscribe first: a fast effect may finish before send returns.
        let mut reduced = self.reduced.subscribe();
        self.send(action).await;

        let wait = async {
            loop {
                match reduced.recv().await {
                    Ok(action) if predicate(&action) => return Ok(action),
                    Ok(_) => {},
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Action waiter lagged");
                    },
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(StoreError::ChannelClosed);
                    },
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| StoreError::Timeout)?
    }

    /// Read the current state
    pub async fn state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&S) -> T,
    {
        let state = self.state.read().await;
        f(&state)
    }

    async fn feed_back(&self, action: A) {
        self.send(action.clone()).await;
        // Nobody waiting is fine.
        let _ = self.reduced.send(action);
    }

    fn run(&self, effect: Effect<A>) {
        match effect {
            Effect::None => {},
            Effect::Future(fut) => {
                metrics::counter!("store.effects.executed", "type" => "future").increment(1);
                let store = self.clone();
                tokio::spawn(async move {
                    if let Some(action) = fut.await {
                        store.feed_back(action).await;
                    }
                });
            },
            Effect::Delay { duration, action } => {
                metrics::counter!("store.effects.executed", "type" => "delay").increment(1);
                let store = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(duration).await;
                    store.feed_back(*action).await;
                });
            },
        }
    }
}

impl<S, A, E, R> Clone for Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E> + Clone,
    E: Clone,
{
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            reducer: self.reducer.clone(),
            environment: self.environment.clone(),
            reduced: self.reduced.clone(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use iamin_core::{SmallVec, smallvec};

    /// A door that takes a ticket, waits, then opens.
    #[derive(Debug, Clone, Default)]
    struct Door {
        tickets: u32,
        open: bool,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum DoorAction {
        Ticket,
        CheckTicket,
        Scanned,
        Open,
        Jam,
    }

    #[derive(Debug, Clone)]
    struct DoorReducer;

    impl Reducer for DoorReducer {
        type State = Door;
        type Action = DoorAction;
        type Environment = Duration;

        fn reduce(
            &self,
            state: &mut Door,
            action: DoorAction,
            pause: &Duration,
        ) -> SmallVec<[Effect<DoorAction>; 4]> {
            match action {
                DoorAction::Ticket => {
                    state.tickets += 1;
                    SmallVec::new()
                },
                DoorAction::CheckTicket => {
                    smallvec![Effect::future(async { Some(DoorAction::Scanned) })]
                },
                DoorAction::Scanned => {
                    state.tickets += 1;
                    smallvec![Effect::Delay {
                        duration: *pause,
                        action: Box::new(DoorAction::Open),
                    }]
                },
                DoorAction::Open => {
                    state.open = true;
                    SmallVec::new()
                },
                DoorAction::Jam => smallvec![Effect::future(async {
                    panic!("door jammed");
                })],
            }
        }
    }

    fn door() -> Store<Door, DoorAction, Duration, DoorReducer> {
        Store::new(Door::default(), DoorReducer, Duration::from_millis(5))
    }

    #[tokio::test]
    async fn send_reduces_in_order() {
        let store = door();
        store.send(DoorAction::Ticket).await;
        store.send(DoorAction::Ticket).await;
        assert_eq!(store.state(|d| d.tickets).await, 2);
    }

    #[tokio::test]
    async fn waits_through_future_and_delay_effects() {
        let store = door();
        let last = store
            .send_and_wait_for(
                DoorAction::CheckTicket,
                |a| *a == DoorAction::Open,
                Duration::from_secs(1),
            )
            .await
            .unwrap();

        assert_eq!(last, DoorAction::Open);
        assert!(store.state(|d| d.open).await);
        assert_eq!(store.state(|d| d.tickets).await, 1);
    }

    #[tokio::test]
    async fn wait_times_out_without_a_match() {
        let store = door();
        let result = store
            .send_and_wait_for(
                DoorAction::Ticket,
                |a| *a == DoorAction::Open,
                Duration::from_millis(20),
            )
            .await;
        assert!(matches!(result, Err(StoreError::Timeout)));
    }

    #[tokio::test]
    async fn panicking_effect_leaves_store_usable() {
        let store = door();
        store.send(DoorAction::Jam).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        store.send(DoorAction::Ticket).await;
        assert_eq!(store.state(|d| d.tickets).await, 1);
    }
}
