//! # iamin Core
//!
//! Building blocks shared by the iamin crates.
//!
//! Stateful features (the request-a-spot script, the live roster) are
//! written as [`Reducer`]s: a reduction updates state and returns [`Effect`]s
//! for the runtime to run. The [`change_feed`] module describes row-level
//! notifications from the backing store that keep roster views current.
//!
//! ```ignore
//! use iamin_core::{Effect, Reducer, SmallVec, smallvec};
//!
//! impl Reducer for SpotRequestReducer {
//!     type State = SpotRequestState;
//!     type Action = SpotRequestAction;
//!     type Environment = SpotRequestEnvironment;
//!
//!     fn reduce(&self, state: &mut Self::State, action: Self::Action, env: &Self::Environment)
//!         -> SmallVec<[Effect<Self::Action>; 4]>
//!     {
//!         // advance the script, return the next spin as a delayed effect
//!         smallvec![Effect::after(env.spin_interval, SpotRequestAction::Spin)]
//!     }
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{smallvec, SmallVec};

pub mod change_feed;

pub use change_feed::{
    ChangeEvent, ChangeFeed, ChangeFeedError, ChangeFilter, ChangeKind, ChangeStream,
    Subscription,
};
pub use effect::Effect;
pub use environment::{Clock, SystemClock};
pub use reducer::Reducer;

/// The [`Reducer`] trait
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// State transitions for one feature.
    ///
    /// `reduce` mutates `state` in place and describes follow-up work as
    /// [`Effect`]s. It must not perform I/O itself; anything that waits goes
    /// through `Environment` inside an effect.
    pub trait Reducer {
        /// State owned by the feature
        type State;

        /// Inputs, including the ones effects feed back
        type Action;

        /// Injected dependencies
        type Environment;

        /// Apply `action` and return the work it triggers
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect descriptions returned by reducers
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    /// Work for the runtime to perform after a reduction.
    pub enum Effect<Action> {
        /// Nothing to do
        None,

        /// Feed `action` back after `duration`
        Delay {
            /// Pause before dispatch
            duration: Duration,
            /// Action to dispatch
            action: Box<Action>,
        },

        /// Run an async task; a `Some` result is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Wrap an async block as an effect
        #[must_use]
        pub fn future<F>(fut: F) -> Self
        where
            F: Future<Output = Option<Action>> + Send + 'static,
        {
            Effect::Future(Box::pin(fut))
        }

        /// Dispatch `action` after `duration`
        #[must_use]
        pub fn after(duration: Duration, action: Action) -> Self {
            Effect::Delay {
                duration,
                action: Box::new(action),
            }
        }

        /// Returns `true` for [`Effect::None`]
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Effect::None)
        }
    }
}

/// Injected time source
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Where timestamps for new rows come from.
    pub trait Clock: Send + Sync {
        /// Current instant
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall clock used in production.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effect_debug_hides_future() {
        let effect: Effect<u8> = Effect::future(async { Some(1) });
        assert_eq!(format!("{effect:?}"), "Effect::Future(<future>)");
    }

    #[test]
    fn delayed_effect_carries_its_action() {
        let effect = Effect::after(std::time::Duration::from_millis(5), 7u8);
        assert!(!effect.is_none());
        assert!(Effect::<u8>::None.is_none());
        match effect {
            Effect::Delay { duration, action } => {
                assert_eq!(duration.as_millis(), 5);
                assert_eq!(*action, 7);
            },
            other => unreachable!("unexpected {other:?}"),
        }
    }

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
