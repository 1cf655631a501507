//! # iamin Testing
//!
//! Test doubles and helpers for the iamin crates:
//!
//! - clocks that return predictable instants ([`FixedClock`], [`SteppingClock`])
//! - [`ReducerTest`] and its [`assertions`]
//! - [`InMemoryChangeFeed`], a change feed backed by a broadcast channel
//!
//! ```ignore
//! use iamin_testing::ReducerTest;
//!
//! ReducerTest::new(RosterReducer)
//!     .with_env(())
//!     .given_state(RosterState::default())
//!     .when_action(RosterAction::Change(ChangeEvent::Inserted(ana)))
//!     .then_state(|roster| assert_eq!(roster.counts().total, 1))
//!     .run();
//! ```

use chrono::{DateTime, Utc};
use iamin_core::environment::Clock;

pub mod change_feed;

/// Deterministic [`Clock`] implementations
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::Mutex;

    /// Clock stuck at one instant.
    ///
    /// ```
    /// use iamin_testing::mocks::FixedClock;
    /// use iamin_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Clock that always reads `time`
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that advances by a fixed step on every reading.
    ///
    /// Rows created through it get strictly increasing timestamps, so
    /// ordering by creation time is deterministic.
    #[derive(Debug)]
    pub struct SteppingClock {
        next: Mutex<DateTime<Utc>>,
        step: chrono::Duration,
    }

    impl SteppingClock {
        /// Start at `start`, advancing by `step` per reading
        #[must_use]
        pub const fn new(start: DateTime<Utc>, step: chrono::Duration) -> Self {
            Self {
                next: Mutex::new(start),
                step,
            }
        }
    }

    impl Clock for SteppingClock {
        fn now(&self) -> DateTime<Utc> {
            let mut next = match self.next.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let now = *next;
            *next = now + self.step;
            now
        }
    }

    /// Midnight, 1 January 2025 UTC.
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap_or_default())
    }

    /// A [`SteppingClock`] starting at the [`test_clock`] instant, one second per reading
    #[must_use]
    pub fn stepping_clock() -> SteppingClock {
        SteppingClock::new(test_clock().now(), chrono::Duration::seconds(1))
    }
}

pub use change_feed::InMemoryChangeFeed;
pub use mocks::{FixedClock, SteppingClock, stepping_clock, test_clock};
pub use reducer_test::{ReducerTest, assertions};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_reads_new_year_2025() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now().to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }

    #[test]
    fn stepping_clock_advances_one_second() {
        let clock = stepping_clock();
        let first = clock.now();
        let second = clock.now();
        assert_eq!(second - first, chrono::Duration::seconds(1));
        assert_eq!(first, test_clock().now());
    }
}
