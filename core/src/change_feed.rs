//! Change feed abstraction for row-level realtime notifications.
//!
//! The backing store emits a [`ChangeEvent`] whenever a row is inserted or
//! updated. A view that wants to stay in sync opens a [`Subscription`] with a
//! [`ChangeFilter`] (table + event kinds + one equality filter on a column) and
//! consumes it as a stream.
//!
//! # Delivery
//!
//! ```text
//! ┌─────────────┐   insert/update   ┌─────────────┐   filter   ┌──────────────┐
//! │ Store write │──────────────────►│ Change feed │───────────►│ Subscription │
//! └─────────────┘                   └─────────────┘            └──────┬───────┘
//!                                                                     │ stream
//!                                                                     ▼
//!                                                               ┌───────────┐
//!                                                               │   View    │
//!                                                               └───────────┘
//! ```
//!
//! - **At-least-once**: the same change may arrive twice; consumers merge idempotently
//! - **Transport order**: no ordering beyond what the transport provides
//! - **No reconnect**: a transport failure ends the stream; the view reloads on
//!   its next mount
//!
//! # Implementations
//!
//! - `InMemoryChangeFeed` (in `iamin-testing`): broadcast channel, for tests and local runs
//! - `PgChangeFeed` (in `iamin-postgres`): `LISTEN/NOTIFY` fed by a row trigger
//!
//! # Unsubscribing
//!
//! A [`Subscription`] owns its channel. Calling [`Subscription::unsubscribe`] or
//! dropping it releases the channel synchronously, so a view that goes away never
//! leaks a listener.

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur while subscribing to or consuming a change feed.
#[derive(Error, Debug, Clone)]
pub enum ChangeFeedError {
    /// Failed to connect to the underlying transport
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to open the subscription
    #[error("Subscription failed for table '{table}': {reason}")]
    SubscriptionFailed {
        /// The table that failed
        table: String,
        /// The reason for failure
        reason: String,
    },

    /// A payload could not be decoded into the row type
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// The subscriber fell behind and missed changes
    #[error("Subscriber lagged, {0} changes skipped")]
    Lagged(u64),

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// Kind of row change carried by a [`ChangeEvent`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    /// A row was inserted
    Insert,
    /// A row was updated
    Update,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert => write!(f, "INSERT"),
            Self::Update => write!(f, "UPDATE"),
        }
    }
}

/// A row-level change, carrying the post-change row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "record", rename_all = "snake_case")]
pub enum ChangeEvent<T> {
    /// The row was inserted
    Inserted(T),
    /// The row was updated
    Updated(T),
}

impl<T> ChangeEvent<T> {
    /// The kind of change.
    #[must_use]
    pub const fn kind(&self) -> ChangeKind {
        match self {
            Self::Inserted(_) => ChangeKind::Insert,
            Self::Updated(_) => ChangeKind::Update,
        }
    }

    /// Borrow the post-change row.
    #[must_use]
    pub const fn record(&self) -> &T {
        match self {
            Self::Inserted(row) | Self::Updated(row) => row,
        }
    }

    /// Take the post-change row.
    #[must_use]
    pub fn into_record(self) -> T {
        match self {
            Self::Inserted(row) | Self::Updated(row) => row,
        }
    }

    /// Build an event from its kind and row.
    #[must_use]
    pub const fn from_kind(kind: ChangeKind, row: T) -> Self {
        match kind {
            ChangeKind::Insert => Self::Inserted(row),
            ChangeKind::Update => Self::Updated(row),
        }
    }
}

/// Which changes a subscription wants to see.
///
/// One table, a set of change kinds, and at most one `column = value`
/// equality filter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeFilter {
    table: String,
    kinds: Vec<ChangeKind>,
    eq: Option<(String, String)>,
}

impl ChangeFilter {
    /// Subscribe to inserts and updates on `table`.
    #[must_use]
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            kinds: vec![ChangeKind::Insert, ChangeKind::Update],
            eq: None,
        }
    }

    /// Only deliver rows whose `column` equals `value`.
    #[must_use]
    pub fn eq(mut self, column: impl Into<String>, value: impl fmt::Display) -> Self {
        self.eq = Some((column.into(), value.to_string()));
        self
    }

    /// Restrict the change kinds delivered.
    #[must_use]
    pub fn kinds(mut self, kinds: &[ChangeKind]) -> Self {
        self.kinds = kinds.to_vec();
        self
    }

    /// Table name.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Kinds delivered by this filter.
    #[must_use]
    pub fn change_kinds(&self) -> &[ChangeKind] {
        &self.kinds
    }

    /// Equality filter, if any.
    #[must_use]
    pub fn eq_filter(&self) -> Option<(&str, &str)> {
        self.eq.as_ref().map(|(c, v)| (c.as_str(), v.as_str()))
    }

    /// Decide whether a change on `table` of `kind`, with row encoded as JSON, passes.
    ///
    /// Column values are compared by their string form, so a UUID column
    /// matches its hyphenated representation.
    #[must_use]
    pub fn matches(&self, table: &str, kind: ChangeKind, row: &serde_json::Value) -> bool {
        if table != self.table || !self.kinds.contains(&kind) {
            return false;
        }

        match &self.eq {
            None => true,
            Some((column, expected)) => match row.get(column) {
                Some(serde_json::Value::String(s)) => s == expected,
                Some(serde_json::Value::Null) | None => false,
                Some(other) => other.to_string() == *expected,
            },
        }
    }
}

/// Stream of changes delivered to a subscriber.
pub type ChangeStream<T> =
    Pin<Box<dyn Stream<Item = Result<ChangeEvent<T>, ChangeFeedError>> + Send>>;

type Release = Box<dyn FnOnce() + Send>;

/// A live subscription to a change feed.
///
/// Yields changes as a [`Stream`]. The underlying channel is released by
/// [`Subscription::unsubscribe`] or when the subscription is dropped.
pub struct Subscription<T> {
    id: Uuid,
    filter: ChangeFilter,
    stream: ChangeStream<T>,
    release: Option<Release>,
}

impl<T> Subscription<T> {
    /// Create a subscription from a stream and a release hook.
    ///
    /// `release` runs exactly once, on unsubscribe or drop.
    #[must_use]
    pub fn new(
        filter: ChangeFilter,
        stream: ChangeStream<T>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            filter,
            stream,
            release: Some(Box::new(release)),
        }
    }

    /// Unique id of this subscription.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// The filter this subscription was opened with.
    #[must_use]
    pub const fn filter(&self) -> &ChangeFilter {
        &self.filter
    }

    /// Release the channel now.
    pub fn unsubscribe(mut self) {
        self.release_channel();
    }

    fn release_channel(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.release_channel();
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("filter", &self.filter)
            .field("released", &self.release.is_none())
            .finish_non_exhaustive()
    }
}

impl<T> Stream for Subscription<T> {
    type Item = Result<ChangeEvent<T>, ChangeFeedError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().stream.as_mut().poll_next(cx)
    }
}

/// Trait for change feed implementations.
///
/// # Dyn Compatibility
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so it can be held as
/// `Arc<dyn ChangeFeed<T>>` in application state.
pub trait ChangeFeed<T>: Send + Sync {
    /// Open a subscription for the changes selected by `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`ChangeFeedError::SubscriptionFailed`] or
    /// [`ChangeFeedError::ConnectionFailed`] if the channel cannot be opened.
    fn subscribe(
        &self,
        filter: ChangeFilter,
    ) -> Pin<Box<dyn Future<Output = Result<Subscription<T>, ChangeFeedError>> + Send + '_>>;
}
