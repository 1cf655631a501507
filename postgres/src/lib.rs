//! `PostgreSQL` plumbing shared by iamin services.
//!
//! - [`PoolSettings`] / [`connect`]: connection pool construction
//! - [`unique_violation`]: classify SQLSTATE `23505` errors by constraint
//! - [`PgChangeFeed`]: a [`ChangeFeed`](iamin_core::ChangeFeed) over `LISTEN/NOTIFY`
//!
//! # Example
//!
//! ```ignore
//! use iamin_postgres::{connect, PgChangeFeed, PoolSettings};
//!
//! let pool = connect(&PoolSettings::new("postgres://localhost/iamin")).await?;
//! let feed: PgChangeFeed<Attendee> = PgChangeFeed::new(pool.clone(), "attendee_changes");
//! ```

pub mod change_feed;

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

pub use change_feed::{NotifyPayload, PgChangeFeed};

/// SQLSTATE for `unique_violation`.
pub const UNIQUE_VIOLATION: &str = "23505";

/// Connection pool settings.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Connection URL
    pub url: String,
    /// Upper bound on pooled connections
    pub max_connections: u32,
    /// Connections kept open when idle
    pub min_connections: u32,
    /// How long to wait for a free connection
    pub acquire_timeout: Duration,
}

impl PoolSettings {
    /// Settings with defaults for everything but the URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Open a connection pool.
///
/// # Errors
///
/// Returns the underlying [`sqlx::Error`] if no connection can be established.
pub async fn connect(settings: &PoolSettings) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(settings.acquire_timeout)
        .connect(&settings.url)
        .await?;

    tracing::info!(
        max_connections = settings.max_connections,
        "Connected to PostgreSQL"
    );

    Ok(pool)
}

/// If `error` is a unique-constraint violation, return the violated constraint.
///
/// A violation without a reported constraint name yields `Some("")`.
#[must_use]
pub fn unique_violation(error: &sqlx::Error) -> Option<&str> {
    match error {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            Some(db_err.constraint().unwrap_or_default())
        },
        _ => None,
    }
}
