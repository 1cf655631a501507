//! Prometheus metrics for observability and monitoring.
//!
//! Metric names used across iamin:
//! - Store runtime (actions, reducer latency, effects)
//! - Registrations and the capacity gate
//! - Waitlist captures and owner notifications
//! - Live roster sockets and change feed deliveries
//!
//! # Example
//!
//! ```rust,no_run
//! use iamin_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use thiserror::Error;

// Re-export metrics macros for use in other crates
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Installs the global recorder; the caller serves [`MetricsServer::render`]
/// on `addr`.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server bound to `addr` once started.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Address the exporter listens on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed. A recorder
    /// that is already installed (tests) is logged and tolerated.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics exporter installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }

    /// Handle for rendering, cloneable into a request handler.
    #[must_use]
    pub fn handle(&self) -> Option<PrometheusHandle> {
        self.handle.clone()
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!("store.actions.total", "Actions sent to stores");
    describe_counter!("store.effects.executed", "Effects executed by stores, by type");
    describe_histogram!(
        "store.reducer.duration_seconds",
        "Time spent inside reducers"
    );

    describe_counter!("registrations_total", "Attendees registered");
    describe_counter!(
        "registrations_duplicate_total",
        "Registrations refused because the phone was already registered"
    );
    describe_counter!(
        "registrations_full_total",
        "Registration attempts routed to the waitlist by the capacity gate"
    );

    describe_counter!("waitlist_entries_total", "Waitlist entries captured");
    describe_counter!(
        "owner_notifications_failed_total",
        "Owner notifications that could not be delivered"
    );

    describe_gauge!("roster_sockets_active", "Live roster WebSocket connections");
    describe_counter!(
        "change_feed_events_total",
        "Change events delivered to roster views"
    );
}

/// Registration metrics recorder.
pub struct RegistrationMetrics;

impl RegistrationMetrics {
    /// Record a successful registration.
    pub fn record_registered() {
        counter!("registrations_total").increment(1);
    }

    /// Record a duplicate registration attempt.
    pub fn record_duplicate() {
        counter!("registrations_duplicate_total").increment(1);
    }

    /// Record an attempt routed to the waitlist.
    pub fn record_full() {
        counter!("registrations_full_total").increment(1);
    }
}

/// Waitlist metrics recorder.
pub struct WaitlistMetrics;

impl WaitlistMetrics {
    /// Record a captured waitlist entry.
    pub fn record_captured() {
        counter!("waitlist_entries_total").increment(1);
    }

    /// Record a failed owner notification.
    pub fn record_notify_failed() {
        counter!("owner_notifications_failed_total").increment(1);
    }
}

/// Roster socket metrics recorder.
pub struct RosterMetrics;

impl RosterMetrics {
    /// A roster socket opened.
    pub fn socket_opened() {
        gauge!("roster_sockets_active").increment(1.0);
    }

    /// A roster socket closed.
    pub fn socket_closed() {
        gauge!("roster_sockets_active").decrement(1.0);
    }

    /// A change event was merged into a roster.
    pub fn record_change() {
        counter!("change_feed_events_total").increment(1);
    }
}
