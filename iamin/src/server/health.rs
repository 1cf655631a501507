//! Readiness probe.

use super::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use iamin_web::handlers::{HealthCheck, HealthReport, readiness};
use std::time::Instant;

/// Store round trips slower than this report `degraded`.
const SLOW_STORE_MS: u64 = 500;

/// Readiness check endpoint.
///
/// Pings the backing store and reports its latency. Returns 503 only when
/// the store is unreachable.
///
/// ```bash
/// curl http://localhost:8080/ready
/// # {"status":"healthy","checks":[{"component":"store","status":"healthy","latency_ms":2}],...}
/// ```
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let started = Instant::now();
    let result = state.repo.ping().await;
    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let check = match result {
        Ok(()) if latency_ms > SLOW_STORE_MS => {
            HealthCheck::degraded("store", format!("slow round trip: {latency_ms}ms"))
        },
        Ok(()) => HealthCheck::healthy("store"),
        Err(error) => {
            tracing::warn!(%error, "Store readiness probe failed");
            HealthCheck::unhealthy("store", "unreachable")
        },
    };

    readiness(vec![check.with_latency_ms(latency_ms)])
}
