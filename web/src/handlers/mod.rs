//! Reusable HTTP and WebSocket handlers.

pub mod health;
pub mod websocket;

pub use health::{HealthCheck, HealthReport, HealthStatus, health_check, readiness};
pub use websocket::{WsMessage, pump};
