//! Axum integration for iamin.
//!
//! Shared HTTP plumbing used by the application crate:
//!
//! - [`AppError`] and [`ActionResult`] render the uniform
//!   `{"success": bool, ...}` response body
//! - extractors for client IPs and cookies
//! - the correlation ID middleware
//! - liveness/readiness handlers and the WebSocket push loop
//!
//! Handlers stay thin: parse the request, hand it to the domain layer,
//! map the outcome to a response.
//!
//! ```ignore
//! use iamin_web::{ActionResult, AppError, ClientIp};
//!
//! async fn register(
//!     ClientIp(client_ip): ClientIp,
//!     Json(form): Json<RegistrationForm>,
//! ) -> Result<ActionResult<Attendee>, AppError> {
//!     let attendee = registration.register(form).await?;
//!     Ok(ActionResult::created(attendee))
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod result;

pub use error::AppError;
pub use extractors::{ClientIp, Cookies};
pub use middleware::{CORRELATION_ID_HEADER, CorrelationId, correlation_id_layer};
pub use result::ActionResult;
