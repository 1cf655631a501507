//! iamin: event pages with RSVPs, a capacity gate, a waitlist and a live
//! guest roster for the host.
//!
//! # Architecture
//!
//! ```text
//!  guest ──POST register──► RegistrationHandler ──► CapacityGate ──OPEN──► attendees
//!                                  │                      │
//!                                  │                     FULL
//!                                  ▼                      ▼
//!                            page cache             SpotRequest flow ──► waitlist_entries
//!                                                   (Store + reducer)  └► owner email
//!
//!  attendees ──INSERT/UPDATE──► ChangeFeed ──► RealtimeChannel ──► RosterReducer ──► host socket
//! ```
//!
//! - [`registration`] validates a guest, consults the [`capacity`] gate and
//!   inserts the attendee; the store's unique `(event_id, phone)` constraint
//!   decides duplicates.
//! - [`waitlist`] runs the request-a-spot flow as a reducer on a
//!   per-request [`iamin_runtime::Store`]. It stores the request, tells the
//!   host, plays three near-miss reel spins and always ends in a refusal.
//! - [`realtime`] scopes change-feed subscriptions to one event's attendees;
//!   [`roster`] merges snapshot and changes into a newest-first view.
//! - [`auth`] resolves cookie sessions per request against a GoTrue-style
//!   identity provider. There is no global session.
//!
//! Handlers in [`api`] are thin: extract, call the domain, map to
//! [`iamin_web::ActionResult`] or [`iamin_web::AppError`].

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod auth;
pub mod capacity;
pub mod config;
pub mod error;
pub mod event_page;
pub mod notify;
pub mod page_cache;
pub mod payments;
pub mod realtime;
pub mod registration;
pub mod roster;
pub mod server;
pub mod slug;
pub mod store;
pub mod types;
pub mod waitlist;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use error::DomainError;
pub use server::{AppSettings, AppState, build_router};
pub use store::{MemoryRepository, PostgresRepository, Repository, RepositoryError};
