//! Domain errors and their HTTP mapping.

use crate::auth::identity::IdentityError;
use crate::store::RepositoryError;
use iamin_core::change_feed::ChangeFeedError;
use iamin_web::AppError;
use thiserror::Error;

/// Message shown for any failure whose details must stay server-side.
pub const GENERIC_FAILURE: &str = "Something went wrong. Please try again.";

/// Errors produced by the application layer.
#[derive(Error, Debug)]
pub enum DomainError {
    /// A form field failed validation
    #[error("{field}: {message}")]
    Validation {
        /// Offending field
        field: &'static str,
        /// User-facing message
        message: String,
    },

    /// This phone number is already registered for the event
    #[error("Already registered")]
    AlreadyRegistered,

    /// The requested event slug is in use
    #[error("Slug taken")]
    SlugTaken,

    /// The waitlist was requested while registration is still open
    #[error("Spots are still available")]
    SpotsAvailable,

    /// Entity does not exist
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind
        entity: &'static str,
        /// Identifier
        id: String,
    },

    /// No authenticated session
    #[error("Unauthorized")]
    Unauthorized,

    /// Authenticated, but not the owner
    #[error("Forbidden")]
    Forbidden,

    /// Identity provider failure
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// Store failure
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Change feed failure
    #[error(transparent)]
    ChangeFeed(#[from] ChangeFeedError),

    /// A flow did not settle in time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Anything else; logged, never shown
    #[error("{0}")]
    Internal(String),
}

impl DomainError {
    /// Shorthand for [`DomainError::Validation`].
    #[must_use]
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Shorthand for [`DomainError::NotFound`].
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation { field, message } => Self::validation(field, message),
            DomainError::AlreadyRegistered => Self::conflict(
                "ALREADY_REGISTERED",
                "You are already registered for this event",
            )
            .with_field("phone"),
            DomainError::SlugTaken => {
                Self::conflict("SLUG_TAKEN", "That link is already taken. Try another one.")
                    .with_field("slug")
            },
            DomainError::SpotsAvailable => {
                Self::conflict("SPOTS_AVAILABLE", "Spots are still available. Register instead.")
            },
            DomainError::NotFound { entity, id } => Self::not_found(entity, id),
            DomainError::Unauthorized => Self::unauthorized("Unauthorized"),
            DomainError::Forbidden => Self::forbidden("You do not have access to this event"),
            DomainError::Identity(IdentityError::InvalidCredentials) => {
                Self::unauthorized("Invalid email or password")
            },
            DomainError::Identity(IdentityError::SessionExpired) => {
                Self::unauthorized("Unauthorized")
            },
            DomainError::Identity(IdentityError::Rejected { message, .. }) => {
                Self::bad_request(message)
            },
            DomainError::Timeout(what) => {
                Self::timeout(GENERIC_FAILURE).with_source(anyhow::anyhow!(what))
            },
            DomainError::ChangeFeed(e) => {
                Self::unavailable("Live updates are unavailable right now").with_source(e.into())
            },
            other => Self::internal(GENERIC_FAILURE).with_source(other.into()),
        }
    }
}
