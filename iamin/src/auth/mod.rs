//! Host authentication: identity provider client and request sessions.

pub mod identity;
pub mod session;

pub use identity::{
    AuthSession, AuthUser, GoTrueClient, IdentityError, IdentityProvider, OAuthStart, SignUp,
};
pub use session::{CurrentUser, SessionContext, SessionResolver, resolve_session};
