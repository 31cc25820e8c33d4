//! OAuth2 authentication against the data space identity service
//!
//! - [`oauth`] - password and refresh-token grants over HTTP
//! - [`session`] - the shared [`AuthSession`] every fetch worker reads its
//!   bearer token from, refreshed at most once per expiry

pub mod oauth;
pub mod session;

pub use oauth::{OAuthClient, TokenPair, TokenProvider, DEFAULT_CLIENT_ID, DEFAULT_TOKEN_URL};
pub use session::{AuthSession, BearerToken, SessionState};

/// Authentication errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Password grant rejected or unreachable
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Refresh grant rejected or unreachable
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// Session already failed a refresh; no further requests are made
    #[error("authentication session failed earlier: {0}")]
    SessionFailed(String),

    /// Identity service answered with a non-success status
    #[error("identity service returned {status}: {message}")]
    Rejected {
        /// HTTP status
        status: u16,
        /// Response body excerpt
        message: String,
    },

    /// Transport error
    #[error("network error: {0}")]
    Network(String),

    /// Token response could not be decoded
    #[error("invalid token response: {0}")]
    Parse(String),
}
