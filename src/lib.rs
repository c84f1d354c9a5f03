//! Spyglass - a realtime client for task/project collaboration servers.
//!
//! This library keeps a local, in-memory view of Projects, Tasks, and the
//! authenticated Session consistent across three asynchronously-arriving
//! input streams:
//!
//! - request/response results from on-demand REST calls ([`net`]),
//! - push events delivered over a persistent websocket connection ([`push`]),
//! - local mutations issued before server confirmation ([`client`]).
//!
//! Both the REST and push paths funnel into one merge policy owned by the
//! [`store::EntityStore`], so an event and a fetch result for the same record
//! reconcile identically regardless of which path delivered it.

pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod models;
pub mod net;
pub mod push;
pub mod session;
pub mod store;

use thiserror::Error;

/// Errors that can occur while talking to the collaboration server.
///
/// The [`net::Gateway`] classifies raw transport/HTTP failures into this
/// taxonomy; everything above it works in these terms only.
#[derive(Debug, Error)]
pub enum Error {
    /// Client-side input rejected before or by the server (HTTP 400/422).
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Bad credentials on an unauthenticated request (login).
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The account exists but has not been approved by an administrator.
    ///
    /// Distinct from [`Error::Authentication`] so callers can route to a
    /// waiting screen instead of a blocked-login screen. The email is filled
    /// in by the session layer, which knows what was submitted.
    #[error("Account pending admin confirmation")]
    ConfirmationRequired { email: Option<String> },

    /// A previously valid-looking credential was rejected mid-session.
    /// The persisted credential has already been cleared when this surfaces.
    #[error("Session expired: please log in again")]
    SessionExpired,

    /// The operation requires an authenticated session.
    #[error("Not logged in")]
    Unauthenticated,

    /// The request could not complete (DNS, connect, timeout, ...).
    #[error("Network error: {0}")]
    Network(String),

    /// Resource not found (HTTP 404).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource conflict (HTTP 409), e.g. duplicate creation.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Any other non-success HTTP response.
    #[error("Server error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for spyglass operations.
pub type Result<T> = std::result::Result<T, Error>;
