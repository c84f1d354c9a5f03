//! REST request gateway.
//!
//! The [`Gateway`] attaches the current bearer credential to every outbound
//! call, classifies HTTP failures into the crate's [`Error`](crate::Error)
//! taxonomy, and detects session invalidation: a 401 on a request that
//! carried a bearer token means the credential is dead, so the gateway
//! clears the token store before surfacing [`Error::SessionExpired`].
//!
//! Failed requests are not retried here; retry policy belongs to callers.

pub mod api;

pub use api::Api;

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::session::TokenStore;
use crate::{Error, Result};

/// Marker the server embeds in the 401 body when an account exists but has
/// not been approved by an administrator.
const PENDING_CONFIRMATION_MARKER: &str = "pending admin confirmation";

/// Whether a request carries the stored bearer credential.
///
/// Auth endpoints (login/register) are sent bare so that a stale stored
/// credential can never turn a bad-password 401 into a session-expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Auth {
    Bearer,
    None,
}

/// HTTP gateway to the collaboration server.
#[derive(Clone)]
pub struct Gateway {
    http: reqwest::Client,
    base: String,
    tokens: Arc<dyn TokenStore>,
}

impl Gateway {
    /// Create a gateway for the given REST base URL (no trailing slash).
    pub fn new(base: impl Into<String>, tokens: Arc<dyn TokenStore>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.into(),
            tokens,
        }
    }

    /// Issue a request and deserialize the JSON response body.
    pub async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: Option<&[(&str, &str)]>,
        body: Option<serde_json::Value>,
        auth: Auth,
    ) -> Result<T> {
        let resp = self.dispatch(method, path, query, body, auth).await?;
        resp.json::<T>()
            .await
            .map_err(|e| Error::Network(format!("invalid response body: {e}")))
    }

    /// Issue a request and discard the response body (e.g. DELETE).
    pub async fn send_empty(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        auth: Auth,
    ) -> Result<()> {
        self.dispatch(method, path, None, body, auth).await?;
        Ok(())
    }

    async fn dispatch(
        &self,
        method: Method,
        path: &str,
        query: Option<&[(&str, &str)]>,
        body: Option<serde_json::Value>,
        auth: Auth,
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base, path);
        debug!(%method, %url, "rest request");

        let mut req = self.http.request(method, &url);
        if let Some(pairs) = query {
            req = req.query(pairs);
        }

        let mut had_token = false;
        if auth == Auth::Bearer {
            if let Some(token) = self.tokens.get()? {
                req = req.bearer_auth(token);
                had_token = true;
            }
        }

        if let Some(json) = body {
            req = req.json(&json);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let raw = resp.text().await.unwrap_or_default();
        let message = parse_error_message(status, &raw);
        let err = classify_failure(status, message, had_token);

        if matches!(err, Error::SessionExpired) {
            // The credential is dead server-side; drop it so the session
            // layer can only transition to an unauthenticated state.
            if let Err(e) = self.tokens.clear() {
                warn!("failed to clear invalidated credential: {e}");
            }
        }

        Err(err)
    }
}

/// Server error bodies are `{"message": "..."}` where the message may also
/// be an array of field errors.
#[derive(Deserialize)]
struct ErrorBody {
    message: ErrorMessage,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorMessage {
    One(String),
    Many(Vec<String>),
}

/// Extract a human-readable message from an error response body.
fn parse_error_message(status: StatusCode, raw: &str) -> String {
    if let Ok(body) = serde_json::from_str::<ErrorBody>(raw) {
        return match body.message {
            ErrorMessage::One(msg) => msg,
            ErrorMessage::Many(msgs) => msgs.join(", "),
        };
    }
    status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string()
}

/// Classify a non-success HTTP response into the error taxonomy.
///
/// `had_token` distinguishes a 401 for bad login credentials from a 401 that
/// invalidates a previously accepted bearer token.
fn classify_failure(status: StatusCode, message: String, had_token: bool) -> Error {
    match status {
        StatusCode::UNAUTHORIZED => {
            if message
                .to_ascii_lowercase()
                .contains(PENDING_CONFIRMATION_MARKER)
            {
                // The session layer fills in the submitted email.
                Error::ConfirmationRequired { email: None }
            } else if had_token {
                Error::SessionExpired
            } else {
                Error::Authentication(message)
            }
        }
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => Error::Validation(message),
        StatusCode::NOT_FOUND => Error::NotFound(message),
        StatusCode::CONFLICT => Error::Conflict(message),
        _ => Error::Api {
            status: status.as_u16(),
            message,
        },
    }
}
