//! Authentication lifecycle: the single source of truth for "who is logged
//! in and in what state".
//!
//! The [`SessionManager`] owns a state machine:
//!
//! ```text
//! Anonymous -> Authenticating -> Authenticated
//!                     |                |
//!                     v                v
//!            ConfirmationPending    Expired
//! ```
//!
//! Every transition writes the whole session record under one lock, so
//! racing operations resolve by last-write-wins and readers never observe a
//! partially-updated session. The stored credential is present iff the
//! status is `Authenticated` (or `ConfirmationPending` reached from a prior
//! login, which keeps the earlier credential untouched).

pub mod token;

pub use token::{FileTokenStore, MemoryTokenStore, TokenStore};

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::models::User;
use crate::net::Api;
use crate::{Error, Result};

/// Authentication state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No credential; nothing in flight.
    Anonymous,
    /// A login or registration attempt is outstanding.
    Authenticating,
    /// Logged in; a credential is held (profile may be lazily fetched).
    Authenticated,
    /// The account exists but awaits admin approval; no credential issued.
    ConfirmationPending,
    /// The server rejected a previously valid credential mid-session.
    Expired,
}

/// A snapshot of the session record.
#[derive(Debug, Clone)]
pub struct Session {
    pub status: SessionStatus,
    /// Bearer credential, present iff authenticated.
    pub credential: Option<String>,
    /// Authenticated profile; `None` until first fetched.
    pub profile: Option<User>,
    /// Email awaiting admin confirmation, when status is `ConfirmationPending`.
    pub pending_confirmation_email: Option<String>,
    /// Display message from the last failed operation.
    pub error: Option<String>,
    /// Bumped on every authenticated-identity change (login success, logout,
    /// invalidation). Late REST responses are fenced against this.
    pub epoch: u64,
}

impl Session {
    fn anonymous() -> Self {
        Self {
            status: SessionStatus::Anonymous,
            credential: None,
            profile: None,
            pending_confirmation_email: None,
            error: None,
            epoch: 0,
        }
    }
}

/// Owns the authentication lifecycle and the current user profile.
pub struct SessionManager {
    inner: Mutex<Session>,
    tokens: Arc<dyn TokenStore>,
    api: Api,
}

impl SessionManager {
    pub fn new(tokens: Arc<dyn TokenStore>, api: Api) -> Self {
        Self {
            inner: Mutex::new(Session::anonymous()),
            tokens,
            api,
        }
    }

    /// Read the persisted credential at startup.
    ///
    /// Transitions to `Authenticated` with an unset profile when a credential
    /// exists (the profile is fetched lazily on first need); fails soft to
    /// `Anonymous` otherwise. Never errors.
    pub fn restore(&self) {
        let restored = match self.tokens.get() {
            Ok(Some(token)) => Some(token),
            Ok(None) => None,
            Err(e) => {
                warn!("token store read failed during restore: {e}");
                None
            }
        };

        let mut session = self.inner.lock().unwrap();
        match restored {
            Some(token) => {
                debug!("restored persisted session");
                session.status = SessionStatus::Authenticated;
                session.credential = Some(token);
            }
            None => {
                session.status = SessionStatus::Anonymous;
                session.credential = None;
            }
        }
    }

    /// Attempt a login.
    ///
    /// On success the credential is persisted and the profile attached. A
    /// pending-admin-confirmation response transitions to
    /// `ConfirmationPending` carrying the submitted email and stores no
    /// credential; a credential left over from a previous session is not
    /// touched. Any other failure restores the prior status with a display
    /// error attached.
    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        let prior = {
            let mut session = self.inner.lock().unwrap();
            let prior = session.status;
            session.status = SessionStatus::Authenticating;
            session.error = None;
            prior
        };

        match self.api.login(email, password).await {
            Ok(resp) => {
                if let Err(e) = self.tokens.set(&resp.access_token) {
                    // The in-memory session still authenticates; only
                    // restore-after-restart is affected.
                    warn!("failed to persist credential: {e}");
                }
                let mut session = self.inner.lock().unwrap();
                session.status = SessionStatus::Authenticated;
                session.credential = Some(resp.access_token);
                session.profile = Some(resp.user.clone());
                session.pending_confirmation_email = None;
                session.error = None;
                session.epoch += 1;
                Ok(resp.user)
            }
            Err(Error::ConfirmationRequired { .. }) => {
                let mut session = self.inner.lock().unwrap();
                session.status = SessionStatus::ConfirmationPending;
                session.pending_confirmation_email = Some(email.to_string());
                Err(Error::ConfirmationRequired {
                    email: Some(email.to_string()),
                })
            }
            Err(e) => {
                let mut session = self.inner.lock().unwrap();
                session.status = prior;
                session.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Register a new account.
    ///
    /// Registration never authenticates: success transitions to
    /// `ConfirmationPending` with the submitted email and no credential.
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<()> {
        let prior = {
            let mut session = self.inner.lock().unwrap();
            let prior = session.status;
            session.status = SessionStatus::Authenticating;
            session.error = None;
            prior
        };

        match self.api.register(name, email, password).await {
            Ok(()) => {
                let mut session = self.inner.lock().unwrap();
                session.status = SessionStatus::ConfirmationPending;
                session.pending_confirmation_email = Some(email.to_string());
                session.error = None;
                Ok(())
            }
            Err(e) => {
                let mut session = self.inner.lock().unwrap();
                session.status = prior;
                session.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Fetch and attach the authenticated profile.
    ///
    /// Requires `Authenticated`; fails with [`Error::Unauthenticated`]
    /// otherwise.
    pub async fn fetch_profile(&self) -> Result<User> {
        if self.status() != SessionStatus::Authenticated {
            return Err(Error::Unauthenticated);
        }

        match self.api.me().await {
            Ok(user) => {
                let mut session = self.inner.lock().unwrap();
                session.profile = Some(user.clone());
                session.error = None;
                Ok(user)
            }
            Err(Error::SessionExpired) => {
                self.invalidate();
                Err(Error::SessionExpired)
            }
            Err(e) => {
                let mut session = self.inner.lock().unwrap();
                session.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Explicit logout. Idempotent; reaches `Anonymous` from any state with
    /// no credential left behind.
    pub fn logout(&self) {
        if let Err(e) = self.tokens.clear() {
            warn!("failed to clear persisted credential: {e}");
        }
        let mut session = self.inner.lock().unwrap();
        let epoch = session.epoch;
        *session = Session::anonymous();
        session.epoch = epoch + 1;
    }

    /// Server-signaled session invalidation.
    ///
    /// The credential is cleared and the session lands in `Expired`, an
    /// unauthenticated state that keeps the reason visible for display;
    /// [`SessionManager::logout`] reaches `Anonymous` from there.
    pub fn invalidate(&self) {
        if let Err(e) = self.tokens.clear() {
            warn!("failed to clear persisted credential: {e}");
        }
        let mut session = self.inner.lock().unwrap();
        session.status = SessionStatus::Expired;
        session.credential = None;
        session.profile = None;
        session.pending_confirmation_email = None;
        session.error = Some(Error::SessionExpired.to_string());
        session.epoch += 1;
    }

    /// Replace the attached profile when a fresher record names the
    /// authenticated user (confirmation push, profile update response).
    pub fn apply_profile_update(&self, user: &User) {
        let mut session = self.inner.lock().unwrap();
        if session
            .profile
            .as_ref()
            .is_some_and(|p| p.id == user.id)
        {
            session.profile = Some(user.clone());
        }
    }

    /// Snapshot the whole session record.
    pub fn snapshot(&self) -> Session {
        self.inner.lock().unwrap().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.lock().unwrap().status
    }

    pub fn is_authenticated(&self) -> bool {
        self.status() == SessionStatus::Authenticated
    }

    /// The current bearer credential, if authenticated.
    pub fn credential(&self) -> Option<String> {
        self.inner.lock().unwrap().credential.clone()
    }

    pub fn epoch(&self) -> u64 {
        self.inner.lock().unwrap().epoch
    }
}
