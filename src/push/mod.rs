//! Push-event connection management.
//!
//! The [`ConnectionManager`] maintains at most one live websocket
//! connection, bound 1:1 to the current session credential. The connection
//! task authenticates with a bearer header on the upgrade request, applies
//! every inbound event through [`EntityStore::apply_event`], and retries
//! transport drops with capped exponential backoff.

pub mod protocol;

pub use protocol::{ClientEvent, ServerEvent};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tracing::{debug, info, warn};

use crate::session::SessionManager;
use crate::store::EntityStore;

/// Maximum reconnection attempts before giving up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Maximum backoff duration in seconds.
pub const MAX_BACKOFF_SECS: u64 = 8;

/// Calculate exponential backoff duration for a given attempt number.
///
/// Attempt 1: 0 seconds (immediate)
/// Attempt 2: 1 second
/// Attempt 3: 2 seconds
/// Attempt 4: 4 seconds
/// Attempt 5+: 8 seconds (max)
pub fn calculate_backoff(attempt: u32) -> Duration {
    if attempt <= 1 {
        Duration::from_secs(0)
    } else {
        let exponent = attempt.saturating_sub(2);
        // Cap the exponent; we only need up to 2^3 = 8 since
        // MAX_BACKOFF_SECS is 8.
        let secs = if exponent >= 63 {
            MAX_BACKOFF_SECS
        } else {
            2u64.pow(exponent).min(MAX_BACKOFF_SECS)
        };
        Duration::from_secs(secs)
    }
}

/// One bound connection: its task, outbound channel, and transport flag.
struct Binding {
    task: JoinHandle<()>,
    outbound: mpsc::UnboundedSender<ClientEvent>,
    connected: Arc<AtomicBool>,
}

/// Owns the single live push-event connection.
pub struct ConnectionManager {
    ws_url: String,
    store: Arc<Mutex<EntityStore>>,
    session: Arc<SessionManager>,
    binding: Mutex<Option<Binding>>,
    /// Fan-out of applied events, for observers like `sg watch`.
    events: broadcast::Sender<ServerEvent>,
}

impl ConnectionManager {
    pub fn new(
        ws_url: impl Into<String>,
        store: Arc<Mutex<EntityStore>>,
        session: Arc<SessionManager>,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            ws_url: ws_url.into(),
            store,
            session,
            binding: Mutex::new(None),
            events,
        }
    }

    /// Subscribe to events after they have been applied to the store.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    /// Open a connection authenticated with `credential`.
    ///
    /// Any existing connection is torn down first, so there is never more
    /// than one live connection. Must be called from within a tokio runtime.
    pub fn bind(&self, credential: &str) {
        self.unbind();

        let (tx, rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(run_connection(
            self.ws_url.clone(),
            credential.to_string(),
            self.store.clone(),
            self.session.clone(),
            connected.clone(),
            self.events.clone(),
            rx,
        ));

        *self.binding.lock().unwrap() = Some(Binding {
            task,
            outbound: tx,
            connected,
        });
    }

    /// Tear down the active connection, if any. Idempotent.
    ///
    /// The connected flag is cleared before the task is aborted so
    /// [`ConnectionManager::is_connected`] reports false as soon as this
    /// returns, with no closing-connection race.
    pub fn unbind(&self) {
        if let Some(binding) = self.binding.lock().unwrap().take() {
            binding.connected.store(false, Ordering::SeqCst);
            binding.task.abort();
            debug!("push connection unbound");
        }
    }

    /// Actual transport-level connected state, not merely "bind was called".
    pub fn is_connected(&self) -> bool {
        self.binding
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|b| b.connected.load(Ordering::SeqCst))
    }

    /// Best-effort hint that this client cares about a project's events.
    /// Fire-and-forget: failures are not surfaced, room membership is an
    /// optimization, not a correctness requirement.
    pub fn join_project(&self, project_id: &str) {
        self.send(ClientEvent::JoinProject(project_id.to_string()));
    }

    /// Best-effort counterpart of [`ConnectionManager::join_project`].
    pub fn leave_project(&self, project_id: &str) {
        self.send(ClientEvent::LeaveProject(project_id.to_string()));
    }

    fn send(&self, event: ClientEvent) {
        if let Some(binding) = self.binding.lock().unwrap().as_ref() {
            let _ = binding.outbound.send(event);
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.unbind();
    }
}

/// Connection task: connect, dispatch, reconnect with backoff.
///
/// The backoff counter resets after every successful handshake; once
/// `MAX_RECONNECT_ATTEMPTS` consecutive attempts fail the task gives up
/// (session expiry is detected independently on the REST path, so a
/// credential rejected here looks no different from a slow network).
async fn run_connection(
    ws_url: String,
    credential: String,
    store: Arc<Mutex<EntityStore>>,
    session: Arc<SessionManager>,
    connected: Arc<AtomicBool>,
    events: broadcast::Sender<ServerEvent>,
    mut outbound: mpsc::UnboundedReceiver<ClientEvent>,
) {
    let mut attempt: u32 = 1;

    while attempt <= MAX_RECONNECT_ATTEMPTS {
        tokio::time::sleep(calculate_backoff(attempt)).await;

        let request = match authenticated_request(&ws_url, &credential) {
            Ok(req) => req,
            Err(e) => {
                warn!("invalid push endpoint {ws_url}: {e}");
                return;
            }
        };

        let ws_stream = match connect_async(request).await {
            Ok((stream, _response)) => stream,
            Err(e) => {
                warn!("push connect attempt {attempt} failed: {e}");
                attempt += 1;
                continue;
            }
        };

        info!("push connection established");
        connected.store(true, Ordering::SeqCst);
        attempt = 1;

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                inbound = read.next() => {
                    match inbound {
                        Some(Ok(Message::Text(text))) => {
                            dispatch(&text, &store, &session, &events);
                        }
                        Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                            break;
                        }
                        Some(Ok(_)) => {}
                    }
                }
                event = outbound.recv() => {
                    match event {
                        Some(ev) => {
                            let text = match serde_json::to_string(&ev) {
                                Ok(t) => t,
                                Err(e) => {
                                    warn!("failed to encode client event: {e}");
                                    continue;
                                }
                            };
                            if write.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        // Sender dropped: the manager is tearing us down.
                        None => {
                            connected.store(false, Ordering::SeqCst);
                            return;
                        }
                    }
                }
            }
        }

        connected.store(false, Ordering::SeqCst);
        warn!("push connection lost, reconnecting");
    }

    warn!("push connection gave up after {MAX_RECONNECT_ATTEMPTS} attempts");
}

/// Build the upgrade request carrying the bearer credential.
fn authenticated_request(
    ws_url: &str,
    credential: &str,
) -> std::result::Result<tokio_tungstenite::tungstenite::handshake::client::Request, String> {
    use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, HeaderValue};

    let mut request = ws_url.into_client_request().map_err(|e| e.to_string())?;
    let value =
        HeaderValue::from_str(&format!("Bearer {credential}")).map_err(|e| e.to_string())?;
    request.headers_mut().insert(AUTHORIZATION, value);
    Ok(request)
}

/// Route one inbound frame into the store's merge policy.
///
/// Unparseable frames are logged and dropped; a confirmation event for the
/// authenticated user additionally refreshes the session profile.
fn dispatch(
    text: &str,
    store: &Arc<Mutex<EntityStore>>,
    session: &Arc<SessionManager>,
    events: &broadcast::Sender<ServerEvent>,
) {
    let event: ServerEvent = match serde_json::from_str(text) {
        Ok(ev) => ev,
        Err(e) => {
            debug!("ignoring unrecognized push frame: {e}");
            return;
        }
    };

    if let ServerEvent::UserConfirmed(user) = &event {
        session.apply_profile_update(user);
    }

    store.lock().unwrap().apply_event(event.clone());
    // No receivers is fine; watch-style observers come and go.
    let _ = events.send(event);
}
