//! Push-event protocol types.
//!
//! Messages on the `/ws` connection are JSON-encoded with an `event` field
//! for discrimination and the payload under `data`, mirroring the server's
//! `scope:action` event naming.
//!
//! # Examples
//!
//! ```json
//! {"event": "task:updated", "data": {"id": "t1", ...}}
//! {"event": "project:deleted", "data": "p1"}
//! {"event": "join:project", "data": "p1"}
//! ```

use serde::{Deserialize, Serialize};

use crate::models::{Notification, Project, Task, User};

/// Inbound events from the server.
///
/// Entity payloads are boxed to keep the enum small.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "project:created")]
    ProjectCreated(Box<Project>),

    #[serde(rename = "project:updated")]
    ProjectUpdated(Box<Project>),

    /// Carries only the deleted project id.
    #[serde(rename = "project:deleted")]
    ProjectDeleted(String),

    #[serde(rename = "task:created")]
    TaskCreated(Box<Task>),

    #[serde(rename = "task:updated")]
    TaskUpdated(Box<Task>),

    /// Carries only the deleted task id.
    #[serde(rename = "task:deleted")]
    TaskDeleted(String),

    /// An administrator approved an account; carries the refreshed user.
    #[serde(rename = "user:confirmed")]
    UserConfirmed(Box<User>),

    #[serde(rename = "user:online")]
    UserOnline(String),

    #[serde(rename = "user:offline")]
    UserOffline(String),

    #[serde(rename = "notification")]
    Notification(Box<Notification>),
}

impl ServerEvent {
    /// Wire name of the event, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::ProjectCreated(_) => "project:created",
            ServerEvent::ProjectUpdated(_) => "project:updated",
            ServerEvent::ProjectDeleted(_) => "project:deleted",
            ServerEvent::TaskCreated(_) => "task:created",
            ServerEvent::TaskUpdated(_) => "task:updated",
            ServerEvent::TaskDeleted(_) => "task:deleted",
            ServerEvent::UserConfirmed(_) => "user:confirmed",
            ServerEvent::UserOnline(_) => "user:online",
            ServerEvent::UserOffline(_) => "user:offline",
            ServerEvent::Notification(_) => "notification",
        }
    }
}

/// Outbound client events.
///
/// Room membership is a scoping optimization only; the server is free to
/// ignore these and no acknowledgment is expected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "join:project")]
    JoinProject(String),

    #[serde(rename = "leave:project")]
    LeaveProject(String),
}
