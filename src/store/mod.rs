//! The consistency engine: normalized, mutation-reconciling collections.
//!
//! Results from REST calls and inbound push events both land here, through
//! the same four operations per collection:
//!
//! - [`Collection::upsert_many`] - authoritative full replace after a fetch
//! - [`Collection::upsert_one`] - whole-record replace, or front insert
//! - [`Collection::remove_one`] - idempotent delete
//! - [`Collection::set_selection`] - unvalidated detail pointer
//!
//! Merging is last-applied-wins at record granularity: no sequence numbers
//! or timestamps are compared before overwrite, the server is trusted as
//! the final-state authority on each record. A push event that arrives
//! after a newer REST response can therefore regress a record; that is the
//! observed upstream behavior, kept deliberately (see DESIGN.md).

use std::collections::HashSet;

use tracing::debug;

use crate::models::{Entity, Notification, Project, Task, User};
use crate::push::protocol::ServerEvent;

/// Maximum notifications retained, newest first.
const NOTIFICATION_CAP: usize = 100;

/// One entity kind's reconciled state: the records, a detail-view selection,
/// and the per-kind request lifecycle flags.
#[derive(Debug, Clone)]
pub struct Collection<T: Entity> {
    items: Vec<T>,
    selection: Option<String>,
    /// A request for this kind is outstanding.
    pub loading: bool,
    /// Display message from the last rejected request for this kind.
    pub error: Option<String>,
}

impl<T: Entity> Default for Collection<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            selection: None,
            loading: false,
            error: None,
        }
    }
}

impl<T: Entity> Collection<T> {
    /// Replace the entire collection with a fetched list.
    ///
    /// REST fetches are ground-truth snapshots: entries absent from the
    /// response are discarded, including prior optimistic inserts. The
    /// selection pointer is left alone; it is allowed to dangle.
    pub fn upsert_many(&mut self, items: Vec<T>) {
        self.items = items;
    }

    /// Insert or overwrite a single record.
    ///
    /// An existing record with the same id is replaced wholesale (no
    /// field-level merge); an unknown id is inserted at the front, matching
    /// the newest-first display convention. Applying the same record twice
    /// is a no-op the second time.
    pub fn upsert_one(&mut self, item: T) {
        match self.items.iter_mut().find(|e| e.id() == item.id()) {
            Some(slot) => *slot = item,
            None => self.items.insert(0, item),
        }
    }

    /// Remove a record if present; clears the selection when it pointed at
    /// the removed id. Removing an absent id is a no-op, not an error.
    pub fn remove_one(&mut self, id: &str) {
        self.items.retain(|e| e.id() != id);
        if self.selection.as_deref() == Some(id) {
            self.selection = None;
        }
    }

    /// Point the detail view at an id (or nothing).
    ///
    /// Not validated against membership: a selection may be set before the
    /// corresponding fetch completes.
    pub fn set_selection(&mut self, id: Option<&str>) {
        self.selection = id.map(str::to_string);
    }

    /// The selected record, when it exists in the collection.
    pub fn selected(&self) -> Option<&T> {
        let id = self.selection.as_deref()?;
        self.get(id)
    }

    pub fn selection_id(&self) -> Option<&str> {
        self.selection.as_deref()
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.items.iter().find(|e| e.id() == id)
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// The full client-side view of server state.
///
/// Mutated only through the collection operations and
/// [`EntityStore::apply_event`]; no component reaches into the
/// representation directly.
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    pub projects: Collection<Project>,
    pub tasks: Collection<Task>,
    /// User directory (admin screens); selection unused.
    pub users: Collection<User>,
    /// User ids currently reported online.
    pub online: HashSet<String>,
    /// Received notifications, newest first, capped.
    pub notifications: Vec<Notification>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all collections, presence, and notifications. Used when the
    /// session identity goes away so no entity data outlives its owner.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Apply one inbound push event.
    ///
    /// Every event source funnels through this single entry point so the
    /// merge policy above stays the one point of truth regardless of whether
    /// a record arrived by fetch or by push.
    pub fn apply_event(&mut self, event: ServerEvent) {
        debug!(kind = event.kind(), "applying push event");
        match event {
            ServerEvent::ProjectCreated(p) | ServerEvent::ProjectUpdated(p) => {
                self.projects.upsert_one(*p);
            }
            ServerEvent::ProjectDeleted(id) => self.projects.remove_one(&id),
            ServerEvent::TaskCreated(t) | ServerEvent::TaskUpdated(t) => {
                self.tasks.upsert_one(*t);
            }
            ServerEvent::TaskDeleted(id) => self.tasks.remove_one(&id),
            ServerEvent::UserConfirmed(user) => self.users.upsert_one(*user),
            ServerEvent::UserOnline(id) => {
                self.online.insert(id);
            }
            ServerEvent::UserOffline(id) => {
                self.online.remove(&id);
            }
            ServerEvent::Notification(n) => {
                self.notifications.insert(0, *n);
                self.notifications.truncate(NOTIFICATION_CAP);
            }
        }
    }
}
