//! The client facade: wires session, connection, and store together and
//! gives every REST mutation the standard pending -> fulfilled/rejected
//! lifecycle.
//!
//! Lifecycle contract, per entity kind:
//! - pending: the kind's loading flag set, its prior error cleared
//! - fulfilled: loading cleared, the whole result applied to the store
//! - rejected: loading cleared, the classified error stored for display
//!
//! Loading and error flags are per kind, so an outstanding task mutation
//! never blocks project UI. A rejected call applies nothing (all or
//! nothing), and a fulfilled call is fenced against the session epoch so a
//! response that arrives after logout cannot repopulate the store for a
//! logged-out session.

use std::sync::{Arc, Mutex};

use crate::config::Endpoints;
use crate::models::{
    NewProject, NewTask, ProfilePatch, Project, ProjectPatch, Task, TaskPatch, TaskStatus, User,
};
use crate::net::{Api, Gateway};
use crate::push::ConnectionManager;
use crate::session::{FileTokenStore, SessionManager, TokenStore};
use crate::store::EntityStore;
use crate::{Error, Result};

/// Entity kinds with independent request lifecycle flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Projects,
    Tasks,
    Users,
}

/// A connected client for one collaboration server.
pub struct Client {
    api: Api,
    session: Arc<SessionManager>,
    store: Arc<Mutex<EntityStore>>,
    connection: ConnectionManager,
}

impl Client {
    /// Build a client with the default file-backed token store.
    pub fn new(endpoints: Endpoints) -> Self {
        Self::with_token_store(endpoints, Arc::new(FileTokenStore::new()))
    }

    /// Build a client with an explicit token store (tests, embedders).
    pub fn with_token_store(endpoints: Endpoints, tokens: Arc<dyn TokenStore>) -> Self {
        let api = Api::new(Gateway::new(endpoints.api_base.clone(), tokens.clone()));
        let session = Arc::new(SessionManager::new(tokens, api.clone()));
        let store = Arc::new(Mutex::new(EntityStore::new()));
        let connection =
            ConnectionManager::new(endpoints.ws_url, store.clone(), session.clone());
        Self {
            api,
            session,
            store,
            connection,
        }
    }

    // ---- lifecycle ----

    /// Restore a persisted session and, when one exists, bind the push
    /// connection to its credential.
    pub fn start(&self) {
        self.session.restore();
        if let Some(credential) = self.session.credential() {
            self.connection.bind(&credential);
        }
    }

    /// Log in and bind the push connection on success.
    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        let user = self.session.login(email, password).await?;
        if let Some(credential) = self.session.credential() {
            self.connection.bind(&credential);
        }
        Ok(user)
    }

    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<()> {
        self.session.register(name, email, password).await
    }

    /// Log out. The push connection is torn down before the session resets,
    /// so `is_connected()` is false by the time the session reads Anonymous.
    /// The entity store is dropped with the session.
    pub fn logout(&self) {
        self.connection.unbind();
        self.session.logout();
        self.store.lock().unwrap().reset();
    }

    /// Tear down the push connection without touching the session.
    pub fn disconnect(&self) {
        self.connection.unbind();
    }

    pub async fn fetch_profile(&self) -> Result<User> {
        match self.session.fetch_profile().await {
            Err(Error::SessionExpired) => {
                self.connection.unbind();
                self.store.lock().unwrap().reset();
                Err(Error::SessionExpired)
            }
            other => other,
        }
    }

    /// Server-signaled invalidation: drop the connection, then the session,
    /// then the expired identity's entity data.
    fn expire_session(&self) {
        self.connection.unbind();
        self.session.invalidate();
        self.store.lock().unwrap().reset();
    }

    // ---- accessors ----

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn store(&self) -> Arc<Mutex<EntityStore>> {
        self.store.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Subscribe to push events after they have been applied to the store.
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<crate::push::ServerEvent> {
        self.connection.subscribe()
    }

    pub fn join_project(&self, project_id: &str) {
        self.connection.join_project(project_id);
    }

    pub fn leave_project(&self, project_id: &str) {
        self.connection.leave_project(project_id);
    }

    pub fn select_project(&self, id: Option<&str>) {
        self.store.lock().unwrap().projects.set_selection(id);
    }

    pub fn select_task(&self, id: Option<&str>) {
        self.store.lock().unwrap().tasks.set_selection(id);
    }

    // ---- projects ----

    pub async fn fetch_projects(&self) -> Result<Vec<Project>> {
        self.run(Kind::Projects, self.api.list_projects(), |store, projects| {
            store.projects.upsert_many(projects.clone());
        })
        .await
    }

    pub async fn fetch_project(&self, id: &str) -> Result<Project> {
        self.run(Kind::Projects, self.api.get_project(id), |store, project| {
            store.projects.upsert_one(project.clone());
        })
        .await
    }

    pub async fn create_project(&self, project: &NewProject) -> Result<Project> {
        self.run(
            Kind::Projects,
            self.api.create_project(project),
            |store, created| store.projects.upsert_one(created.clone()),
        )
        .await
    }

    pub async fn update_project(&self, id: &str, patch: &ProjectPatch) -> Result<Project> {
        self.run(
            Kind::Projects,
            self.api.update_project(id, patch),
            |store, updated| store.projects.upsert_one(updated.clone()),
        )
        .await
    }

    pub async fn add_member(&self, project_id: &str, user_id: &str) -> Result<Project> {
        self.run(
            Kind::Projects,
            self.api.add_member(project_id, user_id),
            |store, updated| store.projects.upsert_one(updated.clone()),
        )
        .await
    }

    pub async fn remove_member(&self, project_id: &str, user_id: &str) -> Result<Project> {
        self.run(
            Kind::Projects,
            self.api.remove_member(project_id, user_id),
            |store, updated| store.projects.upsert_one(updated.clone()),
        )
        .await
    }

    // ---- tasks ----

    pub async fn fetch_tasks_by_project(&self, project_id: &str) -> Result<Vec<Task>> {
        self.run(
            Kind::Tasks,
            self.api.tasks_by_project(project_id),
            |store, tasks| store.tasks.upsert_many(tasks.clone()),
        )
        .await
    }

    pub async fn fetch_my_tasks(&self) -> Result<Vec<Task>> {
        self.run(Kind::Tasks, self.api.my_tasks(), |store, tasks| {
            store.tasks.upsert_many(tasks.clone());
        })
        .await
    }

    pub async fn create_task(&self, task: &NewTask) -> Result<Task> {
        self.run(Kind::Tasks, self.api.create_task(task), |store, created| {
            store.tasks.upsert_one(created.clone());
        })
        .await
    }

    pub async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<Task> {
        self.run(
            Kind::Tasks,
            self.api.update_task(id, patch),
            |store, updated| store.tasks.upsert_one(updated.clone()),
        )
        .await
    }

    pub async fn set_task_status(&self, id: &str, status: TaskStatus) -> Result<Task> {
        self.run(
            Kind::Tasks,
            self.api.set_task_status(id, status),
            |store, updated| store.tasks.upsert_one(updated.clone()),
        )
        .await
    }

    pub async fn delete_task(&self, id: &str) -> Result<()> {
        let deleted = id.to_string();
        self.run(Kind::Tasks, self.api.delete_task(id), move |store, _| {
            store.tasks.remove_one(&deleted);
        })
        .await
    }

    /// Search tasks. Read-only: results are returned to the caller without
    /// replacing the task collection.
    pub async fn search_tasks(&self, search: &str, project_id: Option<&str>) -> Result<Vec<Task>> {
        self.run(
            Kind::Tasks,
            self.api.search_tasks(search, project_id),
            |_store, _tasks| {},
        )
        .await
    }

    /// List tasks by status. Read-only, like [`Client::search_tasks`].
    pub async fn fetch_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<Task>> {
        self.run(
            Kind::Tasks,
            self.api.tasks_by_status(status),
            |_store, _tasks| {},
        )
        .await
    }

    // ---- user directory ----

    pub async fn fetch_users(&self) -> Result<Vec<User>> {
        self.run(Kind::Users, self.api.list_users(), |store, users| {
            store.users.upsert_many(users.clone());
        })
        .await
    }

    pub async fn fetch_online_users(&self) -> Result<Vec<User>> {
        self.run(Kind::Users, self.api.online_users(), |store, users| {
            store.online = users.iter().map(|u| u.id.clone()).collect();
        })
        .await
    }

    /// Update the authenticated user's own profile. The refreshed record is
    /// applied to both the session and the user directory.
    pub async fn update_profile(&self, patch: &ProfilePatch) -> Result<User> {
        let profile = match self.session.snapshot().profile {
            Some(profile) => profile,
            None => self.fetch_profile().await?,
        };
        let updated = self
            .run(
                Kind::Users,
                self.api.update_profile(&profile.id, patch),
                |store, user| store.users.upsert_one(user.clone()),
            )
            .await?;
        self.session.apply_profile_update(&updated);
        Ok(updated)
    }

    pub async fn confirm_user(&self, user_id: &str) -> Result<User> {
        self.run(
            Kind::Users,
            self.api.confirm_user(user_id),
            |store, confirmed| store.users.upsert_one(confirmed.clone()),
        )
        .await
    }

    // ---- lifecycle runner ----

    /// Run one orchestrated request: pending flags, the network call, then
    /// fulfilled/rejected bookkeeping. `apply` only runs when the session
    /// epoch observed before the call is still current.
    async fn run<T, F, A>(&self, kind: Kind, fut: F, apply: A) -> Result<T>
    where
        F: Future<Output = Result<T>>,
        A: FnOnce(&mut EntityStore, &T),
    {
        let epoch = self.session.epoch();

        {
            let mut store = self.store.lock().unwrap();
            let (loading, error) = lifecycle_flags(&mut store, kind);
            *loading = true;
            *error = None;
        }

        match fut.await {
            Ok(value) => {
                let still_current =
                    self.session.epoch() == epoch && self.session.is_authenticated();
                let mut store = self.store.lock().unwrap();
                let (loading, error) = lifecycle_flags(&mut store, kind);
                *loading = false;
                *error = None;
                if still_current {
                    apply(&mut store, &value);
                }
                Ok(value)
            }
            Err(e) => {
                if matches!(e, Error::SessionExpired) {
                    self.expire_session();
                }
                let mut store = self.store.lock().unwrap();
                let (loading, error) = lifecycle_flags(&mut store, kind);
                *loading = false;
                *error = Some(e.to_string());
                Err(e)
            }
        }
    }
}

fn lifecycle_flags(store: &mut EntityStore, kind: Kind) -> (&mut bool, &mut Option<String>) {
    match kind {
        Kind::Projects => (&mut store.projects.loading, &mut store.projects.error),
        Kind::Tasks => (&mut store.tasks.loading, &mut store.tasks.error),
        Kind::Users => (&mut store.users.loading, &mut store.users.error),
    }
}
