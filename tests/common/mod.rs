//! Common test utilities for spyglass integration tests.
//!
//! Provides [`MockServer`], an in-process collaboration server (axum) with
//! the REST surface and `/ws` push endpoint the client expects. Each test
//! spawns its own server on an ephemeral port, making tests parallel-safe.

#![allow(dead_code)]

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;

use spyglass::models::{Project, Task, TaskStatus, User};
use spyglass::push::ServerEvent;

/// Email that always answers login with the pending-confirmation 401.
pub const PENDING_EMAIL: &str = "pending@example.com";

/// The one account that can log in.
pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_PASSWORD: &str = "secret";

type AppState = Arc<ServerState>;

pub struct ServerState {
    pub projects: Mutex<Vec<Project>>,
    pub tasks: Mutex<Vec<Task>>,
    pub users: Mutex<Vec<User>>,
    /// Tokens currently accepted by the bearer check.
    pub valid_tokens: Mutex<HashSet<String>>,
    /// Raw frames pushed to every connected websocket client.
    pub events: broadcast::Sender<String>,
    /// Raw frames received from websocket clients (join/leave hints).
    pub client_frames: Mutex<Vec<String>>,
    /// Artificial delay applied to project listing, for in-flight tests.
    pub list_delay_ms: AtomicU64,
    next_id: AtomicU64,
}

impl ServerState {
    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

pub fn admin_user() -> User {
    User {
        id: "u-admin".to_string(),
        email: ADMIN_EMAIL.to_string(),
        name: "Admin".to_string(),
        is_admin: true,
        is_confirmed: true,
    }
}

/// An in-process collaboration server for one test.
pub struct MockServer {
    pub addr: SocketAddr,
    pub state: AppState,
}

impl MockServer {
    pub async fn spawn() -> Self {
        let (events, _) = broadcast::channel(64);
        let state = Arc::new(ServerState {
            projects: Mutex::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
            users: Mutex::new(vec![admin_user()]),
            valid_tokens: Mutex::new(HashSet::new()),
            events,
            client_frames: Mutex::new(Vec::new()),
            list_delay_ms: AtomicU64::new(0),
            next_id: AtomicU64::new(1),
        });

        let app = Router::new()
            .route("/api/auth/login", post(login))
            .route("/api/auth/register", post(register))
            .route("/api/users/me", get(me))
            .route("/api/users", get(list_users))
            .route("/api/users/online", get(online_users))
            .route("/api/users/:id", patch(update_user))
            .route("/api/users/:id/confirm", patch(confirm_user))
            .route("/api/projects", get(list_projects).post(create_project))
            .route("/api/projects/:id", get(get_project).put(update_project))
            .route(
                "/api/projects/:id/members/:user_id",
                patch(add_member).delete(remove_member),
            )
            .route("/api/tasks", post(create_task))
            .route("/api/tasks/my-tasks", get(my_tasks))
            .route("/api/tasks/search", get(search_tasks))
            .route("/api/tasks/project/:id", get(tasks_by_project))
            .route("/api/tasks/status/:status", get(tasks_by_status))
            .route("/api/tasks/:id", put(update_task).delete(delete_task))
            .route("/api/tasks/:id/status/:status", patch(set_task_status))
            .route("/ws", get(ws_upgrade))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Push an event frame to every connected websocket client.
    pub fn push(&self, event: &ServerEvent) {
        let frame = serde_json::to_string(event).unwrap();
        let _ = self.state.events.send(frame);
    }

    /// Invalidate every issued token; the next authenticated call sees 401.
    pub fn revoke_all_tokens(&self) {
        self.state.valid_tokens.lock().unwrap().clear();
    }

    /// Frames the server has received from clients so far.
    pub fn client_frames(&self) -> Vec<String> {
        self.state.client_frames.lock().unwrap().clone()
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"message": message}))).into_response()
}

fn authorize(state: &ServerState, headers: &HeaderMap) -> Result<(), Response> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match token {
        Some(t) if state.valid_tokens.lock().unwrap().contains(t) => Ok(()),
        _ => Err(error_response(StatusCode::UNAUTHORIZED, "Unauthorized")),
    }
}

// ---- auth ----

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> Response {
    if req.email == PENDING_EMAIL {
        return error_response(
            StatusCode::UNAUTHORIZED,
            "Account pending admin confirmation",
        );
    }
    if req.email == ADMIN_EMAIL && req.password == ADMIN_PASSWORD {
        let token = state.next_id("tok");
        state.valid_tokens.lock().unwrap().insert(token.clone());
        return Json(json!({"accessToken": token, "user": admin_user()})).into_response();
    }
    error_response(StatusCode::UNAUTHORIZED, "Invalid credentials")
}

#[derive(Deserialize)]
struct RegisterRequest {
    name: String,
    email: String,
}

async fn register(State(state): State<AppState>, Json(req): Json<RegisterRequest>) -> Response {
    let user = User {
        id: state.next_id("u"),
        email: req.email,
        name: req.name,
        is_admin: false,
        is_confirmed: false,
    };
    state.users.lock().unwrap().push(user);
    (
        StatusCode::CREATED,
        Json(json!({"message": "registered, awaiting confirmation"})),
    )
        .into_response()
}

// ---- users ----

async fn me(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    Json(admin_user()).into_response()
}

async fn list_users(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    Json(state.users.lock().unwrap().clone()).into_response()
}

async fn online_users(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    Json(Vec::<User>::new()).into_response()
}

#[derive(Deserialize)]
struct UserBody {
    name: Option<String>,
    email: Option<String>,
}

async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<UserBody>,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    let mut users = state.users.lock().unwrap();
    match users.iter_mut().find(|u| u.id == id) {
        Some(user) => {
            if let Some(name) = body.name {
                user.name = name;
            }
            if let Some(email) = body.email {
                user.email = email;
            }
            Json(user.clone()).into_response()
        }
        None => error_response(StatusCode::NOT_FOUND, "User not found"),
    }
}

async fn confirm_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    let mut users = state.users.lock().unwrap();
    match users.iter_mut().find(|u| u.id == id) {
        Some(user) => {
            user.is_confirmed = true;
            Json(user.clone()).into_response()
        }
        None => error_response(StatusCode::NOT_FOUND, "User not found"),
    }
}

// ---- projects ----

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectBody {
    name: Option<String>,
    description: Option<String>,
    is_active: Option<bool>,
    members: Option<Vec<String>>,
}

async fn list_projects(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    let delay = state.list_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
    }
    Json(state.projects.lock().unwrap().clone()).into_response()
}

async fn create_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ProjectBody>,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    let now = Utc::now();
    let project = Project {
        id: state.next_id("p"),
        name: body.name.unwrap_or_default(),
        description: body.description.unwrap_or_default(),
        created_by: "u-admin".to_string(),
        members: body.members.unwrap_or_else(|| vec!["u-admin".to_string()]),
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    state.projects.lock().unwrap().push(project.clone());
    (StatusCode::CREATED, Json(project)).into_response()
}

async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    let projects = state.projects.lock().unwrap();
    match projects.iter().find(|p| p.id == id) {
        Some(project) => Json(project.clone()).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "Project not found"),
    }
}

async fn update_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ProjectBody>,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    let mut projects = state.projects.lock().unwrap();
    match projects.iter_mut().find(|p| p.id == id) {
        Some(project) => {
            if let Some(name) = body.name {
                project.name = name;
            }
            if let Some(description) = body.description {
                project.description = description;
            }
            if let Some(is_active) = body.is_active {
                project.is_active = is_active;
            }
            if let Some(members) = body.members {
                project.members = members;
            }
            project.updated_at = Utc::now();
            Json(project.clone()).into_response()
        }
        None => error_response(StatusCode::NOT_FOUND, "Project not found"),
    }
}

async fn add_member(
    State(state): State<AppState>,
    Path((id, user_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    let mut projects = state.projects.lock().unwrap();
    match projects.iter_mut().find(|p| p.id == id) {
        Some(project) => {
            if !project.members.contains(&user_id) {
                project.members.push(user_id);
            }
            Json(project.clone()).into_response()
        }
        None => error_response(StatusCode::NOT_FOUND, "Project not found"),
    }
}

async fn remove_member(
    State(state): State<AppState>,
    Path((id, user_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    let mut projects = state.projects.lock().unwrap();
    match projects.iter_mut().find(|p| p.id == id) {
        Some(project) => {
            project.members.retain(|m| m != &user_id);
            Json(project.clone()).into_response()
        }
        None => error_response(StatusCode::NOT_FOUND, "Project not found"),
    }
}

// ---- tasks ----

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskBody {
    title: Option<String>,
    description: Option<String>,
    project_id: Option<String>,
    assigned_to: Option<String>,
    status: Option<TaskStatus>,
    priority: Option<spyglass::models::TaskPriority>,
    due_date: Option<chrono::DateTime<Utc>>,
}

async fn create_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<TaskBody>,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    let now = Utc::now();
    let task = Task {
        id: state.next_id("t"),
        title: body.title.unwrap_or_default(),
        description: body.description.unwrap_or_default(),
        created_by: "u-admin".to_string(),
        assigned_to: body.assigned_to,
        project_id: body.project_id.unwrap_or_default(),
        status: body.status.unwrap_or_default(),
        due_date: body.due_date,
        priority: body.priority.unwrap_or_default(),
        created_at: now,
        updated_at: now,
    };
    state.tasks.lock().unwrap().push(task.clone());
    (StatusCode::CREATED, Json(task)).into_response()
}

async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<TaskBody>,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    let mut tasks = state.tasks.lock().unwrap();
    match tasks.iter_mut().find(|t| t.id == id) {
        Some(task) => {
            if let Some(title) = body.title {
                task.title = title;
            }
            if let Some(description) = body.description {
                task.description = description;
            }
            if body.assigned_to.is_some() {
                task.assigned_to = body.assigned_to;
            }
            if let Some(status) = body.status {
                task.status = status;
            }
            if let Some(priority) = body.priority {
                task.priority = priority;
            }
            task.updated_at = Utc::now();
            Json(task.clone()).into_response()
        }
        None => error_response(StatusCode::NOT_FOUND, "Task not found"),
    }
}

async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    state.tasks.lock().unwrap().retain(|t| t.id != id);
    StatusCode::NO_CONTENT.into_response()
}

async fn tasks_by_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    let tasks: Vec<Task> = state
        .tasks
        .lock()
        .unwrap()
        .iter()
        .filter(|t| t.project_id == id)
        .cloned()
        .collect();
    Json(tasks).into_response()
}

async fn my_tasks(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    let tasks: Vec<Task> = state
        .tasks
        .lock()
        .unwrap()
        .iter()
        .filter(|t| t.created_by == "u-admin" || t.assigned_to.as_deref() == Some("u-admin"))
        .cloned()
        .collect();
    Json(tasks).into_response()
}

async fn set_task_status(
    State(state): State<AppState>,
    Path((id, status)): Path<(String, TaskStatus)>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    let mut tasks = state.tasks.lock().unwrap();
    match tasks.iter_mut().find(|t| t.id == id) {
        Some(task) => {
            task.status = status;
            task.updated_at = Utc::now();
            Json(task.clone()).into_response()
        }
        None => error_response(StatusCode::NOT_FOUND, "Task not found"),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchQuery {
    search: String,
    project_id: Option<String>,
}

async fn search_tasks(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    let needle = query.search.to_lowercase();
    let tasks: Vec<Task> = state
        .tasks
        .lock()
        .unwrap()
        .iter()
        .filter(|t| {
            t.title.to_lowercase().contains(&needle)
                && query
                    .project_id
                    .as_ref()
                    .is_none_or(|pid| &t.project_id == pid)
        })
        .cloned()
        .collect();
    Json(tasks).into_response()
}

async fn tasks_by_status(
    State(state): State<AppState>,
    Path(status): Path<TaskStatus>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    let tasks: Vec<Task> = state
        .tasks
        .lock()
        .unwrap()
        .iter()
        .filter(|t| t.status == status)
        .cloned()
        .collect();
    Json(tasks).into_response()
}

// ---- websocket ----

async fn ws_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    upgrade: WebSocketUpgrade,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    // Subscribe before the 101 goes out so no event can slip between the
    // client observing the handshake and this socket joining the fan-out.
    let events = state.events.subscribe();
    upgrade.on_upgrade(move |socket| handle_socket(socket, state, events))
}

async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    mut events: broadcast::Receiver<String>,
) {
    let (mut write, mut read) = socket.split();

    loop {
        tokio::select! {
            frame = events.recv() => {
                match frame {
                    Ok(text) => {
                        if write.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
            inbound = read.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        state.client_frames.lock().unwrap().push(text);
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

/// Poll until `cond` holds or the timeout elapses.
pub async fn wait_for(mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5s"
        );
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
}
