//! Typed wrappers over the collaboration server's REST endpoints.
//!
//! Thin by design: every method is a path, a verb, and a payload shape.
//! Failure classification and bearer attachment live in the
//! [`Gateway`](super::Gateway).

use reqwest::Method;
use serde_json::json;

use super::{Auth, Gateway};
use crate::Result;
use crate::models::{
    AuthResponse, NewProject, NewTask, ProfilePatch, Project, ProjectPatch, Task, TaskPatch,
    TaskStatus, User,
};

/// Typed REST surface of the collaboration server.
#[derive(Clone)]
pub struct Api {
    gw: Gateway,
}

impl Api {
    pub fn new(gw: Gateway) -> Self {
        Self { gw }
    }

    // ---- auth ----

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse> {
        self.gw
            .send(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({"email": email, "password": password})),
                Auth::None,
            )
            .await
    }

    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<()> {
        self.gw
            .send_empty(
                Method::POST,
                "/api/auth/register",
                Some(json!({"name": name, "email": email, "password": password})),
                Auth::None,
            )
            .await
    }

    // ---- users ----

    pub async fn me(&self) -> Result<User> {
        self.gw
            .send(Method::GET, "/api/users/me", None, None, Auth::Bearer)
            .await
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.gw
            .send(Method::GET, "/api/users", None, None, Auth::Bearer)
            .await
    }

    pub async fn online_users(&self) -> Result<Vec<User>> {
        self.gw
            .send(Method::GET, "/api/users/online", None, None, Auth::Bearer)
            .await
    }

    /// Update the authenticated user's own record.
    pub async fn update_profile(&self, user_id: &str, patch: &ProfilePatch) -> Result<User> {
        self.gw
            .send(
                Method::PATCH,
                &format!("/api/users/{user_id}"),
                None,
                Some(serde_json::to_value(patch)?),
                Auth::Bearer,
            )
            .await
    }

    /// Approve a registered account (admin only).
    pub async fn confirm_user(&self, user_id: &str) -> Result<User> {
        self.gw
            .send(
                Method::PATCH,
                &format!("/api/users/{user_id}/confirm"),
                None,
                None,
                Auth::Bearer,
            )
            .await
    }

    // ---- projects ----

    pub async fn create_project(&self, project: &NewProject) -> Result<Project> {
        self.gw
            .send(
                Method::POST,
                "/api/projects",
                None,
                Some(serde_json::to_value(project)?),
                Auth::Bearer,
            )
            .await
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        self.gw
            .send(Method::GET, "/api/projects", None, None, Auth::Bearer)
            .await
    }

    pub async fn get_project(&self, id: &str) -> Result<Project> {
        self.gw
            .send(
                Method::GET,
                &format!("/api/projects/{id}"),
                None,
                None,
                Auth::Bearer,
            )
            .await
    }

    pub async fn update_project(&self, id: &str, patch: &ProjectPatch) -> Result<Project> {
        self.gw
            .send(
                Method::PUT,
                &format!("/api/projects/{id}"),
                None,
                Some(serde_json::to_value(patch)?),
                Auth::Bearer,
            )
            .await
    }

    pub async fn add_member(&self, project_id: &str, user_id: &str) -> Result<Project> {
        self.gw
            .send(
                Method::PATCH,
                &format!("/api/projects/{project_id}/members/{user_id}"),
                None,
                None,
                Auth::Bearer,
            )
            .await
    }

    pub async fn remove_member(&self, project_id: &str, user_id: &str) -> Result<Project> {
        self.gw
            .send(
                Method::DELETE,
                &format!("/api/projects/{project_id}/members/{user_id}"),
                None,
                None,
                Auth::Bearer,
            )
            .await
    }

    // ---- tasks ----

    pub async fn create_task(&self, task: &NewTask) -> Result<Task> {
        self.gw
            .send(
                Method::POST,
                "/api/tasks",
                None,
                Some(serde_json::to_value(task)?),
                Auth::Bearer,
            )
            .await
    }

    pub async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<Task> {
        self.gw
            .send(
                Method::PUT,
                &format!("/api/tasks/{id}"),
                None,
                Some(serde_json::to_value(patch)?),
                Auth::Bearer,
            )
            .await
    }

    pub async fn delete_task(&self, id: &str) -> Result<()> {
        self.gw
            .send_empty(
                Method::DELETE,
                &format!("/api/tasks/{id}"),
                None,
                Auth::Bearer,
            )
            .await
    }

    pub async fn tasks_by_project(&self, project_id: &str) -> Result<Vec<Task>> {
        self.gw
            .send(
                Method::GET,
                &format!("/api/tasks/project/{project_id}"),
                None,
                None,
                Auth::Bearer,
            )
            .await
    }

    /// Tasks created by or assigned to the authenticated user.
    pub async fn my_tasks(&self) -> Result<Vec<Task>> {
        self.gw
            .send(Method::GET, "/api/tasks/my-tasks", None, None, Auth::Bearer)
            .await
    }

    pub async fn set_task_status(&self, id: &str, status: TaskStatus) -> Result<Task> {
        self.gw
            .send(
                Method::PATCH,
                &format!("/api/tasks/{id}/status/{status}"),
                None,
                None,
                Auth::Bearer,
            )
            .await
    }

    pub async fn search_tasks(&self, search: &str, project_id: Option<&str>) -> Result<Vec<Task>> {
        let mut query = vec![("search", search)];
        if let Some(pid) = project_id {
            query.push(("projectId", pid));
        }
        self.gw
            .send(
                Method::GET,
                "/api/tasks/search",
                Some(&query),
                None,
                Auth::Bearer,
            )
            .await
    }

    pub async fn tasks_by_status(&self, status: TaskStatus) -> Result<Vec<Task>> {
        self.gw
            .send(
                Method::GET,
                &format!("/api/tasks/status/{status}"),
                None,
                None,
                Auth::Bearer,
            )
            .await
    }
}
