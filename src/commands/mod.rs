//! Command handlers for the `sg` binary.
//!
//! Each handler drives the [`Client`] and prints the result as pretty JSON
//! on stdout. Errors propagate to `main`, which prints them on stderr and
//! exits nonzero.

use std::time::Duration;

use serde_json::json;
use tracing::info;

use crate::cli::{Commands, ProjectCommands, TaskCommands, UserCommands};
use crate::client::Client;
use crate::models::{NewProject, NewTask, ProfilePatch, ProjectPatch, TaskPatch};
use crate::session::SessionStatus;
use crate::{Error, Result};

/// How long `sg watch` waits for the push handshake before giving up.
const WATCH_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Execute one parsed command against a server.
pub async fn run(client: &Client, command: Commands) -> Result<()> {
    match command {
        Commands::Login { email, password } => login(client, &email, &password).await,
        Commands::Register {
            name,
            email,
            password,
        } => register(client, &name, &email, &password).await,
        Commands::Logout => {
            client.logout();
            print_json(&json!({"status": "logged out"}))
        }
        Commands::Whoami => whoami(client).await,
        Commands::Profile { name, email } => profile(client, name, email).await,
        Commands::Project { command } => project(client, command).await,
        Commands::Task { command } => task(client, command).await,
        Commands::User { command } => user(client, command).await,
        Commands::Watch { project } => watch(client, project.as_deref()).await,
    }
}

async fn login(client: &Client, email: &str, password: &str) -> Result<()> {
    match client.login(email, password).await {
        Ok(user) => print_json(&json!({"status": "logged in", "user": user})),
        Err(Error::ConfirmationRequired { email }) => {
            // Not a terminal failure: the account just awaits approval.
            print_json(&json!({
                "status": "confirmation pending",
                "email": email,
            }))
        }
        Err(e) => Err(e),
    }
}

async fn register(client: &Client, name: &str, email: &str, password: &str) -> Result<()> {
    client.register(name, email, password).await?;
    print_json(&json!({
        "status": "registered, awaiting admin confirmation",
        "email": email,
    }))
}

async fn whoami(client: &Client) -> Result<()> {
    client.start();
    let user = client.fetch_profile().await?;
    print_json(&user)
}

async fn profile(client: &Client, name: Option<String>, email: Option<String>) -> Result<()> {
    client.start();
    if name.is_none() && email.is_none() {
        let user = client.fetch_profile().await?;
        return print_json(&user);
    }
    let updated = client.update_profile(&ProfilePatch { name, email }).await?;
    print_json(&updated)
}

async fn project(client: &Client, command: ProjectCommands) -> Result<()> {
    client.start();
    match command {
        ProjectCommands::List => {
            let projects = client.fetch_projects().await?;
            print_json(&projects)
        }
        ProjectCommands::Create {
            name,
            description,
            member,
        } => {
            let created = client
                .create_project(&NewProject {
                    name,
                    description,
                    members: member,
                })
                .await?;
            print_json(&created)
        }
        ProjectCommands::Show { id } => {
            let found = client.fetch_project(&id).await?;
            print_json(&found)
        }
        ProjectCommands::Update {
            id,
            name,
            description,
            active,
        } => {
            let updated = client
                .update_project(
                    &id,
                    &ProjectPatch {
                        name,
                        description,
                        is_active: active,
                        members: None,
                    },
                )
                .await?;
            print_json(&updated)
        }
        ProjectCommands::AddMember { id, user_id } => {
            let updated = client.add_member(&id, &user_id).await?;
            print_json(&updated)
        }
        ProjectCommands::RemoveMember { id, user_id } => {
            let updated = client.remove_member(&id, &user_id).await?;
            print_json(&updated)
        }
    }
}

async fn task(client: &Client, command: TaskCommands) -> Result<()> {
    client.start();
    match command {
        TaskCommands::List { project_id } => {
            let tasks = client.fetch_tasks_by_project(&project_id).await?;
            print_json(&tasks)
        }
        TaskCommands::Mine => {
            let tasks = client.fetch_my_tasks().await?;
            print_json(&tasks)
        }
        TaskCommands::Create {
            project_id,
            title,
            description,
            assignee,
            priority,
            due,
        } => {
            let created = client
                .create_task(&NewTask {
                    title,
                    description,
                    project_id,
                    assigned_to: assignee,
                    status: None,
                    priority,
                    due_date: due,
                })
                .await?;
            print_json(&created)
        }
        TaskCommands::Update {
            id,
            title,
            description,
            assignee,
            priority,
        } => {
            let updated = client
                .update_task(
                    &id,
                    &TaskPatch {
                        title,
                        description,
                        assigned_to: assignee,
                        status: None,
                        priority,
                        due_date: None,
                    },
                )
                .await?;
            print_json(&updated)
        }
        TaskCommands::Status { id, status } => {
            let updated = client.set_task_status(&id, status).await?;
            print_json(&updated)
        }
        TaskCommands::Delete { id } => {
            client.delete_task(&id).await?;
            print_json(&json!({"status": "deleted", "id": id}))
        }
        TaskCommands::Search { query, project } => {
            let found = client.search_tasks(&query, project.as_deref()).await?;
            print_json(&found)
        }
    }
}

async fn user(client: &Client, command: UserCommands) -> Result<()> {
    client.start();
    match command {
        UserCommands::List => {
            let users = client.fetch_users().await?;
            print_json(&users)
        }
        UserCommands::Online => {
            let users = client.fetch_online_users().await?;
            print_json(&users)
        }
        UserCommands::Confirm { id } => {
            let confirmed = client.confirm_user(&id).await?;
            print_json(&confirmed)
        }
    }
}

/// Bind the push connection and print applied events until ctrl-c.
async fn watch(client: &Client, project: Option<&str>) -> Result<()> {
    client.start();
    if client.session().status() != SessionStatus::Authenticated {
        return Err(Error::Unauthenticated);
    }

    let mut events = client.subscribe_events();

    // Wait for the transport handshake so room hints aren't dropped.
    let deadline = tokio::time::Instant::now() + WATCH_CONNECT_TIMEOUT;
    while !client.is_connected() {
        if tokio::time::Instant::now() >= deadline {
            return Err(Error::Network("push connection timed out".to_string()));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    if let Some(project_id) = project {
        client.join_project(project_id);
    }
    info!("watching for push events (ctrl-c to stop)");

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(ev) => print_json(&ev)?,
                    // Lagged: we only display events, keep going.
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    if let Some(project_id) = project {
        client.leave_project(project_id);
    }
    client.disconnect();
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
