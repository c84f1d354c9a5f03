//! CLI argument definitions for spyglass.

use clap::{Parser, Subcommand};

use crate::models::{TaskPriority, TaskStatus};

/// Spyglass - a realtime client for task/project collaboration servers.
///
/// Log in with `sg login`, then explore with `sg project list` and
/// `sg task list <project-id>`. `sg watch` tails live push events.
#[derive(Parser, Debug)]
#[command(name = "sg")]
#[command(author, version, about = "Realtime client for task/project collaboration servers", long_about = None)]
#[command(long_version = concat!(
    env!("CARGO_PKG_VERSION"),
    " (", env!("SG_GIT_COMMIT"), ", built ", env!("SG_BUILD_TIMESTAMP"), ")"
))]
pub struct Cli {
    /// Server base URL. Can also be set via SPYGLASS_SERVER.
    #[arg(
        long = "server",
        global = true,
        env = crate::config::SERVER_ENV,
        default_value = crate::config::DEFAULT_SERVER
    )]
    pub server: String,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in and persist the session credential
    Login {
        email: String,
        password: String,
    },

    /// Register a new account (requires admin confirmation before login)
    Register {
        name: String,
        email: String,
        password: String,
    },

    /// Log out and clear the persisted credential
    Logout,

    /// Show the authenticated profile
    Whoami,

    /// Update the authenticated profile (shows it when no flags are given)
    Profile {
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        email: Option<String>,
    },

    /// Project management commands
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },

    /// Task management commands
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },

    /// User directory commands
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Connect to the push-event stream and print events until interrupted
    Watch {
        /// Limit events to one project's room
        #[arg(long)]
        project: Option<String>,
    },
}

/// Project subcommands
#[derive(Subcommand, Debug)]
pub enum ProjectCommands {
    /// List projects visible to the authenticated user
    List,

    /// Create a new project
    Create {
        name: String,

        #[arg(short, long, default_value = "")]
        description: String,

        /// Initial member user ids
        #[arg(short, long)]
        member: Vec<String>,
    },

    /// Show one project
    Show {
        id: String,
    },

    /// Update project fields
    Update {
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        description: Option<String>,

        /// Archive (false) or reactivate (true) the project
        #[arg(long)]
        active: Option<bool>,
    },

    /// Add a member (admin only)
    AddMember {
        id: String,
        user_id: String,
    },

    /// Remove a member (creator only)
    RemoveMember {
        id: String,
        user_id: String,
    },
}

/// Task subcommands
#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// List tasks in a project
    List {
        project_id: String,
    },

    /// List tasks created by or assigned to the authenticated user
    Mine,

    /// Create a task
    Create {
        project_id: String,
        title: String,

        #[arg(short, long, default_value = "")]
        description: String,

        /// Assigned user id
        #[arg(short, long)]
        assignee: Option<String>,

        /// Priority: low, medium, high
        #[arg(short, long)]
        priority: Option<TaskPriority>,

        /// Due date (RFC 3339, e.g. 2026-09-15T00:00:00Z)
        #[arg(long)]
        due: Option<chrono::DateTime<chrono::Utc>>,
    },

    /// Update task fields
    Update {
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        assignee: Option<String>,

        #[arg(long)]
        priority: Option<TaskPriority>,
    },

    /// Set a task's workflow status
    Status {
        id: String,

        /// New status: pending, in-progress, completed
        status: TaskStatus,
    },

    /// Delete a task
    Delete {
        id: String,
    },

    /// Search tasks by text
    Search {
        query: String,

        /// Restrict to one project
        #[arg(long)]
        project: Option<String>,
    },
}

/// User directory subcommands
#[derive(Subcommand, Debug)]
pub enum UserCommands {
    /// List all users (admin only)
    List,

    /// List users currently online
    Online,

    /// Approve a registered account (admin only)
    Confirm {
        id: String,
    },
}
