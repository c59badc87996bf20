//! Persistence for users, sessions, workspaces, memberships, invitations,
//! projects and tasks.
//!
//! Services only talk to [`Store`]; [`postgres::PgStore`] backs production and
//! [`sqlite::SqliteStore`] backs local development and tests. Every method that
//! touches more than one row runs inside a single transaction.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

pub mod postgres;
pub mod sqlite;
pub mod types;

pub use types::*;

/// Uniform error type for all storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("conflict")]
    Conflict,
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::AlreadyExists,
            other => StoreError::Backend(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct NewWorkspace {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
}

#[async_trait]
pub trait Store: Send + Sync {
    // ── Users ────────────────────────────────────────────────────────────────

    /// Creates the user, a workspace they own and their `admin` membership atomically.
    async fn create_user_with_workspace(
        &self,
        user: &NewUser,
        workspace_name: &str,
        now: OffsetDateTime,
    ) -> Result<(User, Workspace), StoreError>;

    /// Case-insensitive lookup; emails are stored lowercased.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    // ── Sessions ─────────────────────────────────────────────────────────────

    async fn insert_session(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Result<Session, StoreError>;

    /// Session joined to its user, only if `expires_at > now`.
    async fn find_live_session(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<(Session, User)>, StoreError>;

    /// Returns the number of rows removed (0 when already gone).
    async fn delete_session_by_token(&self, token: &str) -> Result<u64, StoreError>;

    async fn delete_sessions_for_user(&self, user_id: Uuid) -> Result<u64, StoreError>;

    // ── Workspaces & memberships ─────────────────────────────────────────────

    /// Workspaces reachable through the user's memberships, oldest membership first.
    async fn list_user_workspaces(&self, user_id: Uuid)
        -> Result<Vec<WorkspaceSummary>, StoreError>;

    async fn find_workspace(&self, id: Uuid) -> Result<Option<Workspace>, StoreError>;

    /// Inserts the workspace and the owner's `admin` membership atomically.
    async fn create_workspace_with_owner(
        &self,
        workspace: &NewWorkspace,
        now: OffsetDateTime,
    ) -> Result<Workspace, StoreError>;

    /// Returns `true` if a membership row was inserted.
    async fn add_member_if_absent(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
        role: Role,
        now: OffsetDateTime,
    ) -> Result<bool, StoreError>;

    async fn find_membership(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, StoreError>;

    async fn list_members(&self, workspace_id: Uuid) -> Result<Vec<TeamMember>, StoreError>;

    // ── Invitations ──────────────────────────────────────────────────────────

    /// Fails with [`StoreError::AlreadyExists`] if a pending invitation exists
    /// for the same (email, workspace).
    async fn insert_invitation(
        &self,
        invitation: &NewInvitation,
        now: OffsetDateTime,
    ) -> Result<Invitation, StoreError>;

    async fn find_invitation(&self, id: Uuid) -> Result<Option<Invitation>, StoreError>;

    async fn find_pending_invitation(
        &self,
        email: &str,
        workspace_id: Uuid,
    ) -> Result<Option<Invitation>, StoreError>;

    /// Pending invitations addressed to `email`, newest first.
    async fn list_pending_invitations(
        &self,
        email: &str,
    ) -> Result<Vec<PendingInvitation>, StoreError>;

    /// Adds the membership (unless present) and moves the invitation to
    /// `accepted` in one transaction. [`StoreError::Conflict`] if it is no
    /// longer pending, [`StoreError::NotFound`] if absent.
    async fn accept_invitation(
        &self,
        id: Uuid,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<AcceptOutcome, StoreError>;

    /// Moves a pending invitation to `rejected`; same errors as `accept_invitation`.
    async fn reject_invitation(&self, id: Uuid, now: OffsetDateTime) -> Result<(), StoreError>;

    // ── Projects & tasks ─────────────────────────────────────────────────────

    async fn insert_project(
        &self,
        project: &NewProject,
        now: OffsetDateTime,
    ) -> Result<Project, StoreError>;

    /// Newest first.
    async fn list_projects(&self, workspace_id: Uuid) -> Result<Vec<Project>, StoreError>;

    async fn find_project(&self, id: Uuid) -> Result<Option<Project>, StoreError>;

    async fn insert_task(&self, task: &NewTask, now: OffsetDateTime) -> Result<Task, StoreError>;

    /// Oldest first.
    async fn list_tasks(&self, project_id: Uuid) -> Result<Vec<Task>, StoreError>;

    /// [`StoreError::NotFound`] if the project is gone.
    async fn update_project(
        &self,
        id: Uuid,
        name: &str,
        description: Option<&str>,
    ) -> Result<Project, StoreError>;

    /// Removes the project and, through the foreign key, its tasks.
    async fn delete_project(&self, id: Uuid) -> Result<u64, StoreError>;

    async fn find_task(&self, id: Uuid) -> Result<Option<Task>, StoreError>;

    /// [`StoreError::NotFound`] if the task is gone.
    async fn update_task(&self, id: Uuid, changes: &TaskChanges) -> Result<Task, StoreError>;

    /// Moves a task to another board column.
    async fn set_task_status(&self, id: Uuid, status: TaskStatus) -> Result<Task, StoreError>;

    async fn delete_task(&self, id: Uuid) -> Result<u64, StoreError>;

    // ── Dashboard ────────────────────────────────────────────────────────────

    async fn workspace_stats(
        &self,
        workspace_id: Uuid,
        completed_since: OffsetDateTime,
    ) -> Result<WorkspaceStats, StoreError>;

    /// Newest tasks of the workspace first.
    async fn recent_tasks(
        &self,
        workspace_id: Uuid,
        limit: i64,
    ) -> Result<Vec<TaskActivity>, StoreError>;

    /// Unfinished tasks due at or after `from`, soonest first.
    async fn upcoming_tasks(
        &self,
        workspace_id: Uuid,
        from: OffsetDateTime,
        limit: i64,
    ) -> Result<Vec<UpcomingTask>, StoreError>;
}
