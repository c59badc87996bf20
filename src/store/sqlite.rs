use std::str::FromStr;

use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    FromRow, SqlitePool,
};
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use super::{
    AcceptOutcome, Invitation, InvitationStatus, Membership, NewInvitation, NewProject, NewTask,
    NewUser, NewWorkspace, PendingInvitation, Project, Role, Session, Store, StoreError, Task,
    TaskActivity, TaskChanges, TaskStatus, TeamMember, UpcomingTask, User, Workspace,
    WorkspaceStats, WorkspaceSummary,
};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

/// SQLite backend. A single pooled connection keeps `sqlite::memory:` databases
/// alive for the lifetime of the store and serialises writers.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::open("sqlite::memory:").await
    }

    /// Opens (creating the file on first run) and migrates the database at `url`.
    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        MIGRATOR.run(&pool).await?;
        Ok(Self { pool })
    }

    /// A user with no membership anywhere, as seeded or imported accounts are.
    #[cfg(test)]
    pub(crate) async fn insert_bare_user(
        &self,
        user: &NewUser,
        now: OffsetDateTime,
    ) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (id, name, email, password_hash, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, name, email, password_hash, avatar_url, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.name)
        .bind(user.email.to_lowercase())
        .bind(&user.password_hash)
        .bind(ts(now))
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }
}

fn ts(t: OffsetDateTime) -> i64 {
    t.unix_timestamp()
}

fn dt(secs: i64) -> Result<OffsetDateTime, StoreError> {
    OffsetDateTime::from_unix_timestamp(secs).map_err(|e| StoreError::Backend(e.to_string()))
}

// ── Row types ────────────────────────────────────────────────────────────────

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    password_hash: Option<String>,
    avatar_url: Option<String>,
    created_at: i64,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            name: r.name,
            email: r.email,
            password_hash: r.password_hash,
            avatar_url: r.avatar_url,
            created_at: dt(r.created_at)?,
        })
    }
}

#[derive(FromRow)]
struct WorkspaceRow {
    id: Uuid,
    name: String,
    owner_id: Uuid,
    created_at: i64,
}

impl TryFrom<WorkspaceRow> for Workspace {
    type Error = StoreError;

    fn try_from(r: WorkspaceRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            name: r.name,
            owner_id: r.owner_id,
            created_at: dt(r.created_at)?,
        })
    }
}

#[derive(FromRow)]
struct MembershipRow {
    id: Uuid,
    user_id: Uuid,
    workspace_id: Uuid,
    role: String,
    created_at: i64,
}

impl TryFrom<MembershipRow> for Membership {
    type Error = StoreError;

    fn try_from(r: MembershipRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            user_id: r.user_id,
            workspace_id: r.workspace_id,
            role: r.role.parse()?,
            created_at: dt(r.created_at)?,
        })
    }
}

#[derive(FromRow)]
struct InvitationRow {
    id: Uuid,
    email: String,
    workspace_id: Uuid,
    role: String,
    invited_by: Uuid,
    status: String,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<InvitationRow> for Invitation {
    type Error = StoreError;

    fn try_from(r: InvitationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            email: r.email,
            workspace_id: r.workspace_id,
            role: r.role.parse()?,
            invited_by: r.invited_by,
            status: r.status.parse()?,
            created_at: dt(r.created_at)?,
            updated_at: dt(r.updated_at)?,
        })
    }
}

#[derive(FromRow)]
struct SessionUserRow {
    id: Uuid,
    user_id: Uuid,
    token: String,
    expires_at: i64,
    created_at: i64,
    u_name: String,
    u_email: String,
    u_password_hash: Option<String>,
    u_avatar_url: Option<String>,
    u_created_at: i64,
}

#[derive(FromRow)]
struct MemberUserRow {
    m_id: Uuid,
    workspace_id: Uuid,
    role: String,
    m_created_at: i64,
    id: Uuid,
    name: String,
    email: String,
    password_hash: Option<String>,
    avatar_url: Option<String>,
    created_at: i64,
}

#[derive(FromRow)]
struct PendingInvitationRow {
    id: Uuid,
    email: String,
    workspace_id: Uuid,
    role: String,
    invited_by: Uuid,
    status: String,
    created_at: i64,
    updated_at: i64,
    w_name: String,
    w_owner_id: Uuid,
    w_created_at: i64,
    o_name: String,
    o_email: String,
    o_avatar_url: Option<String>,
    o_created_at: i64,
    i_name: String,
    i_email: String,
    i_avatar_url: Option<String>,
    i_created_at: i64,
}

impl TryFrom<PendingInvitationRow> for PendingInvitation {
    type Error = StoreError;

    fn try_from(r: PendingInvitationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            workspace: Workspace {
                id: r.workspace_id,
                name: r.w_name,
                owner_id: r.w_owner_id,
                created_at: dt(r.w_created_at)?,
            },
            owner: User {
                id: r.w_owner_id,
                name: r.o_name,
                email: r.o_email,
                password_hash: None,
                avatar_url: r.o_avatar_url,
                created_at: dt(r.o_created_at)?,
            },
            inviter: User {
                id: r.invited_by,
                name: r.i_name,
                email: r.i_email,
                password_hash: None,
                avatar_url: r.i_avatar_url,
                created_at: dt(r.i_created_at)?,
            },
            invitation: Invitation {
                id: r.id,
                email: r.email,
                workspace_id: r.workspace_id,
                role: r.role.parse()?,
                invited_by: r.invited_by,
                status: r.status.parse()?,
                created_at: dt(r.created_at)?,
                updated_at: dt(r.updated_at)?,
            },
        })
    }
}

#[derive(FromRow)]
struct ProjectRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    workspace_id: Uuid,
    created_at: i64,
}

impl TryFrom<ProjectRow> for Project {
    type Error = StoreError;

    fn try_from(r: ProjectRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            name: r.name,
            description: r.description,
            workspace_id: r.workspace_id,
            created_at: dt(r.created_at)?,
        })
    }
}

#[derive(FromRow)]
struct TaskRow {
    id: Uuid,
    title: String,
    description: Option<String>,
    status: String,
    priority: String,
    due_date: Option<i64>,
    project_id: Uuid,
    assignee_id: Option<Uuid>,
    created_at: i64,
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(r: TaskRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            title: r.title,
            description: r.description,
            status: r.status.parse()?,
            priority: r.priority.parse()?,
            due_date: r.due_date.map(dt).transpose()?,
            project_id: r.project_id,
            assignee_id: r.assignee_id,
            created_at: dt(r.created_at)?,
        })
    }
}

#[derive(FromRow)]
struct StatsRow {
    total_projects: i64,
    active_projects: i64,
    completed_tasks: i64,
    completed_this_week: i64,
    in_progress_tasks: i64,
    assigned_tasks: i64,
    team_members: i64,
}

impl From<StatsRow> for WorkspaceStats {
    fn from(r: StatsRow) -> Self {
        Self {
            total_projects: r.total_projects,
            active_projects: r.active_projects,
            completed_tasks: r.completed_tasks,
            completed_this_week: r.completed_this_week,
            in_progress_tasks: r.in_progress_tasks,
            assigned_tasks: r.assigned_tasks,
            team_members: r.team_members,
        }
    }
}

#[derive(FromRow)]
struct ActivityRow {
    id: Uuid,
    title: String,
    status: String,
    created_at: i64,
    project_name: String,
    assignee_name: Option<String>,
}

impl TryFrom<ActivityRow> for TaskActivity {
    type Error = StoreError;

    fn try_from(r: ActivityRow) -> Result<Self, Self::Error> {
        Ok(Self {
            task_id: r.id,
            title: r.title,
            status: r.status.parse()?,
            project_name: r.project_name,
            assignee_name: r.assignee_name,
            created_at: dt(r.created_at)?,
        })
    }
}

#[derive(FromRow)]
struct UpcomingRow {
    id: Uuid,
    title: String,
    priority: String,
    due_date: i64,
    project_name: String,
}

impl TryFrom<UpcomingRow> for UpcomingTask {
    type Error = StoreError;

    fn try_from(r: UpcomingRow) -> Result<Self, Self::Error> {
        Ok(Self {
            task_id: r.id,
            title: r.title,
            priority: r.priority.parse()?,
            due_date: dt(r.due_date)?,
            project_name: r.project_name,
        })
    }
}

// ── Store impl ───────────────────────────────────────────────────────────────

#[async_trait]
impl Store for SqliteStore {
    async fn create_user_with_workspace(
        &self,
        user: &NewUser,
        workspace_name: &str,
        now: OffsetDateTime,
    ) -> Result<(User, Workspace), StoreError> {
        let mut tx = self.pool.begin().await?;

        let user = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (id, name, email, password_hash, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, name, email, password_hash, avatar_url, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.name)
        .bind(user.email.to_lowercase())
        .bind(&user.password_hash)
        .bind(ts(now))
        .fetch_one(&mut *tx)
        .await?;

        let workspace = sqlx::query_as::<_, WorkspaceRow>(
            r#"
            INSERT INTO workspaces (id, name, owner_id, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id, name, owner_id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(workspace_name)
        .bind(user.id)
        .bind(ts(now))
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO workspace_members (id, user_id, workspace_id, role, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4())
        .bind(user.id)
        .bind(workspace.id)
        .bind(Role::Admin.as_str())
        .bind(ts(now))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((user.try_into()?, workspace.try_into()?))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, email, password_hash, avatar_url, created_at FROM users WHERE email = ?",
        )
        .bind(email.to_lowercase())
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn insert_session(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Result<Session, StoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO sessions (id, user_id, token, expires_at, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(user_id)
        .bind(token)
        .bind(ts(expires_at))
        .bind(ts(now))
        .execute(&self.pool)
        .await?;
        Ok(Session {
            id,
            user_id,
            token: token.to_string(),
            expires_at: dt(ts(expires_at))?,
            created_at: dt(ts(now))?,
        })
    }

    async fn find_live_session(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<(Session, User)>, StoreError> {
        let row = sqlx::query_as::<_, SessionUserRow>(
            r#"
            SELECT s.id, s.user_id, s.token, s.expires_at, s.created_at,
                   u.name AS u_name, u.email AS u_email, u.password_hash AS u_password_hash,
                   u.avatar_url AS u_avatar_url, u.created_at AS u_created_at
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.token = ? AND s.expires_at > ?
            LIMIT 1
            "#,
        )
        .bind(token)
        .bind(ts(now))
        .fetch_optional(&self.pool)
        .await?;

        let Some(r) = row else {
            return Ok(None);
        };
        Ok(Some((
            Session {
                id: r.id,
                user_id: r.user_id,
                token: r.token,
                expires_at: dt(r.expires_at)?,
                created_at: dt(r.created_at)?,
            },
            User {
                id: r.user_id,
                name: r.u_name,
                email: r.u_email,
                password_hash: r.u_password_hash,
                avatar_url: r.u_avatar_url,
                created_at: dt(r.u_created_at)?,
            },
        )))
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<u64, StoreError> {
        let res = sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    async fn delete_sessions_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let res = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    async fn list_user_workspaces(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<WorkspaceSummary>, StoreError> {
        let rows = sqlx::query_as::<_, (Uuid, String, String)>(
            r#"
            SELECT w.id, w.name, m.role
            FROM workspace_members m
            JOIN workspaces w ON w.id = m.workspace_id
            WHERE m.user_id = ?
            ORDER BY m.created_at ASC, m.rowid ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, name, role)| -> Result<WorkspaceSummary, StoreError> {
                Ok(WorkspaceSummary {
                    id,
                    name,
                    role: role.parse()?,
                })
            })
            .collect()
    }

    async fn find_workspace(&self, id: Uuid) -> Result<Option<Workspace>, StoreError> {
        let row = sqlx::query_as::<_, WorkspaceRow>(
            "SELECT id, name, owner_id, created_at FROM workspaces WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn create_workspace_with_owner(
        &self,
        workspace: &NewWorkspace,
        now: OffsetDateTime,
    ) -> Result<Workspace, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, WorkspaceRow>(
            r#"
            INSERT INTO workspaces (id, name, owner_id, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id, name, owner_id, created_at
            "#,
        )
        .bind(workspace.id)
        .bind(&workspace.name)
        .bind(workspace.owner_id)
        .bind(ts(now))
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO workspace_members (id, user_id, workspace_id, role, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4())
        .bind(workspace.owner_id)
        .bind(row.id)
        .bind(Role::Admin.as_str())
        .bind(ts(now))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn add_member_if_absent(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
        role: Role,
        now: OffsetDateTime,
    ) -> Result<bool, StoreError> {
        let res = sqlx::query(
            r#"
            INSERT INTO workspace_members (id, user_id, workspace_id, role, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (user_id, workspace_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(workspace_id)
        .bind(role.as_str())
        .bind(ts(now))
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn find_membership(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, StoreError> {
        let row = sqlx::query_as::<_, MembershipRow>(
            r#"
            SELECT id, user_id, workspace_id, role, created_at
            FROM workspace_members
            WHERE workspace_id = ? AND user_id = ?
            "#,
        )
        .bind(workspace_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_members(&self, workspace_id: Uuid) -> Result<Vec<TeamMember>, StoreError> {
        let rows = sqlx::query_as::<_, MemberUserRow>(
            r#"
            SELECT m.id AS m_id, m.workspace_id, m.role, m.created_at AS m_created_at,
                   u.id, u.name, u.email, u.password_hash, u.avatar_url, u.created_at
            FROM workspace_members m
            JOIN users u ON u.id = m.user_id
            WHERE m.workspace_id = ?
            ORDER BY m.created_at ASC, m.rowid ASC
            "#,
        )
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| -> Result<TeamMember, StoreError> {
                Ok(TeamMember {
                    membership: Membership {
                        id: r.m_id,
                        user_id: r.id,
                        workspace_id: r.workspace_id,
                        role: r.role.parse()?,
                        created_at: dt(r.m_created_at)?,
                    },
                    user: User {
                        id: r.id,
                        name: r.name,
                        email: r.email,
                        password_hash: r.password_hash,
                        avatar_url: r.avatar_url,
                        created_at: dt(r.created_at)?,
                    },
                })
            })
            .collect()
    }

    async fn insert_invitation(
        &self,
        invitation: &NewInvitation,
        now: OffsetDateTime,
    ) -> Result<Invitation, StoreError> {
        let row = sqlx::query_as::<_, InvitationRow>(
            r#"
            INSERT INTO workspace_invitations
                (id, email, workspace_id, role, invited_by, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 'pending', ?, ?)
            RETURNING id, email, workspace_id, role, invited_by, status, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(invitation.email.to_lowercase())
        .bind(invitation.workspace_id)
        .bind(invitation.role.as_str())
        .bind(invitation.invited_by)
        .bind(ts(now))
        .bind(ts(now))
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn find_invitation(&self, id: Uuid) -> Result<Option<Invitation>, StoreError> {
        let row = sqlx::query_as::<_, InvitationRow>(
            r#"
            SELECT id, email, workspace_id, role, invited_by, status, created_at, updated_at
            FROM workspace_invitations
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn find_pending_invitation(
        &self,
        email: &str,
        workspace_id: Uuid,
    ) -> Result<Option<Invitation>, StoreError> {
        let row = sqlx::query_as::<_, InvitationRow>(
            r#"
            SELECT id, email, workspace_id, role, invited_by, status, created_at, updated_at
            FROM workspace_invitations
            WHERE email = ? AND workspace_id = ? AND status = 'pending'
            LIMIT 1
            "#,
        )
        .bind(email.to_lowercase())
        .bind(workspace_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_pending_invitations(
        &self,
        email: &str,
    ) -> Result<Vec<PendingInvitation>, StoreError> {
        let rows = sqlx::query_as::<_, PendingInvitationRow>(
            r#"
            SELECT i.id, i.email, i.workspace_id, i.role, i.invited_by, i.status,
                   i.created_at, i.updated_at,
                   w.name AS w_name, w.owner_id AS w_owner_id, w.created_at AS w_created_at,
                   o.name AS o_name, o.email AS o_email, o.avatar_url AS o_avatar_url,
                   o.created_at AS o_created_at,
                   v.name AS i_name, v.email AS i_email, v.avatar_url AS i_avatar_url,
                   v.created_at AS i_created_at
            FROM workspace_invitations i
            JOIN workspaces w ON w.id = i.workspace_id
            JOIN users o ON o.id = w.owner_id
            JOIN users v ON v.id = i.invited_by
            WHERE i.email = ? AND i.status = 'pending'
            ORDER BY i.created_at DESC, i.rowid DESC
            "#,
        )
        .bind(email.to_lowercase())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn accept_invitation(
        &self,
        id: Uuid,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<AcceptOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        let (workspace_id, role, status) = sqlx::query_as::<_, (Uuid, String, String)>(
            "SELECT workspace_id, role, status FROM workspace_invitations WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;

        if status.parse::<InvitationStatus>()? != InvitationStatus::Pending {
            return Err(StoreError::Conflict);
        }
        let role: Role = role.parse()?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO workspace_members (id, user_id, workspace_id, role, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (user_id, workspace_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(workspace_id)
        .bind(role.as_str())
        .bind(ts(now))
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let updated = sqlx::query(
            r#"
            UPDATE workspace_invitations
            SET status = 'accepted', updated_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(ts(now))
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(StoreError::Conflict);
        }

        tx.commit().await?;
        debug!(invitation_id = %id, %user_id, inserted, "invitation accepted in store");
        Ok(if inserted == 1 {
            AcceptOutcome::Joined
        } else {
            AcceptOutcome::AlreadyMember
        })
    }

    async fn reject_invitation(&self, id: Uuid, now: OffsetDateTime) -> Result<(), StoreError> {
        let updated = sqlx::query(
            r#"
            UPDATE workspace_invitations
            SET status = 'rejected', updated_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(ts(now))
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 1 {
            return Ok(());
        }
        match self.find_invitation(id).await? {
            None => Err(StoreError::NotFound),
            Some(_) => Err(StoreError::Conflict),
        }
    }

    async fn insert_project(
        &self,
        project: &NewProject,
        now: OffsetDateTime,
    ) -> Result<Project, StoreError> {
        let row = sqlx::query_as::<_, ProjectRow>(
            r#"
            INSERT INTO projects (id, name, description, workspace_id, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, name, description, workspace_id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&project.name)
        .bind(&project.description)
        .bind(project.workspace_id)
        .bind(ts(now))
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn list_projects(&self, workspace_id: Uuid) -> Result<Vec<Project>, StoreError> {
        let rows = sqlx::query_as::<_, ProjectRow>(
            r#"
            SELECT id, name, description, workspace_id, created_at
            FROM projects
            WHERE workspace_id = ?
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn find_project(&self, id: Uuid) -> Result<Option<Project>, StoreError> {
        let row = sqlx::query_as::<_, ProjectRow>(
            "SELECT id, name, description, workspace_id, created_at FROM projects WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn insert_task(&self, task: &NewTask, now: OffsetDateTime) -> Result<Task, StoreError> {
        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            INSERT INTO tasks
                (id, title, description, status, priority, due_date, project_id, assignee_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id, title, description, status, priority, due_date, project_id,
                      assignee_id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(task.priority.as_str())
        .bind(task.due_date.map(ts))
        .bind(task.project_id)
        .bind(task.assignee_id)
        .bind(ts(now))
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn list_tasks(&self, project_id: Uuid) -> Result<Vec<Task>, StoreError> {
        let rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id, title, description, status, priority, due_date, project_id,
                   assignee_id, created_at
            FROM tasks
            WHERE project_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn update_project(
        &self,
        id: Uuid,
        name: &str,
        description: Option<&str>,
    ) -> Result<Project, StoreError> {
        let row = sqlx::query_as::<_, ProjectRow>(
            r#"
            UPDATE projects SET name = ?, description = ?
            WHERE id = ?
            RETURNING id, name, description, workspace_id, created_at
            "#,
        )
        .bind(name)
        .bind(description)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;
        row.try_into()
    }

    async fn delete_project(&self, id: Uuid) -> Result<u64, StoreError> {
        let res = sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    async fn find_task(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id, title, description, status, priority, due_date, project_id,
                   assignee_id, created_at
            FROM tasks
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn update_task(&self, id: Uuid, changes: &TaskChanges) -> Result<Task, StoreError> {
        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            UPDATE tasks
            SET title = ?, description = ?, status = ?, priority = ?, due_date = ?,
                assignee_id = ?
            WHERE id = ?
            RETURNING id, title, description, status, priority, due_date, project_id,
                      assignee_id, created_at
            "#,
        )
        .bind(&changes.title)
        .bind(&changes.description)
        .bind(changes.status.as_str())
        .bind(changes.priority.as_str())
        .bind(changes.due_date.map(ts))
        .bind(changes.assignee_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;
        row.try_into()
    }

    async fn set_task_status(&self, id: Uuid, status: TaskStatus) -> Result<Task, StoreError> {
        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            UPDATE tasks SET status = ?
            WHERE id = ?
            RETURNING id, title, description, status, priority, due_date, project_id,
                      assignee_id, created_at
            "#,
        )
        .bind(status.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;
        row.try_into()
    }

    async fn delete_task(&self, id: Uuid) -> Result<u64, StoreError> {
        let res = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    async fn workspace_stats(
        &self,
        workspace_id: Uuid,
        completed_since: OffsetDateTime,
    ) -> Result<WorkspaceStats, StoreError> {
        let row = sqlx::query_as::<_, StatsRow>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM projects WHERE workspace_id = ?) AS total_projects,
                (SELECT COUNT(*) FROM projects p
                 WHERE p.workspace_id = ?
                   AND (NOT EXISTS (SELECT 1 FROM tasks t WHERE t.project_id = p.id)
                        OR EXISTS (SELECT 1 FROM tasks t
                                   WHERE t.project_id = p.id AND t.status <> 'done'))
                ) AS active_projects,
                (SELECT COUNT(*) FROM tasks t JOIN projects p ON p.id = t.project_id
                 WHERE p.workspace_id = ? AND t.status = 'done') AS completed_tasks,
                (SELECT COUNT(*) FROM tasks t JOIN projects p ON p.id = t.project_id
                 WHERE p.workspace_id = ? AND t.status = 'done' AND t.created_at >= ?
                ) AS completed_this_week,
                (SELECT COUNT(*) FROM tasks t JOIN projects p ON p.id = t.project_id
                 WHERE p.workspace_id = ? AND t.status = 'in_progress') AS in_progress_tasks,
                (SELECT COUNT(*) FROM tasks t JOIN projects p ON p.id = t.project_id
                 WHERE p.workspace_id = ? AND t.status = 'in_progress'
                   AND t.assignee_id IS NOT NULL) AS assigned_tasks,
                (SELECT COUNT(*) FROM workspace_members WHERE workspace_id = ?) AS team_members
            "#,
        )
        .bind(workspace_id)
        .bind(workspace_id)
        .bind(workspace_id)
        .bind(workspace_id)
        .bind(ts(completed_since))
        .bind(workspace_id)
        .bind(workspace_id)
        .bind(workspace_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn recent_tasks(
        &self,
        workspace_id: Uuid,
        limit: i64,
    ) -> Result<Vec<TaskActivity>, StoreError> {
        let rows = sqlx::query_as::<_, ActivityRow>(
            r#"
            SELECT t.id, t.title, t.status, t.created_at,
                   p.name AS project_name, u.name AS assignee_name
            FROM tasks t
            JOIN projects p ON p.id = t.project_id
            LEFT JOIN users u ON u.id = t.assignee_id
            WHERE p.workspace_id = ?
            ORDER BY t.created_at DESC, t.rowid DESC
            LIMIT ?
            "#,
        )
        .bind(workspace_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn upcoming_tasks(
        &self,
        workspace_id: Uuid,
        from: OffsetDateTime,
        limit: i64,
    ) -> Result<Vec<UpcomingTask>, StoreError> {
        let rows = sqlx::query_as::<_, UpcomingRow>(
            r#"
            SELECT t.id, t.title, t.priority, t.due_date, p.name AS project_name
            FROM tasks t
            JOIN projects p ON p.id = t.project_id
            WHERE p.workspace_id = ?
              AND t.status <> 'done'
              AND t.due_date IS NOT NULL
              AND t.due_date >= ?
            ORDER BY t.due_date ASC, t.rowid ASC
            LIMIT ?
            "#,
        )
        .bind(workspace_id)
        .bind(ts(from))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Priority;
    use time::Duration;

    fn t0() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    async fn seeded() -> (SqliteStore, User, Workspace) {
        let store = SqliteStore::open_in_memory().await.expect("open store");
        let (user, ws) = store
            .create_user_with_workspace(
                &NewUser {
                    name: "Ana".into(),
                    email: "Ana@Example.com".into(),
                    password_hash: "hash".into(),
                },
                "Ana's Workspace",
                t0(),
            )
            .await
            .expect("create user");
        (store, user, ws)
    }

    #[tokio::test]
    async fn register_creates_admin_membership_and_lowercases_email() {
        let (store, user, ws) = seeded().await;
        assert_eq!(user.email, "ana@example.com");
        let m = store.find_membership(ws.id, user.id).await.unwrap().unwrap();
        assert!(m.is_admin());
        let found = store.find_user_by_email("ANA@example.COM").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(user.id));
    }

    #[tokio::test]
    async fn duplicate_email_is_already_exists() {
        let (store, _, _) = seeded().await;
        let err = store
            .create_user_with_workspace(
                &NewUser {
                    name: "Other".into(),
                    email: "ana@example.com".into(),
                    password_hash: "hash".into(),
                },
                "Other's Workspace",
                t0(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists));
        // the failed transaction left no orphan workspace behind
        let n: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM workspaces")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(n.0, 1);
    }

    #[tokio::test]
    async fn live_session_respects_expiry() {
        let (store, user, _) = seeded().await;
        store
            .insert_session(user.id, "tok", t0() + Duration::days(30), t0())
            .await
            .unwrap();
        assert!(store.find_live_session("tok", t0()).await.unwrap().is_some());
        assert!(store
            .find_live_session("tok", t0() + Duration::days(30))
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.delete_session_by_token("tok").await.unwrap(), 1);
        assert_eq!(store.delete_session_by_token("tok").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn pending_invitation_is_unique_per_email_and_workspace() {
        let (store, user, ws) = seeded().await;
        let new = NewInvitation {
            email: "bob@example.com".into(),
            workspace_id: ws.id,
            role: Role::Member,
            invited_by: user.id,
        };
        let first = store.insert_invitation(&new, t0()).await.unwrap();
        let err = store.insert_invitation(&new, t0()).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists));

        // once the first leaves `pending`, a fresh invitation is allowed
        store.reject_invitation(first.id, t0()).await.unwrap();
        store.insert_invitation(&new, t0()).await.unwrap();
    }

    #[tokio::test]
    async fn accept_is_single_shot() {
        let (store, owner, ws) = seeded().await;
        let (bob, _) = store
            .create_user_with_workspace(
                &NewUser {
                    name: "Bob".into(),
                    email: "bob@example.com".into(),
                    password_hash: "hash".into(),
                },
                "Bob's Workspace",
                t0(),
            )
            .await
            .unwrap();
        let inv = store
            .insert_invitation(
                &NewInvitation {
                    email: bob.email.clone(),
                    workspace_id: ws.id,
                    role: Role::Member,
                    invited_by: owner.id,
                },
                t0(),
            )
            .await
            .unwrap();

        let outcome = store.accept_invitation(inv.id, bob.id, t0()).await.unwrap();
        assert_eq!(outcome, AcceptOutcome::Joined);
        let err = store.accept_invitation(inv.id, bob.id, t0()).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
        let err = store.reject_invitation(inv.id, t0()).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
        assert_eq!(store.list_members(ws.id).await.unwrap().len(), 2);

        let missing = store.accept_invitation(Uuid::new_v4(), bob.id, t0()).await;
        assert!(matches!(missing, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn open_creates_a_missing_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("teamboard.db");
        let url = format!("sqlite:{}", path.display());

        SqliteStore::open(&url).await.unwrap();
        assert!(path.exists());
        // reopening runs the migrator against an up-to-date schema
        SqliteStore::open(&url).await.unwrap();
    }

    #[tokio::test]
    async fn failed_owner_membership_leaves_no_workspace() {
        let (store, user, _) = seeded().await;
        sqlx::query(
            r#"
            CREATE TRIGGER refuse_members BEFORE INSERT ON workspace_members
            BEGIN SELECT RAISE(ABORT, 'membership refused'); END
            "#,
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let err = store
            .create_workspace_with_owner(
                &NewWorkspace {
                    id: Uuid::new_v4(),
                    name: "Side project".into(),
                    owner_id: user.id,
                },
                t0(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));

        let n: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM workspaces")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(n.0, 1);
        assert_eq!(store.list_user_workspaces(user.id).await.unwrap().len(), 1);
    }

    fn new_task(project_id: Uuid, title: &str, status: TaskStatus) -> NewTask {
        NewTask {
            title: title.into(),
            description: None,
            status,
            priority: Priority::Medium,
            due_date: None,
            project_id,
            assignee_id: None,
        }
    }

    #[tokio::test]
    async fn deleting_a_project_removes_its_tasks() {
        let (store, _, ws) = seeded().await;
        let project = store
            .insert_project(
                &NewProject {
                    name: "Website".into(),
                    description: None,
                    workspace_id: ws.id,
                },
                t0(),
            )
            .await
            .unwrap();
        let task = store
            .insert_task(&new_task(project.id, "Copy", TaskStatus::Todo), t0())
            .await
            .unwrap();

        let moved = store.set_task_status(task.id, TaskStatus::Done).await.unwrap();
        assert_eq!(moved.status, TaskStatus::Done);
        assert!(matches!(
            store.set_task_status(Uuid::new_v4(), TaskStatus::Done).await,
            Err(StoreError::NotFound)
        ));

        assert_eq!(store.delete_project(project.id).await.unwrap(), 1);
        assert!(store.find_task(task.id).await.unwrap().is_none());
        assert_eq!(store.delete_project(project.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn stats_count_only_the_given_workspace() {
        let (store, user, ws) = seeded().await;
        let (_, other_ws) = store
            .create_user_with_workspace(
                &NewUser {
                    name: "Bob".into(),
                    email: "bob@example.com".into(),
                    password_hash: "hash".into(),
                },
                "Bob's Workspace",
                t0(),
            )
            .await
            .unwrap();

        let mut ids = Vec::new();
        let layout = [
            ("Done", ws.id),
            ("Open", ws.id),
            ("Empty", ws.id),
            ("Bob", other_ws.id),
        ];
        for (name, workspace_id) in layout {
            let p = store
                .insert_project(
                    &NewProject {
                        name: name.into(),
                        description: None,
                        workspace_id,
                    },
                    t0(),
                )
                .await
                .unwrap();
            ids.push(p.id);
        }
        let old = t0() - Duration::days(10);
        store.insert_task(&new_task(ids[0], "shipped", TaskStatus::Done), old).await.unwrap();
        store.insert_task(&new_task(ids[0], "polished", TaskStatus::Done), t0()).await.unwrap();
        let mut assigned = new_task(ids[1], "building", TaskStatus::InProgress);
        assigned.assignee_id = Some(user.id);
        store.insert_task(&assigned, t0()).await.unwrap();
        store.insert_task(&new_task(ids[1], "next", TaskStatus::InProgress), t0()).await.unwrap();
        store.insert_task(&new_task(ids[3], "elsewhere", TaskStatus::Done), t0()).await.unwrap();

        let stats = store
            .workspace_stats(ws.id, t0() - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(
            stats,
            WorkspaceStats {
                total_projects: 3,
                active_projects: 2,
                completed_tasks: 2,
                completed_this_week: 1,
                in_progress_tasks: 2,
                assigned_tasks: 1,
                team_members: 1,
            }
        );
    }
}
