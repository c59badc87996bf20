use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use super::{
    AcceptOutcome, Invitation, InvitationStatus, Membership, NewInvitation, NewProject, NewTask,
    NewUser, NewWorkspace, PendingInvitation, Project, Role, Session, Store, StoreError, Task,
    TaskActivity, TaskChanges, TaskStatus, TeamMember, UpcomingTask, User, Workspace,
    WorkspaceStats, WorkspaceSummary,
};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/postgres");

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }
}

// ── Row types ────────────────────────────────────────────────────────────────

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    password_hash: Option<String>,
    avatar_url: Option<String>,
    created_at: OffsetDateTime,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        Self {
            id: r.id,
            name: r.name,
            email: r.email,
            password_hash: r.password_hash,
            avatar_url: r.avatar_url,
            created_at: r.created_at,
        }
    }
}

#[derive(FromRow)]
struct WorkspaceRow {
    id: Uuid,
    name: String,
    owner_id: Uuid,
    created_at: OffsetDateTime,
}

impl From<WorkspaceRow> for Workspace {
    fn from(r: WorkspaceRow) -> Self {
        Self {
            id: r.id,
            name: r.name,
            owner_id: r.owner_id,
            created_at: r.created_at,
        }
    }
}

#[derive(FromRow)]
struct MembershipRow {
    id: Uuid,
    user_id: Uuid,
    workspace_id: Uuid,
    role: String,
    created_at: OffsetDateTime,
}

impl TryFrom<MembershipRow> for Membership {
    type Error = StoreError;

    fn try_from(r: MembershipRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            user_id: r.user_id,
            workspace_id: r.workspace_id,
            role: r.role.parse()?,
            created_at: r.created_at,
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
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
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
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(FromRow)]
struct SessionUserRow {
    id: Uuid,
    user_id: Uuid,
    token: String,
    expires_at: OffsetDateTime,
    created_at: OffsetDateTime,
    u_name: String,
    u_email: String,
    u_password_hash: Option<String>,
    u_avatar_url: Option<String>,
    u_created_at: OffsetDateTime,
}

#[derive(FromRow)]
struct MemberUserRow {
    m_id: Uuid,
    workspace_id: Uuid,
    role: String,
    m_created_at: OffsetDateTime,
    id: Uuid,
    name: String,
    email: String,
    password_hash: Option<String>,
    avatar_url: Option<String>,
    created_at: OffsetDateTime,
}

#[derive(FromRow)]
struct PendingInvitationRow {
    id: Uuid,
    email: String,
    workspace_id: Uuid,
    role: String,
    invited_by: Uuid,
    status: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    w_name: String,
    w_owner_id: Uuid,
    w_created_at: OffsetDateTime,
    o_name: String,
    o_email: String,
    o_avatar_url: Option<String>,
    o_created_at: OffsetDateTime,
    i_name: String,
    i_email: String,
    i_avatar_url: Option<String>,
    i_created_at: OffsetDateTime,
}

impl TryFrom<PendingInvitationRow> for PendingInvitation {
    type Error = StoreError;

    fn try_from(r: PendingInvitationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            workspace: Workspace {
                id: r.workspace_id,
                name: r.w_name,
                owner_id: r.w_owner_id,
                created_at: r.w_created_at,
            },
            owner: User {
                id: r.w_owner_id,
                name: r.o_name,
                email: r.o_email,
                password_hash: None,
                avatar_url: r.o_avatar_url,
                created_at: r.o_created_at,
            },
            inviter: User {
                id: r.invited_by,
                name: r.i_name,
                email: r.i_email,
                password_hash: None,
                avatar_url: r.i_avatar_url,
                created_at: r.i_created_at,
            },
            invitation: Invitation {
                id: r.id,
                email: r.email,
                workspace_id: r.workspace_id,
                role: r.role.parse()?,
                invited_by: r.invited_by,
                status: r.status.parse()?,
                created_at: r.created_at,
                updated_at: r.updated_at,
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
    created_at: OffsetDateTime,
}

impl From<ProjectRow> for Project {
    fn from(r: ProjectRow) -> Self {
        Self {
            id: r.id,
            name: r.name,
            description: r.description,
            workspace_id: r.workspace_id,
            created_at: r.created_at,
        }
    }
}

#[derive(FromRow)]
struct TaskRow {
    id: Uuid,
    title: String,
    description: Option<String>,
    status: String,
    priority: String,
    due_date: Option<OffsetDateTime>,
    project_id: Uuid,
    assignee_id: Option<Uuid>,
    created_at: OffsetDateTime,
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
            due_date: r.due_date,
            project_id: r.project_id,
            assignee_id: r.assignee_id,
            created_at: r.created_at,
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
    created_at: OffsetDateTime,
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
            created_at: r.created_at,
        })
    }
}

#[derive(FromRow)]
struct UpcomingRow {
    id: Uuid,
    title: String,
    priority: String,
    due_date: OffsetDateTime,
    project_name: String,
}

impl TryFrom<UpcomingRow> for UpcomingTask {
    type Error = StoreError;

    fn try_from(r: UpcomingRow) -> Result<Self, Self::Error> {
        Ok(Self {
            task_id: r.id,
            title: r.title,
            priority: r.priority.parse()?,
            due_date: r.due_date,
            project_name: r.project_name,
        })
    }
}

// ── Store impl ───────────────────────────────────────────────────────────────

#[async_trait]
impl Store for PgStore {
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
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, email, password_hash, avatar_url, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.name)
        .bind(user.email.to_lowercase())
        .bind(&user.password_hash)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let workspace = sqlx::query_as::<_, WorkspaceRow>(
            r#"
            INSERT INTO workspaces (id, name, owner_id, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, owner_id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(workspace_name)
        .bind(user.id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO workspace_members (id, user_id, workspace_id, role, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user.id)
        .bind(workspace.id)
        .bind(Role::Admin.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((user.into(), workspace.into()))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, email, password_hash, avatar_url, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email.to_lowercase())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
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
            r#"
            INSERT INTO sessions (id, user_id, token, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(Session {
            id,
            user_id,
            token: token.to_string(),
            expires_at,
            created_at: now,
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
            WHERE s.token = $1 AND s.expires_at > $2
            LIMIT 1
            "#,
        )
        .bind(token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| {
            (
                Session {
                    id: r.id,
                    user_id: r.user_id,
                    token: r.token,
                    expires_at: r.expires_at,
                    created_at: r.created_at,
                },
                User {
                    id: r.user_id,
                    name: r.u_name,
                    email: r.u_email,
                    password_hash: r.u_password_hash,
                    avatar_url: r.u_avatar_url,
                    created_at: r.u_created_at,
                },
            )
        }))
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<u64, StoreError> {
        let res = sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    async fn delete_sessions_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let res = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
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
            WHERE m.user_id = $1
            ORDER BY m.created_at ASC, w.id ASC
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
            "SELECT id, name, owner_id, created_at FROM workspaces WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
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
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, owner_id, created_at
            "#,
        )
        .bind(workspace.id)
        .bind(&workspace.name)
        .bind(workspace.owner_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO workspace_members (id, user_id, workspace_id, role, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(workspace.owner_id)
        .bind(row.id)
        .bind(Role::Admin.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.into())
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
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, workspace_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(workspace_id)
        .bind(role.as_str())
        .bind(now)
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
            WHERE workspace_id = $1 AND user_id = $2
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
            WHERE m.workspace_id = $1
            ORDER BY m.created_at ASC
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
                        created_at: r.m_created_at,
                    },
                    user: User {
                        id: r.id,
                        name: r.name,
                        email: r.email,
                        password_hash: r.password_hash,
                        avatar_url: r.avatar_url,
                        created_at: r.created_at,
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
            VALUES ($1, $2, $3, $4, $5, 'pending', $6, $6)
            RETURNING id, email, workspace_id, role, invited_by, status, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(invitation.email.to_lowercase())
        .bind(invitation.workspace_id)
        .bind(invitation.role.as_str())
        .bind(invitation.invited_by)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn find_invitation(&self, id: Uuid) -> Result<Option<Invitation>, StoreError> {
        let row = sqlx::query_as::<_, InvitationRow>(
            r#"
            SELECT id, email, workspace_id, role, invited_by, status, created_at, updated_at
            FROM workspace_invitations
            WHERE id = $1
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
            WHERE email = $1 AND workspace_id = $2 AND status = 'pending'
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
            WHERE i.email = $1 AND i.status = 'pending'
            ORDER BY i.created_at DESC, i.id DESC
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
            r#"
            SELECT workspace_id, role, status
            FROM workspace_invitations
            WHERE id = $1
            FOR UPDATE
            "#,
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
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, workspace_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(workspace_id)
        .bind(role.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let updated = sqlx::query(
            r#"
            UPDATE workspace_invitations
            SET status = 'accepted', updated_at = $2
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            // dropped without commit: the membership insert is rolled back
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
            SET status = 'rejected', updated_at = $2
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(now)
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
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, description, workspace_id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&project.name)
        .bind(&project.description)
        .bind(project.workspace_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn list_projects(&self, workspace_id: Uuid) -> Result<Vec<Project>, StoreError> {
        let rows = sqlx::query_as::<_, ProjectRow>(
            r#"
            SELECT id, name, description, workspace_id, created_at
            FROM projects
            WHERE workspace_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_project(&self, id: Uuid) -> Result<Option<Project>, StoreError> {
        let row = sqlx::query_as::<_, ProjectRow>(
            "SELECT id, name, description, workspace_id, created_at FROM projects WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn insert_task(&self, task: &NewTask, now: OffsetDateTime) -> Result<Task, StoreError> {
        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            INSERT INTO tasks
                (id, title, description, status, priority, due_date, project_id, assignee_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, title, description, status, priority, due_date, project_id,
                      assignee_id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(task.priority.as_str())
        .bind(task.due_date)
        .bind(task.project_id)
        .bind(task.assignee_id)
        .bind(now)
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
            WHERE project_id = $1
            ORDER BY created_at ASC, id ASC
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
            UPDATE projects SET name = $2, description = $3
            WHERE id = $1
            RETURNING id, name, description, workspace_id, created_at
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(description)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;
        Ok(row.into())
    }

    async fn delete_project(&self, id: Uuid) -> Result<u64, StoreError> {
        let res = sqlx::query("DELETE FROM projects WHERE id = $1")
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
            WHERE id = $1
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
            SET title = $2, description = $3, status = $4, priority = $5, due_date = $6,
                assignee_id = $7
            WHERE id = $1
            RETURNING id, title, description, status, priority, due_date, project_id,
                      assignee_id, created_at
            "#,
        )
        .bind(id)
        .bind(&changes.title)
        .bind(&changes.description)
        .bind(changes.status.as_str())
        .bind(changes.priority.as_str())
        .bind(changes.due_date)
        .bind(changes.assignee_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;
        row.try_into()
    }

    async fn set_task_status(&self, id: Uuid, status: TaskStatus) -> Result<Task, StoreError> {
        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            UPDATE tasks SET status = $2
            WHERE id = $1
            RETURNING id, title, description, status, priority, due_date, project_id,
                      assignee_id, created_at
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;
        row.try_into()
    }

    async fn delete_task(&self, id: Uuid) -> Result<u64, StoreError> {
        let res = sqlx::query("DELETE FROM tasks WHERE id = $1")
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
                (SELECT COUNT(*) FROM projects WHERE workspace_id = $1) AS total_projects,
                (SELECT COUNT(*) FROM projects p
                 WHERE p.workspace_id = $1
                   AND (NOT EXISTS (SELECT 1 FROM tasks t WHERE t.project_id = p.id)
                        OR EXISTS (SELECT 1 FROM tasks t
                                   WHERE t.project_id = p.id AND t.status <> 'done'))
                ) AS active_projects,
                (SELECT COUNT(*) FROM tasks t JOIN projects p ON p.id = t.project_id
                 WHERE p.workspace_id = $1 AND t.status = 'done') AS completed_tasks,
                (SELECT COUNT(*) FROM tasks t JOIN projects p ON p.id = t.project_id
                 WHERE p.workspace_id = $1 AND t.status = 'done' AND t.created_at >= $2
                ) AS completed_this_week,
                (SELECT COUNT(*) FROM tasks t JOIN projects p ON p.id = t.project_id
                 WHERE p.workspace_id = $1 AND t.status = 'in_progress') AS in_progress_tasks,
                (SELECT COUNT(*) FROM tasks t JOIN projects p ON p.id = t.project_id
                 WHERE p.workspace_id = $1 AND t.status = 'in_progress'
                   AND t.assignee_id IS NOT NULL) AS assigned_tasks,
                (SELECT COUNT(*) FROM workspace_members WHERE workspace_id = $1) AS team_members
            "#,
        )
        .bind(workspace_id)
        .bind(completed_since)
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
            WHERE p.workspace_id = $1
            ORDER BY t.created_at DESC, t.id DESC
            LIMIT $2
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
            WHERE p.workspace_id = $1
              AND t.status <> 'done'
              AND t.due_date IS NOT NULL
              AND t.due_date >= $2
            ORDER BY t.due_date ASC, t.id ASC
            LIMIT $3
            "#,
        )
        .bind(workspace_id)
        .bind(from)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}
