use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::dto::{ProjectInput, TaskInput};
use crate::auth::RequestContext;
use crate::error::AppError;
use crate::state::AppState;
use crate::store::{
    NewProject, NewTask, Priority, Project, StoreError, Task, TaskChanges, TaskStatus, User,
};
use crate::workspaces::services::{current_workspace, workspace_id};

/// Projects of the caller's current workspace, newest first.
pub async fn list_projects(state: &AppState, ctx: &RequestContext) -> Result<Vec<Project>, AppError> {
    match workspace_id(state, ctx).await? {
        Some(ws) => Ok(state.store.list_projects(ws).await?),
        None => Ok(Vec::new()),
    }
}

/// Trimmed name (at least 2 characters) and non-blank description.
fn project_fields(req: ProjectInput) -> Result<(String, Option<String>), AppError> {
    let name = req.name.trim();
    if name.chars().count() < 2 {
        return Err(AppError::validation("Project name must be at least 2 characters"));
    }
    let description = req
        .description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());
    Ok((name.to_string(), description))
}

/// A row that vanished between the membership check and the write.
fn gone(resource: &'static str) -> impl FnOnce(StoreError) -> AppError {
    move |e| match e {
        StoreError::NotFound => AppError::NotFound(resource),
        other => other.into(),
    }
}

#[instrument(skip(state, ctx, req))]
pub async fn create_project(
    state: &AppState,
    ctx: &RequestContext,
    req: ProjectInput,
) -> Result<Project, AppError> {
    ctx.require_user("You must be logged in to create a project")?;
    let Some(workspace) = current_workspace(state, ctx).await? else {
        return Err(AppError::NoWorkspace);
    };
    let (name, description) = project_fields(req)?;

    let project = state
        .store
        .insert_project(
            &NewProject {
                name,
                description,
                workspace_id: workspace.id,
            },
            state.now(),
        )
        .await?;
    info!(project_id = %project.id, workspace_id = %workspace.id, "project created");
    Ok(project)
}

/// The project, if the caller belongs to its workspace. Anything else reads as
/// not found so project ids are not confirmed to outsiders.
async fn project_for_member(state: &AppState, user: &User, id: Uuid) -> Result<Project, AppError> {
    let project = state
        .store
        .find_project(id)
        .await?
        .ok_or(AppError::NotFound("Project"))?;
    if state
        .store
        .find_membership(project.workspace_id, user.id)
        .await?
        .is_none()
    {
        warn!(user_id = %user.id, project_id = %id, "project access by non-member");
        return Err(AppError::NotFound("Project"));
    }
    Ok(project)
}

/// Project detail with its tasks, oldest first.
#[instrument(skip(state, ctx))]
pub async fn project_detail(
    state: &AppState,
    ctx: &RequestContext,
    id: Uuid,
) -> Result<(Project, Vec<Task>), AppError> {
    let user = ctx.require_user("You must be logged in")?;
    let project = project_for_member(state, user, id).await?;
    let tasks = state.store.list_tasks(project.id).await?;
    Ok((project, tasks))
}

#[instrument(skip(state, ctx, req))]
pub async fn update_project(
    state: &AppState,
    ctx: &RequestContext,
    id: Uuid,
    req: ProjectInput,
) -> Result<Project, AppError> {
    let user = ctx.require_user("You must be logged in")?;
    let (name, description) = project_fields(req)?;
    let project = project_for_member(state, user, id).await?;
    let updated = state
        .store
        .update_project(project.id, &name, description.as_deref())
        .await
        .map_err(gone("Project"))?;
    info!(project_id = %id, "project updated");
    Ok(updated)
}

/// Deletes the project together with its tasks.
#[instrument(skip(state, ctx))]
pub async fn delete_project(
    state: &AppState,
    ctx: &RequestContext,
    id: Uuid,
) -> Result<(), AppError> {
    let user = ctx.require_user("You must be logged in")?;
    let project = project_for_member(state, user, id).await?;
    state.store.delete_project(project.id).await?;
    info!(project_id = %id, workspace_id = %project.workspace_id, "project deleted");
    Ok(())
}

/// The task and its project, if the caller belongs to the project's workspace.
async fn task_for_member(
    state: &AppState,
    user: &User,
    id: Uuid,
) -> Result<(Project, Task), AppError> {
    let task = state
        .store
        .find_task(id)
        .await?
        .ok_or(AppError::NotFound("Task"))?;
    let project = project_for_member(state, user, task.project_id)
        .await
        .map_err(|e| match e {
            AppError::NotFound(_) => AppError::NotFound("Task"),
            other => other,
        })?;
    Ok((project, task))
}

async fn check_assignee(
    state: &AppState,
    workspace_id: Uuid,
    assignee: Option<Uuid>,
) -> Result<(), AppError> {
    let Some(assignee) = assignee else {
        return Ok(());
    };
    if state
        .store
        .find_membership(workspace_id, assignee)
        .await?
        .is_none()
    {
        return Err(AppError::validation("Assignee must be a member of the workspace"));
    }
    Ok(())
}

fn task_title(req: &TaskInput) -> Result<String, AppError> {
    let title = req.title.trim();
    if title.is_empty() {
        return Err(AppError::validation("Title is required"));
    }
    Ok(title.to_string())
}

#[instrument(skip(state, ctx, req))]
pub async fn create_task(
    state: &AppState,
    ctx: &RequestContext,
    project_id: Uuid,
    req: TaskInput,
) -> Result<Task, AppError> {
    let user = ctx.require_user("You must be logged in")?;
    let title = task_title(&req)?;
    let project = project_for_member(state, user, project_id).await?;
    check_assignee(state, project.workspace_id, req.assignee_id).await?;

    let task = state
        .store
        .insert_task(
            &NewTask {
                title,
                description: req.description.filter(|d| !d.trim().is_empty()),
                status: req.status.unwrap_or(TaskStatus::Todo),
                priority: req.priority.unwrap_or(Priority::Medium),
                due_date: req.due_date,
                project_id: project.id,
                assignee_id: req.assignee_id,
            },
            state.now(),
        )
        .await?;
    info!(task_id = %task.id, %project_id, "task created");
    Ok(task)
}

#[instrument(skip(state, ctx, req))]
pub async fn update_task(
    state: &AppState,
    ctx: &RequestContext,
    id: Uuid,
    req: TaskInput,
) -> Result<Task, AppError> {
    let user = ctx.require_user("You must be logged in")?;
    let title = task_title(&req)?;
    let (project, current) = task_for_member(state, user, id).await?;
    check_assignee(state, project.workspace_id, req.assignee_id).await?;

    let changes = TaskChanges {
        title,
        description: req.description.filter(|d| !d.trim().is_empty()),
        status: req.status.unwrap_or(current.status),
        priority: req.priority.unwrap_or(current.priority),
        due_date: req.due_date,
        assignee_id: req.assignee_id,
    };
    let task = state
        .store
        .update_task(id, &changes)
        .await
        .map_err(gone("Task"))?;
    info!(task_id = %id, project_id = %project.id, "task updated");
    Ok(task)
}

/// Moves the task to another board column.
#[instrument(skip(state, ctx))]
pub async fn update_task_status(
    state: &AppState,
    ctx: &RequestContext,
    id: Uuid,
    status: TaskStatus,
) -> Result<Task, AppError> {
    let user = ctx.require_user("You must be logged in")?;
    let (_, current) = task_for_member(state, user, id).await?;
    if current.status == status {
        return Ok(current);
    }
    let task = state
        .store
        .set_task_status(id, status)
        .await
        .map_err(gone("Task"))?;
    info!(task_id = %id, from = current.status.as_str(), to = status.as_str(), "task moved");
    Ok(task)
}

#[instrument(skip(state, ctx))]
pub async fn delete_task(
    state: &AppState,
    ctx: &RequestContext,
    id: Uuid,
) -> Result<(), AppError> {
    let user = ctx.require_user("You must be logged in")?;
    let (project, _) = task_for_member(state, user, id).await?;
    state.store.delete_task(id).await?;
    info!(task_id = %id, project_id = %project.id, "task deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::state::test_support::test_state;
    use crate::store::{NewUser, Workspace};
    use time::Duration;

    async fn registered(state: &AppState, name: &str, email: &str) -> (User, Workspace) {
        state
            .store
            .create_user_with_workspace(
                &NewUser {
                    name: name.into(),
                    email: email.into(),
                    password_hash: "hash".into(),
                },
                &format!("{name}'s Workspace"),
                state.now(),
            )
            .await
            .unwrap()
    }

    fn project(name: &str) -> ProjectInput {
        ProjectInput {
            name: name.into(),
            description: None,
        }
    }

    fn task(title: &str) -> TaskInput {
        TaskInput {
            title: title.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_and_list_in_current_workspace() {
        let (state, clock) = test_state().await;
        let (ana, ws) = registered(&state, "Ana", "ana@x.com").await;
        let ctx = RequestContext::for_user(ana);

        let first = create_project(&state, &ctx, project("Website")).await.unwrap();
        assert_eq!(first.workspace_id, ws.id);
        clock.advance(Duration::seconds(10));
        create_project(&state, &ctx, project("Mobile app")).await.unwrap();

        let names: Vec<_> = list_projects(&state, &ctx)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, ["Mobile app", "Website"]);

        let err = create_project(&state, &ctx, project(" x ")).await.unwrap_err();
        assert_eq!(err.to_string(), "Project name must be at least 2 characters");
        assert!(list_projects(&state, &RequestContext::anonymous())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn detail_is_hidden_from_non_members() {
        let (state, clock) = test_state().await;
        let (ana, _) = registered(&state, "Ana", "ana@x.com").await;
        let (bob, _) = registered(&state, "Bob", "bob@x.com").await;
        let ana_ctx = RequestContext::for_user(ana);
        let p = create_project(&state, &ana_ctx, project("Website")).await.unwrap();

        create_task(&state, &ana_ctx, p.id, task("First")).await.unwrap();
        clock.advance(Duration::seconds(1));
        create_task(&state, &ana_ctx, p.id, task("Second")).await.unwrap();

        let (found, tasks) = project_detail(&state, &ana_ctx, p.id).await.unwrap();
        assert_eq!(found.id, p.id);
        let titles: Vec<_> = tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["First", "Second"]);
        assert_eq!(tasks[0].status, TaskStatus::Todo);
        assert_eq!(tasks[0].priority, Priority::Medium);

        let bob_ctx = RequestContext::for_user(bob);
        let err = project_detail(&state, &bob_ctx, p.id).await.unwrap_err();
        assert_eq!(err.to_string(), "Project not found");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = create_task(&state, &bob_ctx, p.id, task("Sneaky")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn assignee_must_belong_to_workspace() {
        let (state, _) = test_state().await;
        let (ana, _) = registered(&state, "Ana", "ana@x.com").await;
        let (bob, _) = registered(&state, "Bob", "bob@x.com").await;
        let ctx = RequestContext::for_user(ana.clone());
        let p = create_project(&state, &ctx, project("Website")).await.unwrap();

        let mut req = task("Review");
        req.assignee_id = Some(bob.id);
        let err = create_task(&state, &ctx, p.id, req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let mut req = task("Review");
        req.assignee_id = Some(ana.id);
        req.priority = Some(Priority::High);
        let t = create_task(&state, &ctx, p.id, req).await.unwrap();
        assert_eq!(t.assignee_id, Some(ana.id));
        assert_eq!(t.priority, Priority::High);

        let err = create_task(&state, &ctx, p.id, task("  ")).await.unwrap_err();
        assert_eq!(err.to_string(), "Title is required");
    }

    #[tokio::test]
    async fn members_edit_and_delete_projects() {
        let (state, _) = test_state().await;
        let (ana, _) = registered(&state, "Ana", "ana@x.com").await;
        let (bob, _) = registered(&state, "Bob", "bob@x.com").await;
        let ctx = RequestContext::for_user(ana);
        let p = create_project(&state, &ctx, project("Website")).await.unwrap();

        let updated = update_project(
            &state,
            &ctx,
            p.id,
            ProjectInput {
                name: " Landing page ".into(),
                description: Some("  ".into()),
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.name, "Landing page");
        assert_eq!(updated.description, None);

        let err = update_project(&state, &ctx, p.id, project("x")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let bob_ctx = RequestContext::for_user(bob);
        let err = update_project(&state, &bob_ctx, p.id, project("Hijacked"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Project not found");
        let err = delete_project(&state, &bob_ctx, p.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let t = create_task(&state, &ctx, p.id, task("Copy")).await.unwrap();
        delete_project(&state, &ctx, p.id).await.unwrap();
        assert!(list_projects(&state, &ctx).await.unwrap().is_empty());
        let err = update_task_status(&state, &ctx, t.id, TaskStatus::Done)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Task not found");
    }

    #[tokio::test]
    async fn tasks_move_across_the_board() {
        let (state, _) = test_state().await;
        let (ana, _) = registered(&state, "Ana", "ana@x.com").await;
        let (bob, _) = registered(&state, "Bob", "bob@x.com").await;
        let ctx = RequestContext::for_user(ana);
        let p = create_project(&state, &ctx, project("Website")).await.unwrap();
        let t = create_task(&state, &ctx, p.id, task("Copy")).await.unwrap();

        let moved = update_task_status(&state, &ctx, t.id, TaskStatus::InProgress)
            .await
            .unwrap();
        assert_eq!(moved.status, TaskStatus::InProgress);
        let moved = update_task_status(&state, &ctx, t.id, TaskStatus::Done)
            .await
            .unwrap();
        assert_eq!(moved.status, TaskStatus::Done);
        assert_eq!(moved.title, "Copy");

        let bob_ctx = RequestContext::for_user(bob);
        let err = update_task_status(&state, &bob_ctx, t.id, TaskStatus::Todo)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Task not found");
        let anonymous = RequestContext::anonymous();
        let err = update_task_status(&state, &anonymous, t.id, TaskStatus::Todo)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);

        let (_, tasks) = project_detail(&state, &ctx, p.id).await.unwrap();
        assert_eq!(tasks[0].status, TaskStatus::Done);
    }

    #[tokio::test]
    async fn task_update_replaces_fields_and_keeps_unset_status() {
        let (state, _) = test_state().await;
        let (ana, _) = registered(&state, "Ana", "ana@x.com").await;
        let (bob, _) = registered(&state, "Bob", "bob@x.com").await;
        let ctx = RequestContext::for_user(ana.clone());
        let p = create_project(&state, &ctx, project("Website")).await.unwrap();

        let mut req = task("Copy");
        req.status = Some(TaskStatus::InProgress);
        req.description = Some("first draft".into());
        req.assignee_id = Some(ana.id);
        let t = create_task(&state, &ctx, p.id, req).await.unwrap();

        let due = state.now() + Duration::days(2);
        let mut edit = task(" Final copy ");
        edit.priority = Some(Priority::High);
        edit.due_date = Some(due);
        let updated = update_task(&state, &ctx, t.id, edit).await.unwrap();
        assert_eq!(updated.title, "Final copy");
        assert_eq!(updated.status, TaskStatus::InProgress);
        assert_eq!(updated.priority, Priority::High);
        assert_eq!(updated.due_date, Some(due));
        assert_eq!(updated.description, None);
        assert_eq!(updated.assignee_id, None);

        let mut edit = task("Copy");
        edit.assignee_id = Some(bob.id);
        let err = update_task(&state, &ctx, t.id, edit).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = update_task(&state, &ctx, t.id, task("")).await.unwrap_err();
        assert_eq!(err.to_string(), "Title is required");

        delete_task(&state, &ctx, t.id).await.unwrap();
        let err = delete_task(&state, &ctx, t.id).await.unwrap_err();
        assert_eq!(err.to_string(), "Task not found");
    }
}
