use axum::{
    extract::{rejection::PathRejection, Path, State},
    http::StatusCode,
    routing::{get, patch, post, put},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::dto::{ProjectDetails, ProjectInput, ProjectView, TaskInput, TaskStatusInput, TaskView};
use super::services;
use crate::auth::dto::MessageResponse;
use crate::auth::RequestContext;
use crate::error::AppError;
use crate::extract::{path_id, ApiJson};
use crate::state::AppState;

type IdPath = Result<Path<Uuid>, PathRejection>;

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/projects", get(list_projects))
        .route("/projects/:id", get(get_project))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/projects", post(create_project))
        .route("/projects/:id", put(update_project).delete(delete_project))
        .route("/projects/:id/tasks", post(create_task))
        .route("/tasks/:id", put(update_task).delete(delete_task))
        .route("/tasks/:id/status", patch(update_task_status))
}

#[instrument(skip(state, ctx))]
pub async fn list_projects(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<Vec<ProjectView>>, AppError> {
    let projects = services::list_projects(&state, &ctx).await?;
    Ok(Json(projects.into_iter().map(Into::into).collect()))
}

#[instrument(skip(state, ctx))]
pub async fn get_project(
    State(state): State<AppState>,
    ctx: RequestContext,
    id: IdPath,
) -> Result<Json<ProjectDetails>, AppError> {
    let id = path_id(id, "Project")?;
    let (project, tasks) = services::project_detail(&state, &ctx, id).await?;
    Ok(Json(ProjectDetails {
        project: project.into(),
        tasks: tasks.into_iter().map(Into::into).collect(),
    }))
}

#[instrument(skip(state, ctx, payload))]
pub async fn create_project(
    State(state): State<AppState>,
    ctx: RequestContext,
    ApiJson(payload): ApiJson<ProjectInput>,
) -> Result<(StatusCode, Json<ProjectView>), AppError> {
    let project = services::create_project(&state, &ctx, payload).await?;
    Ok((StatusCode::CREATED, Json(project.into())))
}

#[instrument(skip(state, ctx, payload))]
pub async fn update_project(
    State(state): State<AppState>,
    ctx: RequestContext,
    id: IdPath,
    ApiJson(payload): ApiJson<ProjectInput>,
) -> Result<Json<ProjectView>, AppError> {
    let id = path_id(id, "Project")?;
    let project = services::update_project(&state, &ctx, id, payload).await?;
    Ok(Json(project.into()))
}

#[instrument(skip(state, ctx))]
pub async fn delete_project(
    State(state): State<AppState>,
    ctx: RequestContext,
    id: IdPath,
) -> Result<Json<MessageResponse>, AppError> {
    let id = path_id(id, "Project")?;
    services::delete_project(&state, &ctx, id).await?;
    Ok(Json(MessageResponse::ok("Project deleted")))
}

#[instrument(skip(state, ctx, payload))]
pub async fn create_task(
    State(state): State<AppState>,
    ctx: RequestContext,
    project_id: IdPath,
    ApiJson(payload): ApiJson<TaskInput>,
) -> Result<(StatusCode, Json<TaskView>), AppError> {
    let project_id = path_id(project_id, "Project")?;
    let task = services::create_task(&state, &ctx, project_id, payload).await?;
    Ok((StatusCode::CREATED, Json(task.into())))
}

#[instrument(skip(state, ctx, payload))]
pub async fn update_task(
    State(state): State<AppState>,
    ctx: RequestContext,
    id: IdPath,
    ApiJson(payload): ApiJson<TaskInput>,
) -> Result<Json<TaskView>, AppError> {
    let id = path_id(id, "Task")?;
    let task = services::update_task(&state, &ctx, id, payload).await?;
    Ok(Json(task.into()))
}

#[instrument(skip(state, ctx, payload))]
pub async fn update_task_status(
    State(state): State<AppState>,
    ctx: RequestContext,
    id: IdPath,
    ApiJson(payload): ApiJson<TaskStatusInput>,
) -> Result<Json<TaskView>, AppError> {
    let id = path_id(id, "Task")?;
    let task = services::update_task_status(&state, &ctx, id, payload.status).await?;
    Ok(Json(task.into()))
}

#[instrument(skip(state, ctx))]
pub async fn delete_task(
    State(state): State<AppState>,
    ctx: RequestContext,
    id: IdPath,
) -> Result<Json<MessageResponse>, AppError> {
    let id = path_id(id, "Task")?;
    services::delete_task(&state, &ctx, id).await?;
    Ok(Json(MessageResponse::ok("Task deleted")))
}
