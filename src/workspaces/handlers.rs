use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tracing::instrument;

use super::dto::{CreateWorkspaceRequest, CreatedWorkspaceResponse, SetCurrentWorkspaceRequest};
use super::services;
use crate::auth::dto::MessageResponse;
use crate::auth::RequestContext;
use crate::error::AppError;
use crate::extract::ApiJson;
use crate::state::AppState;
use crate::store::WorkspaceSummary;

pub fn workspace_routes() -> Router<AppState> {
    Router::new()
        .route("/workspaces", get(list_workspaces).post(create_workspace))
        .route(
            "/workspaces/current",
            get(get_current_workspace).put(set_current_workspace),
        )
}

#[instrument(skip(state, ctx))]
pub async fn list_workspaces(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<Vec<WorkspaceSummary>>, AppError> {
    let user = ctx.require_user("You must be logged in")?;
    Ok(Json(services::user_workspaces(&state, user.id).await?))
}

/// `null` when the caller is not logged in.
#[instrument(skip(state, ctx))]
pub async fn get_current_workspace(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<Option<WorkspaceSummary>>, AppError> {
    Ok(Json(services::current_workspace(&state, &ctx).await?))
}

#[instrument(skip(state, ctx, payload))]
pub async fn set_current_workspace(
    State(state): State<AppState>,
    ctx: RequestContext,
    ApiJson(payload): ApiJson<SetCurrentWorkspaceRequest>,
) -> Result<impl IntoResponse, AppError> {
    let cookie = services::set_current_workspace(&state, &ctx, payload.workspace_id).await?;
    Ok((cookie, Json(MessageResponse::ok("Workspace changed"))))
}

#[instrument(skip(state, ctx, payload))]
pub async fn create_workspace(
    State(state): State<AppState>,
    ctx: RequestContext,
    ApiJson(payload): ApiJson<CreateWorkspaceRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (workspace, cookie) = services::create_workspace(&state, &ctx, &payload.name).await?;
    Ok((
        StatusCode::CREATED,
        cookie,
        Json(CreatedWorkspaceResponse {
            success: true,
            workspace: workspace.into(),
        }),
    ))
}
