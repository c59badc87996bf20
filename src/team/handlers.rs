use axum::{
    extract::{rejection::PathRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::dto::{InviteMemberRequest, PendingInvitationView, TeamMemberView};
use super::services;
use crate::auth::dto::{MessageResponse, PublicUser};
use crate::auth::RequestContext;
use crate::error::AppError;
use crate::extract::{path_id, ApiJson};
use crate::state::AppState;

pub fn team_routes() -> Router<AppState> {
    Router::new()
        .route("/team/members", get(list_members))
        .route("/team/users", get(list_users))
        .route("/team/invitations", post(invite_member))
}

pub fn invitation_routes() -> Router<AppState> {
    Router::new()
        .route("/invitations", get(list_pending))
        .route("/invitations/:id/accept", post(accept_invitation))
        .route("/invitations/:id/reject", post(reject_invitation))
}

#[instrument(skip(state, ctx))]
pub async fn list_members(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<Vec<TeamMemberView>>, AppError> {
    let members = services::team_members(&state, &ctx).await?;
    Ok(Json(members.into_iter().map(Into::into).collect()))
}

#[instrument(skip(state, ctx))]
pub async fn list_users(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<Vec<PublicUser>>, AppError> {
    let users = services::workspace_users(&state, &ctx).await?;
    Ok(Json(users.into_iter().map(Into::into).collect()))
}

#[instrument(skip(state, ctx, payload))]
pub async fn invite_member(
    State(state): State<AppState>,
    ctx: RequestContext,
    ApiJson(payload): ApiJson<InviteMemberRequest>,
) -> Result<impl IntoResponse, AppError> {
    let message = services::invite_member(&state, &ctx, payload).await?;
    Ok((StatusCode::CREATED, Json(MessageResponse::ok(message))))
}

#[instrument(skip(state, ctx))]
pub async fn list_pending(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<Vec<PendingInvitationView>>, AppError> {
    let pending = services::pending_invitations(&state, &ctx).await?;
    Ok(Json(pending.into_iter().map(Into::into).collect()))
}

#[instrument(skip(state, ctx))]
pub async fn accept_invitation(
    State(state): State<AppState>,
    ctx: RequestContext,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let id = path_id(id, "Invitation")?;
    let message = services::accept_invitation(&state, &ctx, id).await?;
    Ok(Json(MessageResponse::ok(message)))
}

#[instrument(skip(state, ctx))]
pub async fn reject_invitation(
    State(state): State<AppState>,
    ctx: RequestContext,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let id = path_id(id, "Invitation")?;
    let message = services::reject_invitation(&state, &ctx, id).await?;
    Ok(Json(MessageResponse::ok(message)))
}
