use axum::{extract::State, routing::get, Json, Router};
use tracing::instrument;

use super::dto::{ActivityView, DeadlineView};
use super::services;
use crate::auth::RequestContext;
use crate::error::AppError;
use crate::state::AppState;
use crate::store::WorkspaceStats;

pub fn dashboard_routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard/stats", get(get_stats))
        .route("/dashboard/activity", get(get_activity))
        .route("/dashboard/deadlines", get(get_deadlines))
}

#[instrument(skip(state, ctx))]
pub async fn get_stats(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<WorkspaceStats>, AppError> {
    Ok(Json(services::dashboard_stats(&state, &ctx).await?))
}

#[instrument(skip(state, ctx))]
pub async fn get_activity(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<Vec<ActivityView>>, AppError> {
    let recent = services::recent_activity(&state, &ctx).await?;
    Ok(Json(recent.into_iter().map(Into::into).collect()))
}

#[instrument(skip(state, ctx))]
pub async fn get_deadlines(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<Vec<DeadlineView>>, AppError> {
    let upcoming = services::upcoming_deadlines(&state, &ctx).await?;
    Ok(Json(upcoming.into_iter().map(Into::into).collect()))
}
