//! Read-only summaries of the caller's current workspace. A caller without a
//! workspace (including anonymous ones) sees zeros and empty lists.

use time::Duration;
use tracing::{debug, instrument};

use crate::auth::RequestContext;
use crate::error::AppError;
use crate::state::AppState;
use crate::store::{TaskActivity, UpcomingTask, WorkspaceStats};
use crate::workspaces::services::workspace_id;

const FEED_LIMIT: i64 = 5;
const COMPLETED_WINDOW: Duration = Duration::days(7);

#[instrument(skip(state, ctx))]
pub async fn dashboard_stats(
    state: &AppState,
    ctx: &RequestContext,
) -> Result<WorkspaceStats, AppError> {
    let Some(ws) = workspace_id(state, ctx).await? else {
        return Ok(WorkspaceStats::default());
    };
    let stats = state
        .store
        .workspace_stats(ws, state.now() - COMPLETED_WINDOW)
        .await?;
    debug!(workspace_id = %ws, ?stats, "dashboard stats");
    Ok(stats)
}

/// The five newest tasks of the workspace.
pub async fn recent_activity(
    state: &AppState,
    ctx: &RequestContext,
) -> Result<Vec<TaskActivity>, AppError> {
    match workspace_id(state, ctx).await? {
        Some(ws) => Ok(state.store.recent_tasks(ws, FEED_LIMIT).await?),
        None => Ok(Vec::new()),
    }
}

/// The five soonest unfinished tasks that are not yet overdue.
pub async fn upcoming_deadlines(
    state: &AppState,
    ctx: &RequestContext,
) -> Result<Vec<UpcomingTask>, AppError> {
    match workspace_id(state, ctx).await? {
        Some(ws) => Ok(state
            .store
            .upcoming_tasks(ws, state.now(), FEED_LIMIT)
            .await?),
        None => Ok(Vec::new()),
    }
}
