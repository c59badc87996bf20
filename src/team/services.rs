//! Workspace membership and the invitation lifecycle.
//!
//! An invitation starts `pending` and moves exactly once, to `accepted` or
//! `rejected`. The store guards that transition with a conditional update, so
//! the checks here only pick the message; they are not what keeps it single-shot.

use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::dto::InviteMemberRequest;
use crate::auth::services::{is_valid_email, normalize_email};
use crate::auth::RequestContext;
use crate::error::AppError;
use crate::state::AppState;
use crate::store::{
    AcceptOutcome, Invitation, NewInvitation, PendingInvitation, Role, StoreError, TeamMember,
    User,
};
use crate::workspaces::services::{current_workspace, workspace_id};

/// Members of the caller's current workspace; empty without one.
pub async fn team_members(
    state: &AppState,
    ctx: &RequestContext,
) -> Result<Vec<TeamMember>, AppError> {
    match workspace_id(state, ctx).await? {
        Some(ws) => Ok(state.store.list_members(ws).await?),
        None => Ok(Vec::new()),
    }
}

/// Same as [`team_members`] without the roles.
pub async fn workspace_users(state: &AppState, ctx: &RequestContext) -> Result<Vec<User>, AppError> {
    Ok(team_members(state, ctx)
        .await?
        .into_iter()
        .map(|m| m.user)
        .collect())
}

fn parse_role(role: Option<&str>) -> Result<Role, AppError> {
    match role.map(str::trim) {
        None | Some("") => Ok(Role::default()),
        Some(r) => r
            .parse::<Role>()
            .map_err(|_| AppError::validation("Invalid role")),
    }
}

/// Records a pending invitation into the caller's current workspace.
/// Returns the confirmation message.
#[instrument(skip(state, ctx, req), fields(email = %req.email))]
pub async fn invite_member(
    state: &AppState,
    ctx: &RequestContext,
    req: InviteMemberRequest,
) -> Result<String, AppError> {
    if !is_valid_email(req.email.trim()) {
        return Err(AppError::validation("Invalid email address"));
    }
    let role = parse_role(req.role.as_deref())?;
    let email = normalize_email(&req.email);

    let inviter = ctx.require_user("You must be logged in to invite members")?;
    let Some(workspace) = current_workspace(state, ctx).await? else {
        return Err(AppError::NoWorkspace);
    };

    if inviter.email.eq_ignore_ascii_case(&email) {
        warn!(user_id = %inviter.id, "self invite");
        return Err(AppError::SelfInvite);
    }

    if let Some(existing) = state.store.find_user_by_email(&email).await? {
        if state
            .store
            .find_membership(workspace.id, existing.id)
            .await?
            .is_some()
        {
            return Err(AppError::AlreadyMember);
        }
    }

    if state
        .store
        .find_pending_invitation(&email, workspace.id)
        .await?
        .is_some()
    {
        return Err(AppError::DuplicateInvitation);
    }

    let invitation = NewInvitation {
        email: email.clone(),
        workspace_id: workspace.id,
        role,
        invited_by: inviter.id,
    };
    let created = match state.store.insert_invitation(&invitation, state.now()).await {
        Ok(inv) => inv,
        // a concurrent invite got there first
        Err(StoreError::AlreadyExists) => return Err(AppError::DuplicateInvitation),
        Err(e) => return Err(e.into()),
    };

    info!(invitation_id = %created.id, workspace_id = %workspace.id, %role, "invitation created");
    Ok(format!("Invitation sent to {email}"))
}

/// Pending invitations addressed to the caller, newest first.
pub async fn pending_invitations(
    state: &AppState,
    ctx: &RequestContext,
) -> Result<Vec<PendingInvitation>, AppError> {
    match ctx.user.as_ref() {
        Some(user) => Ok(state.store.list_pending_invitations(&user.email).await?),
        None => Ok(Vec::new()),
    }
}

/// Shared preconditions of accept and reject: exists, addressed to the
/// caller, still pending.
async fn load_invitation_for(
    state: &AppState,
    user: &User,
    id: Uuid,
) -> Result<Invitation, AppError> {
    let invitation = state
        .store
        .find_invitation(id)
        .await?
        .ok_or(AppError::NotFound("Invitation"))?;
    if !invitation.email.eq_ignore_ascii_case(&user.email) {
        warn!(user_id = %user.id, invitation_id = %id, "invitation addressed to someone else");
        return Err(AppError::InvitationNotForYou);
    }
    if invitation.status.is_terminal() {
        return Err(AppError::AlreadyProcessed);
    }
    Ok(invitation)
}

fn transition_error(e: StoreError) -> AppError {
    match e {
        StoreError::Conflict => AppError::AlreadyProcessed,
        StoreError::NotFound => AppError::NotFound("Invitation"),
        other => other.into(),
    }
}

#[instrument(skip(state, ctx))]
pub async fn accept_invitation(
    state: &AppState,
    ctx: &RequestContext,
    id: Uuid,
) -> Result<String, AppError> {
    let user = ctx.require_user("You must be logged in to accept invitations")?;
    let invitation = load_invitation_for(state, user, id).await?;

    let outcome = state
        .store
        .accept_invitation(id, user.id, state.now())
        .await
        .map_err(transition_error)?;
    info!(invitation_id = %id, user_id = %user.id, ?outcome, "invitation accepted");

    match outcome {
        AcceptOutcome::AlreadyMember => Ok("You are already a member of this workspace".into()),
        AcceptOutcome::Joined => {
            let name = state
                .store
                .find_workspace(invitation.workspace_id)
                .await?
                .map(|w| w.name)
                .unwrap_or_else(|| "the workspace".into());
            Ok(format!("You have joined {name}"))
        }
    }
}

#[instrument(skip(state, ctx))]
pub async fn reject_invitation(
    state: &AppState,
    ctx: &RequestContext,
    id: Uuid,
) -> Result<String, AppError> {
    let user = ctx.require_user("You must be logged in to reject invitations")?;
    load_invitation_for(state, user, id).await?;

    state
        .store
        .reject_invitation(id, state.now())
        .await
        .map_err(transition_error)?;
    info!(invitation_id = %id, user_id = %user.id, "invitation rejected");
    Ok("Invitation rejected".into())
}
