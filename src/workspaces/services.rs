//! Resolution of the caller's current workspace.
//!
//! Reads never write the `current_workspace_id` cookie; only
//! [`set_current_workspace`] and [`create_workspace`] hand one back.

use time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::auth::cookies::{SetCookie, WORKSPACE_COOKIE};
use crate::auth::RequestContext;
use crate::error::AppError;
use crate::state::AppState;
use crate::store::{NewWorkspace, Role, User, Workspace, WorkspaceSummary};

fn workspace_cookie(state: &AppState, workspace_id: Uuid) -> SetCookie {
    let cookies = &state.config.cookies;
    SetCookie::new(
        WORKSPACE_COOKIE,
        workspace_id.to_string(),
        Duration::days(cookies.workspace_ttl_days),
        cookies.secure,
    )
}

pub async fn user_workspaces(
    state: &AppState,
    user_id: Uuid,
) -> Result<Vec<WorkspaceSummary>, AppError> {
    Ok(state.store.list_user_workspaces(user_id).await?)
}

/// Gives a user without any membership a place to land: the demo workspace
/// when it exists, otherwise a fresh workspace of their own.
async fn provision_first_workspace(state: &AppState, user: &User) -> Result<(), AppError> {
    let demo_id = state.config.demo_workspace_id;
    if state.store.find_workspace(demo_id).await?.is_some() {
        let added = state
            .store
            .add_member_if_absent(demo_id, user.id, Role::Admin, state.now())
            .await?;
        info!(user_id = %user.id, workspace_id = %demo_id, added, "joined demo workspace");
        return Ok(());
    }

    let workspace = state
        .store
        .create_workspace_with_owner(
            &NewWorkspace {
                id: Uuid::new_v4(),
                name: format!("{}'s Workspace", user.name),
                owner_id: user.id,
            },
            state.now(),
        )
        .await?;
    info!(user_id = %user.id, workspace_id = %workspace.id, "provisioned personal workspace");
    Ok(())
}

/// `None` for anonymous callers. The selection cookie is honoured only when it
/// names one of the caller's workspaces; otherwise the oldest membership wins.
#[instrument(skip(state, ctx))]
pub async fn current_workspace(
    state: &AppState,
    ctx: &RequestContext,
) -> Result<Option<WorkspaceSummary>, AppError> {
    let Some(user) = ctx.user.as_ref() else {
        return Ok(None);
    };

    let mut workspaces = user_workspaces(state, user.id).await?;
    if workspaces.is_empty() {
        provision_first_workspace(state, user).await?;
        workspaces = user_workspaces(state, user.id).await?;
    }
    if workspaces.is_empty() {
        warn!(user_id = %user.id, "user still has no workspace after provisioning");
        return Ok(None);
    }

    if let Some(selected) = ctx.selected_workspace_id {
        if let Some(pos) = workspaces.iter().position(|w| w.id == selected) {
            return Ok(Some(workspaces.swap_remove(pos)));
        }
        debug!(%selected, "ignoring workspace cookie for non-member workspace");
    }
    Ok(Some(workspaces.swap_remove(0)))
}

pub async fn workspace_id(state: &AppState, ctx: &RequestContext) -> Result<Option<Uuid>, AppError> {
    Ok(current_workspace(state, ctx).await?.map(|w| w.id))
}

#[instrument(skip(state, ctx))]
pub async fn set_current_workspace(
    state: &AppState,
    ctx: &RequestContext,
    workspace_id: Uuid,
) -> Result<SetCookie, AppError> {
    let user = ctx.require_user("You must be logged in to change workspace")?;
    if state
        .store
        .find_membership(workspace_id, user.id)
        .await?
        .is_none()
    {
        warn!(user_id = %user.id, %workspace_id, "workspace switch by non-member");
        return Err(AppError::NotMember);
    }
    info!(user_id = %user.id, %workspace_id, "current workspace changed");
    Ok(workspace_cookie(state, workspace_id))
}

/// Creates the workspace with the caller as admin and selects it.
#[instrument(skip(state, ctx))]
pub async fn create_workspace(
    state: &AppState,
    ctx: &RequestContext,
    name: &str,
) -> Result<(Workspace, SetCookie), AppError> {
    let user = ctx.require_user("You must be logged in to create a workspace")?;
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::validation("Workspace name is required"));
    }

    let workspace = state
        .store
        .create_workspace_with_owner(
            &NewWorkspace {
                id: Uuid::new_v4(),
                name: name.to_string(),
                owner_id: user.id,
            },
            state.now(),
        )
        .await?;
    info!(user_id = %user.id, workspace_id = %workspace.id, "workspace created");
    let cookie = workspace_cookie(state, workspace.id);
    Ok((workspace, cookie))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_DEMO_WORKSPACE_ID;
    use crate::error::ErrorKind;
    use crate::state::test_support::{test_state, test_state_with_store};
    use crate::store::NewUser;

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

    fn bare(name: &str, email: &str) -> NewUser {
        NewUser {
            name: name.into(),
            email: email.into(),
            password_hash: "hash".into(),
        }
    }

    #[tokio::test]
    async fn zero_workspace_user_gets_exactly_one_admin_workspace() {
        let (state, _, store) = test_state_with_store().await;
        let zoe = store.insert_bare_user(&bare("Zoe", "zoe@example.com"), state.now()).await.unwrap();
        let ctx = RequestContext::for_user(zoe.clone());

        let current = current_workspace(&state, &ctx).await.unwrap().unwrap();
        assert_eq!(current.name, "Zoe's Workspace");
        assert_eq!(current.role, Role::Admin);

        // resolving again does not provision a second one
        let again = current_workspace(&state, &ctx).await.unwrap().unwrap();
        assert_eq!(again.id, current.id);
        assert_eq!(user_workspaces(&state, zoe.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn zero_workspace_user_joins_demo_workspace_when_present() {
        let (state, _, store) = test_state_with_store().await;
        let (owner, _) = registered(&state, "Demo", "demo@example.com").await;
        state
            .store
            .create_workspace_with_owner(
                &NewWorkspace {
                    id: DEFAULT_DEMO_WORKSPACE_ID,
                    name: "Demo".into(),
                    owner_id: owner.id,
                },
                state.now(),
            )
            .await
            .unwrap();
        let zoe = store.insert_bare_user(&bare("Zoe", "zoe@example.com"), state.now()).await.unwrap();

        let current = workspace_id(&state, &RequestContext::for_user(zoe.clone()))
            .await
            .unwrap();
        assert_eq!(current, Some(DEFAULT_DEMO_WORKSPACE_ID));
        let m = state
            .store
            .find_membership(DEFAULT_DEMO_WORKSPACE_ID, zoe.id)
            .await
            .unwrap()
            .unwrap();
        assert!(m.is_admin());
    }

    #[tokio::test]
    async fn anonymous_has_no_current_workspace() {
        let (state, _) = test_state().await;
        let ctx = RequestContext::anonymous();
        assert!(current_workspace(&state, &ctx).await.unwrap().is_none());
        assert!(workspace_id(&state, &ctx).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn defaults_to_oldest_membership_and_honours_cookie() {
        let (state, clock) = test_state().await;
        let (ana, own) = registered(&state, "Ana", "ana@example.com").await;
        clock.advance(Duration::minutes(1));
        let ctx = RequestContext::for_user(ana.clone());
        let (second, _) = create_workspace(&state, &ctx, "  Side project  ").await.unwrap();
        assert_eq!(second.name, "Side project");

        let current = current_workspace(&state, &ctx).await.unwrap().unwrap();
        assert_eq!(current.id, own.id);

        let selected = ctx.clone().with_workspace(second.id);
        let current = current_workspace(&state, &selected).await.unwrap().unwrap();
        assert_eq!(current.id, second.id);
        assert_eq!(current.role, Role::Admin);
    }

    #[tokio::test]
    async fn cookie_for_foreign_workspace_falls_back() {
        let (state, _) = test_state().await;
        let (ana, own) = registered(&state, "Ana", "ana@example.com").await;
        let (_, foreign) = registered(&state, "Bob", "bob@example.com").await;

        let ctx = RequestContext::for_user(ana).with_workspace(foreign.id);
        let current = current_workspace(&state, &ctx).await.unwrap().unwrap();
        assert_eq!(current.id, own.id);
    }

    #[tokio::test]
    async fn set_current_workspace_requires_membership() {
        let (state, _) = test_state().await;
        let (ana, _) = registered(&state, "Ana", "ana@example.com").await;
        let (_, foreign) = registered(&state, "Bob", "bob@example.com").await;
        let ctx = RequestContext::for_user(ana.clone());

        let err = set_current_workspace(&state, &ctx, foreign.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(err.to_string(), "You do not belong to this workspace");

        let err = set_current_workspace(&state, &RequestContext::anonymous(), foreign.id)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "You must be logged in to change workspace");
    }

    #[tokio::test]
    async fn set_then_get_returns_selected_workspace() {
        let (state, _) = test_state().await;
        let (ana, _) = registered(&state, "Ana", "ana@example.com").await;
        let ctx = RequestContext::for_user(ana);
        let (second, _) = create_workspace(&state, &ctx, "Second").await.unwrap();

        let cookie = set_current_workspace(&state, &ctx, second.id).await.unwrap();
        assert_eq!(cookie.name, WORKSPACE_COOKIE);
        assert_eq!(cookie.max_age, Duration::days(30));

        // next request carries the cookie value back
        let next = ctx.with_workspace(cookie.value.parse().unwrap());
        let current = current_workspace(&state, &next).await.unwrap().unwrap();
        assert_eq!(current.id, second.id);
    }

    #[tokio::test]
    async fn create_workspace_validates_name() {
        let (state, _) = test_state().await;
        let (ana, _) = registered(&state, "Ana", "ana@example.com").await;
        let err = create_workspace(&state, &RequestContext::for_user(ana), "   ")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Workspace name is required");

        let err = create_workspace(&state, &RequestContext::anonymous(), "Name")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "You must be logged in to create a workspace");
    }
}
