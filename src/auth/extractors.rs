use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use uuid::Uuid;

use super::cookies::{read_cookie, SESSION_COOKIE, WORKSPACE_COOKIE};
use super::session::SessionManager;
use crate::error::AppError;
use crate::state::AppState;
use crate::store::User;

/// Who is calling and which workspace they last selected.
///
/// Resolving never rejects an anonymous request; each operation decides for
/// itself whether it needs a user, so validation can run before the auth check.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub user: Option<User>,
    pub session_token: Option<String>,
    pub selected_workspace_id: Option<Uuid>,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn for_user(user: User) -> Self {
        Self {
            user: Some(user),
            ..Self::default()
        }
    }

    pub fn with_workspace(mut self, workspace_id: Uuid) -> Self {
        self.selected_workspace_id = Some(workspace_id);
        self
    }

    /// The authenticated user, or `Unauthenticated(msg)`.
    pub fn require_user(&self, msg: &'static str) -> Result<&User, AppError> {
        self.user.as_ref().ok_or(AppError::Unauthenticated(msg))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for RequestContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = read_cookie(&parts.headers, SESSION_COOKIE).map(str::to_owned);
        // A malformed workspace cookie is treated as no selection.
        let selected_workspace_id =
            read_cookie(&parts.headers, WORKSPACE_COOKIE).and_then(|v| v.parse::<Uuid>().ok());

        let sessions = SessionManager::from_ref(state);
        let user = sessions.get_current_user(token.as_deref()).await?;

        Ok(Self {
            user,
            session_token: token,
            selected_workspace_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::test_state;
    use crate::store::NewUser;
    use axum::http::{header::COOKIE, Request};

    async fn extract(state: &AppState, cookie: Option<&str>) -> RequestContext {
        let mut builder = Request::builder().uri("/api/auth/me");
        if let Some(c) = cookie {
            builder = builder.header(COOKIE, c);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        RequestContext::from_request_parts(&mut parts, state)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn anonymous_request_resolves_to_empty_context() {
        let (state, _) = test_state().await;
        let ctx = extract(&state, None).await;
        assert!(ctx.user.is_none());
        assert!(ctx.session_token.is_none());
        assert!(matches!(
            ctx.require_user("You must be logged in"),
            Err(AppError::Unauthenticated("You must be logged in"))
        ));
    }

    #[tokio::test]
    async fn resolves_user_and_selected_workspace_from_cookies() {
        let (state, _) = test_state().await;
        let (ana, ws) = state
            .store
            .create_user_with_workspace(
                &NewUser {
                    name: "Ana".into(),
                    email: "ana@example.com".into(),
                    password_hash: "hash".into(),
                },
                "Ana's Workspace",
                state.now(),
            )
            .await
            .unwrap();
        let issued = SessionManager::from_ref(&state)
            .create_session(ana.id)
            .await
            .unwrap();

        let cookie = format!(
            "session_token={}; current_workspace_id={}",
            issued.session.token, ws.id
        );
        let ctx = extract(&state, Some(&cookie)).await;
        assert_eq!(ctx.user.map(|u| u.id), Some(ana.id));
        assert_eq!(ctx.selected_workspace_id, Some(ws.id));
    }

    #[tokio::test]
    async fn unknown_token_and_garbage_workspace_are_ignored() {
        let (state, _) = test_state().await;
        let ctx = extract(&state, Some("session_token=bogus; current_workspace_id=xyz")).await;
        assert!(ctx.user.is_none());
        assert_eq!(ctx.session_token.as_deref(), Some("bogus"));
        assert!(ctx.selected_workspace_id.is_none());
    }
}
