use axum::extract::FromRef;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use super::cookies::SetCookie;
use super::dto::{LoginRequest, RegisterRequest};
use super::extractors::RequestContext;
use super::password::{credential_matches, hash_credential};
use super::session::{IssuedSession, SessionManager};
use crate::error::AppError;
use crate::state::AppState;
use crate::store::{NewUser, StoreError, User};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Trimmed, lowercased form used for storage and comparison.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_registration(req: &RegisterRequest) -> Result<(), AppError> {
    if req.name.trim().chars().count() < 2 {
        return Err(AppError::validation("Name must be at least 2 characters"));
    }
    if !is_valid_email(req.email.trim()) {
        return Err(AppError::validation("Invalid email address"));
    }
    if req.password.chars().count() < 8 {
        return Err(AppError::validation("Password must be at least 8 characters"));
    }
    if !req.password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AppError::validation("Password must contain a number"));
    }
    if !req.password.chars().any(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::validation("Password must contain a letter"));
    }
    Ok(())
}

/// Creates the account, its own workspace and admin membership, then logs in.
#[instrument(skip(state, req), fields(email = %req.email))]
pub async fn register(
    state: &AppState,
    req: RegisterRequest,
) -> Result<(User, IssuedSession), AppError> {
    validate_registration(&req)?;
    let email = normalize_email(&req.email);
    let name = req.name.trim().to_string();

    if state.store.find_user_by_email(&email).await?.is_some() {
        warn!("email already registered");
        return Err(AppError::EmailTaken);
    }

    let password_hash = hash_credential(&req.password)?;
    let workspace_name = format!("{name}'s Workspace");
    let new_user = NewUser {
        name,
        email,
        password_hash,
    };
    let (user, workspace) = match state
        .store
        .create_user_with_workspace(&new_user, &workspace_name, state.now())
        .await
    {
        Ok(created) => created,
        // lost a race with a concurrent registration
        Err(StoreError::AlreadyExists) => return Err(AppError::EmailTaken),
        Err(e) => return Err(e.into()),
    };

    let issued = SessionManager::from_ref(state).create_session(user.id).await?;
    info!(user_id = %user.id, workspace_id = %workspace.id, "user registered");
    Ok((user, issued))
}

#[instrument(skip(state, req), fields(email = %req.email))]
pub async fn login(
    state: &AppState,
    req: LoginRequest,
) -> Result<(User, IssuedSession), AppError> {
    if !is_valid_email(req.email.trim()) {
        return Err(AppError::validation("Invalid email address"));
    }
    if req.password.is_empty() {
        return Err(AppError::validation("Password is required"));
    }

    let email = normalize_email(&req.email);
    let Some(user) = state.store.find_user_by_email(&email).await? else {
        warn!("login unknown email");
        return Err(AppError::InvalidCredentials);
    };
    let Some(hash) = user.password_hash.as_deref() else {
        warn!(user_id = %user.id, "login for account without password");
        return Err(AppError::InvalidCredentials);
    };
    if !credential_matches(&req.password, hash) {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::InvalidCredentials);
    }

    let issued = SessionManager::from_ref(state).create_session(user.id).await?;
    info!(user_id = %user.id, "user logged in");
    Ok((user, issued))
}

/// Always succeeds for a well-formed request, logged in or not.
pub async fn logout(state: &AppState, ctx: &RequestContext) -> Result<SetCookie, AppError> {
    let cookie = SessionManager::from_ref(state)
        .delete_session(ctx.session_token.as_deref())
        .await?;
    Ok(cookie)
}

/// Revokes every session of the caller, including the current one.
pub async fn logout_all(
    state: &AppState,
    ctx: &RequestContext,
) -> Result<(u64, SetCookie), AppError> {
    let user = ctx.require_user("You must be logged in")?;
    let sessions = SessionManager::from_ref(state);
    let revoked = sessions.delete_all_user_sessions(user.id).await?;
    let cookie = sessions.delete_session(None).await?;
    Ok((revoked, cookie))
}

pub fn me(ctx: &RequestContext) -> Result<&User, AppError> {
    ctx.require_user("You must be logged in")
}
