use std::sync::Arc;

use axum::extract::FromRef;
use rand::{rngs::OsRng, RngCore};
use time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::cookies::{SetCookie, SESSION_COOKIE};
use crate::clock::Clock;
use crate::state::AppState;
use crate::store::{Session, Store, StoreError, User};

const TOKEN_BYTES: usize = 32;

/// A live session and the user it authenticates.
#[derive(Debug, Clone)]
pub struct SessionData {
    pub session: Session,
    pub user: User,
}

/// Result of a successful login: the persisted row and the cookie to send back.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub session: Session,
    pub cookie: SetCookie,
}

/// Opaque, database-backed sessions carried in the `session_token` cookie.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    secure: bool,
}

impl FromRef<AppState> for SessionManager {
    fn from_ref(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            clock: state.clock.clone(),
            ttl: Duration::days(state.config.cookies.session_ttl_days),
            secure: state.config.cookies.secure,
        }
    }
}

/// 256 random bits, hex encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

impl SessionManager {
    pub async fn create_session(&self, user_id: Uuid) -> Result<IssuedSession, StoreError> {
        let now = self.clock.now();
        let token = generate_token();
        let expires_at = now + self.ttl;
        let session = self
            .store
            .insert_session(user_id, &token, expires_at, now)
            .await?;
        info!(%user_id, session_id = %session.id, "session created");
        Ok(IssuedSession {
            cookie: SetCookie::new(SESSION_COOKIE, token, self.ttl, self.secure),
            session,
        })
    }

    /// `None` for a missing, unknown or expired token.
    pub async fn get_session(&self, token: Option<&str>) -> Result<Option<SessionData>, StoreError> {
        let Some(token) = token else {
            return Ok(None);
        };
        let found = self.store.find_live_session(token, self.clock.now()).await?;
        if found.is_none() {
            debug!("session token unknown or expired");
        }
        Ok(found.map(|(session, user)| SessionData { session, user }))
    }

    pub async fn get_current_user(&self, token: Option<&str>) -> Result<Option<User>, StoreError> {
        Ok(self.get_session(token).await?.map(|d| d.user))
    }

    /// Idempotent; always returns the cookie removal to send back.
    pub async fn delete_session(&self, token: Option<&str>) -> Result<SetCookie, StoreError> {
        if let Some(token) = token {
            let removed = self.store.delete_session_by_token(token).await?;
            debug!(removed, "session deleted");
        }
        Ok(SetCookie::removal(SESSION_COOKIE, self.secure))
    }

    pub async fn delete_all_user_sessions(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let removed = self.store.delete_sessions_for_user(user_id).await?;
        info!(%user_id, removed, "all sessions revoked");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::test_state;
    use crate::store::NewUser;

    async fn user(state: &AppState, email: &str) -> User {
        let (user, _) = state
            .store
            .create_user_with_workspace(
                &NewUser {
                    name: "Ana".into(),
                    email: email.into(),
                    password_hash: "hash".into(),
                },
                "Ana's Workspace",
                state.now(),
            )
            .await
            .unwrap();
        user
    }

    #[test]
    fn tokens_are_256_bit_hex_and_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn create_then_get_session() {
        let (state, _) = test_state().await;
        let sessions = SessionManager::from_ref(&state);
        let ana = user(&state, "ana@example.com").await;

        let issued = sessions.create_session(ana.id).await.unwrap();
        assert_eq!(issued.session.expires_at - state.now(), Duration::days(30));
        assert_eq!(issued.cookie.value, issued.session.token);
        assert_eq!(issued.cookie.max_age, Duration::days(30));

        let found = sessions
            .get_session(Some(&issued.session.token))
            .await
            .unwrap()
            .expect("live session");
        assert_eq!(found.user.id, ana.id);
    }

    #[tokio::test]
    async fn missing_unknown_and_expired_tokens_fail_closed() {
        let (state, clock) = test_state().await;
        let sessions = SessionManager::from_ref(&state);
        let ana = user(&state, "ana@example.com").await;
        let issued = sessions.create_session(ana.id).await.unwrap();

        assert!(sessions.get_session(None).await.unwrap().is_none());
        assert!(sessions.get_session(Some("nope")).await.unwrap().is_none());

        clock.advance(Duration::days(30));
        assert!(sessions
            .get_current_user(Some(&issued.session.token))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn delete_session_is_idempotent() {
        let (state, _) = test_state().await;
        let sessions = SessionManager::from_ref(&state);
        let ana = user(&state, "ana@example.com").await;
        let issued = sessions.create_session(ana.id).await.unwrap();
        let token = issued.session.token.as_str();

        let cookie = sessions.delete_session(Some(token)).await.unwrap();
        assert_eq!(cookie.max_age, Duration::ZERO);
        assert!(sessions.get_session(Some(token)).await.unwrap().is_none());
        sessions.delete_session(Some(token)).await.unwrap();
        sessions.delete_session(None).await.unwrap();
    }

    #[tokio::test]
    async fn delete_all_user_sessions_revokes_every_device() {
        let (state, _) = test_state().await;
        let sessions = SessionManager::from_ref(&state);
        let ana = user(&state, "ana@example.com").await;
        let bob = user(&state, "bob@example.com").await;
        let a1 = sessions.create_session(ana.id).await.unwrap();
        let a2 = sessions.create_session(ana.id).await.unwrap();
        let b1 = sessions.create_session(bob.id).await.unwrap();

        assert_eq!(sessions.delete_all_user_sessions(ana.id).await.unwrap(), 2);
        assert!(sessions.get_session(Some(&a1.session.token)).await.unwrap().is_none());
        assert!(sessions.get_session(Some(&a2.session.token)).await.unwrap().is_none());
        assert!(sessions.get_session(Some(&b1.session.token)).await.unwrap().is_some());
    }
}
