use crate::errors::{ApiError, AppError};
use crate::models::CurrentUser;
use crate::storage::{StoredSession, persist_session};
use chrono::Utc;
use std::{path::PathBuf, sync::Arc};
use tokio::sync::Mutex;
use tracing::info;

pub const SESSION_TTL_MS: i64 = 24 * 60 * 60 * 1000;

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn is_token_valid(expiry: Option<i64>, now_ms: i64) -> bool {
    matches!(expiry, Some(expiry) if now_ms < expiry)
}

/// A logged-in user together with the bearer token for backend calls.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSession {
    pub user: CurrentUser,
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionStatus {
    Active(ActiveSession),
    Expired,
    Anonymous,
}

impl StoredSession {
    pub fn status_at(&self, now_ms: i64) -> SessionStatus {
        match (&self.user, self.token_expiry) {
            (None, _) => SessionStatus::Anonymous,
            (Some(_), None) => SessionStatus::Expired,
            (Some(user), expiry) if is_token_valid(expiry, now_ms) => SessionStatus::Active(ActiveSession {
                user: user.clone(),
                token: self.token.clone(),
            }),
            (Some(_), _) => SessionStatus::Expired,
        }
    }

    pub fn establish(&mut self, user: CurrentUser, token: Option<String>, now_ms: i64) {
        self.user = Some(user);
        // Login without a token still opens a 24h window; an older token is dropped.
        self.token = token;
        self.token_expiry = Some(now_ms + SESSION_TTL_MS);
    }

    pub fn clear(&mut self) {
        *self = StoredSession::default();
    }
}

/// Shared handle over the persisted session. Every mutation is written through
/// to the session file.
#[derive(Clone)]
pub struct SessionStore {
    path: PathBuf,
    inner: Arc<Mutex<StoredSession>>,
}

impl SessionStore {
    pub fn new(path: PathBuf, session: StoredSession) -> Self {
        Self {
            path,
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// Returns the active session, clearing local state when it has expired.
    pub async fn require(&self) -> Result<ActiveSession, ApiError> {
        let mut session = self.inner.lock().await;
        match session.status_at(now_ms()) {
            SessionStatus::Active(active) => Ok(active),
            SessionStatus::Anonymous => Err(ApiError::NotAuthenticated),
            SessionStatus::Expired => {
                info!("session token expired, logging out");
                session.clear();
                self.write(&session).await;
                Err(ApiError::SessionExpired)
            }
        }
    }

    pub async fn status(&self) -> SessionStatus {
        self.inner.lock().await.status_at(now_ms())
    }

    pub async fn establish(&self, user: CurrentUser, token: Option<String>) -> Result<(), AppError> {
        let mut session = self.inner.lock().await;
        session.establish(user, token, now_ms());
        persist_session(&self.path, &session).await
    }

    pub async fn clear(&self) -> Result<(), AppError> {
        let mut session = self.inner.lock().await;
        session.clear();
        persist_session(&self.path, &session).await
    }

    /// Applies `update` to the stored profile, if any.
    pub async fn update_user<F>(&self, update: F) -> Result<(), AppError>
    where
        F: FnOnce(&mut CurrentUser),
    {
        let mut session = self.inner.lock().await;
        if let Some(user) = session.user.as_mut() {
            update(user);
            persist_session(&self.path, &session).await?;
        }
        Ok(())
    }

    /// Periodic check: logs out a user whose token expired. Returns whether a
    /// logout happened.
    pub async fn expire_if_stale(&self, now_ms: i64) -> bool {
        let mut session = self.inner.lock().await;
        if session.user.is_some() && !is_token_valid(session.token_expiry, now_ms) {
            session.clear();
            self.write(&session).await;
            true
        } else {
            false
        }
    }

    async fn write(&self, session: &StoredSession) {
        if let Err(err) = persist_session(&self.path, session).await {
            tracing::error!("failed to persist session: {}", err.message);
        }
    }
}
