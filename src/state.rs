use crate::config::AppConfig;
use crate::errors::ApiError;
use crate::gateway::{Backend, Gateway};
use crate::notifications::NotificationCenter;
use crate::registry::{Entropy, Registry, UuidEntropy};
use crate::session::{ActiveSession, SessionStore, now_ms};
use crate::storage::StoredSession;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    Success,
    Error,
    Info,
}

/// One-shot message shown on the next rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    pub kind: ToastKind,
    pub message: String,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub gateway: Gateway,
    pub session: SessionStore,
    pub registry: Arc<Mutex<Registry>>,
    pub notifications: Arc<Mutex<NotificationCenter>>,
    pub entropy: Arc<dyn Entropy>,
    toast: Arc<Mutex<Option<Toast>>>,
}

impl AppState {
    pub fn new(config: AppConfig, gateway: Gateway, session: StoredSession) -> Self {
        let session = SessionStore::new(config.data_path.clone(), session);
        Self {
            config: Arc::new(config),
            gateway,
            session,
            registry: Arc::new(Mutex::new(Registry::with_fixtures())),
            notifications: Arc::new(Mutex::new(NotificationCenter::with_fixtures())),
            entropy: Arc::new(UuidEntropy),
            toast: Arc::new(Mutex::new(None)),
        }
    }

    /// The active session and a backend handle carrying its token.
    pub async fn backend(&self) -> Result<(ActiveSession, Backend), ApiError> {
        let session = self.session.require().await?;
        let backend = self.gateway.authorized(session.token.clone());
        Ok((session, backend))
    }

    pub async fn flash(&self, kind: ToastKind, message: impl Into<String>) {
        *self.toast.lock().await = Some(Toast {
            kind,
            message: message.into(),
        });
    }

    pub async fn take_toast(&self) -> Option<Toast> {
        self.toast.lock().await.take()
    }
}

/// Logs the user out once the token expires, checking every
/// `session_check_interval`. The first check runs immediately.
pub async fn watch_session_expiry(state: AppState) {
    let mut ticker = tokio::time::interval(state.config.session_check_interval);
    loop {
        ticker.tick().await;
        if state.session.expire_if_stale(now_ms()).await {
            warn!("periodic check found an expired session, logging out");
            state.flash(ToastKind::Error, ApiError::SessionExpired.to_string()).await;
        }
    }
}
