use crate::errors::AppError;
use crate::models::CurrentUser;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::error;

/// The locally persisted session, keyed the way the browser client keyed its
/// local storage.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StoredSession {
    #[serde(rename = "bbts_user", default, skip_serializing_if = "Option::is_none")]
    pub user: Option<CurrentUser>,
    #[serde(rename = "bbts_token", default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Epoch milliseconds.
    #[serde(rename = "bbts_token_expiry", default, skip_serializing_if = "Option::is_none")]
    pub token_expiry: Option<i64>,
}

pub async fn load_session(path: &Path) -> StoredSession {
    match fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(session) => session,
            Err(err) => {
                error!("failed to parse session file: {err}");
                StoredSession::default()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => StoredSession::default(),
        Err(err) => {
            error!("failed to read session file: {err}");
            StoredSession::default()
        }
    }
}

pub async fn persist_session(path: &Path, session: &StoredSession) -> Result<(), AppError> {
    let payload = serde_json::to_vec_pretty(session).map_err(AppError::internal)?;
    fs::write(path, payload).await.map_err(AppError::internal)?;
    Ok(())
}
