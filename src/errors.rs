use axum::http::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Failures of the backend gateway and of the workflows built on it.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A precondition failed before any request was sent.
    #[error("{0}")]
    Validation(String),

    #[error("{message}")]
    Http { status: StatusCode, message: String },

    #[error("Erro de conexão com o servidor: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Resposta inválida do servidor: {0}")]
    Decode(String),

    #[error("Sua sessão expirou. Por favor, faça login novamente.")]
    SessionExpired,

    #[error("Usuário não identificado. Faça login novamente.")]
    NotAuthenticated,

    #[error("Tokens insuficientes. Você tem {available} tokens e precisa de {needed}.")]
    InsufficientTokens { available: i64, needed: i64 },

    /// An earlier step of a multi-request mutation already reached the backend
    /// when this one failed. Nothing is rolled back.
    #[error("Operação incompleta ({step}): {source}")]
    Incomplete {
        step: &'static str,
        #[source]
        source: Box<ApiError>,
    },
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn incomplete(step: &'static str, source: ApiError) -> Self {
        Self::Incomplete {
            step,
            source: Box::new(source),
        }
    }

    /// Builds an HTTP error from a non-success response body, taking the message
    /// from the first known field and falling back to the raw text.
    pub fn from_response(status: StatusCode, body: &str, fallback: &str) -> Self {
        Self::Http {
            status,
            message: extract_message(body).unwrap_or_else(|| fallback.to_string()),
        }
    }
}

pub fn extract_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => ["message", "error", "erro"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string),
        Ok(Value::String(text)) => Some(text),
        Ok(_) => None,
        Err(_) => Some(trimmed.to_string()),
    }
}

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal(err: impl std::error::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::internal(err)
    }
}

impl From<ApiError> for AppError {
    fn from(err: ApiError) -> Self {
        let status = match &err {
            ApiError::Validation(_) | ApiError::InsufficientTokens { .. } => StatusCode::BAD_REQUEST,
            ApiError::SessionExpired | ApiError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Http { status, .. } => *status,
            ApiError::Transport(_) | ApiError::Decode(_) | ApiError::Incomplete { .. } => {
                StatusCode::BAD_GATEWAY
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        (self.status, self.message).into_response()
    }
}
