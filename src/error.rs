use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum ControlPlaneError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    Conflict(String),

    #[error("worker request failed: {0}")]
    Transport(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    Unauthorized(String),
}

pub type Result<T> = std::result::Result<T, ControlPlaneError>;

impl ControlPlaneError {
    pub fn not_found(what: &str, id: &str) -> Self {
        ControlPlaneError::NotFound(format!("{what} {id} not found"))
    }
}

impl From<reqwest::Error> for ControlPlaneError {
    fn from(err: reqwest::Error) -> Self {
        ControlPlaneError::Transport(err.to_string())
    }
}

impl IntoResponse for ControlPlaneError {
    fn into_response(self) -> Response {
        let status = match &self {
            ControlPlaneError::Validation(_) => StatusCode::BAD_REQUEST,
            ControlPlaneError::NotFound(_) => StatusCode::NOT_FOUND,
            ControlPlaneError::AlreadyExists(_) => StatusCode::CONFLICT,
            // Status-guard violations surface as 400 with a specific message.
            ControlPlaneError::Conflict(_) => StatusCode::BAD_REQUEST,
            ControlPlaneError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ControlPlaneError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ControlPlaneError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}
