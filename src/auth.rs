use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ControlPlaneError;
use crate::state::SharedState;

const LOCUST_TOKEN_HEADER: &str = "X-Locust-Token";

/// Token authentication for the whole surface.
///
/// `/health` is open. Worker callbacks under `/v1/internal/locust/` are
/// checked against the callback token; everything else against the API
/// bearer token. An empty configured token disables the respective check.
pub async fn require_auth(
    State(state): State<SharedState>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path();

    if path == "/health" {
        return next.run(req).await;
    }

    if path.starts_with("/v1/internal/locust/") {
        let expected = &state.config.security.locust_callback_token;
        if !expected.is_empty() {
            let token = req
                .headers()
                .get(LOCUST_TOKEN_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            if token != expected {
                return ControlPlaneError::Unauthorized(
                    "Invalid Locust callback token".to_string(),
                )
                .into_response();
            }
        }
        return next.run(req).await;
    }

    let expected = &state.config.security.api_token;
    if !expected.is_empty() {
        let header = req
            .headers()
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        let token = match header.split_once(' ') {
            Some(("Bearer", token)) => token,
            _ => {
                return ControlPlaneError::Unauthorized(
                    "Invalid authorization header format".to_string(),
                )
                .into_response();
            }
        };

        if token != expected {
            return ControlPlaneError::Unauthorized("Invalid API token".to_string())
                .into_response();
        }
    }

    next.run(req).await
}
