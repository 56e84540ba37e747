//! Inbound worker callbacks. These carry the X-Locust-Token, not the user
//! bearer token; the auth middleware routes them accordingly.

use axum::extract::State;
use axum::Json;
use tracing::debug;

use crate::dto::{
    MetricsCallbackRequest, RegisterExternalRequest, SuccessResponse,
    TestStartCallbackRequest, TestStopCallbackRequest,
};
use crate::error::{ControlPlaneError, Result};
use crate::orchestrator::RegisterExternalParams;
use crate::state::SharedState;

/// POST /v1/internal/locust/test-start
pub async fn test_start(
    State(state): State<SharedState>,
    Json(req): Json<TestStartCallbackRequest>,
) -> Result<Json<SuccessResponse>> {
    if req.run_id.is_empty() {
        return Err(ControlPlaneError::Validation("runId is required".to_string()));
    }

    state.orchestrator.handle_test_start(&req.run_id).await?;
    Ok(Json(SuccessResponse::with_message("")))
}

/// POST /v1/internal/locust/test-stop
pub async fn test_stop(
    State(state): State<SharedState>,
    Json(req): Json<TestStopCallbackRequest>,
) -> Result<Json<SuccessResponse>> {
    if req.run_id.is_empty() {
        return Err(ControlPlaneError::Validation("runId is required".to_string()));
    }

    state
        .orchestrator
        .handle_test_stop(&req.run_id, req.final_metrics, req.auto_stopped)
        .await?;
    Ok(Json(SuccessResponse::with_message("")))
}

/// POST /v1/internal/locust/metrics — periodic snapshot push.
pub async fn metrics(
    State(state): State<SharedState>,
    Json(req): Json<MetricsCallbackRequest>,
) -> Result<Json<SuccessResponse>> {
    if req.run_id.is_empty() {
        return Err(ControlPlaneError::Validation("runId is required".to_string()));
    }

    debug!(run_id = %req.run_id, rps = req.metrics.total_rps, "metrics push");
    state
        .orchestrator
        .update_metrics(&req.run_id, req.metrics)
        .await?;
    Ok(Json(SuccessResponse::with_message("")))
}

/// POST /v1/internal/locust/register-external — a run the worker started
/// from its own UI; tracked from Running without a swarm call.
pub async fn register_external(
    State(state): State<SharedState>,
    Json(req): Json<RegisterExternalRequest>,
) -> Result<Json<serde_json::Value>> {
    if req.account_id.is_empty() || req.org_id.is_empty() || req.project_id.is_empty() {
        return Err(ControlPlaneError::Validation(
            "accountId, orgId and projectId are required".to_string(),
        ));
    }

    let run = state
        .orchestrator
        .register_external_run(RegisterExternalParams {
            account_id: req.account_id,
            org_id: req.org_id,
            project_id: req.project_id,
            env_id: req.env_id,
            target_users: req.target_users,
            spawn_rate: req.spawn_rate,
            duration_seconds: req.duration_seconds,
        })
        .await?;

    Ok(Json(serde_json::json!({
        "runId": run.id,
        "message": "External test registered successfully",
    })))
}
