use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use std::str::FromStr;

use crate::domain::RunStatus;
use crate::dto::{CreateLoadTestRunRequest, LoadTestRunResponse};
use crate::error::{ControlPlaneError, Result};
use crate::orchestrator::CreateRunParams;
use crate::state::SharedState;
use crate::store::{LoadTestRunFilter, SortBy, SortOrder};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRunsQuery {
    #[serde(default)]
    pub load_test_id: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub org_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub env_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort_order: Option<String>,
}

impl ListRunsQuery {
    fn into_filter(self) -> Result<LoadTestRunFilter> {
        let status = match self.status.as_deref() {
            Some(s) => Some(
                RunStatus::from_str(s).map_err(ControlPlaneError::Validation)?,
            ),
            None => None,
        };

        Ok(LoadTestRunFilter {
            load_test_id: self.load_test_id,
            account_id: self.account_id,
            org_id: self.org_id,
            project_id: self.project_id,
            env_id: self.env_id,
            name: self.name,
            status,
            limit: self.limit.unwrap_or(0),
            sort_by: SortBy::parse(self.sort_by.as_deref().unwrap_or("createdAt")),
            sort_order: SortOrder::parse(self.sort_order.as_deref().unwrap_or("desc")),
        })
    }
}

/// POST /v1/load-tests/{id}/runs — create a run bound to the latest script
/// revision and start it. An empty body runs with the test's defaults.
pub async fn create_run(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse> {
    let req: CreateLoadTestRunRequest = if body.is_empty() {
        CreateLoadTestRunRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ControlPlaneError::Validation(format!("Invalid request body: {e}")))?
    };

    let params = CreateRunParams {
        name: req.name,
        target_users: req.target_users,
        spawn_rate: req.spawn_rate,
        duration_seconds: req.duration_seconds,
        created_by: req.created_by,
        metadata: req.metadata,
    };

    let run = state.orchestrator.create_run(&id, params).await?;
    Ok((StatusCode::CREATED, Json(LoadTestRunResponse::from(run))))
}

/// GET /v1/runs
pub async fn list_runs(
    State(state): State<SharedState>,
    Query(query): Query<ListRunsQuery>,
) -> Result<Json<Vec<LoadTestRunResponse>>> {
    let runs = state.runs.list(&query.into_filter()?).await?;
    Ok(Json(runs.into_iter().map(LoadTestRunResponse::from).collect()))
}

/// GET /v1/load-tests/{id}/runs
pub async fn list_runs_for_test(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(mut query): Query<ListRunsQuery>,
) -> Result<Json<Vec<LoadTestRunResponse>>> {
    query.load_test_id = Some(id);
    let runs = state.runs.list(&query.into_filter()?).await?;
    Ok(Json(runs.into_iter().map(LoadTestRunResponse::from).collect()))
}

/// GET /v1/runs/{id}
pub async fn get_run(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<LoadTestRunResponse>> {
    let run = state.runs.get(&id).await?;
    Ok(Json(LoadTestRunResponse::from(run)))
}

/// POST /v1/runs/{id}/stop — manual stop; only Running runs qualify.
pub async fn stop_run(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<LoadTestRunResponse>> {
    let run = state.orchestrator.stop_run(&id).await?;
    Ok(Json(LoadTestRunResponse::from(run)))
}
