//! Read-side projections over the metrics time-series.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::error::Result;
use crate::state::SharedState;

#[derive(Debug, Default, Deserialize)]
pub struct WindowQuery {
    /// Unix milliseconds; 0 or absent leaves the bound open.
    #[serde(default)]
    pub from: i64,
    #[serde(default)]
    pub to: i64,
}

/// GET /v1/runs/{id}/metrics/timeseries — snapshots ascending by timestamp.
pub async fn get_timeseries(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<serde_json::Value>> {
    let run = state.runs.get(&id).await?;

    let records = state.metrics.window(&run.id, query.from, query.to).await?;
    let points: Vec<_> = records.into_iter().map(|r| r.snapshot).collect();

    Ok(Json(serde_json::json!({
        "runId": run.id,
        "points": points,
    })))
}

/// GET /v1/runs/{id}/metrics/aggregate
pub async fn get_aggregate(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let run = state.runs.get(&id).await?;
    let aggregate = state.metrics.aggregate(&run.id).await?;

    Ok(Json(serde_json::json!({
        "runId": run.id,
        "aggregate": aggregate,
    })))
}
