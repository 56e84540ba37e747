use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::domain::{now_millis, ScriptRevision};
use crate::dto::{ScriptRevisionResponse, UpdateScriptRequest};
use crate::error::{ControlPlaneError, Result};
use crate::script;
use crate::state::SharedState;

#[derive(Debug, Default, Deserialize)]
pub struct RevisionListQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

/// PUT /v1/load-tests/{id}/script — store a new revision (shim injected),
/// bump the test's latest-revision pointer.
pub async fn update_script(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateScriptRequest>,
) -> Result<Json<ScriptRevisionResponse>> {
    if req.script_content.is_empty() {
        return Err(ControlPlaneError::Validation(
            "scriptContent is required".to_string(),
        ));
    }

    let mut test = state.tests.get(&id).await?;

    let next_number = match state.revisions.get_latest_by_load_test(&id).await {
        Ok(latest) => latest.revision_number + 1,
        Err(_) => 1,
    };

    let injected = script::inject_base64(&req.script_content)?;

    let now = now_millis();
    let revision = ScriptRevision {
        id: uuid::Uuid::new_v4().to_string(),
        load_test_id: id,
        revision_number: next_number,
        script_content: injected,
        description: req.description,
        created_at: now,
        created_by: req.updated_by.clone(),
    };

    state.revisions.create(&revision).await?;

    test.latest_revision_id = revision.id.clone();
    test.updated_at = now;
    test.updated_by = req.updated_by;
    state.tests.update(&test).await?;

    ScriptRevisionResponse::stripped(revision).map(Json)
}

/// GET /v1/load-tests/{id}/script — latest revision, stripped.
pub async fn get_script(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ScriptRevisionResponse>> {
    let revision = state.revisions.get_latest_by_load_test(&id).await?;
    ScriptRevisionResponse::stripped(revision).map(Json)
}

/// GET /v1/load-tests/{id}/script/revisions — history, newest first.
pub async fn list_script_revisions(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(query): Query<RevisionListQuery>,
) -> Result<Json<Vec<ScriptRevisionResponse>>> {
    let revisions = state
        .revisions
        .list_by_load_test(&id, query.limit.unwrap_or(0))
        .await?;

    revisions
        .into_iter()
        .map(ScriptRevisionResponse::stripped)
        .collect::<Result<Vec<_>>>()
        .map(Json)
}

/// GET /v1/load-tests/{id}/script/revisions/{rid}
pub async fn get_script_revision(
    State(state): State<SharedState>,
    Path((_id, revision_id)): Path<(String, String)>,
) -> Result<Json<ScriptRevisionResponse>> {
    let revision = state.revisions.get(&revision_id).await?;
    ScriptRevisionResponse::stripped(revision).map(Json)
}
