//! Wire DTOs for the HTTP surface.
//!
//! Timestamps at rest are int64 Unix milliseconds; started/finished times on
//! the wire are RFC3339. Script content travels base64-encoded.

use serde::{Deserialize, Serialize};

use crate::domain::{LoadTest, LoadTestRun, MetricSnapshot, ScriptRevision};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLoadTestRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub account_id: String,
    pub org_id: String,
    pub project_id: String,
    #[serde(default)]
    pub env_id: String,
    #[serde(default)]
    pub locust_cluster_id: String,
    pub target_url: String,
    /// Base64-encoded Locust script; becomes revision 1.
    pub script_content: String,
    #[serde(default)]
    pub default_users: u32,
    #[serde(default)]
    pub default_spawn_rate: f64,
    #[serde(default)]
    pub default_duration_sec: Option<u32>,
    #[serde(default)]
    pub max_duration_sec: Option<u32>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLoadTestRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub target_url: Option<String>,
    #[serde(default)]
    pub default_users: Option<u32>,
    #[serde(default)]
    pub default_spawn_rate: Option<f64>,
    #[serde(default)]
    pub default_duration_sec: Option<u32>,
    #[serde(default)]
    pub max_duration_sec: Option<u32>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub updated_by: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateScriptRequest {
    /// Base64-encoded Locust script; becomes the next revision.
    pub script_content: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub updated_by: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLoadTestRunRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub target_users: Option<u32>,
    #[serde(default)]
    pub spawn_rate: Option<f64>,
    #[serde(default)]
    pub duration_seconds: Option<u32>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestStartCallbackRequest {
    pub run_id: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub env_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestStopCallbackRequest {
    pub run_id: String,
    #[serde(default)]
    pub final_metrics: Option<MetricSnapshot>,
    #[serde(default)]
    pub auto_stopped: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsCallbackRequest {
    pub run_id: String,
    pub metrics: MetricSnapshot,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterExternalRequest {
    pub account_id: String,
    pub org_id: String,
    pub project_id: String,
    #[serde(default)]
    pub env_id: String,
    #[serde(default)]
    pub target_users: u32,
    #[serde(default)]
    pub spawn_rate: f64,
    #[serde(default)]
    pub duration_seconds: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadTestResponse {
    #[serde(flatten)]
    pub test: LoadTest,
    /// Latest script with the integration shim stripped; only on single-item
    /// reads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_content: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadTestRunResponse {
    pub id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub load_test_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub script_revision_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub account_id: String,
    pub org_id: String,
    pub project_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub env_id: String,
    pub target_users: u32,
    pub spawn_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u32>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_metrics: Option<MetricSnapshot>,
    pub created_at: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub created_by: String,
    pub updated_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl From<LoadTestRun> for LoadTestRunResponse {
    fn from(run: LoadTestRun) -> Self {
        LoadTestRunResponse {
            id: run.id,
            load_test_id: run.load_test_id,
            script_revision_id: run.script_revision_id,
            name: run.name,
            account_id: run.account_id,
            org_id: run.org_id,
            project_id: run.project_id,
            env_id: run.env_id,
            target_users: run.target_users,
            spawn_rate: run.spawn_rate,
            duration_seconds: run.duration_seconds,
            status: run.status.to_string(),
            started_at: millis_to_rfc3339(run.started_at),
            finished_at: millis_to_rfc3339(run.finished_at),
            last_metrics: run.last_metrics,
            created_at: run.created_at,
            created_by: run.created_by,
            updated_at: run.updated_at,
            metadata: run.metadata,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptRevisionResponse {
    pub id: String,
    pub load_test_id: String,
    pub revision_number: u32,
    pub script_content: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub created_at: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub created_by: String,
}

impl ScriptRevisionResponse {
    /// Response carrying the revision's stored (injected) content.
    pub fn raw(revision: ScriptRevision) -> Self {
        ScriptRevisionResponse {
            id: revision.id,
            load_test_id: revision.load_test_id,
            revision_number: revision.revision_number,
            script_content: revision.script_content,
            description: revision.description,
            created_at: revision.created_at,
            created_by: revision.created_by,
        }
    }

    /// Response with the integration shim stripped from the content.
    pub fn stripped(revision: ScriptRevision) -> crate::error::Result<Self> {
        let clean = crate::script::strip_base64(&revision.script_content)?;
        let mut resp = Self::raw(revision);
        resp.script_content = clean;
        Ok(resp)
    }
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl SuccessResponse {
    pub fn with_message(message: &str) -> Self {
        SuccessResponse {
            success: true,
            message: message.to_string(),
        }
    }
}

pub fn millis_to_rfc3339(millis: i64) -> Option<String> {
    if millis <= 0 {
        return None;
    }
    chrono::DateTime::from_timestamp_millis(millis).map(|dt| dt.to_rfc3339())
}
