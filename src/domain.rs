use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle status of a load test run.
///
/// Transitions are monotone: Pending -> Running -> (Stopping ->) terminal.
/// Finished, Stopped and Failed are terminal; Stopping is transitory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    Pending,
    Running,
    Stopping,
    /// Worker reported a manual stop.
    Stopped,
    /// Run completed on its own (duration elapsed or stopped by us).
    Finished,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Finished | RunStatus::Stopped | RunStatus::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Pending => "Pending",
            RunStatus::Running => "Running",
            RunStatus::Stopping => "Stopping",
            RunStatus::Stopped => "Stopped",
            RunStatus::Finished => "Finished",
            RunStatus::Failed => "Failed",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(RunStatus::Pending),
            "Running" => Ok(RunStatus::Running),
            "Stopping" => Ok(RunStatus::Stopping),
            "Stopped" => Ok(RunStatus::Stopped),
            "Finished" => Ok(RunStatus::Finished),
            "Failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

/// A Locust master cluster resolved from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocustCluster {
    pub id: String,
    pub base_url: String,
    pub account_id: String,
    pub org_id: String,
    pub project_id: String,
    #[serde(default)]
    pub env_id: String,
    #[serde(default)]
    pub auth_token: String,
}

/// A reusable load test definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadTest {
    pub id: String,
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
    pub locust_cluster_id: String,
    pub target_url: String,
    /// Points at the highest-numbered revision for this test.
    #[serde(default)]
    pub latest_revision_id: String,
    #[serde(default)]
    pub default_users: u32,
    #[serde(default)]
    pub default_spawn_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_duration_sec: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration_sec: Option<u32>,
    /// Newest-first, at most 10 entries, unique by run id.
    #[serde(default)]
    pub recent_runs: Vec<RecentRun>,
    pub created_at: i64,
    #[serde(default)]
    pub created_by: String,
    pub updated_at: i64,
    #[serde(default)]
    pub updated_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// An immutable, numbered version of a test's Locust script.
/// The stored content is base64 of the plugin-injected script.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptRevision {
    pub id: String,
    pub load_test_id: String,
    pub revision_number: u32,
    pub script_content: String,
    #[serde(default)]
    pub description: String,
    pub created_at: i64,
    #[serde(default)]
    pub created_by: String,
}

/// One execution attempt of a load test.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadTestRun {
    pub id: String,
    /// Empty for externally-registered runs.
    #[serde(default)]
    pub load_test_id: String,
    #[serde(default)]
    pub script_revision_id: String,
    #[serde(default)]
    pub name: String,
    pub account_id: String,
    pub org_id: String,
    pub project_id: String,
    #[serde(default)]
    pub env_id: String,
    pub target_users: u32,
    pub spawn_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u32>,
    pub status: RunStatus,
    /// Unix milliseconds; 0 until the run reaches Running.
    #[serde(default)]
    pub started_at: i64,
    /// Unix milliseconds; 0 until the run reaches a terminal state.
    #[serde(default)]
    pub finished_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_metrics: Option<MetricSnapshot>,
    pub created_at: i64,
    #[serde(default)]
    pub created_by: String,
    pub updated_at: i64,
    #[serde(default)]
    pub updated_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Bounded per-test summary of a run, embedded on the parent LoadTest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentRun {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub status: RunStatus,
    pub target_users: u32,
    pub spawn_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u32>,
    #[serde(default)]
    pub started_at: i64,
    #[serde(default)]
    pub finished_at: i64,
    pub created_at: i64,
    #[serde(default)]
    pub created_by: String,
}

impl RecentRun {
    pub fn from_run(run: &LoadTestRun) -> Self {
        RecentRun {
            id: run.id.clone(),
            name: run.name.clone(),
            status: run.status,
            target_users: run.target_users,
            spawn_rate: run.spawn_rate,
            duration_seconds: run.duration_seconds,
            started_at: run.started_at,
            finished_at: run.finished_at,
            created_at: run.created_at,
            created_by: run.created_by.clone(),
        }
    }
}

/// Point-in-time aggregation of worker metrics for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSnapshot {
    /// Unix milliseconds, assigned by the worker.
    pub timestamp: i64,
    #[serde(default)]
    pub total_rps: f64,
    #[serde(default)]
    pub total_requests: i64,
    #[serde(default)]
    pub total_failures: i64,
    /// Percentage in [0, 100].
    #[serde(default)]
    pub error_rate: f64,
    #[serde(default)]
    pub avg_response_ms: f64,
    #[serde(default)]
    pub min_response_ms: f64,
    #[serde(default)]
    pub max_response_ms: f64,
    #[serde(default)]
    pub p50_response_ms: f64,
    #[serde(default)]
    pub p95_response_ms: f64,
    #[serde(default)]
    pub p99_response_ms: f64,
    #[serde(default)]
    pub current_users: u32,
    /// Keyed by "{method} {name}".
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub request_stats: HashMap<String, ReqStat>,
}

impl MetricSnapshot {
    /// errorRate = 100 * failures / requests, 0 when no requests.
    pub fn derive_error_rate(total_failures: i64, total_requests: i64) -> f64 {
        if total_requests > 0 {
            100.0 * total_failures as f64 / total_requests as f64
        } else {
            0.0
        }
    }
}

/// Per-endpoint statistics inside a snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReqStat {
    pub method: String,
    pub name: String,
    #[serde(default)]
    pub num_requests: i64,
    #[serde(default)]
    pub num_failures: i64,
    #[serde(default)]
    pub avg_response_ms: f64,
    #[serde(default)]
    pub min_response_ms: f64,
    #[serde(default)]
    pub max_response_ms: f64,
    #[serde(default)]
    pub median_response_ms: f64,
    #[serde(default)]
    pub requests_per_sec: f64,
}

/// Append-only historical form of a snapshot, keyed by (run id, timestamp).
/// Scoping keys are denormalised from the run for query locality.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsRecord {
    pub load_test_run_id: String,
    pub account_id: String,
    pub org_id: String,
    pub project_id: String,
    #[serde(default)]
    pub env_id: String,
    #[serde(flatten)]
    pub snapshot: MetricSnapshot,
}

/// Aggregate over all of a run's time-series records.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedMetrics {
    pub avg_rps: f64,
    pub max_rps: f64,
    pub min_rps: f64,
    pub avg_p50: f64,
    pub avg_p95: f64,
    pub avg_p99: f64,
    pub max_p95: f64,
    pub total_requests: i64,
    pub total_failures: i64,
    pub data_points: usize,
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
