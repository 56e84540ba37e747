use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD as Base64;
use base64::Engine;
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

use locust_controlplane::config::{ClusterConfig, Config};
use locust_controlplane::domain::{now_millis, LoadTestRun, MetricSnapshot, RunStatus};
use locust_controlplane::error::{ControlPlaneError, Result};
use locust_controlplane::locust::LocustClient;
use locust_controlplane::orchestrator::Orchestrator;
use locust_controlplane::server::build_router;
use locust_controlplane::state::{AppState, SharedState};
use locust_controlplane::store::{
    InMemoryLoadTestRunStore, InMemoryLoadTestStore, InMemoryMetricsStore,
    InMemoryScriptRevisionStore, LoadTestRunStore,
};

const API_TOKEN: &str = "api-secret";
const CALLBACK_TOKEN: &str = "locust-secret";
const USER_SCRIPT: &str = "from locust import HttpUser\nclass U(HttpUser): pass";

struct StubLocustClient {
    fail_swarm: bool,
}

#[async_trait]
impl LocustClient for StubLocustClient {
    async fn set_run_context(
        &self,
        _run_id: &str,
        _tenant_id: &str,
        _env_id: &str,
        _duration_seconds: Option<u32>,
    ) -> Result<()> {
        Ok(())
    }

    async fn swarm(&self, _users: u32, _spawn_rate: f64) -> Result<()> {
        if self.fail_swarm {
            return Err(ControlPlaneError::Transport(
                "swarm request failed with status 500".into(),
            ));
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    async fn get_stats(&self) -> Result<MetricSnapshot> {
        Ok(MetricSnapshot::default())
    }
}

fn test_state(fail_swarm: bool) -> SharedState {
    let mut config = Config::default();
    config.locust_clusters = vec![ClusterConfig {
        id: "cluster-1".to_string(),
        base_url: "http://locust-master:8089".to_string(),
        account_id: "acct".to_string(),
        org_id: "org".to_string(),
        project_id: "proj".to_string(),
        env_id: String::new(),
        auth_token: String::new(),
    }];
    config.security.api_token = API_TOKEN.to_string();
    config.security.locust_callback_token = CALLBACK_TOKEN.to_string();
    let config = Arc::new(config);

    let tests = Arc::new(InMemoryLoadTestStore::new());
    let revisions = Arc::new(InMemoryScriptRevisionStore::new());
    let runs = Arc::new(InMemoryLoadTestRunStore::new());
    let metrics = Arc::new(InMemoryMetricsStore::new());

    let mut clients: HashMap<String, Arc<dyn LocustClient>> = HashMap::new();
    clients.insert(
        "cluster-1".to_string(),
        Arc::new(StubLocustClient { fail_swarm }),
    );

    let orchestrator = Arc::new(Orchestrator::new(
        config.clone(),
        tests.clone(),
        revisions.clone(),
        runs.clone(),
        metrics.clone(),
        clients,
    ));

    Arc::new(AppState::new(
        config,
        tests,
        revisions,
        runs,
        metrics,
        orchestrator,
    ))
}

fn app(state: &SharedState) -> Router {
    build_router(state.clone())
}

fn user_request(method: &str, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {API_TOKEN}"));

    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn callback_request(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("X-Locust-Token", CALLBACK_TOKEN)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn create_test_body(max_duration: Option<u32>) -> serde_json::Value {
    let mut body = serde_json::json!({
        "name": "checkout flow",
        "accountId": "acct",
        "orgId": "org",
        "projectId": "proj",
        "locustClusterId": "cluster-1",
        "targetUrl": "http://target:8080",
        "scriptContent": Base64.encode(USER_SCRIPT),
        "defaultUsers": 10,
        "defaultSpawnRate": 1.0,
        "createdBy": "tester",
    });
    match max_duration {
        // The default has to respect the cap.
        Some(max) => {
            body["defaultDurationSec"] = serde_json::json!(max);
            body["maxDurationSec"] = serde_json::json!(max);
        }
        None => body["defaultDurationSec"] = serde_json::json!(60),
    }
    body
}

async fn create_test(state: &SharedState, max_duration: Option<u32>) -> String {
    let response = app(state)
        .oneshot(user_request(
            "POST",
            "/v1/load-tests",
            Some(create_test_body(max_duration)),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_is_open() {
    let state = test_state(false);
    let response = app(&state)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn user_endpoints_require_bearer_token() {
    let state = test_state(false);

    let response = app(&state)
        .oneshot(
            Request::builder()
                .uri("/v1/load-tests")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app(&state)
        .oneshot(
            Request::builder()
                .uri("/v1/load-tests")
                .header(header::AUTHORIZATION, "Bearer wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app(&state)
        .oneshot(user_request("GET", "/v1/load-tests", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn callback_endpoints_use_locust_token() {
    let state = test_state(false);

    let response = app(&state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/internal/locust/test-start")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"runId":"r1"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Valid token, unknown run: auth passed, lookup failed.
    let response = app(&state)
        .oneshot(callback_request(
            "/v1/internal/locust/test-start",
            serde_json::json!({"runId": "r1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_test_returns_stripped_script_on_read() {
    let state = test_state(false);
    let id = create_test(&state, None).await;

    let response = app(&state)
        .oneshot(user_request("GET", &format!("/v1/load-tests/{id}"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;

    assert_eq!(body["name"], "checkout flow");
    assert!(!body["latestRevisionId"].as_str().unwrap().is_empty());

    let script = body["scriptContent"].as_str().unwrap();
    let decoded = String::from_utf8(Base64.decode(script).unwrap()).unwrap();
    assert_eq!(decoded, USER_SCRIPT);
}

#[tokio::test]
async fn script_revision_workflow() {
    let state = test_state(false);
    let id = create_test(&state, None).await;

    let s2 = "from locust import HttpUser\nclass V2(HttpUser): pass";
    let s3 = "from locust import HttpUser\nclass V3(HttpUser): pass";

    for (script, expected_number) in [(s2, 2), (s3, 3)] {
        let response = app(&state)
            .oneshot(user_request(
                "PUT",
                &format!("/v1/load-tests/{id}/script"),
                Some(serde_json::json!({
                    "scriptContent": Base64.encode(script),
                    "description": "update",
                    "updatedBy": "tester",
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["revisionNumber"], expected_number);
    }

    // Latest pointer follows revision 3.
    let response = app(&state)
        .oneshot(user_request("GET", &format!("/v1/load-tests/{id}/script"), None))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["revisionNumber"], 3);
    let decoded = String::from_utf8(
        Base64.decode(body["scriptContent"].as_str().unwrap()).unwrap(),
    )
    .unwrap();
    assert_eq!(decoded, s3);

    // History is newest-first with gap-free numbering.
    let response = app(&state)
        .oneshot(user_request(
            "GET",
            &format!("/v1/load-tests/{id}/script/revisions"),
            None,
        ))
        .await
        .unwrap();
    let body = json_body(response).await;
    let numbers: Vec<_> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["revisionNumber"].as_u64().unwrap())
        .collect();
    assert_eq!(numbers, vec![3, 2, 1]);
}

#[tokio::test]
async fn create_run_with_empty_body_uses_defaults() {
    let state = test_state(false);
    let id = create_test(&state, None).await;

    let response = app(&state)
        .oneshot(user_request(
            "POST",
            &format!("/v1/load-tests/{id}/runs"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;

    assert_eq!(body["status"], "Running");
    assert_eq!(body["targetUsers"], 10);
    assert_eq!(body["durationSeconds"], 60);
    assert!(body["startedAt"].as_str().is_some());
}

#[tokio::test]
async fn run_for_unknown_test_is_404() {
    let state = test_state(false);
    let response = app(&state)
        .oneshot(user_request("POST", "/v1/load-tests/absent/runs", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn duration_exceeding_max_is_rejected_with_400() {
    let state = test_state(false);
    let id = create_test(&state, Some(30)).await;

    let response = app(&state)
        .oneshot(user_request(
            "POST",
            &format!("/v1/load-tests/{id}/runs"),
            Some(serde_json::json!({"durationSeconds": 60})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Duration exceeds maximum allowed duration");

    // No run row was persisted.
    let response = app(&state)
        .oneshot(user_request("GET", &format!("/v1/load-tests/{id}/runs"), None))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn swarm_failure_surfaces_500_and_marks_run_failed() {
    let state = test_state(true);
    let id = create_test(&state, None).await;

    let response = app(&state)
        .oneshot(user_request(
            "POST",
            &format!("/v1/load-tests/{id}/runs"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let response = app(&state)
        .oneshot(user_request("GET", &format!("/v1/load-tests/{id}/runs"), None))
        .await
        .unwrap();
    let body = json_body(response).await;
    let runs = body.as_array().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["status"], "Failed");
    assert!(runs[0]["startedAt"].as_str().is_none());
}

#[tokio::test]
async fn stopping_a_pending_run_is_rejected() {
    let state = test_state(false);

    let now = now_millis();
    let pending = LoadTestRun {
        id: "r-pending".to_string(),
        load_test_id: String::new(),
        script_revision_id: String::new(),
        name: String::new(),
        account_id: "acct".to_string(),
        org_id: "org".to_string(),
        project_id: "proj".to_string(),
        env_id: String::new(),
        target_users: 10,
        spawn_rate: 1.0,
        duration_seconds: None,
        status: RunStatus::Pending,
        started_at: 0,
        finished_at: 0,
        last_metrics: None,
        created_at: now,
        created_by: String::new(),
        updated_at: now,
        updated_by: String::new(),
        metadata: None,
    };
    state.runs.create(&pending).await.unwrap();

    let response = app(&state)
        .oneshot(user_request("POST", "/v1/runs/r-pending/stop", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Can only stop running tests");

    let run = state.runs.get("r-pending").await.unwrap();
    assert_eq!(run.status, RunStatus::Pending);
}

#[tokio::test]
async fn metrics_pushes_feed_the_timeseries_endpoints() {
    let state = test_state(false);
    let id = create_test(&state, None).await;

    let response = app(&state)
        .oneshot(user_request(
            "POST",
            &format!("/v1/load-tests/{id}/runs"),
            None,
        ))
        .await
        .unwrap();
    let run_id = json_body(response).await["id"].as_str().unwrap().to_string();

    // Out-of-order arrival: the later snapshot is pushed first.
    for (ts, rps) in [(2_000_i64, 8.0), (1_000_i64, 5.0)] {
        let response = app(&state)
            .oneshot(callback_request(
                "/v1/internal/locust/metrics",
                serde_json::json!({
                    "runId": run_id,
                    "metrics": {
                        "timestamp": ts,
                        "totalRps": rps,
                        "totalRequests": 25,
                        "totalFailures": 0,
                        "currentUsers": 10,
                        "p50ResponseMs": 100.0,
                        "p95ResponseMs": 150.0,
                        "p99ResponseMs": 200.0,
                    },
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app(&state)
        .oneshot(user_request(
            "GET",
            &format!("/v1/runs/{run_id}/metrics/timeseries"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let points = body["points"].as_array().unwrap();
    assert_eq!(points.len(), 2);
    assert_eq!(points[0]["timestamp"], 1_000);
    assert_eq!(points[1]["timestamp"], 2_000);

    let response = app(&state)
        .oneshot(user_request(
            "GET",
            &format!("/v1/runs/{run_id}/metrics/aggregate"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["aggregate"]["dataPoints"], 2);
    assert_eq!(body["aggregate"]["totalRequests"], 50);

    // lastMetrics reflects the last writer (timestamp 1000).
    let response = app(&state)
        .oneshot(user_request("GET", &format!("/v1/runs/{run_id}"), None))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["lastMetrics"]["timestamp"], 1_000);
}

#[tokio::test]
async fn test_stop_callback_finalizes_run_and_recent_runs() {
    let state = test_state(false);
    let id = create_test(&state, None).await;

    let response = app(&state)
        .oneshot(user_request(
            "POST",
            &format!("/v1/load-tests/{id}/runs"),
            None,
        ))
        .await
        .unwrap();
    let run_id = json_body(response).await["id"].as_str().unwrap().to_string();

    let response = app(&state)
        .oneshot(callback_request(
            "/v1/internal/locust/test-stop",
            serde_json::json!({
                "runId": run_id,
                "autoStopped": true,
                "finalMetrics": {
                    "timestamp": 62_000,
                    "totalRps": 4.8,
                    "totalRequests": 300,
                    "totalFailures": 3,
                },
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app(&state)
        .oneshot(user_request("GET", &format!("/v1/runs/{run_id}"), None))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["status"], "Finished");
    assert!(body["finishedAt"].as_str().is_some());

    let response = app(&state)
        .oneshot(user_request("GET", &format!("/v1/load-tests/{id}"), None))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["recentRuns"][0]["id"], run_id.as_str());
    assert_eq!(body["recentRuns"][0]["status"], "Finished");
}

#[tokio::test]
async fn register_external_creates_running_run() {
    let state = test_state(false);

    let response = app(&state)
        .oneshot(callback_request(
            "/v1/internal/locust/register-external",
            serde_json::json!({
                "accountId": "acct",
                "orgId": "org",
                "projectId": "proj",
                "targetUsers": 15,
                "spawnRate": 1.5,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let run_id = body["runId"].as_str().unwrap().to_string();

    let run = state.runs.get(&run_id).await.unwrap();
    assert_eq!(run.status, RunStatus::Running);
    assert_eq!(run.created_by, "locust-ui");
}
