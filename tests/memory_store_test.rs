use locust_controlplane::domain::{
    LoadTest, LoadTestRun, MetricSnapshot, MetricsRecord, RunStatus, ScriptRevision,
};
use locust_controlplane::error::ControlPlaneError;
use locust_controlplane::store::{
    InMemoryLoadTestRunStore, InMemoryLoadTestStore, InMemoryMetricsStore,
    InMemoryScriptRevisionStore, LoadTestFilter, LoadTestRunFilter, LoadTestRunStore,
    LoadTestStore, MetricsStore, ScriptRevisionStore, SortBy, SortOrder,
};

fn make_test(id: &str, name: &str, created_at: i64) -> LoadTest {
    LoadTest {
        id: id.to_string(),
        name: name.to_string(),
        description: String::new(),
        tags: Vec::new(),
        account_id: "acct".to_string(),
        org_id: "org".to_string(),
        project_id: "proj".to_string(),
        env_id: String::new(),
        locust_cluster_id: "cluster-1".to_string(),
        target_url: "http://target".to_string(),
        latest_revision_id: String::new(),
        default_users: 1,
        default_spawn_rate: 1.0,
        default_duration_sec: None,
        max_duration_sec: None,
        recent_runs: Vec::new(),
        created_at,
        created_by: String::new(),
        updated_at: created_at,
        updated_by: String::new(),
        metadata: None,
    }
}

fn make_run(id: &str, status: RunStatus, created_at: i64) -> LoadTestRun {
    LoadTestRun {
        id: id.to_string(),
        load_test_id: "t1".to_string(),
        script_revision_id: String::new(),
        name: format!("run {id}"),
        account_id: "acct".to_string(),
        org_id: "org".to_string(),
        project_id: "proj".to_string(),
        env_id: String::new(),
        target_users: 10,
        spawn_rate: 1.0,
        duration_seconds: None,
        status,
        started_at: 0,
        finished_at: 0,
        last_metrics: None,
        created_at,
        created_by: String::new(),
        updated_at: created_at,
        updated_by: String::new(),
        metadata: None,
    }
}

fn make_revision(id: &str, load_test_id: &str, number: u32) -> ScriptRevision {
    ScriptRevision {
        id: id.to_string(),
        load_test_id: load_test_id.to_string(),
        revision_number: number,
        script_content: "c2NyaXB0".to_string(),
        description: String::new(),
        created_at: number as i64,
        created_by: String::new(),
    }
}

fn make_record(run_id: &str, timestamp: i64, rps: f64) -> MetricsRecord {
    MetricsRecord {
        load_test_run_id: run_id.to_string(),
        account_id: "acct".to_string(),
        org_id: "org".to_string(),
        project_id: "proj".to_string(),
        env_id: String::new(),
        snapshot: MetricSnapshot {
            timestamp,
            total_rps: rps,
            total_requests: 10,
            total_failures: 1,
            p50_response_ms: 100.0,
            p95_response_ms: 150.0,
            p99_response_ms: 200.0,
            ..Default::default()
        },
    }
}

#[tokio::test]
async fn load_test_crud_round_trip() {
    let store = InMemoryLoadTestStore::new();
    let test = make_test("t1", "checkout", 100);

    store.create(&test).await.unwrap();
    assert!(matches!(
        store.create(&test).await.unwrap_err(),
        ControlPlaneError::AlreadyExists(_)
    ));

    let mut fetched = store.get("t1").await.unwrap();
    assert_eq!(fetched.name, "checkout");

    // Mutating the returned value must not touch the stored copy.
    fetched.name = "mutated".to_string();
    assert_eq!(store.get("t1").await.unwrap().name, "checkout");

    fetched.name = "renamed".to_string();
    store.update(&fetched).await.unwrap();
    assert_eq!(store.get("t1").await.unwrap().name, "renamed");

    store.delete("t1").await.unwrap();
    assert!(matches!(
        store.get("t1").await.unwrap_err(),
        ControlPlaneError::NotFound(_)
    ));
    assert!(matches!(
        store.delete("t1").await.unwrap_err(),
        ControlPlaneError::NotFound(_)
    ));
}

#[tokio::test]
async fn load_test_filters_and_sorting() {
    let store = InMemoryLoadTestStore::new();

    let mut a = make_test("a", "api smoke", 100);
    a.tags = vec!["smoke".to_string()];
    let mut b = make_test("b", "api stress", 200);
    b.tags = vec!["stress".to_string(), "nightly".to_string()];
    let mut c = make_test("c", "checkout flow", 300);
    c.account_id = "other".to_string();

    store.create(&a).await.unwrap();
    store.create(&b).await.unwrap();
    store.create(&c).await.unwrap();

    // Name substring.
    let filter = LoadTestFilter {
        name: Some("api".to_string()),
        ..Default::default()
    };
    let found = store.list(&filter).await.unwrap();
    assert_eq!(found.len(), 2);

    // Tag any-match.
    let filter = LoadTestFilter {
        tags: vec!["nightly".to_string(), "missing".to_string()],
        ..Default::default()
    };
    let found = store.list(&filter).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "b");

    // Scoping key.
    let filter = LoadTestFilter {
        account_id: Some("other".to_string()),
        ..Default::default()
    };
    let found = store.list(&filter).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "c");

    // Default sort: createdAt descending.
    let found = store.list(&LoadTestFilter::default()).await.unwrap();
    let ids: Vec<_> = found.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["c", "b", "a"]);

    // Ascending with a limit.
    let filter = LoadTestFilter {
        sort_by: SortBy::CreatedAt,
        sort_order: SortOrder::Asc,
        limit: 2,
        ..Default::default()
    };
    let found = store.list(&filter).await.unwrap();
    let ids: Vec<_> = found.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[tokio::test]
async fn run_filters_by_status_and_test() {
    let store = InMemoryLoadTestRunStore::new();

    store
        .create(&make_run("r1", RunStatus::Running, 100))
        .await
        .unwrap();
    store
        .create(&make_run("r2", RunStatus::Finished, 200))
        .await
        .unwrap();
    let mut other = make_run("r3", RunStatus::Running, 300);
    other.load_test_id = "t2".to_string();
    store.create(&other).await.unwrap();

    let filter = LoadTestRunFilter {
        status: Some(RunStatus::Running),
        ..Default::default()
    };
    let running = store.list(&filter).await.unwrap();
    assert_eq!(running.len(), 2);

    let filter = LoadTestRunFilter {
        load_test_id: Some("t1".to_string()),
        status: Some(RunStatus::Running),
        ..Default::default()
    };
    let found = store.list(&filter).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "r1");
}

#[tokio::test]
async fn revisions_are_unique_per_test_and_listed_newest_first() {
    let store = InMemoryScriptRevisionStore::new();

    store.create(&make_revision("v1", "t1", 1)).await.unwrap();
    store.create(&make_revision("v2", "t1", 2)).await.unwrap();
    store.create(&make_revision("v3", "t1", 3)).await.unwrap();
    store.create(&make_revision("o1", "t2", 1)).await.unwrap();

    // Duplicate (loadTestId, revisionNumber) is rejected.
    assert!(matches!(
        store.create(&make_revision("dup", "t1", 3)).await.unwrap_err(),
        ControlPlaneError::AlreadyExists(_)
    ));

    let latest = store.get_latest_by_load_test("t1").await.unwrap();
    assert_eq!(latest.id, "v3");
    assert_eq!(latest.revision_number, 3);

    let listed = store.list_by_load_test("t1", 0).await.unwrap();
    let numbers: Vec<_> = listed.iter().map(|r| r.revision_number).collect();
    assert_eq!(numbers, vec![3, 2, 1]);

    let limited = store.list_by_load_test("t1", 2).await.unwrap();
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[0].revision_number, 3);

    assert!(matches!(
        store.get_latest_by_load_test("absent").await.unwrap_err(),
        ControlPlaneError::NotFound(_)
    ));
}

#[tokio::test]
async fn metrics_window_bounds_and_ordering() {
    let store = InMemoryMetricsStore::new();

    // Appended out of order on purpose.
    store.append(&make_record("r1", 3_000, 3.0)).await.unwrap();
    store.append(&make_record("r1", 1_000, 1.0)).await.unwrap();
    store.append(&make_record("r1", 2_000, 2.0)).await.unwrap();
    store.append(&make_record("r2", 1_500, 9.0)).await.unwrap();

    let all = store.window("r1", 0, 0).await.unwrap();
    let stamps: Vec<_> = all.iter().map(|r| r.snapshot.timestamp).collect();
    assert_eq!(stamps, vec![1_000, 2_000, 3_000]);

    let from_only = store.window("r1", 2_000, 0).await.unwrap();
    assert_eq!(from_only.len(), 2);

    let bounded = store.window("r1", 1_500, 2_500).await.unwrap();
    assert_eq!(bounded.len(), 1);
    assert_eq!(bounded[0].snapshot.timestamp, 2_000);

    let none = store.window("absent", 0, 0).await.unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn metrics_aggregate_over_run() {
    let store = InMemoryMetricsStore::new();

    store.append(&make_record("r1", 1_000, 2.0)).await.unwrap();
    store.append(&make_record("r1", 2_000, 4.0)).await.unwrap();
    store.append(&make_record("r1", 3_000, 6.0)).await.unwrap();

    let agg = store.aggregate("r1").await.unwrap();
    assert_eq!(agg.data_points, 3);
    assert!((agg.avg_rps - 4.0).abs() < 1e-9);
    assert_eq!(agg.max_rps, 6.0);
    assert_eq!(agg.min_rps, 2.0);
    assert_eq!(agg.total_requests, 30);
    assert_eq!(agg.total_failures, 3);
    assert_eq!(agg.max_p95, 150.0);
    assert!((agg.avg_p50 - 100.0).abs() < 1e-9);

    assert!(matches!(
        store.aggregate("absent").await.unwrap_err(),
        ControlPlaneError::NotFound(_)
    ));
}

#[tokio::test]
async fn snapshot_error_rate_invariants() {
    assert_eq!(MetricSnapshot::derive_error_rate(0, 0), 0.0);
    assert_eq!(MetricSnapshot::derive_error_rate(0, 100), 0.0);
    assert_eq!(MetricSnapshot::derive_error_rate(25, 100), 25.0);
    assert_eq!(MetricSnapshot::derive_error_rate(100, 100), 100.0);
}
