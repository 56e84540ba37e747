//! Run lifecycle orchestration.
//!
//! Owns the status state machine for load test runs, the metrics ingestion
//! path shared by push callbacks and the poll tick, and the bounded
//! recent-runs summary on the parent test.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::{Config, MetricsMode, RECENT_RUNS_LIMIT};
use crate::domain::{
    now_millis, LoadTestRun, MetricSnapshot, MetricsRecord, RecentRun, RunStatus,
};
use crate::error::{ControlPlaneError, Result};
use crate::locust::{HttpLocustClient, LocustClient};
use crate::store::{
    LoadTestRunFilter, LoadTestRunStore, LoadTestStore, MetricsStore, ScriptRevisionStore,
};

/// Parameters for starting a run; unset fields fall back to test defaults.
#[derive(Debug, Clone, Default)]
pub struct CreateRunParams {
    pub name: String,
    pub target_users: Option<u32>,
    pub spawn_rate: Option<f64>,
    pub duration_seconds: Option<u32>,
    pub created_by: String,
    pub metadata: Option<serde_json::Value>,
}

/// Parameters for registering a run the worker started from its own UI.
#[derive(Debug, Clone, Default)]
pub struct RegisterExternalParams {
    pub account_id: String,
    pub org_id: String,
    pub project_id: String,
    pub env_id: String,
    pub target_users: u32,
    pub spawn_rate: f64,
    pub duration_seconds: Option<u32>,
}

pub struct Orchestrator {
    config: Arc<Config>,
    tests: Arc<dyn LoadTestStore>,
    revisions: Arc<dyn ScriptRevisionStore>,
    runs: Arc<dyn LoadTestRunStore>,
    metrics: Arc<dyn MetricsStore>,
    /// Cluster id -> client; populated once at construction, read-only after.
    clients: HashMap<String, Arc<dyn LocustClient>>,
    /// Serializes the recent-runs read-modify-write so concurrent run
    /// completions cannot lose updates.
    recent_runs_mu: Mutex<()>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<Config>,
        tests: Arc<dyn LoadTestStore>,
        revisions: Arc<dyn ScriptRevisionStore>,
        runs: Arc<dyn LoadTestRunStore>,
        metrics: Arc<dyn MetricsStore>,
        clients: HashMap<String, Arc<dyn LocustClient>>,
    ) -> Self {
        Orchestrator {
            config,
            tests,
            revisions,
            runs,
            metrics,
            clients,
            recent_runs_mu: Mutex::new(()),
        }
    }

    /// Build one HTTP client per configured cluster.
    pub fn clients_from_config(config: &Config) -> HashMap<String, Arc<dyn LocustClient>> {
        config
            .locust_clusters
            .iter()
            .map(|c| {
                let client: Arc<dyn LocustClient> =
                    Arc::new(HttpLocustClient::new(&c.base_url, &c.auth_token));
                (c.id.clone(), client)
            })
            .collect()
    }

    fn client(&self, cluster_id: &str) -> Result<Arc<dyn LocustClient>> {
        self.clients
            .get(cluster_id)
            .cloned()
            .ok_or_else(|| {
                ControlPlaneError::NotFound(format!("no client found for cluster {cluster_id}"))
            })
    }

    /// Create a run for a load test and start it on the resolved cluster.
    ///
    /// Duration is validated against the test's maximum before anything is
    /// persisted; a rejected request leaves no run row behind.
    pub async fn create_run(
        &self,
        load_test_id: &str,
        params: CreateRunParams,
    ) -> Result<LoadTestRun> {
        let test = self.tests.get(load_test_id).await?;

        let target_users = params.target_users.unwrap_or(test.default_users);
        let spawn_rate = params.spawn_rate.unwrap_or(test.default_spawn_rate);
        let duration_seconds = params.duration_seconds.or(test.default_duration_sec);

        if target_users < 1 {
            return Err(ControlPlaneError::Validation(
                "targetUsers must be at least 1".to_string(),
            ));
        }
        if spawn_rate <= 0.0 {
            return Err(ControlPlaneError::Validation(
                "spawnRate must be greater than 0".to_string(),
            ));
        }
        if let (Some(duration), Some(max)) = (duration_seconds, test.max_duration_sec) {
            if duration > max {
                return Err(ControlPlaneError::Conflict(
                    "Duration exceeds maximum allowed duration".to_string(),
                ));
            }
        }

        let revision = self
            .revisions
            .get_latest_by_load_test(load_test_id)
            .await
            .map_err(|_| {
                ControlPlaneError::NotFound("No script found for this load test".to_string())
            })?;

        let now = now_millis();
        let mut run = LoadTestRun {
            id: uuid::Uuid::new_v4().to_string(),
            load_test_id: load_test_id.to_string(),
            script_revision_id: revision.id,
            name: params.name,
            account_id: test.account_id.clone(),
            org_id: test.org_id.clone(),
            project_id: test.project_id.clone(),
            env_id: test.env_id.clone(),
            target_users,
            spawn_rate,
            duration_seconds,
            status: RunStatus::Pending,
            started_at: 0,
            finished_at: 0,
            last_metrics: None,
            created_at: now,
            created_by: params.created_by.clone(),
            updated_at: now,
            updated_by: params.created_by,
            metadata: params.metadata,
        };

        self.runs.create(&run).await?;

        let cluster = match self.config.cluster_for(
            &run.account_id,
            &run.org_id,
            &run.project_id,
            &run.env_id,
        ) {
            Ok(cluster) => cluster,
            Err(err) => {
                self.fail_run(&mut run).await;
                return Err(err);
            }
        };

        let client = match self.client(&cluster.id) {
            Ok(client) => client,
            Err(err) => {
                self.fail_run(&mut run).await;
                return Err(err);
            }
        };

        if let Err(err) = client
            .set_run_context(&run.id, &run.account_id, &run.env_id, run.duration_seconds)
            .await
        {
            warn!(run_id = %run.id, error = %err, "set-context failed");
            self.fail_run(&mut run).await;
            return Err(err);
        }

        if let Err(err) = client.swarm(run.target_users, run.spawn_rate).await {
            warn!(run_id = %run.id, error = %err, "swarm failed");
            self.fail_run(&mut run).await;
            return Err(err);
        }

        let started = now_millis();
        run.status = RunStatus::Running;
        run.started_at = started;
        run.updated_at = started;
        self.runs.update(&run).await?;

        self.patch_recent_runs(&run).await;

        info!(
            run_id = %run.id,
            load_test_id = %run.load_test_id,
            users = run.target_users,
            "run started"
        );
        Ok(run)
    }

    /// Register a run the worker already started from its own UI.
    /// The run is born Running; no context or swarm call is issued.
    pub async fn register_external_run(
        &self,
        params: RegisterExternalParams,
    ) -> Result<LoadTestRun> {
        // Validates that a cluster is actually configured for the key.
        self.config.cluster_for(
            &params.account_id,
            &params.org_id,
            &params.project_id,
            &params.env_id,
        )?;

        let now = now_millis();
        let run = LoadTestRun {
            id: uuid::Uuid::new_v4().to_string(),
            load_test_id: String::new(),
            script_revision_id: String::new(),
            name: "External Locust UI Test".to_string(),
            account_id: params.account_id,
            org_id: params.org_id,
            project_id: params.project_id,
            env_id: params.env_id,
            target_users: params.target_users,
            spawn_rate: params.spawn_rate,
            duration_seconds: params.duration_seconds,
            status: RunStatus::Running,
            started_at: now,
            finished_at: 0,
            last_metrics: None,
            created_at: now,
            created_by: "locust-ui".to_string(),
            updated_at: now,
            updated_by: "locust-ui".to_string(),
            metadata: Some(serde_json::json!({ "source": "locust-ui" })),
        };

        self.runs.create(&run).await?;
        info!(run_id = %run.id, "registered external run");
        Ok(run)
    }

    /// Stop a running test on its worker.
    ///
    /// The run moves to Stopping before the worker call; if the call fails it
    /// stays Stopping so a later worker callback can still finalize it.
    pub async fn stop_run(&self, run_id: &str) -> Result<LoadTestRun> {
        let mut run = self.runs.get(run_id).await?;

        if run.status != RunStatus::Running {
            return Err(ControlPlaneError::Conflict(
                "Can only stop running tests".to_string(),
            ));
        }

        let cluster = self.config.cluster_for(
            &run.account_id,
            &run.org_id,
            &run.project_id,
            &run.env_id,
        )?;
        let client = self.client(&cluster.id)?;

        run.status = RunStatus::Stopping;
        run.updated_at = now_millis();
        self.runs.update(&run).await?;

        client.stop().await?;

        let now = now_millis();
        run.status = RunStatus::Finished;
        run.finished_at = now;
        run.updated_at = now;
        self.runs.update(&run).await?;

        self.patch_recent_runs(&run).await;

        info!(run_id = %run.id, "run stopped");
        Ok(run)
    }

    /// Worker reported the test has started.
    pub async fn handle_test_start(&self, run_id: &str) -> Result<()> {
        let mut run = self.runs.get(run_id).await?;

        if run.status == RunStatus::Pending {
            let now = now_millis();
            run.status = RunStatus::Running;
            run.started_at = now;
            run.updated_at = now;
            self.runs.update(&run).await?;
            info!(run_id, "run started (worker callback)");
        }

        Ok(())
    }

    /// Ingest a metric snapshot: append to the time-series and refresh the
    /// run's embedded latest snapshot. The record keeps the snapshot's own
    /// timestamp, not the ingestion time.
    pub async fn update_metrics(&self, run_id: &str, mut snapshot: MetricSnapshot) -> Result<()> {
        let mut run = self.runs.get(run_id).await?;

        // Keep the error rate consistent with the counters when the sender
        // left it unset.
        if snapshot.error_rate == 0.0 && snapshot.total_failures > 0 {
            snapshot.error_rate = MetricSnapshot::derive_error_rate(
                snapshot.total_failures,
                snapshot.total_requests,
            );
        }

        let record = MetricsRecord {
            load_test_run_id: run.id.clone(),
            account_id: run.account_id.clone(),
            org_id: run.org_id.clone(),
            project_id: run.project_id.clone(),
            env_id: run.env_id.clone(),
            snapshot: snapshot.clone(),
        };
        self.metrics.append(&record).await?;

        run.last_metrics = Some(snapshot);
        run.updated_at = now_millis();
        self.runs.update(&run).await?;

        Ok(())
    }

    /// Worker reported the test has stopped. `auto_stopped` distinguishes a
    /// natural completion (Finished) from a user-initiated one (Stopped).
    /// Duplicate callbacks after a terminal state are tolerated as no-ops.
    pub async fn handle_test_stop(
        &self,
        run_id: &str,
        final_metrics: Option<MetricSnapshot>,
        auto_stopped: bool,
    ) -> Result<()> {
        let mut run = self.runs.get(run_id).await?;

        if run.status.is_terminal() {
            return Ok(());
        }

        let now = now_millis();
        run.status = if auto_stopped {
            RunStatus::Finished
        } else {
            RunStatus::Stopped
        };
        if run.started_at == 0 {
            // Stop can arrive before (or instead of) the start callback.
            run.started_at = now;
        }
        run.finished_at = now;
        run.updated_at = now;
        // Unconditional: a stop without final metrics clears the stale
        // snapshot rather than preserving it.
        run.last_metrics = final_metrics;
        self.runs.update(&run).await?;

        self.patch_recent_runs(&run).await;

        info!(run_id, status = %run.status, "run finished (worker callback)");
        Ok(())
    }

    /// One watchdog tick: stop overdue runs, and in poll mode fetch stats for
    /// every running run through the shared ingestion path.
    pub async fn tick(&self) {
        let filter = LoadTestRunFilter {
            status: Some(RunStatus::Running),
            ..Default::default()
        };

        let running = match self.runs.list(&filter).await {
            Ok(runs) => runs,
            Err(err) => {
                warn!(error = %err, "watchdog: failed to list running runs");
                return;
            }
        };

        for run in running {
            if let Some(duration) = run.duration_seconds {
                if run.started_at > 0
                    && now_millis() - run.started_at >= i64::from(duration) * 1000
                {
                    info!(run_id = %run.id, duration, "duration elapsed, stopping run");
                    match self.stop_run(&run.id).await {
                        Ok(_) => continue,
                        // A concurrent callback already finalized the run.
                        Err(ControlPlaneError::Conflict(_)) => continue,
                        Err(err) => {
                            warn!(run_id = %run.id, error = %err, "watchdog stop failed");
                            continue;
                        }
                    }
                }
            }

            if self.config.orchestrator.metrics_mode == MetricsMode::Poll {
                self.poll_run_metrics(&run).await;
            }
        }
    }

    async fn poll_run_metrics(&self, run: &LoadTestRun) {
        let cluster = match self.config.cluster_for(
            &run.account_id,
            &run.org_id,
            &run.project_id,
            &run.env_id,
        ) {
            Ok(cluster) => cluster,
            Err(err) => {
                warn!(run_id = %run.id, error = %err, "poll: no cluster for run");
                return;
            }
        };

        let client = match self.client(&cluster.id) {
            Ok(client) => client,
            Err(err) => {
                warn!(run_id = %run.id, error = %err, "poll: no client for cluster");
                return;
            }
        };

        // Decode failures skip this tick; the next one retries.
        let snapshot = match client.get_stats().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(run_id = %run.id, error = %err, "poll: stats fetch failed");
                return;
            }
        };

        if let Err(err) = self.update_metrics(&run.id, snapshot).await {
            warn!(run_id = %run.id, error = %err, "poll: metrics update failed");
        }
    }

    async fn fail_run(&self, run: &mut LoadTestRun) {
        let now = now_millis();
        run.status = RunStatus::Failed;
        run.finished_at = now;
        run.updated_at = now;
        if let Err(err) = self.runs.update(run).await {
            warn!(run_id = %run.id, error = %err, "failed to mark run Failed");
        }
    }

    /// Project a run's outcome into its parent test's recent-runs summary:
    /// replace in place by run id or prepend, then truncate to the bound.
    /// The whole read-modify-write runs under one lock.
    async fn patch_recent_runs(&self, run: &LoadTestRun) {
        if run.load_test_id.is_empty() {
            return;
        }

        let _guard = self.recent_runs_mu.lock().await;

        let mut test = match self.tests.get(&run.load_test_id).await {
            Ok(test) => test,
            Err(err) => {
                warn!(
                    load_test_id = %run.load_test_id,
                    error = %err,
                    "recent-runs patch: load test fetch failed"
                );
                return;
            }
        };

        let entry = RecentRun::from_run(run);
        match test.recent_runs.iter_mut().find(|r| r.id == run.id) {
            Some(existing) => *existing = entry,
            None => test.recent_runs.insert(0, entry),
        }
        test.recent_runs.truncate(RECENT_RUNS_LIMIT);
        test.updated_at = now_millis();

        // The run row stays authoritative; a failed patch is only logged.
        if let Err(err) = self.tests.update(&test).await {
            warn!(
                load_test_id = %test.id,
                error = %err,
                "recent-runs patch: load test update failed"
            );
        }
    }
}
