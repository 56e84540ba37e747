//! In-memory store backends.
//!
//! Each store guards its map with a readers-writer lock. Reads clone out of
//! the map and writes clone their argument, so callers can never mutate
//! shared state through a returned value.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::{
    AggregatedMetrics, LoadTest, LoadTestRun, MetricsRecord, ScriptRevision,
};
use crate::error::{ControlPlaneError, Result};
use crate::store::{
    LoadTestFilter, LoadTestRunFilter, LoadTestRunStore, LoadTestStore, MetricsStore,
    ScriptRevisionStore, SortBy, SortOrder,
};

const DEFAULT_REVISION_LIST_LIMIT: usize = 10;

#[derive(Default)]
pub struct InMemoryLoadTestStore {
    tests: RwLock<HashMap<String, LoadTest>>,
}

impl InMemoryLoadTestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LoadTestStore for InMemoryLoadTestStore {
    async fn create(&self, test: &LoadTest) -> Result<()> {
        if test.id.is_empty() {
            return Err(ControlPlaneError::Validation(
                "load test id cannot be empty".to_string(),
            ));
        }

        let mut tests = self.tests.write().unwrap();
        if tests.contains_key(&test.id) {
            return Err(ControlPlaneError::AlreadyExists(format!(
                "load test {} already exists",
                test.id
            )));
        }
        tests.insert(test.id.clone(), test.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<LoadTest> {
        let tests = self.tests.read().unwrap();
        tests
            .get(id)
            .cloned()
            .ok_or_else(|| ControlPlaneError::not_found("load test", id))
    }

    async fn update(&self, test: &LoadTest) -> Result<()> {
        let mut tests = self.tests.write().unwrap();
        if !tests.contains_key(&test.id) {
            return Err(ControlPlaneError::not_found("load test", &test.id));
        }
        tests.insert(test.id.clone(), test.clone());
        Ok(())
    }

    async fn list(&self, filter: &LoadTestFilter) -> Result<Vec<LoadTest>> {
        let tests = self.tests.read().unwrap();

        let mut results: Vec<LoadTest> = tests
            .values()
            .filter(|t| {
                matches_opt(&filter.account_id, &t.account_id)
                    && matches_opt(&filter.org_id, &t.org_id)
                    && matches_opt(&filter.project_id, &t.project_id)
                    && matches_opt(&filter.env_id, &t.env_id)
                    && filter
                        .name
                        .as_ref()
                        .is_none_or(|name| t.name.contains(name.as_str()))
                    && (filter.tags.is_empty() || has_any_tag(&t.tags, &filter.tags))
            })
            .cloned()
            .collect();

        sort_and_truncate(
            &mut results,
            filter.sort_by,
            filter.sort_order,
            filter.limit,
            |t| (t.created_at, t.updated_at),
        );
        Ok(results)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut tests = self.tests.write().unwrap();
        if tests.remove(id).is_none() {
            return Err(ControlPlaneError::not_found("load test", id));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryScriptRevisionStore {
    revisions: RwLock<HashMap<String, ScriptRevision>>,
}

impl InMemoryScriptRevisionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScriptRevisionStore for InMemoryScriptRevisionStore {
    async fn create(&self, revision: &ScriptRevision) -> Result<()> {
        let mut revisions = self.revisions.write().unwrap();
        if revisions.contains_key(&revision.id) {
            return Err(ControlPlaneError::AlreadyExists(format!(
                "script revision {} already exists",
                revision.id
            )));
        }
        // (loadTestId, revisionNumber) is unique across the collection.
        if revisions.values().any(|r| {
            r.load_test_id == revision.load_test_id
                && r.revision_number == revision.revision_number
        }) {
            return Err(ControlPlaneError::AlreadyExists(format!(
                "revision {} already exists for load test {}",
                revision.revision_number, revision.load_test_id
            )));
        }
        revisions.insert(revision.id.clone(), revision.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<ScriptRevision> {
        let revisions = self.revisions.read().unwrap();
        revisions
            .get(id)
            .cloned()
            .ok_or_else(|| ControlPlaneError::not_found("script revision", id))
    }

    async fn get_latest_by_load_test(&self, load_test_id: &str) -> Result<ScriptRevision> {
        let revisions = self.revisions.read().unwrap();
        revisions
            .values()
            .filter(|r| r.load_test_id == load_test_id)
            .max_by_key(|r| r.revision_number)
            .cloned()
            .ok_or_else(|| {
                ControlPlaneError::NotFound(format!(
                    "no script revisions found for load test {load_test_id}"
                ))
            })
    }

    async fn list_by_load_test(
        &self,
        load_test_id: &str,
        limit: usize,
    ) -> Result<Vec<ScriptRevision>> {
        let limit = if limit == 0 {
            DEFAULT_REVISION_LIST_LIMIT
        } else {
            limit
        };

        let revisions = self.revisions.read().unwrap();
        let mut results: Vec<ScriptRevision> = revisions
            .values()
            .filter(|r| r.load_test_id == load_test_id)
            .cloned()
            .collect();
        results.sort_by(|a, b| b.revision_number.cmp(&a.revision_number));
        results.truncate(limit);
        Ok(results)
    }
}

#[derive(Default)]
pub struct InMemoryLoadTestRunStore {
    runs: RwLock<HashMap<String, LoadTestRun>>,
}

impl InMemoryLoadTestRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LoadTestRunStore for InMemoryLoadTestRunStore {
    async fn create(&self, run: &LoadTestRun) -> Result<()> {
        if run.id.is_empty() {
            return Err(ControlPlaneError::Validation(
                "load test run id cannot be empty".to_string(),
            ));
        }

        let mut runs = self.runs.write().unwrap();
        if runs.contains_key(&run.id) {
            return Err(ControlPlaneError::AlreadyExists(format!(
                "load test run {} already exists",
                run.id
            )));
        }
        runs.insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<LoadTestRun> {
        let runs = self.runs.read().unwrap();
        runs.get(id)
            .cloned()
            .ok_or_else(|| ControlPlaneError::not_found("load test run", id))
    }

    async fn update(&self, run: &LoadTestRun) -> Result<()> {
        let mut runs = self.runs.write().unwrap();
        if !runs.contains_key(&run.id) {
            return Err(ControlPlaneError::not_found("load test run", &run.id));
        }
        runs.insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn list(&self, filter: &LoadTestRunFilter) -> Result<Vec<LoadTestRun>> {
        let runs = self.runs.read().unwrap();

        let mut results: Vec<LoadTestRun> = runs
            .values()
            .filter(|r| {
                matches_opt(&filter.load_test_id, &r.load_test_id)
                    && matches_opt(&filter.account_id, &r.account_id)
                    && matches_opt(&filter.org_id, &r.org_id)
                    && matches_opt(&filter.project_id, &r.project_id)
                    && matches_opt(&filter.env_id, &r.env_id)
                    && filter
                        .name
                        .as_ref()
                        .is_none_or(|name| r.name.contains(name.as_str()))
                    && filter.status.is_none_or(|s| r.status == s)
            })
            .cloned()
            .collect();

        sort_and_truncate(
            &mut results,
            filter.sort_by,
            filter.sort_order,
            filter.limit,
            |r| (r.created_at, r.updated_at),
        );
        Ok(results)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut runs = self.runs.write().unwrap();
        if runs.remove(id).is_none() {
            return Err(ControlPlaneError::not_found("load test run", id));
        }
        Ok(())
    }
}

/// Time-series records bucketed per run id (the meta field); within a bucket
/// records keep arrival order and are sorted by snapshot timestamp on read.
#[derive(Default)]
pub struct InMemoryMetricsStore {
    records: RwLock<HashMap<String, Vec<MetricsRecord>>>,
}

impl InMemoryMetricsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetricsStore for InMemoryMetricsStore {
    async fn append(&self, record: &MetricsRecord) -> Result<()> {
        let mut records = self.records.write().unwrap();
        records
            .entry(record.load_test_run_id.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn window(&self, run_id: &str, from: i64, to: i64) -> Result<Vec<MetricsRecord>> {
        let records = self.records.read().unwrap();
        let mut results: Vec<MetricsRecord> = records
            .get(run_id)
            .map(|bucket| {
                bucket
                    .iter()
                    .filter(|r| {
                        (from <= 0 || r.snapshot.timestamp >= from)
                            && (to <= 0 || r.snapshot.timestamp <= to)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        results.sort_by_key(|r| r.snapshot.timestamp);
        Ok(results)
    }

    async fn aggregate(&self, run_id: &str) -> Result<AggregatedMetrics> {
        let records = self.records.read().unwrap();
        let bucket = records
            .get(run_id)
            .filter(|b| !b.is_empty())
            .ok_or_else(|| {
                ControlPlaneError::NotFound(format!("no metrics found for run {run_id}"))
            })?;

        let n = bucket.len() as f64;
        let mut agg = AggregatedMetrics {
            min_rps: f64::MAX,
            data_points: bucket.len(),
            ..Default::default()
        };

        for record in bucket {
            let s = &record.snapshot;
            agg.avg_rps += s.total_rps / n;
            agg.max_rps = agg.max_rps.max(s.total_rps);
            agg.min_rps = agg.min_rps.min(s.total_rps);
            agg.avg_p50 += s.p50_response_ms / n;
            agg.avg_p95 += s.p95_response_ms / n;
            agg.avg_p99 += s.p99_response_ms / n;
            agg.max_p95 = agg.max_p95.max(s.p95_response_ms);
            agg.total_requests += s.total_requests;
            agg.total_failures += s.total_failures;
        }

        Ok(agg)
    }
}

fn matches_opt(filter: &Option<String>, value: &str) -> bool {
    filter.as_ref().is_none_or(|f| f == value)
}

fn has_any_tag(tags: &[String], wanted: &[String]) -> bool {
    wanted.iter().any(|w| tags.contains(w))
}

fn sort_and_truncate<T>(
    items: &mut Vec<T>,
    sort_by: SortBy,
    sort_order: SortOrder,
    limit: usize,
    key: impl Fn(&T) -> (i64, i64),
) {
    items.sort_by_key(|item| {
        let (created_at, updated_at) = key(item);
        let k = match sort_by {
            SortBy::CreatedAt => created_at,
            SortBy::UpdatedAt => updated_at,
        };
        match sort_order {
            SortOrder::Asc => k,
            SortOrder::Desc => -k,
        }
    });
    if limit > 0 {
        items.truncate(limit);
    }
}
