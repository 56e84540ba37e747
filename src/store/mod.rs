//! Persistence seams for the control plane.
//!
//! Repositories are async traits so the orchestrator and handlers stay
//! backend-agnostic; the in-memory backends in [`memory`] implement the full
//! filter set.

pub mod memory;

use async_trait::async_trait;

use crate::domain::{
    AggregatedMetrics, LoadTest, LoadTestRun, MetricsRecord, RunStatus, ScriptRevision,
};
use crate::error::Result;

pub use memory::{
    InMemoryLoadTestRunStore, InMemoryLoadTestStore, InMemoryMetricsStore,
    InMemoryScriptRevisionStore,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortBy {
    #[default]
    CreatedAt,
    UpdatedAt,
}

impl SortBy {
    pub fn parse(s: &str) -> SortBy {
        match s {
            "updatedAt" => SortBy::UpdatedAt,
            _ => SortBy::CreatedAt,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(s: &str) -> SortOrder {
        match s {
            "asc" => SortOrder::Asc,
            _ => SortOrder::Desc,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadTestFilter {
    pub account_id: Option<String>,
    pub org_id: Option<String>,
    pub project_id: Option<String>,
    pub env_id: Option<String>,
    /// Substring match on the test name.
    pub name: Option<String>,
    /// Matches tests carrying any of these tags.
    pub tags: Vec<String>,
    pub limit: usize,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
}

#[derive(Debug, Clone, Default)]
pub struct LoadTestRunFilter {
    pub load_test_id: Option<String>,
    pub account_id: Option<String>,
    pub org_id: Option<String>,
    pub project_id: Option<String>,
    pub env_id: Option<String>,
    pub name: Option<String>,
    pub status: Option<RunStatus>,
    pub limit: usize,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
}

#[async_trait]
pub trait LoadTestStore: Send + Sync {
    async fn create(&self, test: &LoadTest) -> Result<()>;
    async fn get(&self, id: &str) -> Result<LoadTest>;
    async fn update(&self, test: &LoadTest) -> Result<()>;
    async fn list(&self, filter: &LoadTestFilter) -> Result<Vec<LoadTest>>;
    async fn delete(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait ScriptRevisionStore: Send + Sync {
    /// Revisions are immutable: no update or delete.
    async fn create(&self, revision: &ScriptRevision) -> Result<()>;
    async fn get(&self, id: &str) -> Result<ScriptRevision>;
    async fn get_latest_by_load_test(&self, load_test_id: &str) -> Result<ScriptRevision>;
    /// Newest-first by revision number. A zero limit means the default of 10.
    async fn list_by_load_test(
        &self,
        load_test_id: &str,
        limit: usize,
    ) -> Result<Vec<ScriptRevision>>;
}

#[async_trait]
pub trait LoadTestRunStore: Send + Sync {
    async fn create(&self, run: &LoadTestRun) -> Result<()>;
    async fn get(&self, id: &str) -> Result<LoadTestRun>;
    async fn update(&self, run: &LoadTestRun) -> Result<()>;
    async fn list(&self, filter: &LoadTestRunFilter) -> Result<Vec<LoadTestRun>>;
    async fn delete(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Append-only; records are never updated.
    async fn append(&self, record: &MetricsRecord) -> Result<()>;
    /// Records for a run within [from, to], ascending by snapshot timestamp.
    /// A bound of 0 leaves that side open.
    async fn window(&self, run_id: &str, from: i64, to: i64) -> Result<Vec<MetricsRecord>>;
    async fn aggregate(&self, run_id: &str) -> Result<AggregatedMetrics>;
}
