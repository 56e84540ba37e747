use std::sync::Arc;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::orchestrator::Orchestrator;
use crate::store::{LoadTestRunStore, LoadTestStore, MetricsStore, ScriptRevisionStore};

pub type SharedState = Arc<AppState>;

/// Shared application state handed to every handler and background task.
pub struct AppState {
    pub config: Arc<Config>,
    pub tests: Arc<dyn LoadTestStore>,
    pub revisions: Arc<dyn ScriptRevisionStore>,
    pub runs: Arc<dyn LoadTestRunStore>,
    pub metrics: Arc<dyn MetricsStore>,
    pub orchestrator: Arc<Orchestrator>,
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        tests: Arc<dyn LoadTestStore>,
        revisions: Arc<dyn ScriptRevisionStore>,
        runs: Arc<dyn LoadTestRunStore>,
        metrics: Arc<dyn MetricsStore>,
        orchestrator: Arc<Orchestrator>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        AppState {
            config,
            tests,
            revisions,
            runs,
            metrics,
            orchestrator,
            shutdown_tx,
        }
    }

    pub fn signal_shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}
