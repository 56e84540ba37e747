use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::domain::LocustCluster;
use crate::error::{ControlPlaneError, Result};

/// Locust Control Plane — orchestrates load test runs on Locust clusters.
#[derive(Parser, Debug, Clone)]
#[command(name = "locust-controlplane")]
pub struct CliArgs {
    /// Path to the YAML (or JSON) configuration file
    #[arg(short = 'c', long = "config", default_value = "config/config.yaml")]
    pub config: PathBuf,
}

// Server defaults
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;

// Orchestrator constants
pub const DEFAULT_WATCHDOG_TICK_SECS: u64 = 10;
pub const WORKER_CALL_TIMEOUT_SECS: u64 = 30;
pub const WORKER_STATS_TIMEOUT_SECS: u64 = 10;
pub const RECENT_RUNS_LIMIT: usize = 10;

// HTTP server timeouts
pub const HTTP_READ_TIMEOUT_SECS: u64 = 15;
pub const SERVER_SHUTDOWN_GRACE_SECS: u64 = 30;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default, rename = "locustClusters")]
    pub locust_clusters: Vec<ClusterConfig>,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
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

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityConfig {
    /// Bearer token for user-facing endpoints; empty disables the check.
    #[serde(default)]
    pub api_token: String,
    /// X-Locust-Token for worker callbacks; empty disables the check.
    #[serde(default)]
    pub locust_callback_token: String,
}

/// How metric snapshots reach the control plane. Push and poll are mutually
/// exclusive per deployment; running both would double-count the time-series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricsMode {
    /// The worker plugin POSTs snapshots to the callback endpoints.
    #[default]
    Push,
    /// The watchdog tick fetches /stats/requests from each running cluster.
    Poll,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorConfig {
    /// Watchdog tick in seconds (and poll cadence in poll mode).
    #[serde(default = "default_tick")]
    pub metrics_poll_interval_seconds: u64,
    #[serde(default)]
    pub metrics_mode: MetricsMode,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            metrics_poll_interval_seconds: default_tick(),
            metrics_mode: MetricsMode::default(),
        }
    }
}

fn default_tick() -> u64 {
    DEFAULT_WATCHDOG_TICK_SECS
}

impl Config {
    /// Load configuration from a YAML file, falling back to JSON.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Config> {
        let data = std::fs::read_to_string(path)?;

        let cfg: Config = match serde_yaml::from_str(&data) {
            Ok(cfg) => cfg,
            Err(yaml_err) => serde_json::from_str(&data).map_err(|json_err| {
                anyhow::anyhow!(
                    "failed to parse config as YAML ({yaml_err}) or JSON ({json_err})"
                )
            })?,
        };

        Ok(cfg)
    }

    /// Resolve the Locust cluster for a tenant-shaped key.
    ///
    /// Exact match on account/org/project. The environment matches when either
    /// side is empty, otherwise it must be equal. When several clusters match,
    /// the first in declaration order wins, so resolution is deterministic.
    pub fn cluster_for(
        &self,
        account_id: &str,
        org_id: &str,
        project_id: &str,
        env_id: &str,
    ) -> Result<LocustCluster> {
        for cluster in &self.locust_clusters {
            if cluster.account_id == account_id
                && cluster.org_id == org_id
                && cluster.project_id == project_id
                && (env_id.is_empty() || cluster.env_id.is_empty() || cluster.env_id == env_id)
            {
                return Ok(LocustCluster {
                    id: cluster.id.clone(),
                    base_url: cluster.base_url.clone(),
                    account_id: cluster.account_id.clone(),
                    org_id: cluster.org_id.clone(),
                    project_id: cluster.project_id.clone(),
                    env_id: cluster.env_id.clone(),
                    auth_token: cluster.auth_token.clone(),
                });
            }
        }

        Err(ControlPlaneError::NotFound(format!(
            "no Locust cluster found for account={account_id}, org={org_id}, \
             project={project_id}, env={env_id}"
        )))
    }
}
