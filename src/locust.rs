//! HTTP adapter over a single Locust master cluster.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::config::{WORKER_CALL_TIMEOUT_SECS, WORKER_STATS_TIMEOUT_SECS};
use crate::domain::{now_millis, MetricSnapshot, ReqStat};
use crate::error::{ControlPlaneError, Result};

/// Client seam for one worker cluster. Implemented over HTTP in production
/// and mocked in tests.
#[async_trait]
pub trait LocustClient: Send + Sync {
    /// Hand the worker the identifiers it echoes back in callbacks.
    async fn set_run_context(
        &self,
        run_id: &str,
        tenant_id: &str,
        env_id: &str,
        duration_seconds: Option<u32>,
    ) -> Result<()>;

    /// Start a load test with the given user count and spawn rate.
    async fn swarm(&self, users: u32, spawn_rate: f64) -> Result<()>;

    /// Stop the current load test.
    async fn stop(&self) -> Result<()>;

    /// Fetch current statistics (poll mode only).
    async fn get_stats(&self) -> Result<MetricSnapshot>;
}

pub struct HttpLocustClient {
    base_url: String,
    auth_token: String,
    http: reqwest::Client,
}

impl HttpLocustClient {
    pub fn new(base_url: &str, auth_token: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(WORKER_CALL_TIMEOUT_SECS))
            .build()
            .expect("failed to build HTTP client");

        HttpLocustClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: auth_token.to_string(),
            http,
        }
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.auth_token.is_empty() {
            req
        } else {
            req.bearer_auth(&self.auth_token)
        }
    }

    async fn check_status(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            let prefix: String = body.chars().take(200).collect();
            return Err(ControlPlaneError::Transport(format!(
                "{what} request failed with status {status}: {prefix}"
            )));
        }
        Ok(resp)
    }
}

#[async_trait]
impl LocustClient for HttpLocustClient {
    async fn set_run_context(
        &self,
        run_id: &str,
        tenant_id: &str,
        env_id: &str,
        duration_seconds: Option<u32>,
    ) -> Result<()> {
        let url = format!("{}/controlplane/set-context", self.base_url);
        let body = serde_json::json!({
            "runId": run_id,
            "tenantId": tenant_id,
            "envId": env_id,
            "durationSeconds": duration_seconds,
        });

        let resp = self.authorize(self.http.post(&url)).json(&body).send().await?;
        Self::check_status(resp, "set-context").await?;
        Ok(())
    }

    async fn swarm(&self, users: u32, spawn_rate: f64) -> Result<()> {
        let url = format!("{}/swarm", self.base_url);
        debug!(users, spawn_rate, %url, "starting swarm");

        // Locust's /swarm endpoint takes form-encoded fields.
        let form = [
            ("user_count", users.to_string()),
            ("spawn_rate", format!("{spawn_rate:.2}")),
        ];

        let resp = self.authorize(self.http.post(&url)).form(&form).send().await?;
        Self::check_status(resp, "swarm").await?;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let url = format!("{}/stop", self.base_url);
        let resp = self.authorize(self.http.get(&url)).send().await?;
        Self::check_status(resp, "stop").await?;
        Ok(())
    }

    async fn get_stats(&self) -> Result<MetricSnapshot> {
        let url = format!("{}/stats/requests", self.base_url);
        let resp = self
            .authorize(self.http.get(&url))
            .timeout(Duration::from_secs(WORKER_STATS_TIMEOUT_SECS))
            .send()
            .await?;
        let resp = Self::check_status(resp, "stats").await?;

        let stats: LocustStatsResponse = resp
            .json()
            .await
            .map_err(|e| ControlPlaneError::Transport(format!("failed to decode stats: {e}")))?;

        Ok(convert_stats(&stats))
    }
}

/// Shape of the worker's native /stats/requests response.
#[derive(Debug, Default, Deserialize)]
pub struct LocustStatsResponse {
    #[serde(default)]
    pub stats: Vec<LocustEndpointStats>,
    #[serde(default)]
    pub total_rps: f64,
    /// Decimal in [0, 1], not a percentage.
    #[serde(default)]
    pub fail_ratio: f64,
    #[serde(default)]
    pub user_count: u32,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub total_avg_response_time: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct LocustEndpointStats {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub num_requests: i64,
    #[serde(default)]
    pub num_failures: i64,
    #[serde(default)]
    pub avg_response_time: f64,
    #[serde(default)]
    pub min_response_time: f64,
    #[serde(default)]
    pub max_response_time: f64,
    #[serde(default)]
    pub median_response_time: f64,
    #[serde(default)]
    pub current_rps: f64,
}

/// Convert the worker's native stats shape into a snapshot.
///
/// When an "Aggregated"/"Total" entry is present its counters win; otherwise
/// per-endpoint counters are summed and the largest per-endpoint median is
/// taken as a conservative p50. p95/p99 are approximated from p50 here
/// because the native endpoint does not expose them; the push path carries
/// real percentiles.
pub fn convert_stats(stats: &LocustStatsResponse) -> MetricSnapshot {
    let mut snapshot = MetricSnapshot {
        timestamp: now_millis(),
        total_rps: stats.total_rps,
        error_rate: stats.fail_ratio * 100.0,
        current_users: stats.user_count,
        ..Default::default()
    };

    let mut total_requests: i64 = 0;
    let mut total_failures: i64 = 0;
    let mut sum_avg_response = 0.0;
    let mut max_median = 0.0_f64;
    let mut valid_entries = 0u32;
    let mut request_stats = HashMap::new();

    for entry in &stats.stats {
        if entry.name == "Aggregated" || entry.name == "Total" {
            if entry.num_requests > 0 {
                snapshot.total_requests = entry.num_requests;
                snapshot.total_failures = entry.num_failures;
                snapshot.avg_response_ms = entry.avg_response_time;
                snapshot.p50_response_ms = entry.median_response_time;
            }
            continue;
        }

        total_requests += entry.num_requests;
        total_failures += entry.num_failures;

        if entry.num_requests > 0 {
            sum_avg_response += entry.avg_response_time;
            valid_entries += 1;
            max_median = max_median.max(entry.median_response_time);
        }

        request_stats.insert(
            format!("{} {}", entry.method, entry.name),
            ReqStat {
                method: entry.method.clone(),
                name: entry.name.clone(),
                num_requests: entry.num_requests,
                num_failures: entry.num_failures,
                avg_response_ms: entry.avg_response_time,
                min_response_ms: entry.min_response_time,
                max_response_ms: entry.max_response_time,
                median_response_ms: entry.median_response_time,
                requests_per_sec: entry.current_rps,
            },
        );
    }

    snapshot.request_stats = request_stats;

    if snapshot.total_requests == 0 {
        snapshot.total_requests = total_requests;
        snapshot.total_failures = total_failures;
    }

    if snapshot.avg_response_ms == 0.0 && valid_entries > 0 {
        snapshot.avg_response_ms = sum_avg_response / valid_entries as f64;
    }

    if snapshot.p50_response_ms == 0.0 {
        snapshot.p50_response_ms = max_median;
    }

    // Approximation: the native stats carry no p95/p99.
    if snapshot.p50_response_ms > 0.0 {
        snapshot.p95_response_ms = snapshot.p50_response_ms * 1.5;
        snapshot.p99_response_ms = snapshot.p50_response_ms * 2.0;
    }

    if stats.total_avg_response_time > 0.0 {
        snapshot.avg_response_ms = stats.total_avg_response_time;
    }

    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convert_prefers_aggregated_entry() {
        let stats = LocustStatsResponse {
            stats: vec![
                LocustEndpointStats {
                    method: "GET".into(),
                    name: "/products".into(),
                    num_requests: 40,
                    num_failures: 1,
                    avg_response_time: 120.0,
                    median_response_time: 100.0,
                    current_rps: 4.0,
                    ..Default::default()
                },
                LocustEndpointStats {
                    name: "Aggregated".into(),
                    num_requests: 50,
                    num_failures: 2,
                    avg_response_time: 110.0,
                    median_response_time: 90.0,
                    ..Default::default()
                },
            ],
            total_rps: 5.0,
            fail_ratio: 0.04,
            user_count: 10,
            ..Default::default()
        };

        let snapshot = convert_stats(&stats);
        assert_eq!(snapshot.total_requests, 50);
        assert_eq!(snapshot.total_failures, 2);
        assert_eq!(snapshot.p50_response_ms, 90.0);
        assert_eq!(snapshot.p95_response_ms, 135.0);
        assert_eq!(snapshot.p99_response_ms, 180.0);
        assert!((snapshot.error_rate - 4.0).abs() < 1e-9);
        assert_eq!(snapshot.current_users, 10);
        assert!(snapshot.request_stats.contains_key("GET /products"));
        assert!(!snapshot.request_stats.contains_key(" Aggregated"));
    }

    #[test]
    fn convert_falls_back_to_endpoint_sums() {
        let stats = LocustStatsResponse {
            stats: vec![
                LocustEndpointStats {
                    method: "GET".into(),
                    name: "/a".into(),
                    num_requests: 30,
                    num_failures: 3,
                    avg_response_time: 100.0,
                    median_response_time: 80.0,
                    ..Default::default()
                },
                LocustEndpointStats {
                    method: "POST".into(),
                    name: "/b".into(),
                    num_requests: 10,
                    num_failures: 0,
                    avg_response_time: 200.0,
                    median_response_time: 150.0,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let snapshot = convert_stats(&stats);
        assert_eq!(snapshot.total_requests, 40);
        assert_eq!(snapshot.total_failures, 3);
        // Conservative p50: the largest per-endpoint median.
        assert_eq!(snapshot.p50_response_ms, 150.0);
        assert_eq!(snapshot.avg_response_ms, 150.0);
    }
}
