//! Metrics collection and export
//!
//! Latency samples, scalar readings, and reinforcement metrics are held in
//! memory and exported as structured JSON plus a columnar CSV. Columnar
//! export degrades to the JSON snapshot if the CSV write fails.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;
use tracing::warn;

use neuraxis_common::Result;
use neuraxis_policy::RlMetrics;

#[derive(Debug, Default)]
pub struct MetricsCollector {
    latencies_s: BTreeMap<String, Vec<f64>>,
    pub battery_level: f64,
    pub user_energy_level: f64,
    pub bellman_error: f64,
    rl: Option<RlMetrics>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_latency(&mut self, name: &str, duration_s: f64) {
        self.latencies_s
            .entry(name.to_string())
            .or_default()
            .push(duration_s);
    }

    pub fn latencies(&self, name: &str) -> &[f64] {
        self.latencies_s.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn set_rl_metrics(&mut self, metrics: RlMetrics) {
        self.rl = Some(metrics);
    }

    pub fn snapshot(&self) -> serde_json::Value {
        let rl = self.rl.as_ref().map(|m| {
            json!({
                "rl/epsilon": m.epsilon,
                "rl/td_error_mean": m.td_error_mean,
                "rl/policy_version": m.policy_version,
                "rl/enabled": m.enabled,
            })
        });
        json!({
            "ts": chrono::Utc::now().timestamp_millis(),
            "battery": self.battery_level,
            "user_energy": self.user_energy_level,
            "bellman_error": self.bellman_error,
            "rl": rl.unwrap_or_else(|| json!({})),
            "latencies_s": self.latencies_s,
        })
    }

    pub fn export_json(&self, path: &Path) -> Result<PathBuf> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_string_pretty(&self.snapshot())?;
        fs::write(path, payload)?;
        Ok(path.to_path_buf())
    }

    /// Columnar (metric, value) export. Falls back to a JSON snapshot next
    /// to the requested path if the CSV write fails.
    pub fn export_csv(&self, path: &Path) -> Result<PathBuf> {
        match self.write_csv(path) {
            Ok(out) => Ok(out),
            Err(err) => {
                warn!(%err, "csv export failed, falling back to json");
                self.export_json(&path.with_extension("json"))
            }
        }
    }

    fn write_csv(&self, path: &Path) -> Result<PathBuf> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(path)
            .map_err(|e| neuraxis_common::NeuraxisError::Storage(e.to_string()))?;
        writer
            .write_record(["metric", "value"])
            .map_err(|e| neuraxis_common::NeuraxisError::Storage(e.to_string()))?;

        for (name, values) in &self.latencies_s {
            for value in values {
                writer
                    .write_record([format!("latency.{}", name), value.to_string()])
                    .map_err(|e| neuraxis_common::NeuraxisError::Storage(e.to_string()))?;
            }
        }
        for (metric, value) in [
            ("battery", self.battery_level),
            ("user_energy", self.user_energy_level),
            ("bellman_error", self.bellman_error),
        ] {
            writer
                .write_record([metric.to_string(), value.to_string()])
                .map_err(|e| neuraxis_common::NeuraxisError::Storage(e.to_string()))?;
        }
        writer
            .flush()
            .map_err(|e| neuraxis_common::NeuraxisError::Storage(e.to_string()))?;
        Ok(path.to_path_buf())
    }
}
