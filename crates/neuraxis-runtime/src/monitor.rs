//! Health monitoring and graceful degradation
//!
//! Latency anomaly detection (z-score), budget deficit tracking, and the
//! FULL / REDUCED / MINIMAL / SAFE mode ladder driven by scalar resources
//! and budget health.

use std::collections::{BTreeMap, VecDeque};

use tracing::{info, warn};

use neuraxis_budget::BudgetAllocator;
use neuraxis_common::DegradationMode;

const ANOMALY_WINDOW: usize = 50;
const ANOMALY_MIN_SAMPLES: usize = 10;
const ANOMALY_Z_THRESHOLD: f64 = 3.0;
const ANOMALY_MIN_STD: f64 = 1e-6;

/// Sliding-window z-score detector over per-module latency samples.
#[derive(Debug, Default)]
pub struct AnomalyDetector {
    samples: BTreeMap<String, VecDeque<f64>>,
}

impl AnomalyDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sample(&mut self, name: &str, value: f64) {
        let buf = self.samples.entry(name.to_string()).or_default();
        if buf.len() >= ANOMALY_WINDOW {
            buf.pop_front();
        }
        buf.push_back(value);
    }

    /// True when the latest sample deviates more than the z threshold from
    /// the window mean. Needs a minimum sample count first.
    pub fn detect(&self, name: &str) -> bool {
        let Some(buf) = self.samples.get(name) else {
            return false;
        };
        if buf.len() < ANOMALY_MIN_SAMPLES {
            return false;
        }
        let n = buf.len() as f64;
        let mean = buf.iter().sum::<f64>() / n;
        let variance = buf.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std = variance.sqrt().max(ANOMALY_MIN_STD);
        let last = *buf.back().unwrap_or(&mean);
        ((last - mean) / std).abs() > ANOMALY_Z_THRESHOLD
    }
}

#[derive(Debug, Clone)]
pub struct BudgetHealth {
    pub healthy: bool,
    pub deficits: BTreeMap<String, f64>,
}

/// Flags modules whose remaining budget falls below a floor.
#[derive(Debug)]
pub struct BudgetHealthMonitor {
    thresholds: BTreeMap<String, f64>,
}

impl BudgetHealthMonitor {
    pub fn new(thresholds: BTreeMap<String, f64>) -> Self {
        Self { thresholds }
    }

    pub fn check_health(&self, allocator: &BudgetAllocator) -> BudgetHealth {
        let mut deficits = BTreeMap::new();
        for name in allocator.module_names() {
            let remaining = allocator.ledger(&name).map_or(0.0, |l| l.remaining());
            let threshold = self.thresholds.get(&name).copied().unwrap_or(0.0);
            if remaining < threshold {
                deficits.insert(name, threshold - remaining);
            }
        }
        if !deficits.is_empty() {
            warn!(?deficits, "budget deficits detected");
        }
        BudgetHealth {
            healthy: deficits.is_empty(),
            deficits,
        }
    }
}

/// Maps scalar resources and budget health onto a degradation mode.
#[derive(Debug)]
pub struct DegradationController {
    mode: DegradationMode,
}

impl Default for DegradationController {
    fn default() -> Self {
        Self {
            mode: DegradationMode::Full,
        }
    }
}

impl DegradationController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> DegradationMode {
        self.mode
    }

    /// Scalars below threshold dominate budget health.
    pub fn assess(
        &mut self,
        battery: f64,
        user_energy: f64,
        health: &BudgetHealth,
        battery_threshold: f64,
        energy_threshold: f64,
    ) -> DegradationMode {
        let next = if battery <= battery_threshold || user_energy <= energy_threshold {
            DegradationMode::Safe
        } else if !health.healthy {
            DegradationMode::Reduced
        } else {
            DegradationMode::Full
        };
        if next != self.mode {
            info!(from = %self.mode, to = %next, "degradation mode change");
        }
        self.mode = next;
        next
    }
}
