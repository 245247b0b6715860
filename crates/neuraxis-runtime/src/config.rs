//! Runtime configuration
//!
//! Flat numeric/string fields with declared bounds, loaded from defaults,
//! an optional JSON file, and `NEURAXIS_`-prefixed environment variables.
//! Invalid configuration is a hard startup failure.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use neuraxis_common::{NeuraxisError, Result};

/// Actuator safety envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyMode {
    Strict,
    Moderate,
    Minimal,
}

impl fmt::Display for SafetyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SafetyMode::Strict => "strict",
            SafetyMode::Moderate => "moderate",
            SafetyMode::Minimal => "minimal",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for SafetyMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "strict" => Ok(SafetyMode::Strict),
            "moderate" => Ok(SafetyMode::Moderate),
            "minimal" => Ok(SafetyMode::Minimal),
            other => Err(format!("unknown safety mode: {}", other)),
        }
    }
}

/// System configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Initial battery level, percent
    pub initial_battery: f64,
    /// Initial user energy level, percent
    pub initial_user_energy: f64,

    /// Discount factor for value estimation
    pub gamma: f64,
    /// Membrane time constant (ms), biological range [1, 100]
    pub tau: f64,

    pub safety_mode: SafetyMode,
    /// Per-cycle watchdog deadline, seconds
    pub watchdog_timeout_s: f64,

    /// Degradation thresholds
    pub energy_threshold: f64,
    pub battery_threshold: f64,

    /// Budget economy
    pub global_resource_pool: f64,
    pub decoder_budget: f64,
    pub planner_budget: f64,
    pub actuator_budget: f64,

    /// Latency SLAs, milliseconds
    pub decoder_sla_ms: f64,
    pub planner_sla_ms: f64,
    pub actuator_sla_ms: f64,

    /// Sensory simulation
    pub n_channels: usize,
    pub sim_window_s: f64,
    pub max_firing_hz: f64,
    pub seed: u64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            initial_battery: 100.0,
            initial_user_energy: 100.0,
            gamma: 0.95,
            tau: 10.0,
            safety_mode: SafetyMode::Strict,
            watchdog_timeout_s: 1.0,
            energy_threshold: 20.0,
            battery_threshold: 10.0,
            global_resource_pool: 1000.0,
            decoder_budget: 200.0,
            planner_budget: 400.0,
            actuator_budget: 400.0,
            decoder_sla_ms: 20.0,
            planner_sla_ms: 50.0,
            actuator_sla_ms: 30.0,
            n_channels: 128,
            sim_window_s: 0.02,
            max_firing_hz: 200.0,
            seed: 1337,
        }
    }
}

fn env_override<T: FromStr>(name: &str, target: &mut T) {
    if let Ok(raw) = std::env::var(name) {
        if let Ok(value) = raw.parse() {
            *target = value;
        }
    }
}

impl SystemConfig {
    /// Load configuration from environment, layered over defaults.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();

        if let Ok(path) = std::env::var("NEURAXIS_CONFIG") {
            cfg = Self::from_file(Path::new(&path))?;
        }

        env_override("NEURAXIS_INITIAL_BATTERY", &mut cfg.initial_battery);
        env_override("NEURAXIS_INITIAL_USER_ENERGY", &mut cfg.initial_user_energy);
        env_override("NEURAXIS_GAMMA", &mut cfg.gamma);
        env_override("NEURAXIS_TAU", &mut cfg.tau);
        env_override("NEURAXIS_SAFETY_MODE", &mut cfg.safety_mode);
        env_override("NEURAXIS_WATCHDOG_TIMEOUT_S", &mut cfg.watchdog_timeout_s);
        env_override("NEURAXIS_ENERGY_THRESHOLD", &mut cfg.energy_threshold);
        env_override("NEURAXIS_BATTERY_THRESHOLD", &mut cfg.battery_threshold);
        env_override("NEURAXIS_GLOBAL_RESOURCE_POOL", &mut cfg.global_resource_pool);
        env_override("NEURAXIS_DECODER_BUDGET", &mut cfg.decoder_budget);
        env_override("NEURAXIS_PLANNER_BUDGET", &mut cfg.planner_budget);
        env_override("NEURAXIS_ACTUATOR_BUDGET", &mut cfg.actuator_budget);
        env_override("NEURAXIS_DECODER_SLA_MS", &mut cfg.decoder_sla_ms);
        env_override("NEURAXIS_PLANNER_SLA_MS", &mut cfg.planner_sla_ms);
        env_override("NEURAXIS_ACTUATOR_SLA_MS", &mut cfg.actuator_sla_ms);
        env_override("NEURAXIS_N_CHANNELS", &mut cfg.n_channels);
        env_override("NEURAXIS_SIM_WINDOW_S", &mut cfg.sim_window_s);
        env_override("NEURAXIS_MAX_FIRING_HZ", &mut cfg.max_firing_hz);
        env_override("NEURAXIS_SEED", &mut cfg.seed);

        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| NeuraxisError::Config(format!("{}: {}", path.display(), e)))?;
        let cfg: Self = serde_json::from_str(&raw)
            .map_err(|e| NeuraxisError::Config(format!("{}: {}", path.display(), e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let check = |ok: bool, msg: &str| -> Result<()> {
            if ok {
                Ok(())
            } else {
                Err(NeuraxisError::Config(msg.to_string()))
            }
        };

        check(
            (0.0..=100.0).contains(&self.initial_battery),
            "initial_battery outside [0, 100]",
        )?;
        check(
            (0.0..=100.0).contains(&self.initial_user_energy),
            "initial_user_energy outside [0, 100]",
        )?;
        check(
            self.gamma > 0.0 && self.gamma < 1.0,
            "gamma outside (0, 1)",
        )?;
        check(
            (1.0..=100.0).contains(&self.tau),
            "tau outside biological range [1, 100]",
        )?;
        check(self.watchdog_timeout_s > 0.0, "watchdog_timeout_s must be > 0")?;
        check(
            (0.0..=100.0).contains(&self.energy_threshold),
            "energy_threshold outside [0, 100]",
        )?;
        check(
            (0.0..=100.0).contains(&self.battery_threshold),
            "battery_threshold outside [0, 100]",
        )?;
        check(
            self.global_resource_pool > 0.0,
            "global_resource_pool must be > 0",
        )?;
        check(self.decoder_budget > 0.0, "decoder_budget must be > 0")?;
        check(self.planner_budget > 0.0, "planner_budget must be > 0")?;
        check(self.actuator_budget > 0.0, "actuator_budget must be > 0")?;
        check(self.decoder_sla_ms > 0.0, "decoder_sla_ms must be > 0")?;
        check(self.planner_sla_ms > 0.0, "planner_sla_ms must be > 0")?;
        check(self.actuator_sla_ms > 0.0, "actuator_sla_ms must be > 0")?;
        check(
            (1..=4096).contains(&self.n_channels),
            "n_channels outside [1, 4096]",
        )?;
        check(
            self.sim_window_s > 0.0 && self.sim_window_s <= 1.0,
            "sim_window_s outside (0, 1]",
        )?;
        check(self.max_firing_hz > 0.0, "max_firing_hz must be > 0")?;
        Ok(())
    }
}
