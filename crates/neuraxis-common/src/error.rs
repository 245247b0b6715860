//! Error types for the Neuraxis control loop
//!
//! Provides a unified error type and domain-specific error variants.
//!
//! Note that a denied budget request and a failed stability gate are *not*
//! errors; they are ordinary control-flow signals. Only contract breaches,
//! integrity failures, and resilience faults surface here.

use thiserror::Error;

/// Result type alias using NeuraxisError
pub type Result<T> = std::result::Result<T, NeuraxisError>;

/// Unified error type for Neuraxis operations
#[derive(Debug, Error)]
pub enum NeuraxisError {
    // Runtime contract breaches
    #[error("Invariant violation: {0}")]
    Invariant(#[from] InvariantViolation),

    // Policy artifact integrity
    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    // Watchdog / circuit breaker faults
    #[error("Resilience error: {0}")]
    Resilience(#[from] ResilienceError),

    // Sensory source contract breaches
    #[error("Sensory error: {0}")]
    Sensory(String),

    // Actuator rejections
    #[error("Actuator error: {0}")]
    Actuator(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Runtime invariant violations on observable state
///
/// These are always fatal to the current validation point and are never
/// silently clamped.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InvariantViolation {
    #[error("battery_pct must be finite, got {value}")]
    BatteryNotFinite { value: f64 },

    #[error("battery_pct out of range [0, 100]: {value}")]
    BatteryOutOfRange { value: f64 },

    #[error("user_energy_pct must be finite, got {value}")]
    EnergyNotFinite { value: f64 },

    #[error("user_energy_pct out of range: {value}")]
    EnergyOutOfRange { value: f64 },

    #[error("budget for {module} must be finite")]
    BudgetNotFinite { module: String },

    #[error("budget for {module} must be >= 0, got {value}")]
    BudgetNegative { module: String, value: f64 },

    #[error("SLA for {module} must be finite and > 0, got {value}")]
    SlaNonPositive { module: String, value: f64 },

    #[error("missing module budgets: {missing:?}")]
    MissingModules { missing: Vec<String> },
}

/// Policy artifact integrity errors
///
/// Any of these at planner construction disables reinforcement-based
/// decisions for the remainder of the process (fail closed).
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("policy artifact or checksum sidecar missing: {path}")]
    Missing { path: String },

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("weights shape mismatch: expected {expected} entries, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("artifact decode failed: {0}")]
    Decode(String),

    #[error("artifact write failed: {0}")]
    Write(String),
}

/// Watchdog and circuit-breaker faults
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResilienceError {
    #[error("watchdog timeout: cycle exceeded {timeout_ms}ms deadline")]
    WatchdogTimeout { timeout_ms: u64 },

    #[error("circuit breaker is open ({failures} consecutive failures)")]
    BreakerOpen { failures: u32 },
}

impl From<serde_json::Error> for NeuraxisError {
    fn from(err: serde_json::Error) -> Self {
        NeuraxisError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for NeuraxisError {
    fn from(err: std::io::Error) -> Self {
        NeuraxisError::Storage(err.to_string())
    }
}

impl NeuraxisError {
    /// Whether this error must terminate the run rather than the cycle.
    ///
    /// Invariant violations and watchdog timeouts indicate the loop's own
    /// guarantees have broken down; everything else is scoped to one cycle
    /// phase.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            NeuraxisError::Invariant(_)
                | NeuraxisError::Resilience(ResilienceError::WatchdogTimeout { .. })
        )
    }
}
