//! Runtime contracts on observable system state
//!
//! The orchestration loop re-validates these every cycle. Violations are
//! fatal to the current validation point: the contract functions return
//! [`InvariantViolation`] rather than clamping.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::InvariantViolation;

/// Service degradation level, most capable first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DegradationMode {
    /// All subsystems active
    Full,
    /// Budget deficits detected, non-essential work shed
    Reduced,
    /// Only simplified actions are executed
    Minimal,
    /// Scalar resources below safety thresholds
    Safe,
}

impl fmt::Display for DegradationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DegradationMode::Full => "FULL",
            DegradationMode::Reduced => "REDUCED",
            DegradationMode::Minimal => "MINIMAL",
            DegradationMode::Safe => "SAFE",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for DegradationMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "FULL" => Ok(DegradationMode::Full),
            "REDUCED" => Ok(DegradationMode::Reduced),
            "MINIMAL" => Ok(DegradationMode::Minimal),
            "SAFE" => Ok(DegradationMode::Safe),
            other => Err(format!("unknown degradation mode: {}", other)),
        }
    }
}

/// Minimal scalar state required to reason about safety and resource behavior.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SystemScalars {
    pub battery_pct: f64,
    pub user_energy_pct: f64,
    pub degradation_mode: DegradationMode,
}

/// Budget invariants are checked on observable quantities only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetSnapshot {
    /// Remaining budget per module
    pub budgets: BTreeMap<String, f64>,
    /// Configured SLA per module (milliseconds)
    pub slas_ms: BTreeMap<String, f64>,
}

/// Validate scalar resource state.
///
/// Invariants:
/// - battery_pct is finite and in [0, 100]
/// - user_energy_pct is finite and in [0, 100] unless `allow_negative_energy`
pub fn validate_system_scalars(
    state: &SystemScalars,
    allow_negative_energy: bool,
) -> std::result::Result<(), InvariantViolation> {
    if !state.battery_pct.is_finite() {
        return Err(InvariantViolation::BatteryNotFinite {
            value: state.battery_pct,
        });
    }
    if state.battery_pct < 0.0 || state.battery_pct > 100.0 {
        return Err(InvariantViolation::BatteryOutOfRange {
            value: state.battery_pct,
        });
    }

    if !state.user_energy_pct.is_finite() {
        return Err(InvariantViolation::EnergyNotFinite {
            value: state.user_energy_pct,
        });
    }
    if !allow_negative_energy && (state.user_energy_pct < 0.0 || state.user_energy_pct > 100.0) {
        return Err(InvariantViolation::EnergyOutOfRange {
            value: state.user_energy_pct,
        });
    }
    if allow_negative_energy && state.user_energy_pct > 100.0 {
        return Err(InvariantViolation::EnergyOutOfRange {
            value: state.user_energy_pct,
        });
    }

    Ok(())
}

/// Validate a budget snapshot.
///
/// Invariants:
/// - all budgets are finite and >= 0
/// - SLA values are finite and > 0
/// - if `known_modules` is given, keys are a superset of the known set
pub fn validate_budget_snapshot(
    snapshot: &BudgetSnapshot,
    known_modules: Option<&[String]>,
) -> std::result::Result<(), InvariantViolation> {
    for (name, value) in &snapshot.budgets {
        if !value.is_finite() {
            return Err(InvariantViolation::BudgetNotFinite {
                module: name.clone(),
            });
        }
        if *value < 0.0 {
            return Err(InvariantViolation::BudgetNegative {
                module: name.clone(),
                value: *value,
            });
        }
    }

    for (name, value) in &snapshot.slas_ms {
        if !value.is_finite() || *value <= 0.0 {
            return Err(InvariantViolation::SlaNonPositive {
                module: name.clone(),
                value: *value,
            });
        }
    }

    if let Some(known) = known_modules {
        let mut missing: Vec<String> = known
            .iter()
            .filter(|m| !snapshot.budgets.contains_key(*m))
            .cloned()
            .collect();
        if !missing.is_empty() {
            missing.sort();
            return Err(InvariantViolation::MissingModules { missing });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalars(battery: f64, energy: f64) -> SystemScalars {
        SystemScalars {
            battery_pct: battery,
            user_energy_pct: energy,
            degradation_mode: DegradationMode::Full,
        }
    }

    #[test]
    fn test_scalars_in_range() {
        assert!(validate_system_scalars(&scalars(50.0, 50.0), false).is_ok());
        assert!(validate_system_scalars(&scalars(0.0, 100.0), false).is_ok());
    }

    #[test]
    fn test_scalars_out_of_range() {
        let err = validate_system_scalars(&scalars(120.0, 50.0), false).unwrap_err();
        assert!(matches!(err, InvariantViolation::BatteryOutOfRange { .. }));

        let err = validate_system_scalars(&scalars(50.0, -1.0), false).unwrap_err();
        assert!(matches!(err, InvariantViolation::EnergyOutOfRange { .. }));
    }

    #[test]
    fn test_scalars_relaxed_energy() {
        assert!(validate_system_scalars(&scalars(50.0, -5.0), true).is_ok());
        // Over 100 is rejected even when negative energy is tolerated
        assert!(validate_system_scalars(&scalars(50.0, 101.0), true).is_err());
    }

    #[test]
    fn test_scalars_non_finite() {
        assert!(validate_system_scalars(&scalars(f64::NAN, 50.0), false).is_err());
        assert!(validate_system_scalars(&scalars(50.0, f64::INFINITY), false).is_err());
    }

    #[test]
    fn test_budget_snapshot_valid() {
        let snapshot = BudgetSnapshot {
            budgets: BTreeMap::from([("decoder".to_string(), 100.0)]),
            slas_ms: BTreeMap::from([("decoder".to_string(), 20.0)]),
        };
        assert!(validate_budget_snapshot(&snapshot, None).is_ok());
    }

    #[test]
    fn test_budget_snapshot_negative() {
        let snapshot = BudgetSnapshot {
            budgets: BTreeMap::from([("decoder".to_string(), -1.0)]),
            slas_ms: BTreeMap::new(),
        };
        let err = validate_budget_snapshot(&snapshot, None).unwrap_err();
        assert!(matches!(err, InvariantViolation::BudgetNegative { .. }));
    }

    #[test]
    fn test_budget_snapshot_missing_module() {
        let snapshot = BudgetSnapshot {
            budgets: BTreeMap::from([("decoder".to_string(), 100.0)]),
            slas_ms: BTreeMap::from([("decoder".to_string(), 20.0)]),
        };
        let known = vec!["decoder".to_string(), "planner".to_string()];
        let err = validate_budget_snapshot(&snapshot, Some(&known)).unwrap_err();
        assert!(matches!(err, InvariantViolation::MissingModules { .. }));
    }

    #[test]
    fn test_degradation_mode_roundtrip() {
        for mode in [
            DegradationMode::Full,
            DegradationMode::Reduced,
            DegradationMode::Minimal,
            DegradationMode::Safe,
        ] {
            assert_eq!(mode.to_string().parse::<DegradationMode>().unwrap(), mode);
        }
        assert!("BROKEN".parse::<DegradationMode>().is_err());
    }
}
