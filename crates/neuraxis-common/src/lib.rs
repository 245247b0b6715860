//! # Neuraxis Common
//!
//! Shared error taxonomy and runtime contracts for the Neuraxis
//! resource-constrained control loop.
//!
//! ## Core Types
//!
//! - [`SystemScalars`]: validated scalar resource state (battery, energy)
//! - [`BudgetSnapshot`]: validated view of per-module budgets and SLAs
//! - [`DegradationMode`]: FULL / REDUCED / MINIMAL / SAFE service levels
//! - [`NeuraxisError`]: unified error type with domain sub-enums

pub mod contracts;
pub mod error;

// Re-export commonly used types at crate root
pub use contracts::{
    validate_budget_snapshot, validate_system_scalars, BudgetSnapshot, DegradationMode,
    SystemScalars,
};
pub use error::{
    ArtifactError, InvariantViolation, NeuraxisError, ResilienceError, Result,
};

/// Neuraxis version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Dimensionality of the planner's continuous state (battery, energy)
pub const STATE_SIZE: usize = 2;

/// Number of discrete planner actions (approve, simplify, reject)
pub const ACTION_COUNT: usize = 3;

/// Canonical action names understood by the decoder and actuator
pub const ACTION_NAMES: [&str; 3] = ["move_arm", "plan_route", "stop"];
