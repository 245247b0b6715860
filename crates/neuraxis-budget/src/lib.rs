//! # Neuraxis Budget
//!
//! Per-module resource ledgers and the staged budget allocator for the
//! Neuraxis control loop.
//!
//! ## Core Types
//!
//! - [`ModuleLedger`]: one resource account per module, with SLA violation
//!   tracking and end-of-cycle deficit penalties
//! - [`BudgetAllocator`]: flat / auction / predictive / game-theoretic
//!   allocation stages over the ledgers, with a TTL-cached equilibrium
//!   search and a surplus→deficit negotiation pass
//! - [`UsagePredictor`]: injectable trend predictor seam

pub mod allocator;
pub mod ledger;

pub use allocator::{AllocationStrategy, BudgetAllocator, TrendPredictor, UsagePredictor};
pub use ledger::{ModuleLedger, DEFAULT_PENALTY_RATE, VIOLATION_WINDOW};
