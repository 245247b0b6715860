//! # Neuraxis Policy
//!
//! Decision-making layer for the Neuraxis control loop: Lyapunov stability
//! analysis, an LQR baseline regulator, the tabular reinforcement policy
//! with checksummed persistence, and the gated decision planner that
//! arbitrates between them.
//!
//! ## Core Types
//!
//! - [`LyapunovAnalyzer`]: quadratic stability gate over the 2-D resource
//!   state
//! - [`LqrController`]: seeded discrete Riccati regulator with a lazily
//!   cached gain
//! - [`rl::TabularPolicy`] / [`rl::QLearningTrainer`]: ε-greedy tabular Q
//!   learning over discretized battery/energy bins
//! - [`DecisionPlanner`]: candidate chain (reinforcement → LQR → rules)
//!   with budget and stability gates

pub mod lqr;
pub mod planner;
pub mod rl;
pub mod stability;

pub use lqr::LqrController;
pub use planner::{DecisionPlanner, PlannerConfig, RlMetrics};
pub use stability::LyapunovAnalyzer;
