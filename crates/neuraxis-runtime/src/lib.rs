//! # Neuraxis Runtime
//!
//! Orchestration layer for the Neuraxis control loop: configuration,
//! sensory and actuation collaborators, resilience primitives, health
//! monitoring, metrics export, and the per-cycle [`ControlSystem`] driver.
//!
//! ## Core Types
//!
//! - [`config::SystemConfig`]: bounded flat configuration, env-overridable
//! - [`sensory::SpikeSource`] / [`actuator::Actuator`]: collaborator seams
//! - [`resilience::CircuitBreaker`] / [`resilience::WatchdogTimer`]: the
//!   loop's only retry and deadline mechanisms
//! - [`system::ControlSystem`]: the sequential cycle driver

pub mod actuator;
pub mod config;
pub mod metrics;
pub mod monitor;
pub mod persist;
pub mod resilience;
pub mod sensory;
pub mod system;

pub use actuator::{Actuator, SafetyActuator};
pub use config::{SafetyMode, SystemConfig};
pub use metrics::MetricsCollector;
pub use monitor::{AnomalyDetector, BudgetHealth, BudgetHealthMonitor, DegradationController};
pub use persist::StateManager;
pub use resilience::{CircuitBreaker, WatchdogTimer};
pub use sensory::{IntentDecoder, NeuromodulationController, RateSimulator, SpikeSource};
pub use system::{ControlSystem, CycleSnapshot};
