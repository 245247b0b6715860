//! Actuation collaborator
//!
//! The control loop talks to actuators through the [`Actuator`] trait so
//! hardware integrations can be swapped in behind the same safety checks.

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use neuraxis_common::{NeuraxisError, Result, ACTION_NAMES};

use crate::config::SafetyMode;

#[async_trait]
pub trait Actuator: Send {
    /// Performs `action_name`, optionally in simplified (reduced-effort)
    /// form. May reject disallowed actions depending on the safety mode.
    async fn perform(&mut self, action_name: &str, simplified: bool) -> Result<()>;
}

/// Stub actuator with a safety envelope and simulated execution latency.
pub struct SafetyActuator {
    safety_mode: SafetyMode,
}

impl SafetyActuator {
    pub fn new(safety_mode: SafetyMode) -> Self {
        Self { safety_mode }
    }
}

#[async_trait]
impl Actuator for SafetyActuator {
    async fn perform(&mut self, action_name: &str, simplified: bool) -> Result<()> {
        if self.safety_mode == SafetyMode::Strict && !ACTION_NAMES.contains(&action_name) {
            return Err(NeuraxisError::Actuator(format!(
                "action not allowed in strict mode: {}",
                action_name
            )));
        }
        let latency = if simplified {
            Duration::from_millis(1)
        } else {
            Duration::from_millis(3)
        };
        tokio::time::sleep(latency).await;
        info!(action = action_name, simplified, "actuator executed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_strict_mode_rejects_unknown_actions() {
        let mut actuator = SafetyActuator::new(SafetyMode::Strict);
        assert!(actuator.perform("self_destruct", false).await.is_err());
        assert!(actuator.perform("move_arm", false).await.is_ok());
    }

    #[tokio::test]
    async fn test_moderate_mode_allows_unknown_actions() {
        let mut actuator = SafetyActuator::new(SafetyMode::Moderate);
        assert!(actuator.perform("wave", true).await.is_ok());
    }
}
