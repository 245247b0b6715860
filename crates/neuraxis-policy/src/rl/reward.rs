//! Reward shaping for the control-loop policy
//!
//! Four weighted terms: stability (ΔV), budget efficiency, SLA adherence,
//! and intent/task success. The combined reward is clamped to [-10, 10].

/// Stability term. Non-negative ΔV means the transition failed to descend
/// the Lyapunov surface and is penalized in proportion.
pub fn delta_v_penalty(delta_v: f64) -> f64 {
    if delta_v >= 0.0 {
        -delta_v.max(0.0) - 0.5
    } else {
        0.5
    }
}

/// Fraction of the available budget left unspent, clamped to [0, 1].
/// A non-positive budget is itself penalized.
pub fn budget_efficiency(spent: f64, available: f64) -> f64 {
    if available <= 0.0 {
        return -1.0;
    }
    (1.0 - spent / available).clamp(0.0, 1.0)
}

/// Latency overshoot relative to the SLA, as a non-positive term.
pub fn sla_penalty(latency_ms: f64, sla_ms: f64) -> f64 {
    if sla_ms <= 0.0 {
        return -1.0;
    }
    -((latency_ms - sla_ms).max(0.0) / sla_ms)
}

pub fn task_success(intent: &str, action_name: &str, approved: bool) -> f64 {
    if approved && intent == action_name {
        1.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RewardWeights {
    pub w_delta_v: f64,
    pub w_budget: f64,
    pub w_sla: f64,
    pub w_success: f64,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            w_delta_v: 1.0,
            w_budget: 0.5,
            w_sla: 0.5,
            w_success: 1.0,
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub fn compute_reward(
    delta_v: f64,
    spent: f64,
    available: f64,
    latency_ms: f64,
    sla_ms: f64,
    intent: &str,
    action_name: &str,
    approved: bool,
    weights: RewardWeights,
) -> f64 {
    let reward = weights.w_delta_v * delta_v_penalty(delta_v)
        + weights.w_budget * budget_efficiency(spent, available)
        + weights.w_sla * sla_penalty(latency_ms, sla_ms)
        + weights.w_success * task_success(intent, action_name, approved);
    reward.clamp(-10.0, 10.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reward_penalizes_positive_delta_v() {
        let weights = RewardWeights::default();
        let descending = compute_reward(
            -0.5, 10.0, 100.0, 10.0, 50.0, "a", "a", true, weights,
        );
        let ascending = compute_reward(
            0.5, 10.0, 100.0, 10.0, 50.0, "a", "a", true, weights,
        );
        assert!(descending > ascending);
    }

    #[test]
    fn test_budget_and_sla_edge_cases() {
        assert_eq!(budget_efficiency(1.0, 0.0), -1.0);
        assert_eq!(sla_penalty(10.0, 0.0), -1.0);
        assert_eq!(sla_penalty(10.0, 50.0), 0.0);
        assert!((sla_penalty(75.0, 50.0) + 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_task_success_requires_approval_and_match() {
        assert_eq!(task_success("move_arm", "move_arm", true), 1.0);
        assert_eq!(task_success("move_arm", "move_arm", false), 0.0);
        assert_eq!(task_success("move_arm", "stop", true), 0.0);
    }

    #[test]
    fn test_reward_is_clamped() {
        let weights = RewardWeights {
            w_delta_v: 100.0,
            ..RewardWeights::default()
        };
        let r = compute_reward(5.0, 0.0, 100.0, 0.0, 50.0, "a", "a", true, weights);
        assert_eq!(r, -10.0);
    }
}
