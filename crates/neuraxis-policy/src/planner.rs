//! Decision planner
//!
//! Combines the reinforcement policy, the LQR baseline, and a rule-based
//! fallback into a gated candidate chain. Every candidate must pass a
//! budget feasibility precheck and a Lyapunov stability gate before it can
//! be scored; if nothing survives, the planner falls back to the configured
//! reject action.

use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use tracing::{debug, info, warn};

use neuraxis_common::{ArtifactError, NeuraxisError, Result, ACTION_COUNT, ACTION_NAMES};

use crate::lqr::LqrController;
use crate::rl::{
    compute_reward, load_policy_artifact, save_policy_artifact, FeatureSpec, PolicyArtifact,
    QLearningTrainer, RewardWeights, TabularPolicy, TrajectoryBuffer, Transition, DEFAULT_BINS,
};
use crate::stability::LyapunovAnalyzer;

/// Per-action (reward, cost, stability) estimation baseline. Column 1 is
/// the deterministic cost used by the feasibility gate.
const ACTION_BASE: [[f64; 3]; ACTION_COUNT] = [
    [10.0, 5.0, 8.0],
    [5.0, 2.0, 4.0],
    [0.0, 0.0, 10.0],
];

const ESTIMATE_NOISE_STD: f64 = 0.5;
const ROLLOUT_SLA_MS: f64 = 50.0;

#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub target: [f64; 2],
    pub seed: u64,
    pub epsilon: f64,
    pub gamma: f64,
    pub alpha: f64,
    pub bins: (usize, usize),
    /// Action returned when every candidate fails its gates.
    pub reject_action: usize,
    pub rl_top_k: usize,
    pub artifact_path: PathBuf,
    pub train_episodes: usize,
    pub train_steps_per_episode: usize,
    pub max_steps_per_epoch: usize,
    pub buffer_capacity: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            target: [75.0, 75.0],
            seed: 1337,
            epsilon: 0.1,
            gamma: 0.95,
            alpha: 0.1,
            bins: DEFAULT_BINS,
            reject_action: 2,
            rl_top_k: 2,
            artifact_path: PathBuf::from("artifacts/models/rl_policy.bin"),
            train_episodes: 4,
            train_steps_per_episode: 16,
            max_steps_per_epoch: 64,
            buffer_capacity: 256,
        }
    }
}

/// Snapshot of reinforcement-side planner metrics.
#[derive(Debug, Clone)]
pub struct RlMetrics {
    pub epsilon: f64,
    pub td_error_mean: f64,
    pub policy_version: String,
    pub enabled: bool,
}

pub struct DecisionPlanner {
    config: PlannerConfig,
    lyapunov: LyapunovAnalyzer,
    lqr: LqrController,
    rl_policy: TabularPolicy,
    trainer: QLearningTrainer,
    buffer: TrajectoryBuffer,
    rng: StdRng,
    rl_enabled: bool,
    pub force_simplify: bool,
    decisions: u64,
    rl_gate_rejections: u64,
    rl_fallbacks: u64,
    rl_updates: u64,
    rl_version_counter: u32,
    rl_policy_version: String,
    last_td_errors: Vec<f64>,
}

impl DecisionPlanner {
    /// Builds the planner, attempting to restore the persisted policy.
    ///
    /// The configured reject action must name a real action. A missing
    /// artifact starts a fresh enabled policy; a present but corrupt or
    /// mismatched one disables reinforcement decisions for the life of the
    /// planner.
    pub fn new(config: PlannerConfig) -> Result<Self> {
        if config.reject_action >= ACTION_COUNT {
            return Err(NeuraxisError::Config(format!(
                "reject_action must be < {}, got {}",
                ACTION_COUNT, config.reject_action
            )));
        }
        let mut rl_policy = TabularPolicy::new(
            ACTION_COUNT,
            config.bins,
            config.epsilon,
            config.seed,
        );
        let trainer = QLearningTrainer::new(config.gamma, config.alpha, config.max_steps_per_epoch);

        let mut rl_enabled = true;
        let mut rl_version_counter = 0u32;
        let mut rl_policy_version = "v0".to_string();

        match load_policy_artifact(&config.artifact_path) {
            Ok(artifact) => match rl_policy.load_weights(&artifact.weights) {
                Ok(()) => {
                    rl_policy_version = artifact.policy_version.clone();
                    rl_version_counter = artifact
                        .policy_version
                        .strip_prefix('v')
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0);
                    info!(version = %rl_policy_version, "restored policy artifact");
                }
                Err(err) => {
                    warn!(%err, "policy weights incompatible, reinforcement disabled");
                    rl_enabled = false;
                }
            },
            Err(NeuraxisError::Artifact(ArtifactError::Missing { .. })) => {
                debug!("no policy artifact, starting fresh");
            }
            Err(err) => {
                warn!(%err, "policy artifact rejected, reinforcement disabled");
                rl_enabled = false;
            }
        }

        Ok(Self {
            lqr: LqrController::new(config.seed),
            rng: StdRng::seed_from_u64(config.seed),
            rl_policy,
            trainer,
            buffer: TrajectoryBuffer::new(config.buffer_capacity),
            config,
            lyapunov: LyapunovAnalyzer::new(),
            rl_enabled,
            force_simplify: false,
            decisions: 0,
            rl_gate_rejections: 0,
            rl_fallbacks: 0,
            rl_updates: 0,
            rl_version_counter,
            rl_policy_version,
            last_td_errors: Vec::new(),
        })
    }

    pub fn rl_enabled(&self) -> bool {
        self.rl_enabled
    }

    pub fn set_rl_enabled(&mut self, enabled: bool) {
        self.rl_enabled = enabled;
    }

    pub fn decisions(&self) -> u64 {
        self.decisions
    }

    pub fn rl_gate_rejections(&self) -> u64 {
        self.rl_gate_rejections
    }

    pub fn rl_fallbacks(&self) -> u64 {
        self.rl_fallbacks
    }

    pub fn rl_updates(&self) -> u64 {
        self.rl_updates
    }

    pub fn rl_policy_version(&self) -> &str {
        &self.rl_policy_version
    }

    pub fn rl_version_counter(&self) -> u32 {
        self.rl_version_counter
    }

    pub fn rl_policy_mut(&mut self) -> &mut TabularPolicy {
        &mut self.rl_policy
    }

    /// Deterministic per-action cost used by the feasibility gate.
    pub fn action_cost(action: usize) -> f64 {
        ACTION_BASE[action][1]
    }

    /// Noisy (reward, cost, stability) estimate for an action.
    pub fn estimate_params(&mut self, action: usize) -> (f64, f64, f64) {
        let base = ACTION_BASE[action];
        let mut noisy = [0.0; 3];
        for (out, b) in noisy.iter_mut().zip(base.iter()) {
            let n: f64 = StandardNormal.sample(&mut self.rng);
            *out = b + ESTIMATE_NOISE_STD * n;
        }
        (noisy[0], noisy[1], noisy[2])
    }

    fn feasible(action: usize, state: [f64; 2]) -> bool {
        let cost = Self::action_cost(action);
        cost <= state[0] && 0.5 * cost <= state[1]
    }

    fn next_state(state: [f64; 2], cost: f64) -> [f64; 2] {
        [
            (state[0] - cost).max(0.0),
            (state[1] - 0.5 * cost).max(0.0),
        ]
    }

    /// Threshold fallback over raw battery/energy levels.
    pub fn decide_rule_based(&self, state: [f64; 2]) -> usize {
        if self.force_simplify {
            return 1;
        }
        let (battery, energy) = (state[0], state[1]);
        if energy > 50.0 && battery > 30.0 {
            0
        } else if energy > 30.0 && battery > 15.0 {
            1
        } else {
            self.config.reject_action
        }
    }

    fn lqr_action(&mut self, state: [f64; 2]) -> usize {
        let u = self.lqr.control(state, self.config.target);
        let mut best = 0;
        for (i, &v) in u.iter().enumerate() {
            if v > u[best] {
                best = i;
            }
        }
        best
    }

    /// Gated candidate selection: reinforcement proposals, then the LQR
    /// action, then the rule-based choice, first occurrence kept. Each
    /// surviving candidate is scored by its Q value (when reinforcement is
    /// enabled) plus the negated Lyapunov delta; gate failures are counted,
    /// an empty survivor set falls back to the reject action.
    pub fn decide_with_stability(&mut self, state: [f64; 2]) -> usize {
        let mut candidates: Vec<usize> = Vec::with_capacity(self.config.rl_top_k + 2);
        if self.rl_enabled {
            for (action, _prob, _value) in self
                .rl_policy
                .propose_action_distribution(state, self.config.rl_top_k)
            {
                candidates.push(action);
            }
        }
        candidates.push(self.lqr_action(state));
        candidates.push(self.decide_rule_based(state));

        let mut seen = [false; ACTION_COUNT];
        let mut best: Option<(usize, f64)> = None;
        for action in candidates {
            if seen[action] {
                continue;
            }
            seen[action] = true;

            if !Self::feasible(action, state) {
                self.rl_gate_rejections += 1;
                continue;
            }
            let next = Self::next_state(state, Self::action_cost(action));
            let (stable, dv) = self.lyapunov.stable(state, next, self.config.target);
            if !stable {
                self.rl_gate_rejections += 1;
                continue;
            }

            let q = if self.rl_enabled {
                self.rl_policy.q_values(state)[action] as f64
            } else {
                0.0
            };
            let score = q - dv;
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((action, score));
            }
        }

        self.decisions += 1;
        match best {
            Some((action, _)) => action,
            None => {
                self.rl_fallbacks += 1;
                self.config.reject_action
            }
        }
    }

    /// Deterministic TD proxy over the noisy estimation model.
    pub fn compute_bellman_error(
        &mut self,
        action: usize,
        reward: f64,
    ) -> f64 {
        let (r, c, _s) = self.estimate_params(action);
        let pred = r - c;
        let target = reward + self.config.gamma * (r - c);
        (pred - target).abs()
    }

    /// Runs synthetic rollouts against the planner's own cost and
    /// stability model, trains the tabular policy, advances the policy
    /// version, and persists a fresh checksummed artifact. No-op when
    /// reinforcement is disabled.
    pub fn train(&mut self, epochs: usize) -> Result<()> {
        if !self.rl_enabled {
            return Ok(());
        }

        self.buffer.clear();
        let weights = RewardWeights::default();
        for episode in 0..self.config.train_episodes {
            let start = 90.0 - 10.0 * episode as f64;
            let mut state = [start.max(10.0), start.max(10.0)];
            for _ in 0..self.config.train_steps_per_episode {
                let action = self.rl_policy.propose_action(state);
                let cost = Self::action_cost(action);
                let approved = Self::feasible(action, state);
                let next = Self::next_state(state, cost);
                let (_, dv) = self.lyapunov.stable(state, next, self.config.target);
                let name = ACTION_NAMES[action];
                let reward = compute_reward(
                    dv, cost, state[0], cost, ROLLOUT_SLA_MS, name, name, approved, weights,
                );
                let done = next[0] <= 0.0 || next[1] <= 0.0;
                self.buffer.add(Transition {
                    state,
                    action,
                    reward,
                    next_state: next,
                    done,
                });
                state = next;
                if done {
                    break;
                }
            }
        }

        let td_errors = self
            .trainer
            .train_epochs(&mut self.rl_policy, &self.buffer, epochs);
        self.rl_updates += td_errors.len() as u64;
        self.last_td_errors = td_errors;

        self.rl_version_counter += 1;
        self.rl_policy_version = format!("v{}", self.rl_version_counter);
        let artifact = self.to_artifact();
        save_policy_artifact(&artifact, &self.config.artifact_path)?;
        info!(
            version = %self.rl_policy_version,
            updates = self.rl_updates,
            "policy trained"
        );
        Ok(())
    }

    fn to_artifact(&self) -> PolicyArtifact {
        let mut hyperparameters = std::collections::BTreeMap::new();
        hyperparameters.insert("gamma".to_string(), self.config.gamma);
        hyperparameters.insert("alpha".to_string(), self.config.alpha);
        hyperparameters.insert("epsilon".to_string(), self.config.epsilon);
        PolicyArtifact {
            schema_version: "1.0".to_string(),
            algorithm: "tabular_q_learning".to_string(),
            hyperparameters,
            weights: self.rl_policy.export_weights(),
            feature_spec: FeatureSpec {
                battery_bins: self.config.bins.0,
                energy_bins: self.config.bins.1,
                action_count: ACTION_COUNT,
            },
            action_mapping: (0..ACTION_COUNT as u32).collect(),
            seed: self.config.seed,
            timestamp: chrono::Utc::now().timestamp(),
            policy_version: self.rl_policy_version.clone(),
        }
    }

    pub fn rl_metrics(&self) -> RlMetrics {
        let td_error_mean = if self.last_td_errors.is_empty() {
            0.0
        } else {
            self.last_td_errors.iter().sum::<f64>() / self.last_td_errors.len() as f64
        };
        RlMetrics {
            epsilon: self.rl_policy.epsilon(),
            td_error_mean,
            policy_version: self.rl_policy_version.clone(),
            enabled: self.rl_enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static COUNTER: AtomicU32 = AtomicU32::new(0);

    fn scratch_config(seed: u64) -> PlannerConfig {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        PlannerConfig {
            seed,
            artifact_path: std::env::temp_dir().join(format!(
                "neuraxis-planner-{}-{}/policy.bin",
                std::process::id(),
                n
            )),
            ..PlannerConfig::default()
        }
    }

    #[test]
    fn test_rule_based_thresholds() {
        let planner = DecisionPlanner::new(scratch_config(1)).unwrap();
        assert_eq!(planner.decide_rule_based([50.0, 60.0]), 0);
        assert_eq!(planner.decide_rule_based([20.0, 40.0]), 1);
        assert_eq!(planner.decide_rule_based([10.0, 10.0]), 2);
    }

    #[test]
    fn test_out_of_range_reject_action_is_rejected() {
        let config = PlannerConfig {
            reject_action: ACTION_COUNT,
            ..scratch_config(1)
        };
        assert!(DecisionPlanner::new(config).is_err());
    }

    #[test]
    fn test_force_simplify_overrides_rule() {
        let mut planner = DecisionPlanner::new(scratch_config(1)).unwrap();
        planner.force_simplify = true;
        assert_eq!(planner.decide_rule_based([90.0, 90.0]), 1);
    }

    #[test]
    fn test_decision_never_violates_feasibility() {
        let mut planner = DecisionPlanner::new(scratch_config(7)).unwrap();
        for &state in &[
            [1.0, 1.0],
            [4.0, 50.0],
            [50.0, 1.0],
            [50.0, 50.0],
            [90.0, 90.0],
        ] {
            let action = planner.decide_with_stability(state);
            assert!(action < ACTION_COUNT);
            if action != 2 {
                assert!(DecisionPlanner::feasible(action, state));
            }
        }
    }

    #[test]
    fn test_infeasible_state_falls_back_to_reject() {
        let mut planner = DecisionPlanner::new(scratch_config(7)).unwrap();
        // Below target on both axes: any cost deduction moves further away,
        // so no candidate can pass the stability gate.
        let action = planner.decide_with_stability([20.0, 20.0]);
        assert_eq!(action, 2);
        assert!(planner.rl_gate_rejections() >= 1);
    }

    #[test]
    fn test_gate_rejections_count_low_budget() {
        let mut planner = DecisionPlanner::new(scratch_config(7)).unwrap();
        let action = planner.decide_with_stability([1.0, 1.0]);
        assert_eq!(action, 2);
        assert!(planner.rl_gate_rejections() >= 1);
        assert_eq!(planner.decisions(), 1);
    }

    #[test]
    fn test_training_updates_weights_deterministically() {
        let mut planner = DecisionPlanner::new(scratch_config(123)).unwrap();
        let initial = planner.rl_policy.export_weights();
        planner.train(2).unwrap();
        let updated = planner.rl_policy.export_weights();
        assert_ne!(initial, updated);
        assert!(planner.rl_updates() > 0);
        assert_eq!(planner.rl_policy_version(), "v1");

        let mut replay = DecisionPlanner::new(scratch_config(123)).unwrap();
        replay.train(2).unwrap();
        assert_eq!(replay.rl_policy.export_weights(), updated);
    }

    #[test]
    fn test_train_disabled_is_noop() {
        let mut planner = DecisionPlanner::new(scratch_config(5)).unwrap();
        planner.set_rl_enabled(false);
        planner.train(1).unwrap();
        assert_eq!(planner.rl_updates(), 0);
    }

    #[test]
    fn test_restores_version_from_artifact() {
        let config = scratch_config(1);
        let mut first = DecisionPlanner::new(config.clone()).unwrap();
        first.train(1).unwrap();
        first.train(1).unwrap();

        let second = DecisionPlanner::new(config).unwrap();
        assert_eq!(second.rl_policy_version(), "v2");
        assert_eq!(second.rl_version_counter(), 2);
        assert!(second.rl_enabled());
    }

    #[test]
    fn test_corrupt_artifact_disables_reinforcement() {
        let config = scratch_config(1);
        std::fs::create_dir_all(config.artifact_path.parent().unwrap()).unwrap();
        std::fs::write(&config.artifact_path, b"corrupt").unwrap();
        let sidecar = format!("{}.blake3", config.artifact_path.display());
        std::fs::write(sidecar, "bad").unwrap();

        let mut planner = DecisionPlanner::new(config).unwrap();
        assert!(!planner.rl_enabled());
        let action = planner.decide_with_stability([50.0, 50.0]);
        assert!(action < ACTION_COUNT);
    }

    #[test]
    fn test_rl_metrics_snapshot() {
        let mut planner = DecisionPlanner::new(scratch_config(9)).unwrap();
        planner.train(1).unwrap();
        let metrics = planner.rl_metrics();
        assert_eq!(metrics.epsilon, 0.1);
        assert_eq!(metrics.policy_version, "v1");
        assert!(metrics.enabled);
    }

    #[test]
    fn test_bellman_error_is_finite() {
        let mut planner = DecisionPlanner::new(scratch_config(3)).unwrap();
        let err = planner.compute_bellman_error(0, 1.0);
        assert!(err.is_finite());
        assert!(err >= 0.0);
    }
}
