//! Reinforcement learning subsystem
//!
//! Tabular Q policy over the discretized battery/energy state, a one-step
//! Q-learning trainer fed from a FIFO trajectory buffer, shaped rewards,
//! and checksummed artifact persistence.

pub mod buffer;
pub mod persistence;
pub mod policy;
pub mod reward;
pub mod trainer;

pub use buffer::{TrajectoryBuffer, Transition};
pub use persistence::{
    load_policy_artifact, save_policy_artifact, FeatureSpec, PolicyArtifact,
};
pub use policy::{encode_state, TabularPolicy, DEFAULT_BINS, STATE_BUCKET_WIDTH};
pub use reward::{
    budget_efficiency, compute_reward, delta_v_penalty, sla_penalty, task_success, RewardWeights,
};
pub use trainer::QLearningTrainer;
