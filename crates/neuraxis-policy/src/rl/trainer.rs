//! One-step Q-learning over buffered transitions

use super::buffer::{TrajectoryBuffer, Transition};
use super::policy::TabularPolicy;

/// Tabular Q-learning with a per-epoch step cap.
#[derive(Debug)]
pub struct QLearningTrainer {
    pub gamma: f64,
    pub alpha: f64,
    pub max_steps_per_epoch: usize,
    td_errors: Vec<f64>,
}

impl Default for QLearningTrainer {
    fn default() -> Self {
        Self {
            gamma: 0.95,
            alpha: 0.1,
            max_steps_per_epoch: 64,
            td_errors: Vec::new(),
        }
    }
}

impl QLearningTrainer {
    pub fn new(gamma: f64, alpha: f64, max_steps_per_epoch: usize) -> Self {
        Self {
            gamma,
            alpha,
            max_steps_per_epoch,
            td_errors: Vec::new(),
        }
    }

    /// target = r + γ·max(Q(s')) ·(1 − done); returns the TD error.
    pub fn train_step(&mut self, policy: &mut TabularPolicy, transition: &Transition) -> f64 {
        let q_sa = policy.q_values(transition.state)[transition.action] as f64;
        let next_q = policy
            .q_values(transition.next_state)
            .iter()
            .cloned()
            .fold(f32::NEG_INFINITY, f32::max) as f64;
        let done = if transition.done { 1.0 } else { 0.0 };
        let target = transition.reward + self.gamma * next_q * (1.0 - done);
        let td_error = target - q_sa;
        policy.update_q(
            transition.state,
            transition.action,
            q_sa + self.alpha * td_error,
        );
        self.td_errors.push(td_error);
        td_error
    }

    /// Replays the buffer in insertion order for `epochs` passes, at most
    /// `max_steps_per_epoch` transitions each. Clears accumulated TD errors
    /// at the start and returns the fresh batch.
    pub fn train_epochs(
        &mut self,
        policy: &mut TabularPolicy,
        buffer: &TrajectoryBuffer,
        epochs: usize,
    ) -> Vec<f64> {
        self.td_errors.clear();
        for _ in 0..epochs {
            for (steps, transition) in buffer.iter().enumerate() {
                self.train_step(policy, transition);
                if steps + 1 >= self.max_steps_per_epoch {
                    break;
                }
            }
        }
        self.td_errors.clone()
    }

    pub fn td_errors(&self) -> &[f64] {
        &self.td_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::policy::DEFAULT_BINS;

    fn transition(reward: f64, done: bool) -> Transition {
        Transition {
            state: [50.0, 50.0],
            action: 0,
            reward,
            next_state: [60.0, 60.0],
            done,
        }
    }

    #[test]
    fn test_train_step_moves_q_toward_target() {
        let mut policy = TabularPolicy::new(3, DEFAULT_BINS, 0.0, 1);
        let mut trainer = QLearningTrainer::default();

        let td = trainer.train_step(&mut policy, &transition(1.0, false));
        assert!((td - 1.0).abs() < 1e-6);
        let q = policy.q_values([50.0, 50.0])[0] as f64;
        assert!((q - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_done_transition_ignores_next_state_value() {
        let mut policy = TabularPolicy::new(3, DEFAULT_BINS, 0.0, 1);
        policy.update_q([60.0, 60.0], 1, 100.0);
        let mut trainer = QLearningTrainer::default();

        let td = trainer.train_step(&mut policy, &transition(2.0, true));
        assert!((td - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_train_epochs_respects_step_cap_and_clears_errors() {
        let mut policy = TabularPolicy::new(3, DEFAULT_BINS, 0.0, 1);
        let mut trainer = QLearningTrainer::new(0.95, 0.1, 2);
        let mut buffer = TrajectoryBuffer::new(8);
        for _ in 0..5 {
            buffer.add(transition(1.0, false));
        }

        let errors = trainer.train_epochs(&mut policy, &buffer, 1);
        assert_eq!(errors.len(), 2);

        let errors = trainer.train_epochs(&mut policy, &buffer, 2);
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_training_is_deterministic() {
        let mut buffer = TrajectoryBuffer::new(8);
        for i in 0..4 {
            buffer.add(transition(i as f64, false));
        }

        let run = |seed: u64| {
            let mut policy = TabularPolicy::new(3, DEFAULT_BINS, 0.1, seed);
            let mut trainer = QLearningTrainer::default();
            trainer.train_epochs(&mut policy, &buffer, 3);
            policy.export_weights()
        };
        assert_eq!(run(123), run(123));
    }
}
