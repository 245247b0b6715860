//! Tabular value policy over the discretized battery/energy state

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use neuraxis_common::{ArtifactError, NeuraxisError, Result};

/// Bucket width used to discretize the [0, 100] scalar range.
pub const STATE_BUCKET_WIDTH: f64 = 10.0;

/// Default bin counts covering 0..=100 inclusive at width 10.
pub const DEFAULT_BINS: (usize, usize) = (11, 11);

/// Discretize battery/energy into table bins, clamped at the edges.
pub fn encode_state(state: [f64; 2], bins: (usize, usize)) -> (usize, usize) {
    let battery_bin = (state[0] / STATE_BUCKET_WIDTH)
        .floor()
        .clamp(0.0, (bins.0 - 1) as f64) as usize;
    let energy_bin = (state[1] / STATE_BUCKET_WIDTH)
        .floor()
        .clamp(0.0, (bins.1 - 1) as f64) as usize;
    (battery_bin, energy_bin)
}

/// Epsilon-greedy tabular Q policy.
///
/// The table is stored flat, indexed `(battery_bin * bins.1 + energy_bin)
/// * action_count + action`.
#[derive(Debug)]
pub struct TabularPolicy {
    action_count: usize,
    bins: (usize, usize),
    epsilon: f64,
    rng: StdRng,
    q: Vec<f32>,
}

impl TabularPolicy {
    pub fn new(action_count: usize, bins: (usize, usize), epsilon: f64, seed: u64) -> Self {
        Self {
            action_count,
            bins,
            epsilon,
            rng: StdRng::seed_from_u64(seed),
            q: vec![0.0; bins.0 * bins.1 * action_count],
        }
    }

    pub fn action_count(&self) -> usize {
        self.action_count
    }

    pub fn bins(&self) -> (usize, usize) {
        self.bins
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    fn row_start(&self, state: [f64; 2]) -> usize {
        let (b, e) = encode_state(state, self.bins);
        (b * self.bins.1 + e) * self.action_count
    }

    /// Q row for the discretized state.
    pub fn q_values(&self, state: [f64; 2]) -> &[f32] {
        let start = self.row_start(state);
        &self.q[start..start + self.action_count]
    }

    pub fn update_q(&mut self, state: [f64; 2], action: usize, value: f64) {
        let start = self.row_start(state);
        self.q[start + action] = value as f32;
    }

    /// Greedy action with ε-probability uniform exploration. Greedy ties
    /// break toward the lowest action index.
    pub fn propose_action(&mut self, state: [f64; 2]) -> usize {
        if self.rng.gen::<f64>() < self.epsilon {
            return self.rng.gen_range(0..self.action_count);
        }
        let row = self.q_values(state);
        let mut best = 0;
        for (i, &v) in row.iter().enumerate() {
            if v > row[best] {
                best = i;
            }
        }
        best
    }

    /// Top-k actions ranked by `(value desc, probability desc, index asc)`
    /// as `(action, probability, value)` triples. Probabilities come from
    /// shifting the row to strictly positive and normalizing.
    pub fn propose_action_distribution(
        &self,
        state: [f64; 2],
        k: usize,
    ) -> Vec<(usize, f64, f64)> {
        let row = self.q_values(state);
        let min = row.iter().cloned().fold(f32::INFINITY, f32::min) as f64;
        let shifted: Vec<f64> = row.iter().map(|&v| v as f64 - min + 1e-6).collect();
        let total: f64 = shifted.iter().sum();

        let mut ranked: Vec<(usize, f64, f64)> = row
            .iter()
            .enumerate()
            .map(|(i, &v)| (i, shifted[i] / total, v as f64))
            .collect();
        ranked.sort_by(|a, b| {
            b.2.total_cmp(&a.2)
                .then(b.1.total_cmp(&a.1))
                .then(a.0.cmp(&b.0))
        });
        ranked.truncate(k.clamp(1, self.action_count));
        ranked
    }

    /// Replace the table with externally loaded weights.
    pub fn load_weights(&mut self, weights: &[f32]) -> Result<()> {
        if weights.len() != self.q.len() {
            return Err(NeuraxisError::Artifact(ArtifactError::ShapeMismatch {
                expected: self.q.len(),
                actual: weights.len(),
            }));
        }
        self.q.copy_from_slice(weights);
        Ok(())
    }

    pub fn export_weights(&self) -> Vec<f32> {
        self.q.clone()
    }
}
