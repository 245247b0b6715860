//! Sensory collaborators: spike source, neuromodulation, intent decoding
//!
//! The control loop only depends on the [`SpikeSource`] trait; the bundled
//! [`RateSimulator`] is a seeded leaky rate model standing in for real
//! hardware. Every emitted vector is validated against the channel-count /
//! finiteness / max-rate contract before it leaves the source.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use tracing::debug;

use neuraxis_common::{NeuraxisError, Result};

const ENERGY_BASELINE_HZ: f64 = 25.0;
const ATP_NOMINAL: f64 = 5.0e-3;
const ATP_MAX: f64 = 10.0e-3;
const NEIGHBOR_REACH: usize = 4;
const CORRELATION_SCALE: f64 = 0.1;

/// Asynchronous firing-rate source.
#[async_trait]
pub trait SpikeSource: Send {
    /// Yields one firing-rate vector, already contract-validated.
    async fn neural_spikes(&mut self) -> Result<Vec<f64>>;

    /// Maps a rate vector to a user-energy percentage in [0, 100].
    fn decode_energy(&self, rates: &[f64]) -> f64;

    fn neuromod_mut(&mut self) -> &mut NeuromodulationController;
}

/// Contract checks on emitted rate vectors.
#[derive(Debug, Clone)]
pub struct SpikeValidator {
    expected_channels: usize,
    max_rate_hz: f64,
}

impl SpikeValidator {
    pub fn new(expected_channels: usize, max_rate_hz: f64) -> Self {
        Self {
            expected_channels,
            max_rate_hz,
        }
    }

    pub fn validate(&self, rates: &[f64]) -> Result<()> {
        if rates.len() != self.expected_channels {
            return Err(NeuraxisError::Sensory(format!(
                "channel count mismatch: {} != {}",
                rates.len(),
                self.expected_channels
            )));
        }
        if rates.iter().any(|r| !r.is_finite()) {
            return Err(NeuraxisError::Sensory("non-finite rates".to_string()));
        }
        if rates.iter().any(|&r| r < 0.0 || r > self.max_rate_hz) {
            return Err(NeuraxisError::Sensory("rates out of range".to_string()));
        }
        Ok(())
    }
}

/// Dopamine/norepinephrine gain control over injected drive.
#[derive(Debug, Clone)]
pub struct NeuromodulationController {
    dopamine: f64,
    norepinephrine: f64,
}

impl Default for NeuromodulationController {
    fn default() -> Self {
        Self {
            dopamine: 1.0,
            norepinephrine: 1.0,
        }
    }
}

impl NeuromodulationController {
    pub fn update_from_success(&mut self, reward: f64) {
        self.dopamine = (self.dopamine + 0.1 * reward).clamp(0.5, 2.0);
    }

    pub fn update_from_stress(&mut self, stressed: bool) {
        let delta = if stressed { 0.2 } else { -0.05 };
        self.norepinephrine = (self.norepinephrine + delta).clamp(0.5, 2.0);
    }

    pub fn gain(&self) -> f64 {
        self.dopamine * (0.5 + 0.5 * self.norepinephrine)
    }
}

/// Coarse ATP pool tracking simulated metabolic load.
#[derive(Debug, Clone)]
pub struct MetabolicState {
    atp: f64,
}

impl Default for MetabolicState {
    fn default() -> Self {
        Self { atp: ATP_NOMINAL }
    }
}

impl MetabolicState {
    /// Deducts spike, pump, and basal costs; returns the ATP ratio against
    /// the nominal pool.
    pub fn update(&mut self, window_s: f64, total_spikes: f64, n_channels: usize) -> f64 {
        let spike_cost = 1.67e-18 * total_spikes / (n_channels.max(1) as f64);
        let pump_cost = 1e-18 * window_s;
        let basal_cost = 1e-6 * window_s;
        self.atp = (self.atp - spike_cost - pump_cost - basal_cost).clamp(0.0, ATP_MAX);
        self.atp / ATP_NOMINAL
    }

    pub fn atp_ratio(&self) -> f64 {
        self.atp / ATP_NOMINAL
    }
}

/// Threshold-based intent extraction over the mean firing rate.
#[derive(Debug, Clone)]
pub struct IntentDecoder {
    /// (intent, threshold) pairs sorted by threshold descending.
    thresholds: Vec<(String, f64)>,
}

impl Default for IntentDecoder {
    fn default() -> Self {
        let mut thresholds: Vec<(String, f64)> = vec![
            ("move_arm".to_string(), 30.0),
            ("plan_route".to_string(), 15.0),
            ("stop".to_string(), 0.0),
        ];
        thresholds.sort_by(|a, b| b.1.total_cmp(&a.1));
        Self { thresholds }
    }
}

impl IntentDecoder {
    pub fn decode_intent(&self, rates: &[f64]) -> String {
        let mean = if rates.is_empty() {
            0.0
        } else {
            rates.iter().sum::<f64>() / rates.len() as f64
        };
        for (intent, threshold) in &self.thresholds {
            if mean > *threshold {
                return intent.clone();
            }
        }
        "stop".to_string()
    }
}

/// Seeded leaky firing-rate simulator with nearest-neighbor correlation.
pub struct RateSimulator {
    n_channels: usize,
    sim_window_s: f64,
    max_firing_hz: f64,
    rng: StdRng,
    rates: Vec<f64>,
    metabolic: MetabolicState,
    neuromod: NeuromodulationController,
    validator: SpikeValidator,
}

impl RateSimulator {
    pub fn new(n_channels: usize, sim_window_s: f64, max_firing_hz: f64, seed: u64) -> Self {
        Self {
            n_channels,
            sim_window_s,
            max_firing_hz,
            rng: StdRng::seed_from_u64(seed),
            rates: vec![0.0; n_channels],
            metabolic: MetabolicState::default(),
            neuromod: NeuromodulationController::default(),
            validator: SpikeValidator::new(n_channels, max_firing_hz),
        }
    }

    fn correlate(&self, rates: &[f64]) -> Vec<f64> {
        let n = rates.len();
        let mut out = rates.to_vec();
        for i in 0..n {
            let lo = i.saturating_sub(NEIGHBOR_REACH);
            let hi = (i + NEIGHBOR_REACH + 1).min(n);
            let mut coupled = 0.0;
            for j in lo..hi {
                if j == i {
                    continue;
                }
                let distance = i.abs_diff(j) as f64;
                coupled += (-distance / 2.0).exp() * rates[j];
            }
            out[i] = rates[i] + CORRELATION_SCALE * coupled;
        }
        out
    }
}

#[async_trait]
impl SpikeSource for RateSimulator {
    async fn neural_spikes(&mut self) -> Result<Vec<f64>> {
        let gain = self.neuromod.gain();
        for rate in self.rates.iter_mut() {
            let noise: f64 = StandardNormal.sample(&mut self.rng);
            let drive = (5.0 + noise) * gain;
            *rate = (0.9 * *rate + 8.0 * drive).clamp(0.0, self.max_firing_hz);
        }

        let mut rates = self.correlate(&self.rates);
        for rate in rates.iter_mut() {
            *rate = rate.clamp(0.0, self.max_firing_hz);
        }

        let total_spikes = rates.iter().sum::<f64>() * self.sim_window_s;
        let ratio = self
            .metabolic
            .update(self.sim_window_s, total_spikes, self.n_channels);
        debug!(atp_ratio = ratio, "metabolic update");

        self.validator.validate(&rates)?;
        Ok(rates)
    }

    fn decode_energy(&self, rates: &[f64]) -> f64 {
        let mean = if rates.is_empty() {
            0.0
        } else {
            rates.iter().sum::<f64>() / rates.len() as f64
        };
        let energy = 100.0 * (mean / ENERGY_BASELINE_HZ) * self.metabolic.atp_ratio();
        energy.clamp(0.0, 100.0)
    }

    fn neuromod_mut(&mut self) -> &mut NeuromodulationController {
        &mut self.neuromod
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulator_respects_rate_contract() {
        let mut sim = RateSimulator::new(32, 0.02, 200.0, 1337);
        for _ in 0..5 {
            let rates = sim.neural_spikes().await.unwrap();
            assert_eq!(rates.len(), 32);
            assert!(rates.iter().all(|&r| (0.0..=200.0).contains(&r)));
        }
    }

    #[tokio::test]
    async fn test_simulator_is_deterministic_per_seed() {
        let mut a = RateSimulator::new(16, 0.02, 200.0, 7);
        let mut b = RateSimulator::new(16, 0.02, 200.0, 7);
        assert_eq!(
            a.neural_spikes().await.unwrap(),
            b.neural_spikes().await.unwrap()
        );
    }

    #[test]
    fn test_validator_rejects_contract_breaches() {
        let validator = SpikeValidator::new(3, 200.0);
        assert!(validator.validate(&[10.0, 20.0, 30.0]).is_ok());
        assert!(validator.validate(&[10.0, 20.0]).is_err());
        assert!(validator.validate(&[10.0, f64::NAN, 30.0]).is_err());
        assert!(validator.validate(&[10.0, 20.0, 300.0]).is_err());
        assert!(validator.validate(&[-1.0, 20.0, 30.0]).is_err());
    }

    #[test]
    fn test_intent_decoder_thresholds() {
        let decoder = IntentDecoder::default();
        assert_eq!(decoder.decode_intent(&[100.0, 100.0]), "move_arm");
        assert_eq!(decoder.decode_intent(&[20.0, 20.0]), "plan_route");
        assert_eq!(decoder.decode_intent(&[5.0, 5.0]), "stop");
        assert_eq!(decoder.decode_intent(&[0.0]), "stop");
    }

    #[test]
    fn test_neuromod_clamps() {
        let mut neuromod = NeuromodulationController::default();
        for _ in 0..100 {
            neuromod.update_from_success(10.0);
            neuromod.update_from_stress(true);
        }
        assert!(neuromod.gain() <= 2.0 * 1.5);

        for _ in 0..100 {
            neuromod.update_from_success(-10.0);
            neuromod.update_from_stress(false);
        }
        assert!(neuromod.gain() >= 0.5 * 0.75);
    }

    #[test]
    fn test_energy_decode_is_bounded() {
        let sim = RateSimulator::new(8, 0.02, 200.0, 1);
        assert_eq!(sim.decode_energy(&[]), 0.0);
        assert_eq!(sim.decode_energy(&[200.0; 8]), 100.0);
        let mid = sim.decode_energy(&[12.5; 8]);
        assert!(mid > 0.0 && mid < 100.0);
    }
}
