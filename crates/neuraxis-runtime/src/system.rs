//! Orchestration loop
//!
//! One cycle runs allocation → validation → negotiation/equilibrium →
//! sensing → decoding → planning → acting → ledger penalties → health and
//! degradation assessment → snapshot persistence, strictly in that order.
//! A denied budget request ends that action's processing for the cycle;
//! fatal errors (invariant violations, watchdog timeouts) end the run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use neuraxis_budget::{AllocationStrategy, BudgetAllocator};
use neuraxis_common::{
    validate_budget_snapshot, validate_system_scalars, DegradationMode, Result,
    SystemScalars,
};
use neuraxis_policy::{DecisionPlanner, PlannerConfig};

use crate::actuator::{Actuator, SafetyActuator};
use crate::config::SystemConfig;
use crate::metrics::MetricsCollector;
use crate::monitor::{AnomalyDetector, BudgetHealthMonitor, DegradationController};
use crate::persist::StateManager;
use crate::resilience::{CircuitBreaker, WatchdogTimer};
use crate::sensory::{IntentDecoder, RateSimulator, SpikeSource};

const DECODER_REQUEST: f64 = 100.0;
const PLANNER_REQUEST: f64 = 200.0;
const ACTUATOR_REQUEST: f64 = 150.0;

#[derive(Debug)]
struct Scalars {
    battery: f64,
    user_energy: f64,
}

/// Per-cycle persisted record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleSnapshot {
    pub cycle: u64,
    pub action: String,
    pub battery: f64,
    pub user_energy: f64,
    pub mode: DegradationMode,
}

pub struct ControlSystem<S: SpikeSource = RateSimulator, A: Actuator = SafetyActuator> {
    config: SystemConfig,
    artifacts_dir: PathBuf,
    scalars: Mutex<Scalars>,
    rng: StdRng,

    source: S,
    decoder: IntentDecoder,
    planner: DecisionPlanner,
    actuator: A,
    allocator: BudgetAllocator,

    metrics: MetricsCollector,
    breaker: CircuitBreaker,
    state: StateManager,
    anomaly: AnomalyDetector,
    health_monitor: BudgetHealthMonitor,
    degradation: DegradationController,
    degradation_mode: DegradationMode,
}

impl ControlSystem<RateSimulator, SafetyActuator> {
    pub fn new(config: SystemConfig) -> Result<Self> {
        let source = RateSimulator::new(
            config.n_channels,
            config.sim_window_s,
            config.max_firing_hz,
            config.seed,
        );
        let actuator = SafetyActuator::new(config.safety_mode);
        Self::with_collaborators(config, source, actuator, "artifacts")
    }
}

impl<S: SpikeSource, A: Actuator> ControlSystem<S, A> {
    /// Builds the system around injected sensory/actuation collaborators.
    pub fn with_collaborators(
        config: SystemConfig,
        source: S,
        actuator: A,
        artifacts_dir: impl AsRef<Path>,
    ) -> Result<Self> {
        let artifacts_dir = artifacts_dir.as_ref().to_path_buf();

        let planner = DecisionPlanner::new(PlannerConfig {
            gamma: config.gamma,
            seed: config.seed,
            artifact_path: artifacts_dir.join("models/rl_policy.bin"),
            ..PlannerConfig::default()
        })?;

        let allocator = BudgetAllocator::new(
            config.global_resource_pool,
            &[
                ("decoder", config.decoder_budget, config.decoder_sla_ms),
                ("planner", config.planner_budget, config.planner_sla_ms),
                ("actuator", config.actuator_budget, config.actuator_sla_ms),
            ],
        )
        .with_strategy(AllocationStrategy::GameTheoretic);

        let health_monitor = BudgetHealthMonitor::new(BTreeMap::from([
            ("decoder".to_string(), 50.0),
            ("planner".to_string(), 100.0),
            ("actuator".to_string(), 100.0),
        ]));

        Ok(Self {
            scalars: Mutex::new(Scalars {
                battery: config.initial_battery,
                user_energy: config.initial_user_energy,
            }),
            rng: StdRng::seed_from_u64(config.seed),
            state: StateManager::new(artifacts_dir.join("state")),
            source,
            decoder: IntentDecoder::default(),
            planner,
            actuator,
            allocator,
            metrics: MetricsCollector::new(),
            breaker: CircuitBreaker::default(),
            anomaly: AnomalyDetector::new(),
            health_monitor,
            degradation: DegradationController::new(),
            degradation_mode: DegradationMode::Full,
            config,
            artifacts_dir,
        })
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn planner(&self) -> &DecisionPlanner {
        &self.planner
    }

    pub fn planner_mut(&mut self) -> &mut DecisionPlanner {
        &mut self.planner
    }

    pub fn allocator(&self) -> &BudgetAllocator {
        &self.allocator
    }

    pub fn allocator_mut(&mut self) -> &mut BudgetAllocator {
        &mut self.allocator
    }

    pub fn degradation_mode(&self) -> DegradationMode {
        self.degradation_mode
    }

    pub async fn scalar_levels(&self) -> (f64, f64) {
        let scalars = self.scalars.lock().await;
        (scalars.battery, scalars.user_energy)
    }

    fn request_budget(&mut self, module: &str, amount: f64) -> bool {
        let granted = self
            .allocator
            .ledger_mut(module)
            .map_or(false, |ledger| ledger.request(amount));
        if !granted {
            debug!(module, amount, "budget request denied");
        }
        granted
    }

    /// Reads the sensor and updates the scalar state inside the single
    /// exclusive critical section.
    pub async fn monitor_resources(&mut self) -> Result<(f64, f64)> {
        let mut scalars = self.scalars.lock().await;

        let rates = self.breaker.call(self.source.neural_spikes()).await?;
        scalars.user_energy = self.source.decode_energy(&rates);

        let noise: f64 = StandardNormal.sample(&mut self.rng);
        let depletion = (3.0 + noise).max(0.0);
        scalars.battery = (scalars.battery - depletion).max(0.0);

        self.metrics.battery_level = scalars.battery;
        self.metrics.user_energy_level = scalars.user_energy;

        validate_system_scalars(
            &SystemScalars {
                battery_pct: scalars.battery,
                user_energy_pct: scalars.user_energy,
                degradation_mode: self.degradation_mode,
            },
            false,
        )?;
        Ok((scalars.battery, scalars.user_energy))
    }

    /// Decoder → planner → actuator phases for one requested action. Each
    /// phase starts with a budget request; denial ends the cycle's
    /// remaining phases without error.
    pub async fn process_action(&mut self, action_name: &str) -> Result<()> {
        // Decoder phase
        let t0 = Instant::now();
        if !self.request_budget("decoder", DECODER_REQUEST) {
            return Ok(());
        }
        let rates = self.breaker.call(self.source.neural_spikes()).await?;
        let intent = self.decoder.decode_intent(&rates);
        let dec_ms = t0.elapsed().as_secs_f64() * 1000.0;
        self.allocator.check_sla("decoder", dec_ms);
        self.metrics.record_latency("decoder", dec_ms / 1000.0);
        self.anomaly.add_sample("decoder", dec_ms / 1000.0);

        if intent != action_name {
            debug!(%intent, requested = action_name, "intent mismatch, aborting cycle");
            return Ok(());
        }

        // Planner phase
        let t1 = Instant::now();
        if !self.request_budget("planner", PLANNER_REQUEST) {
            return Ok(());
        }
        let state = {
            let scalars = self.scalars.lock().await;
            [scalars.battery, scalars.user_energy]
        };
        let action = self.planner.decide_with_stability(state);
        self.metrics.set_rl_metrics(self.planner.rl_metrics());
        let approve = action == 0 || action == 1;
        let (reward, cost, _) = self.planner.estimate_params(action);
        self.metrics.bellman_error = self.planner.compute_bellman_error(action, reward - cost);
        let plan_ms = t1.elapsed().as_secs_f64() * 1000.0;
        self.allocator.check_sla("planner", plan_ms);
        self.metrics.record_latency("planner", plan_ms / 1000.0);
        self.anomaly.add_sample("planner", plan_ms / 1000.0);

        if !approve {
            debug!(action, "planner rejected action");
            return Ok(());
        }

        // Actuator phase
        let t2 = Instant::now();
        if !self.request_budget("actuator", ACTUATOR_REQUEST) {
            return Ok(());
        }
        let simplified = action == 1 || self.degradation_mode == DegradationMode::Minimal;
        self.breaker
            .call(self.actuator.perform(action_name, simplified))
            .await?;
        let act_ms = t2.elapsed().as_secs_f64() * 1000.0;
        self.allocator.check_sla("actuator", act_ms);
        self.metrics.record_latency("actuator", act_ms / 1000.0);
        self.anomaly.add_sample("actuator", act_ms / 1000.0);

        self.source.neuromod_mut().update_from_success(reward);
        let stressed = self.metrics.bellman_error > 0.1;
        self.source.neuromod_mut().update_from_stress(stressed);

        self.monitor_resources().await?;
        // A completed action publishes a fresh structured snapshot.
        self.metrics
            .export_json(&self.artifacts_dir.join("metrics/metrics.json"))?;
        Ok(())
    }

    /// Drives one cycle per requested action, then exports metrics.
    pub async fn run_loop(&mut self, actions: &[String], epochs: usize) -> Result<()> {
        let mut watchdog = WatchdogTimer::new(Duration::from_secs_f64(
            self.config.watchdog_timeout_s,
        ));

        self.planner.train(epochs)?;
        self.metrics.set_rl_metrics(self.planner.rl_metrics());

        for (i, action) in actions.iter().enumerate() {
            let cycle = (i + 1) as u64;
            watchdog.reset();

            self.allocator.allocate_cycle();
            self.allocator.negotiate_resources();
            validate_budget_snapshot(
                &self.allocator.snapshot(),
                Some(&self.allocator.module_names()),
            )?;
            let equilibrium = self.allocator.find_equilibrium();
            self.allocator.apply_equilibrium(&equilibrium);

            match self.process_action(action).await {
                Ok(()) => {}
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => warn!(cycle, %err, "cycle phase failed"),
            }

            self.allocator.end_cycle();

            let health = self.health_monitor.check_health(&self.allocator);
            let (battery, user_energy) = self.scalar_levels().await;
            self.degradation_mode = self.degradation.assess(
                battery,
                user_energy,
                &health,
                self.config.battery_threshold,
                self.config.energy_threshold,
            );
            self.planner.force_simplify = self.degradation_mode == DegradationMode::Minimal;

            self.state.save(
                &CycleSnapshot {
                    cycle,
                    action: action.clone(),
                    battery,
                    user_energy,
                    mode: self.degradation_mode,
                },
                &format!("cycle_{}_{}", cycle, action),
            )?;

            watchdog.check()?;
            info!(cycle, action = %action, mode = %self.degradation_mode, "cycle complete");
        }

        self.metrics
            .export_csv(&self.artifacts_dir.join("metrics/metrics.csv"))?;
        self.metrics
            .export_json(&self.artifacts_dir.join("metrics/metrics.json"))?;
        Ok(())
    }
}
