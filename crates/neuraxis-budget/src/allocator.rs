//! Staged resource allocator over module ledgers
//!
//! Four escalating allocation stages, selectable at construction:
//!
//! - **Flat**: equal split of the global pool each cycle
//! - **Auction**: priority × urgency scored greedy grants
//! - **Predictive**: trend-based top-ups before the auction runs
//! - **GameTheoretic**: predictive, plus a cached fixed-point equilibrium
//!   and a surplus→deficit negotiation pass
//!
//! The usage predictor is injected so each stage can be tested in
//! isolation, and so the equilibrium cache's "no recomputation inside the
//! TTL" guarantee is observable.

use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use neuraxis_common::BudgetSnapshot;

use crate::ledger::ModuleLedger;

/// Retained per-module usage samples for trend prediction.
const USAGE_HISTORY_LEN: usize = 10;

/// Samples the trend predictor averages over.
const PREDICTION_WINDOW: usize = 5;

/// Fraction of a module's initial budget bid in each auction round.
const AUCTION_REQUEST_FRACTION: f64 = 0.10;

/// Per-module cap on predictive top-ups, as a fraction of the global pool.
const PREDICTIVE_TOPUP_FRACTION: f64 = 0.10;

/// Fixed-point iteration cap for the equilibrium search.
const EQUILIBRIUM_MAX_ITER: usize = 10;

/// Convergence band for the equilibrium search (budget units).
const EQUILIBRIUM_TOLERANCE: f64 = 5.0;

/// Minimum transfer worth executing in a negotiation pass.
const NEGOTIATION_MIN_TRANSFER: f64 = 10.0;

/// Predicts a module's next-cycle usage from its bounded usage history.
pub trait UsagePredictor: Send {
    fn predict(&self, history: &VecDeque<f64>, current_usage: f64) -> f64;
}

/// Mean-plus-trend predictor over the last [`PREDICTION_WINDOW`] samples.
///
/// Falls back to the raw current usage until three samples exist.
#[derive(Debug, Default)]
pub struct TrendPredictor;

impl UsagePredictor for TrendPredictor {
    fn predict(&self, history: &VecDeque<f64>, current_usage: f64) -> f64 {
        if history.len() < 3 {
            return current_usage;
        }
        let recent: Vec<f64> = history
            .iter()
            .rev()
            .take(PREDICTION_WINDOW)
            .rev()
            .copied()
            .collect();
        let mean = recent.iter().sum::<f64>() / recent.len() as f64;
        let trend = (recent[recent.len() - 1] - recent[0]) / recent.len() as f64;
        (mean + trend).max(0.0)
    }
}

/// Which allocation stages run each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationStrategy {
    Flat,
    Auction,
    Predictive,
    GameTheoretic,
}

impl AllocationStrategy {
    fn predictive(&self) -> bool {
        matches!(
            self,
            AllocationStrategy::Predictive | AllocationStrategy::GameTheoretic
        )
    }
}

struct ModuleEntry {
    name: String,
    ledger: ModuleLedger,
    usage_history: VecDeque<f64>,
}

struct EquilibriumCache {
    key: String,
    computed_at: Instant,
    allocation: BTreeMap<String, f64>,
}

/// Resource allocator composing the staged strategies over module ledgers.
///
/// Module keys are fixed at construction; ledgers live for the process
/// lifetime.
pub struct BudgetAllocator {
    global_pool: f64,
    entries: Vec<ModuleEntry>,
    strategy: AllocationStrategy,
    predictor: Box<dyn UsagePredictor>,
    cache: Option<EquilibriumCache>,
    cache_ttl: Duration,
}

impl BudgetAllocator {
    /// Build an allocator with the full game-theoretic stage chain.
    pub fn new(global_pool: f64, module_configs: &[(&str, f64, f64)]) -> Self {
        let entries = module_configs
            .iter()
            .map(|(name, budget, sla_ms)| ModuleEntry {
                name: name.to_string(),
                ledger: ModuleLedger::new(*budget, *sla_ms),
                usage_history: VecDeque::with_capacity(USAGE_HISTORY_LEN),
            })
            .collect();
        Self {
            global_pool,
            entries,
            strategy: AllocationStrategy::GameTheoretic,
            predictor: Box::new(TrendPredictor),
            cache: None,
            cache_ttl: Duration::from_secs(1),
        }
    }

    /// Restrict the allocator to an earlier stage in the chain.
    pub fn with_strategy(mut self, strategy: AllocationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Inject a usage predictor (tests use a counting predictor here).
    pub fn with_predictor(mut self, predictor: Box<dyn UsagePredictor>) -> Self {
        self.predictor = predictor;
        self
    }

    /// Override the equilibrium cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    #[inline]
    pub fn global_pool(&self) -> f64 {
        self.global_pool
    }

    pub fn module_names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    pub fn ledger(&self, name: &str) -> Option<&ModuleLedger> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| &e.ledger)
    }

    pub fn ledger_mut(&mut self, name: &str) -> Option<&mut ModuleLedger> {
        self.entries
            .iter_mut()
            .find(|e| e.name == name)
            .map(|e| &mut e.ledger)
    }

    /// Observable view of all ledgers, for contract validation.
    pub fn snapshot(&self) -> BudgetSnapshot {
        BudgetSnapshot {
            budgets: self
                .entries
                .iter()
                .map(|e| (e.name.clone(), e.ledger.remaining()))
                .collect(),
            slas_ms: self
                .entries
                .iter()
                .map(|e| (e.name.clone(), e.ledger.sla_ms()))
                .collect(),
        }
    }

    /// Run the configured allocation stages for one cycle.
    pub fn allocate_cycle(&mut self) {
        if self.strategy.predictive() {
            self.predictive_topup();
        }
        match self.strategy {
            AllocationStrategy::Flat => self.flat_allocation(),
            _ => self.auction_allocation(),
        }
    }

    /// Equal split of the global pool.
    fn flat_allocation(&mut self) {
        let share = self.global_pool / self.entries.len().max(1) as f64;
        for entry in &mut self.entries {
            entry.ledger.top_up(share);
        }
    }

    /// Priority × urgency scored greedy grants until the pool runs dry.
    fn auction_allocation(&mut self) {
        let mut bids: Vec<(usize, f64, f64)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| {
                let amount = AUCTION_REQUEST_FRACTION * entry.ledger.initial_budget();
                let score = module_priority(&entry.name) * urgency(&entry.ledger);
                (idx, amount, score)
            })
            .collect();
        // Stable sort keeps insertion order on score ties
        bids.sort_by(|a, b| b.2.total_cmp(&a.2));

        let mut pool = self.global_pool;
        for (idx, amount, score) in bids {
            let grant = amount.min(pool);
            if grant <= 0.0 {
                break;
            }
            trace!(module = %self.entries[idx].name, grant, score, "auction grant");
            self.entries[idx].ledger.top_up(grant);
            pool -= grant;
        }
    }

    /// Top up modules whose predicted need exceeds their remaining budget.
    fn predictive_topup(&mut self) {
        let cap = PREDICTIVE_TOPUP_FRACTION * self.global_pool;
        for entry in &mut self.entries {
            let predicted = self
                .predictor
                .predict(&entry.usage_history, entry.ledger.usage_this_cycle());
            let deficit = predicted - entry.ledger.remaining();
            if deficit > 0.0 {
                entry.ledger.top_up(deficit.min(cap));
            }
        }
    }

    /// Record an observed latency against a module's SLA.
    pub fn check_sla(&mut self, name: &str, actual_latency_ms: f64) {
        if let Some(ledger) = self.ledger_mut(name) {
            ledger.check_sla(actual_latency_ms);
        }
    }

    /// End-of-cycle accounting: record usage history, then penalize deficits.
    pub fn end_cycle(&mut self) {
        for entry in &mut self.entries {
            if entry.usage_history.len() >= USAGE_HISTORY_LEN {
                entry.usage_history.pop_front();
            }
            entry
                .usage_history
                .push_back(entry.ledger.usage_this_cycle());
            entry.ledger.penalize_cycle();
        }
    }

    /// Find a fixed-point allocation where no module's locally optimal
    /// request exceeds what the pool supports given the others' holdings.
    ///
    /// Results are cached keyed on the rounded ledger state; calls inside
    /// the TTL with an unchanged key return the cached split without
    /// re-invoking the predictor.
    pub fn find_equilibrium(&mut self) -> BTreeMap<String, f64> {
        let key = self.state_key();
        if let Some(cache) = &self.cache {
            if cache.key == key && cache.computed_at.elapsed() < self.cache_ttl {
                trace!(%key, "equilibrium cache hit");
                return cache.allocation.clone();
            }
        }

        let total_remaining: f64 = self.entries.iter().map(|e| e.ledger.remaining()).sum();
        let mut strategies: BTreeMap<String, f64> = BTreeMap::new();
        for _ in 0..EQUILIBRIUM_MAX_ITER {
            for entry in &self.entries {
                let others = total_remaining - entry.ledger.remaining();
                let available = (self.global_pool - others).max(0.0);
                let predicted = self
                    .predictor
                    .predict(&entry.usage_history, entry.ledger.usage_this_cycle());
                let risk = 0.1 * entry.ledger.violation_count() as f64;
                let optimal = available.min((1.2 * predicted - risk).max(0.0));
                strategies.insert(entry.name.clone(), optimal);
            }

            let converged = self.entries.iter().all(|entry| {
                (strategies[&entry.name] - entry.ledger.remaining()).abs()
                    < EQUILIBRIUM_TOLERANCE
            });
            if converged {
                break;
            }
        }

        debug!(?strategies, "equilibrium computed");
        self.cache = Some(EquilibriumCache {
            key,
            computed_at: Instant::now(),
            allocation: strategies.clone(),
        });
        strategies
    }

    /// Overwrite ledger balances with a negotiated equilibrium split.
    pub fn apply_equilibrium(&mut self, allocation: &BTreeMap<String, f64>) {
        for entry in &mut self.entries {
            if let Some(value) = allocation.get(&entry.name) {
                entry.ledger.set_remaining(*value);
            }
        }
    }

    /// Single greedy transfer pass from surplus modules to deficit modules.
    ///
    /// Each donor feeds at most one recipient per pass, and only when the
    /// transferable amount clears the minimum threshold.
    pub fn negotiate_resources(&mut self) {
        let mut donors: Vec<(usize, f64)> = Vec::new();
        let mut recipients: Vec<(usize, f64)> = Vec::new();
        for (idx, entry) in self.entries.iter().enumerate() {
            let remaining = entry.ledger.remaining();
            let usage = entry.ledger.usage_this_cycle();
            if remaining > 1.5 * usage.max(1.0) {
                donors.push((idx, remaining - usage));
            }
            if remaining < 0.2 * entry.ledger.initial_budget() {
                recipients.push((idx, 0.2 * entry.ledger.initial_budget() - remaining));
            }
        }

        for (donor_idx, surplus) in donors {
            for &(recipient_idx, deficit) in &recipients {
                let amount = surplus.min(deficit);
                if amount > NEGOTIATION_MIN_TRANSFER {
                    debug!(
                        donor = %self.entries[donor_idx].name,
                        recipient = %self.entries[recipient_idx].name,
                        amount,
                        "negotiated transfer"
                    );
                    let donor_remaining = self.entries[donor_idx].ledger.remaining();
                    self.entries[donor_idx]
                        .ledger
                        .set_remaining(donor_remaining - amount);
                    self.entries[recipient_idx].ledger.top_up(amount);
                    break;
                }
            }
        }
    }

    /// Deterministic digest of the rounded ledger state, used as cache key.
    fn state_key(&self) -> String {
        let mut parts: Vec<String> = self
            .entries
            .iter()
            .map(|e| format!("{}:{:.1}", e.name, e.ledger.remaining()))
            .collect();
        parts.sort();
        blake3::hash(parts.join("|").as_bytes()).to_hex().to_string()
    }
}

fn module_priority(name: &str) -> f64 {
    match name {
        "decoder" => 0.9,
        "planner" => 0.7,
        "actuator" => 1.0,
        _ => 0.5,
    }
}

fn urgency(ledger: &ModuleLedger) -> f64 {
    (1.0 - ledger.remaining() / ledger.initial_budget().max(1.0)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const MODULES: [(&str, f64, f64); 3] = [
        ("decoder", 200.0, 20.0),
        ("planner", 400.0, 50.0),
        ("actuator", 400.0, 30.0),
    ];

    struct CountingPredictor {
        calls: Arc<AtomicUsize>,
    }

    impl UsagePredictor for CountingPredictor {
        fn predict(&self, _history: &VecDeque<f64>, current_usage: f64) -> f64 {
            self.calls.fetch_add(1, Ordering::SeqCst);
            current_usage
        }
    }

    #[test]
    fn test_flat_allocation_splits_pool_equally() {
        let mut allocator =
            BudgetAllocator::new(900.0, &MODULES).with_strategy(AllocationStrategy::Flat);
        allocator.allocate_cycle();
        for (name, initial, _) in MODULES {
            let ledger = allocator.ledger(name).unwrap();
            assert!((ledger.remaining() - (initial + 300.0)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_auction_grants_by_priority_times_urgency() {
        let mut allocator =
            BudgetAllocator::new(1000.0, &MODULES).with_strategy(AllocationStrategy::Auction);
        // Drain the actuator to make it maximally urgent
        assert!(allocator.ledger_mut("actuator").unwrap().request(400.0));
        allocator.allocate_cycle();
        // actuator: priority 1.0, urgency 1.0 -> granted its full 10% bid
        let actuator = allocator.ledger("actuator").unwrap();
        assert!((actuator.remaining() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_auction_stops_when_pool_exhausted() {
        let mut allocator =
            BudgetAllocator::new(30.0, &MODULES).with_strategy(AllocationStrategy::Auction);
        for name in ["decoder", "planner", "actuator"] {
            let ledger = allocator.ledger_mut(name).unwrap();
            let all = ledger.remaining();
            assert!(ledger.request(all));
        }
        allocator.allocate_cycle();
        let granted: f64 = ["decoder", "planner", "actuator"]
            .iter()
            .map(|n| allocator.ledger(n).unwrap().remaining())
            .sum();
        assert!(granted <= 30.0 + 1e-9);
    }

    #[test]
    fn test_trend_predictor_needs_three_samples() {
        let predictor = TrendPredictor;
        let mut history = VecDeque::new();
        history.push_back(10.0);
        history.push_back(20.0);
        assert_eq!(predictor.predict(&history, 7.0), 7.0);

        history.push_back(30.0);
        let predicted = predictor.predict(&history, 7.0);
        // mean 20 + trend (30-10)/3
        assert!((predicted - (20.0 + 20.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_predictive_topup_covers_predicted_deficit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut allocator = BudgetAllocator::new(1000.0, &MODULES)
            .with_strategy(AllocationStrategy::Predictive)
            .with_predictor(Box::new(CountingPredictor {
                calls: calls.clone(),
            }));
        allocator.allocate_cycle();
        assert!(calls.load(Ordering::SeqCst) >= MODULES.len());
    }

    #[test]
    fn test_equilibrium_keys_and_nonnegative() {
        let mut allocator = BudgetAllocator::new(1000.0, &MODULES);
        allocator.allocate_cycle();
        let eq = allocator.find_equilibrium();
        let keys: Vec<&str> = eq.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["actuator", "decoder", "planner"]);
        assert!(eq.values().all(|v| *v >= 0.0));
    }

    #[test]
    fn test_equilibrium_cache_skips_prediction_inside_ttl() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut allocator = BudgetAllocator::new(1000.0, &MODULES)
            .with_cache_ttl(Duration::from_secs(60))
            .with_predictor(Box::new(CountingPredictor {
                calls: calls.clone(),
            }));

        let first = allocator.find_equilibrium();
        let calls_after_first = calls.load(Ordering::SeqCst);
        assert!(calls_after_first > 0);

        let second = allocator.find_equilibrium();
        assert_eq!(calls.load(Ordering::SeqCst), calls_after_first);
        assert_eq!(first, second);
    }

    #[test]
    fn test_equilibrium_recomputes_after_state_change() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut allocator = BudgetAllocator::new(1000.0, &MODULES)
            .with_cache_ttl(Duration::from_secs(60))
            .with_predictor(Box::new(CountingPredictor {
                calls: calls.clone(),
            }));

        allocator.find_equilibrium();
        let calls_after_first = calls.load(Ordering::SeqCst);

        assert!(allocator.ledger_mut("planner").unwrap().request(100.0));
        allocator.find_equilibrium();
        assert!(calls.load(Ordering::SeqCst) > calls_after_first);
    }

    #[test]
    fn test_negotiation_moves_surplus_to_deficit() {
        let mut allocator = BudgetAllocator::new(1000.0, &MODULES);
        // decoder deep in deficit, planner flush
        allocator
            .ledger_mut("decoder")
            .unwrap()
            .set_remaining(10.0);
        allocator
            .ledger_mut("planner")
            .unwrap()
            .set_remaining(400.0);

        let decoder_before = allocator.ledger("decoder").unwrap().remaining();
        allocator.negotiate_resources();
        let decoder_after = allocator.ledger("decoder").unwrap().remaining();
        assert!(decoder_after > decoder_before);
    }

    #[test]
    fn test_negotiation_skips_below_threshold_transfers() {
        let mut allocator = BudgetAllocator::new(1000.0, &[("decoder", 200.0, 20.0)]);
        // Deficit of 5 is below the 10-unit minimum transfer
        allocator
            .ledger_mut("decoder")
            .unwrap()
            .set_remaining(35.0);
        allocator.negotiate_resources();
        assert_eq!(allocator.ledger("decoder").unwrap().remaining(), 35.0);
    }

    #[test]
    fn test_snapshot_reflects_ledgers() {
        let allocator = BudgetAllocator::new(1000.0, &MODULES);
        let snapshot = allocator.snapshot();
        assert_eq!(snapshot.budgets.len(), 3);
        assert_eq!(snapshot.budgets["planner"], 400.0);
        assert_eq!(snapshot.slas_ms["decoder"], 20.0);
    }
}
