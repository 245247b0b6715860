//! Per-module budget ledger
//!
//! Each resource-consuming module (decoder, planner, actuator) holds one
//! ledger. `request` is the budget feasibility gate used everywhere else:
//! it either atomically deducts or leaves the ledger untouched.

use std::collections::VecDeque;

use serde::Serialize;
use tracing::debug;

/// Maximum retained violation ratios, most-recent-last.
pub const VIOLATION_WINDOW: usize = 32;

/// Default fraction of `initial_budget` charged per violation unit.
pub const DEFAULT_PENALTY_RATE: f64 = 0.2;

/// Resource account for a single module.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleLedger {
    initial_budget: f64,
    remaining: f64,
    usage_this_cycle: f64,
    sla_ms: f64,
    penalty_rate: f64,
    violation_history: VecDeque<f64>,
}

impl ModuleLedger {
    pub fn new(initial_budget: f64, sla_ms: f64) -> Self {
        Self {
            initial_budget,
            remaining: initial_budget,
            usage_this_cycle: 0.0,
            sla_ms,
            penalty_rate: DEFAULT_PENALTY_RATE,
            violation_history: VecDeque::with_capacity(VIOLATION_WINDOW),
        }
    }

    #[inline]
    pub fn initial_budget(&self) -> f64 {
        self.initial_budget
    }

    #[inline]
    pub fn remaining(&self) -> f64 {
        self.remaining
    }

    #[inline]
    pub fn usage_this_cycle(&self) -> f64 {
        self.usage_this_cycle
    }

    #[inline]
    pub fn sla_ms(&self) -> f64 {
        self.sla_ms
    }

    #[inline]
    pub fn penalty_rate(&self) -> f64 {
        self.penalty_rate
    }

    #[inline]
    pub fn violation_count(&self) -> usize {
        self.violation_history.len()
    }

    /// Deduct `amount` iff it fits in the remaining budget.
    ///
    /// A denied request mutates nothing; it is the feasibility gate
    /// downstream phases key off.
    pub fn request(&mut self, amount: f64) -> bool {
        if self.remaining >= amount {
            self.remaining -= amount;
            self.usage_this_cycle += amount;
            true
        } else {
            false
        }
    }

    /// Unconditionally increase the remaining budget.
    pub fn top_up(&mut self, amount: f64) {
        self.remaining += amount;
    }

    /// Overwrite the remaining budget (equilibrium application, negotiation).
    pub(crate) fn set_remaining(&mut self, value: f64) {
        self.remaining = value;
    }

    /// Record an SLA overshoot and apply an immediate penalty.
    ///
    /// The same violation can be penalized again at cycle end if the ledger
    /// goes into deficit; that double charge is intentional and observable
    /// through budget totals.
    pub fn check_sla(&mut self, actual_latency_ms: f64) {
        if actual_latency_ms <= self.sla_ms {
            return;
        }
        let overshoot = (actual_latency_ms - self.sla_ms) / self.sla_ms.max(1.0);
        self.push_violation(overshoot);
        let penalty = self.penalty_rate * self.initial_budget * overshoot.min(1.0);
        self.remaining = (self.remaining - penalty).max(0.0);
        debug!(
            overshoot,
            penalty,
            remaining = self.remaining,
            "SLA violated"
        );
    }

    /// End-of-cycle accounting: charge any deficit and reset cycle usage.
    ///
    /// Sustained overspending (trailing-3 mean violation ratio > 0.5)
    /// escalates the penalty rate permanently.
    pub fn penalize_cycle(&mut self) {
        if self.remaining < 0.0 {
            let overspend = -self.remaining;
            let ratio = overspend / self.initial_budget.max(1.0);
            self.push_violation(ratio);
            if self.trailing_violation_mean(3) > 0.5 {
                self.penalty_rate *= 1.5;
            }
            self.remaining = (self.remaining - self.penalty_rate * overspend).max(0.0);
        }
        self.usage_this_cycle = 0.0;
    }

    fn push_violation(&mut self, ratio: f64) {
        if self.violation_history.len() >= VIOLATION_WINDOW {
            self.violation_history.pop_front();
        }
        self.violation_history.push_back(ratio);
    }

    fn trailing_violation_mean(&self, n: usize) -> f64 {
        if self.violation_history.len() < n {
            return 0.0;
        }
        let tail = self
            .violation_history
            .iter()
            .rev()
            .take(n)
            .copied()
            .collect::<Vec<_>>();
        tail.iter().sum::<f64>() / tail.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deducts_and_tracks_usage() {
        let mut ledger = ModuleLedger::new(100.0, 20.0);
        assert!(ledger.request(40.0));
        assert_eq!(ledger.remaining(), 60.0);
        assert_eq!(ledger.usage_this_cycle(), 40.0);
    }

    #[test]
    fn test_denied_request_mutates_nothing() {
        let mut ledger = ModuleLedger::new(100.0, 20.0);
        assert!(!ledger.request(150.0));
        assert_eq!(ledger.remaining(), 100.0);
        assert_eq!(ledger.usage_this_cycle(), 0.0);
    }

    #[test]
    fn test_sequential_requests_bounded_by_initial_remaining() {
        let mut ledger = ModuleLedger::new(100.0, 20.0);
        let before = ledger.remaining();
        let a = 60.0;
        let b = 30.0;
        assert!(ledger.request(a));
        assert!(ledger.request(b));
        assert!(a + b <= before);
    }

    #[test]
    fn test_check_sla_within_bound_is_free() {
        let mut ledger = ModuleLedger::new(100.0, 20.0);
        ledger.check_sla(15.0);
        assert_eq!(ledger.violation_count(), 0);
        assert_eq!(ledger.remaining(), 100.0);
    }

    #[test]
    fn test_check_sla_overshoot_penalizes_immediately() {
        let mut ledger = ModuleLedger::new(100.0, 20.0);
        ledger.check_sla(30.0);
        assert_eq!(ledger.violation_count(), 1);
        // overshoot ratio 0.5 -> penalty 0.2 * 100 * 0.5 = 10
        assert!((ledger.remaining() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_check_sla_penalty_capped_at_full_overshoot() {
        let mut ledger = ModuleLedger::new(100.0, 20.0);
        // overshoot ratio 4.0, capped at 1.0 -> penalty 20
        ledger.check_sla(100.0);
        assert!((ledger.remaining() - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_penalize_cycle_resets_usage_and_floors_remaining() {
        let mut ledger = ModuleLedger::new(100.0, 20.0);
        assert!(ledger.request(30.0));
        ledger.penalize_cycle();
        assert_eq!(ledger.usage_this_cycle(), 0.0);
        assert!(ledger.remaining() >= 0.0);
    }

    #[test]
    fn test_penalize_cycle_charges_deficit() {
        let mut ledger = ModuleLedger::new(100.0, 20.0);
        ledger.set_remaining(-10.0);
        ledger.penalize_cycle();
        assert_eq!(ledger.violation_count(), 1);
        assert_eq!(ledger.remaining(), 0.0);
        assert_eq!(ledger.usage_this_cycle(), 0.0);
    }

    #[test]
    fn test_sustained_overspend_escalates_penalty_rate_permanently() {
        let mut ledger = ModuleLedger::new(100.0, 20.0);
        let base_rate = ledger.penalty_rate();
        for _ in 0..3 {
            ledger.set_remaining(-80.0); // ratio 0.8 each cycle
            ledger.penalize_cycle();
        }
        assert!(ledger.penalty_rate() > base_rate);

        // The escalated rate persists through a clean cycle
        let escalated = ledger.penalty_rate();
        ledger.penalize_cycle();
        assert_eq!(ledger.penalty_rate(), escalated);
    }
}
