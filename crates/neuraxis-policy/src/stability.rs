//! Lyapunov stability analysis over the 2-D resource state
//!
//! A candidate transition is stable iff the Lyapunov function strictly
//! decreases: V(next, target) < V(state, target).

/// Quadratic Lyapunov analyzer with a fixed positive-definite weighting.
#[derive(Debug, Clone)]
pub struct LyapunovAnalyzer {
    p: [[f64; 2]; 2],
}

impl Default for LyapunovAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl LyapunovAnalyzer {
    pub fn new() -> Self {
        Self {
            p: [[2.0, 0.1], [0.1, 2.0]],
        }
    }

    /// V(state, target) = (state - target)ᵀ P (state - target)
    pub fn v(&self, state: [f64; 2], target: [f64; 2]) -> f64 {
        let err = [state[0] - target[0], state[1] - target[1]];
        let pe = [
            self.p[0][0] * err[0] + self.p[0][1] * err[1],
            self.p[1][0] * err[0] + self.p[1][1] * err[1],
        ];
        err[0] * pe[0] + err[1] * pe[1]
    }

    /// Returns `(stable, delta_v)` for the transition state → next.
    pub fn stable(
        &self,
        state: [f64; 2],
        next_state: [f64; 2],
        target: [f64; 2],
    ) -> (bool, f64) {
        let dv = self.v(next_state, target) - self.v(state, target);
        (dv < 0.0, dv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: [f64; 2] = [75.0, 75.0];

    #[test]
    fn test_v_is_zero_at_target() {
        let analyzer = LyapunovAnalyzer::new();
        assert_eq!(analyzer.v(TARGET, TARGET), 0.0);
    }

    #[test]
    fn test_moving_toward_target_is_stable() {
        let analyzer = LyapunovAnalyzer::new();
        let (stable, dv) = analyzer.stable([50.0, 50.0], [60.0, 60.0], TARGET);
        assert!(stable);
        assert!(dv < 0.0);
    }

    #[test]
    fn test_moving_away_from_target_is_unstable() {
        let analyzer = LyapunovAnalyzer::new();
        let (stable, dv) = analyzer.stable([50.0, 50.0], [40.0, 40.0], TARGET);
        assert!(!stable);
        assert!(dv > 0.0);
    }

    #[test]
    fn test_no_movement_is_not_strictly_stable() {
        let analyzer = LyapunovAnalyzer::new();
        let (stable, dv) = analyzer.stable([50.0, 50.0], [50.0, 50.0], TARGET);
        assert!(!stable);
        assert_eq!(dv, 0.0);
    }
}
