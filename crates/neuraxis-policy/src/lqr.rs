//! Linear-quadratic regulator baseline
//!
//! A discrete algebraic Riccati recursion over a seeded near-identity
//! plant. The gain matrix is solved lazily on first use and cached for the
//! controller's lifetime.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use tracing::debug;

use neuraxis_common::{ACTION_COUNT, STATE_SIZE};

const RICCATI_MAX_ITER: usize = 500;
const RICCATI_TOLERANCE: f64 = 1e-6;

type StateMat = [[f64; STATE_SIZE]; STATE_SIZE];
type InputMat = [[f64; ACTION_COUNT]; STATE_SIZE];
type ActionMat = [[f64; ACTION_COUNT]; ACTION_COUNT];
type GainMat = [[f64; STATE_SIZE]; ACTION_COUNT];

/// LQR controller over the battery/energy state.
pub struct LqrController {
    a: StateMat,
    b: InputMat,
    q: StateMat,
    r: ActionMat,
    gain: Option<GainMat>,
}

impl LqrController {
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut sample = || -> f64 { StandardNormal.sample(&mut rng) };

        let mut a = [[0.0; STATE_SIZE]; STATE_SIZE];
        for (i, row) in a.iter_mut().enumerate() {
            for (j, value) in row.iter_mut().enumerate() {
                let identity = if i == j { 1.0 } else { 0.0 };
                *value = identity - 0.01 * sample();
            }
        }

        let mut b = [[0.0; ACTION_COUNT]; STATE_SIZE];
        for row in b.iter_mut() {
            for value in row.iter_mut() {
                *value = 0.1 * sample();
            }
        }

        let mut q = [[0.0; STATE_SIZE]; STATE_SIZE];
        for (i, row) in q.iter_mut().enumerate() {
            row[i] = 10.0;
        }
        let mut r = [[0.0; ACTION_COUNT]; ACTION_COUNT];
        for (i, row) in r.iter_mut().enumerate() {
            row[i] = 1.0;
        }

        Self {
            a,
            b,
            q,
            r,
            gain: None,
        }
    }

    /// u = -K (state - target)
    pub fn control(&mut self, state: [f64; 2], target: [f64; 2]) -> [f64; ACTION_COUNT] {
        let k = *self.gain.get_or_insert_with(|| {
            let gain = solve_riccati(&self.a, &self.b, &self.q, &self.r);
            debug!("LQR gain solved");
            gain
        });
        let err = [state[0] - target[0], state[1] - target[1]];
        let mut u = [0.0; ACTION_COUNT];
        for (i, row) in k.iter().enumerate() {
            u[i] = -(row[0] * err[0] + row[1] * err[1]);
        }
        u
    }
}

/// Iterate P ← Q + AᵀPA − AᵀPB (R + BᵀPB)⁻¹ BᵀPA to convergence,
/// then K = (R + BᵀPB)⁻¹ BᵀPA.
fn solve_riccati(a: &StateMat, b: &InputMat, q: &StateMat, r: &ActionMat) -> GainMat {
    let mut p = *q;
    for _ in 0..RICCATI_MAX_ITER {
        let btpb = quad_form_input(b, &p);
        let inv = invert3(&add3(r, &btpb));
        let btpa = input_t_p_state(b, &p, a);
        let correction = state_t_input_gain(a, &p, b, &mul3x2(&inv, &btpa));
        let atpa = quad_form_state(a, &p);

        let mut next = *q;
        let mut max_delta: f64 = 0.0;
        for i in 0..STATE_SIZE {
            for j in 0..STATE_SIZE {
                next[i][j] += atpa[i][j] - correction[i][j];
                max_delta = max_delta.max((next[i][j] - p[i][j]).abs());
            }
        }
        p = next;
        if max_delta < RICCATI_TOLERANCE {
            break;
        }
    }

    let btpb = quad_form_input(b, &p);
    let inv = invert3(&add3(r, &btpb));
    let btpa = input_t_p_state(b, &p, a);
    mul3x2(&inv, &btpa)
}

/// BᵀPB (3×3)
fn quad_form_input(b: &InputMat, p: &StateMat) -> ActionMat {
    // PB (2×3)
    let mut pb = [[0.0; ACTION_COUNT]; STATE_SIZE];
    for i in 0..STATE_SIZE {
        for j in 0..ACTION_COUNT {
            for k in 0..STATE_SIZE {
                pb[i][j] += p[i][k] * b[k][j];
            }
        }
    }
    let mut out = [[0.0; ACTION_COUNT]; ACTION_COUNT];
    for i in 0..ACTION_COUNT {
        for j in 0..ACTION_COUNT {
            for k in 0..STATE_SIZE {
                out[i][j] += b[k][i] * pb[k][j];
            }
        }
    }
    out
}

/// AᵀPA (2×2)
fn quad_form_state(a: &StateMat, p: &StateMat) -> StateMat {
    let mut pa = [[0.0; STATE_SIZE]; STATE_SIZE];
    for i in 0..STATE_SIZE {
        for j in 0..STATE_SIZE {
            for k in 0..STATE_SIZE {
                pa[i][j] += p[i][k] * a[k][j];
            }
        }
    }
    let mut out = [[0.0; STATE_SIZE]; STATE_SIZE];
    for i in 0..STATE_SIZE {
        for j in 0..STATE_SIZE {
            for k in 0..STATE_SIZE {
                out[i][j] += a[k][i] * pa[k][j];
            }
        }
    }
    out
}

/// BᵀPA (3×2)
fn input_t_p_state(b: &InputMat, p: &StateMat, a: &StateMat) -> GainMat {
    let mut pa = [[0.0; STATE_SIZE]; STATE_SIZE];
    for i in 0..STATE_SIZE {
        for j in 0..STATE_SIZE {
            for k in 0..STATE_SIZE {
                pa[i][j] += p[i][k] * a[k][j];
            }
        }
    }
    let mut out = [[0.0; STATE_SIZE]; ACTION_COUNT];
    for i in 0..ACTION_COUNT {
        for j in 0..STATE_SIZE {
            for k in 0..STATE_SIZE {
                out[i][j] += b[k][i] * pa[k][j];
            }
        }
    }
    out
}

/// AᵀPB · M where M is 3×2; yields the 2×2 Riccati correction term.
fn state_t_input_gain(a: &StateMat, p: &StateMat, b: &InputMat, m: &GainMat) -> StateMat {
    // AᵀPB (2×3)
    let mut pb = [[0.0; ACTION_COUNT]; STATE_SIZE];
    for i in 0..STATE_SIZE {
        for j in 0..ACTION_COUNT {
            for k in 0..STATE_SIZE {
                pb[i][j] += p[i][k] * b[k][j];
            }
        }
    }
    let mut atpb = [[0.0; ACTION_COUNT]; STATE_SIZE];
    for i in 0..STATE_SIZE {
        for j in 0..ACTION_COUNT {
            for k in 0..STATE_SIZE {
                atpb[i][j] += a[k][i] * pb[k][j];
            }
        }
    }
    let mut out = [[0.0; STATE_SIZE]; STATE_SIZE];
    for i in 0..STATE_SIZE {
        for j in 0..STATE_SIZE {
            for k in 0..ACTION_COUNT {
                out[i][j] += atpb[i][k] * m[k][j];
            }
        }
    }
    out
}

fn add3(x: &ActionMat, y: &ActionMat) -> ActionMat {
    let mut out = [[0.0; ACTION_COUNT]; ACTION_COUNT];
    for i in 0..ACTION_COUNT {
        for j in 0..ACTION_COUNT {
            out[i][j] = x[i][j] + y[i][j];
        }
    }
    out
}

fn mul3x2(x: &ActionMat, y: &GainMat) -> GainMat {
    let mut out = [[0.0; STATE_SIZE]; ACTION_COUNT];
    for i in 0..ACTION_COUNT {
        for j in 0..STATE_SIZE {
            for k in 0..ACTION_COUNT {
                out[i][j] += x[i][k] * y[k][j];
            }
        }
    }
    out
}

/// 3×3 inverse by adjugate. The matrix R + BᵀPB is symmetric positive
/// definite by construction, so the determinant stays well away from zero.
fn invert3(m: &ActionMat) -> ActionMat {
    let det = m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0]);
    let inv_det = 1.0 / det;

    let mut out = [[0.0; ACTION_COUNT]; ACTION_COUNT];
    out[0][0] = (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * inv_det;
    out[0][1] = (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det;
    out[0][2] = (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det;
    out[1][0] = (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * inv_det;
    out[1][1] = (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det;
    out[1][2] = (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det;
    out[2][0] = (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * inv_det;
    out[2][1] = (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det;
    out[2][2] = (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det;
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_output_has_action_dimension() {
        let mut controller = LqrController::new(1337);
        let u = controller.control([50.0, 50.0], [75.0, 75.0]);
        assert_eq!(u.len(), ACTION_COUNT);
        assert!(u.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_gain_is_cached_and_deterministic() {
        let mut controller = LqrController::new(1337);
        let first = controller.control([50.0, 50.0], [75.0, 75.0]);
        let second = controller.control([50.0, 50.0], [75.0, 75.0]);
        assert_eq!(first, second);

        let mut fresh = LqrController::new(1337);
        let third = fresh.control([50.0, 50.0], [75.0, 75.0]);
        assert_eq!(first, third);
    }

    #[test]
    fn test_zero_error_yields_zero_control() {
        let mut controller = LqrController::new(7);
        let u = controller.control([75.0, 75.0], [75.0, 75.0]);
        assert!(u.iter().all(|x| x.abs() < 1e-12));
    }

    #[test]
    fn test_invert3_recovers_identity() {
        let m = [[4.0, 1.0, 0.5], [1.0, 3.0, 0.2], [0.5, 0.2, 2.0]];
        let inv = invert3(&m);
        for i in 0..3 {
            for j in 0..3 {
                let mut prod = 0.0;
                for k in 0..3 {
                    prod += m[i][k] * inv[k][j];
                }
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((prod - expected).abs() < 1e-9);
            }
        }
    }
}
