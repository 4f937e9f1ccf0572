//! Newton-Raphson iteration for per-sample implicit equations.
//!
//! Every nonlinear element in the engine is solved the same way: start from
//! the previous sample's solution (warm start), run a bounded number of
//! `y -= F(y) / F'(y)` steps, and accept whatever the loop produced. The
//! solver never allocates and never fails; a step with a zero or non-finite
//! derivative simply ends the loop early.

use crate::config::IterationPolicy;

/// Outcome of a single per-sample solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewtonSolution {
    /// Final iterate
    pub value: f64,
    /// Number of iterations actually performed
    pub iterations: usize,
    /// Size of the last update
    pub last_step: f64,
}

/// Bounded scalar Newton-Raphson solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewtonRaphson {
    policy: IterationPolicy,
}

impl Default for NewtonRaphson {
    fn default() -> Self {
        Self::new(IterationPolicy::default())
    }
}

impl NewtonRaphson {
    /// Create a solver with the given iteration policy.
    pub fn new(policy: IterationPolicy) -> Self {
        Self { policy }
    }

    /// Create a solver that always runs exactly `iterations` steps.
    pub fn fixed(iterations: usize) -> Self {
        Self::new(IterationPolicy::Fixed(iterations))
    }

    pub fn policy(&self) -> IterationPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: IterationPolicy) {
        self.policy = policy;
    }

    /// Solve `F(y) = 0` starting from `guess`.
    ///
    /// `f` returns `(F(y), F'(y))`.
    #[inline]
    pub fn solve<F>(&self, guess: f64, f: F) -> NewtonSolution
    where
        F: FnMut(f64) -> (f64, f64),
    {
        self.solve_bracketed(guess, f64::NEG_INFINITY, f64::INFINITY, f)
    }

    /// Solve `F(y) = 0` keeping every iterate inside `[lo, hi]`.
    ///
    /// The bracket must contain the root. Clamping stops a step taken from
    /// the flat side of an exponential from landing far past the root, where
    /// the next evaluation would overflow.
    #[inline]
    pub fn solve_bracketed<F>(&self, guess: f64, lo: f64, hi: f64, mut f: F) -> NewtonSolution
    where
        F: FnMut(f64) -> (f64, f64),
    {
        let mut y = guess.clamp(lo, hi);
        let mut last_step = 0.0;
        let mut iterations = 0;

        for _ in 0..self.policy.max_iterations() {
            let (fy, dfy) = f(y);
            iterations += 1;

            let step = fy / dfy;
            if !step.is_finite() {
                break;
            }

            let next = (y - step).clamp(lo, hi);
            last_step = (next - y).abs();
            y = next;

            if self.policy.converged(last_step) {
                break;
            }
        }

        NewtonSolution {
            value: y,
            iterations,
            last_step,
        }
    }
}

/// Trapezoidal companion-model state update for a capacitor.
///
/// `g` is the discretized admittance `2 * C * fs`, `y - bias` the voltage
/// across the capacitor this sample, `state` the previous history current.
#[inline]
pub fn companion_update(g: f64, y: f64, bias: f64, state: f64) -> f64 {
    2.0 * g * (y - bias) - state
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_solves_square_root() {
        let solver = NewtonRaphson::fixed(8);
        let sol = solver.solve(1.0, |y| (y * y - 2.0, 2.0 * y));
        assert_relative_eq!(sol.value, 2.0_f64.sqrt(), epsilon = 1e-12);
        assert_eq!(sol.iterations, 8);
    }

    #[test]
    fn test_early_exit_stops_sooner() {
        let solver = NewtonRaphson::new(IterationPolicy::EarlyExit {
            max_iterations: 50,
            tolerance: 1e-9,
        });
        let sol = solver.solve(1.0, |y| (y * y - 2.0, 2.0 * y));
        assert!(sol.iterations < 10);
        assert_relative_eq!(sol.value, 2.0_f64.sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn test_zero_derivative_is_harmless() {
        let solver = NewtonRaphson::fixed(4);
        let sol = solver.solve(0.0, |y| (y * y + 1.0, 2.0 * y));
        assert_eq!(sol.value, 0.0);
        assert_eq!(sol.iterations, 1);
    }

    #[test]
    fn test_bracket_limits_iterates() {
        // Exponential with the root at ln(10); a step from -10 would overshoot wildly.
        let solver = NewtonRaphson::fixed(60);
        let sol = solver.solve_bracketed(-10.0, -10.0, 3.0, |y| (y.exp() - 10.0, y.exp()));
        assert_relative_eq!(sol.value, 10.0_f64.ln(), epsilon = 1e-10);
    }

    #[test]
    fn test_companion_update() {
        assert_relative_eq!(companion_update(0.5, 1.7, 0.7, 0.25), 0.75);
    }
}
