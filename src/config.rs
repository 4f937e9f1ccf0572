//! Solver configuration shared by every circuit model.

/// Default number of Newton-Raphson iterations per sample.
pub const DEFAULT_ITERATIONS: usize = 4;

/// Iteration count used by [`Quality::High`].
pub const HIGH_QUALITY_ITERATIONS: usize = 8;

/// Default bound on NDK state magnitude before the state is treated as unstable.
pub const DEFAULT_SANITY_BOUND: f64 = 1.0e4;

/// Policy for the transistor stages, whose four coupled junctions need more
/// than the default budget on loud input.
pub const TRANSISTOR_POLICY: IterationPolicy = IterationPolicy::EarlyExit {
    max_iterations: 16,
    tolerance: 1.0e-6,
};

/// How many Newton-Raphson steps a per-sample solve performs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IterationPolicy {
    /// Always run exactly this many iterations. Deterministic timing.
    Fixed(usize),
    /// Run up to `max_iterations`, stopping once the summed absolute update
    /// drops below `tolerance`. Cheaper on average, but worst-case timing is
    /// only bounded by `max_iterations`.
    EarlyExit { max_iterations: usize, tolerance: f64 },
}

impl IterationPolicy {
    /// Upper bound on the number of iterations.
    pub fn max_iterations(&self) -> usize {
        match *self {
            Self::Fixed(n) => n,
            Self::EarlyExit { max_iterations, .. } => max_iterations,
        }
    }

    /// Whether the loop may stop after an update of size `delta`.
    #[inline]
    pub fn converged(&self, delta: f64) -> bool {
        match *self {
            Self::Fixed(_) => false,
            Self::EarlyExit { tolerance, .. } => delta < tolerance,
        }
    }
}

impl Default for IterationPolicy {
    fn default() -> Self {
        Self::Fixed(DEFAULT_ITERATIONS)
    }
}

/// Accuracy/cost trade-off for the single-equation clipper stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quality {
    /// 4 iterations per sample
    #[default]
    Standard,
    /// 8 iterations per sample, more accurate on loud high-frequency content
    High,
}

impl Quality {
    /// Iteration count for this quality level.
    pub fn iterations(self) -> usize {
        match self {
            Self::Standard => DEFAULT_ITERATIONS,
            Self::High => HIGH_QUALITY_ITERATIONS,
        }
    }
}

/// Configuration for the per-sample solvers.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Newton-Raphson iteration policy.
    pub policy: IterationPolicy,
    /// Largest state magnitude accepted before instability recovery kicks in.
    pub sanity_bound: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            policy: IterationPolicy::default(),
            sanity_bound: DEFAULT_SANITY_BOUND,
        }
    }
}

impl SolverConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the iteration policy.
    pub fn with_iteration_policy(mut self, policy: IterationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Use a fixed iteration count.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.policy = IterationPolicy::Fixed(iterations.max(1));
        self
    }

    /// Set the state sanity bound.
    ///
    /// The bound should sit well above the largest companion-model value the
    /// circuit produces at its highest supported sample rate.
    pub fn with_sanity_bound(mut self, bound: f64) -> Self {
        self.sanity_bound = bound.abs();
        self
    }
}
