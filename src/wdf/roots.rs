//! Root elements that close a WDF tree.
//!
//! The nonlinear roots solve the wave-domain port equation
//!
//! ```text
//! F(v) = a - v - Rp i(v) = 0,     b = 2v - a
//! ```
//!
//! for the port voltage `v` with a fixed-iteration Newton-Raphson, warm
//! started from the previous sample. Iterates are clamped to an interval that
//! provably contains the root, so a cold start on a large wave cannot push
//! the exponential into overflow.

use super::{Wave, WdfRoot};
use crate::components::DiodeParams;
use crate::config::IterationPolicy;
use crate::solver::NewtonRaphson;

/// Ideal voltage source: `b = 2V - a`. Only valid as a root.
#[derive(Debug, Clone, Default)]
pub struct IdealVoltageSource {
    voltage: f64,
    wave: Wave,
}

impl IdealVoltageSource {
    pub fn new(voltage: f64) -> Self {
        Self {
            voltage,
            wave: Wave::default(),
        }
    }

    #[inline]
    pub fn set_voltage(&mut self, voltage: f64) {
        self.voltage = voltage;
    }
}

impl WdfRoot for IdealVoltageSource {
    #[inline]
    fn solve(&mut self, a: f64, _port_resistance: f64) -> f64 {
        self.wave = Wave {
            a,
            b: 2.0 * self.voltage - a,
        };
        self.wave.b
    }

    fn wave(&self) -> Wave {
        self.wave
    }

    fn reset(&mut self) {
        self.wave = Wave::default();
    }
}

/// Open circuit: zero current, `b = a`.
#[derive(Debug, Clone, Default)]
pub struct OpenCircuit {
    wave: Wave,
}

impl WdfRoot for OpenCircuit {
    #[inline]
    fn solve(&mut self, a: f64, _port_resistance: f64) -> f64 {
        self.wave = Wave { a, b: a };
        a
    }

    fn wave(&self) -> Wave {
        self.wave
    }

    fn reset(&mut self) {
        self.wave = Wave::default();
    }
}

/// Pair of matched diodes in anti-parallel.
#[derive(Debug, Clone)]
pub struct DiodePairRoot {
    params: DiodeParams,
    newton: NewtonRaphson,
    v: f64,
    port_resistance: f64,
    wave: Wave,
}

impl DiodePairRoot {
    pub fn new(params: DiodeParams) -> Self {
        Self {
            params,
            newton: NewtonRaphson::default(),
            v: 0.0,
            port_resistance: 1.0,
            wave: Wave::default(),
        }
    }

    pub fn with_policy(mut self, policy: IterationPolicy) -> Self {
        self.newton.set_policy(policy);
        self
    }

    pub fn set_policy(&mut self, policy: IterationPolicy) {
        self.newton.set_policy(policy);
    }

    pub fn set_params(&mut self, params: DiodeParams) {
        self.params = params;
    }

    pub fn params(&self) -> &DiodeParams {
        &self.params
    }

    /// |F(v)| at the last solution.
    pub fn residual(&self) -> f64 {
        let (i, _) = self.params.antiparallel(self.v);
        (self.wave.a - self.v - self.port_resistance * i).abs()
    }
}

impl WdfRoot for DiodePairRoot {
    #[inline]
    fn solve(&mut self, a: f64, port_resistance: f64) -> f64 {
        let params = self.params;
        let r = port_resistance;

        // |Rp i(v)| <= |a| bounds the root by both the linear and the sinh term.
        let bound = a.abs().min(params.n_vt() * (a.abs() / (2.0 * r * params.is)).asinh());
        let (lo, hi) = if a >= 0.0 { (0.0, bound) } else { (-bound, 0.0) };

        let solution = self.newton.solve_bracketed(self.v, lo, hi, |v| {
            let (i, g) = params.antiparallel(v);
            (a - v - r * i, -1.0 - r * g)
        });

        self.v = solution.value;
        self.port_resistance = r;
        self.wave = Wave {
            a,
            b: 2.0 * self.v - a,
        };
        self.wave.b
    }

    fn wave(&self) -> Wave {
        self.wave
    }

    fn reset(&mut self) {
        self.v = 0.0;
        self.wave = Wave::default();
    }
}

/// Single diode, anode on the port's positive terminal.
#[derive(Debug, Clone)]
pub struct DiodeRoot {
    params: DiodeParams,
    newton: NewtonRaphson,
    v: f64,
    port_resistance: f64,
    wave: Wave,
}

impl DiodeRoot {
    pub fn new(params: DiodeParams) -> Self {
        Self {
            params,
            newton: NewtonRaphson::default(),
            v: 0.0,
            port_resistance: 1.0,
            wave: Wave::default(),
        }
    }

    pub fn with_policy(mut self, policy: IterationPolicy) -> Self {
        self.newton.set_policy(policy);
        self
    }

    /// |F(v)| at the last solution.
    pub fn residual(&self) -> f64 {
        let (i, _) = self.params.shockley(self.v);
        (self.wave.a - self.v - self.port_resistance * i).abs()
    }
}

impl WdfRoot for DiodeRoot {
    #[inline]
    fn solve(&mut self, a: f64, port_resistance: f64) -> f64 {
        let params = self.params;
        let r = port_resistance;

        // Forward: 0 <= v <= min(a, nVt ln(1 + a / (Rp Is))).
        // Reverse: the current is bounded by -Is, so v sits just above a.
        let (lo, hi) = if a >= 0.0 {
            let ln_bound = params.n_vt() * (a / (r * params.is)).ln_1p();
            (0.0, a.min(ln_bound))
        } else {
            (a, (a + r * params.is).min(0.0))
        };

        let solution = self.newton.solve_bracketed(self.v, lo, hi, |v| {
            let (i, g) = params.shockley(v);
            (a - v - r * i, -1.0 - r * g)
        });

        self.v = solution.value;
        self.port_resistance = r;
        self.wave = Wave {
            a,
            b: 2.0 * self.v - a,
        };
        self.wave.b
    }

    fn wave(&self) -> Wave {
        self.wave
    }

    fn reset(&mut self) {
        self.v = 0.0;
        self.wave = Wave::default();
    }
}
