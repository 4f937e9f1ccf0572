//! Diode models.
//!
//! Single diodes follow the Shockley equation:
//!   I = Is * (exp(V / (n * Vt)) - 1)
//!
//! A pair of matched diodes in anti-parallel conducts
//!   I = Is * (exp(V / nVt) - exp(-V / nVt)) = 2 * Is * sinh(V / nVt)
//!
//! Both forms come with their analytic derivative so the per-sample
//! Newton-Raphson solvers never differentiate numerically.

use crate::THERMAL_VOLTAGE;

/// Largest exponent handed to `exp()` before linear extrapolation.
///
/// exp(80) is about 5.5e34, far past any physical current but still far from
/// f64 overflow once multiplied by a resistance.
pub const MAX_EXPONENT: f64 = 80.0;

/// Common diode parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiodeType {
    /// GZ34 rectifier
    #[default]
    Gz34,
    /// 1N34 germanium
    N34,
    /// 1N4148 silicon switching diode
    N4148,
}

impl DiodeType {
    /// Reverse saturation current in amps.
    pub fn saturation_current(self) -> f64 {
        match self {
            Self::Gz34 => 2.52e-9,
            Self::N34 => 200.0e-12,
            Self::N4148 => 2.64e-9,
        }
    }

    /// Select a diode by index, as exposed by a choice control.
    pub fn from_index(index: usize) -> Self {
        match index {
            1 => Self::N34,
            2 => Self::N4148,
            _ => Self::Gz34,
        }
    }
}

/// Parameters for a diode (or a string of identical diodes).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiodeParams {
    /// Saturation current (Is)
    pub is: f64,
    /// Ideality factor (n)
    pub n: f64,
    /// Number of diodes in series; scales the effective thermal voltage
    pub count: f64,
}

impl Default for DiodeParams {
    fn default() -> Self {
        Self::from_type(DiodeType::Gz34)
    }
}

impl DiodeParams {
    /// Create parameters for a catalogued diode.
    pub fn from_type(diode: DiodeType) -> Self {
        Self {
            is: diode.saturation_current(),
            n: 1.0,
            count: 1.0,
        }
    }

    /// Create parameters for a germanium diode.
    pub fn germanium() -> Self {
        Self::from_type(DiodeType::N34)
    }

    /// Create parameters for a silicon diode.
    pub fn silicon() -> Self {
        Self::from_type(DiodeType::N4148)
    }

    /// Set the number of diodes in series (clamped to 0.3..3).
    pub fn with_count(mut self, count: f64) -> Self {
        self.count = count.clamp(0.3, 3.0);
        self
    }

    /// Thermal voltage times ideality factor times diode count.
    pub fn n_vt(&self) -> f64 {
        self.n * self.count * THERMAL_VOLTAGE
    }

    /// Current through a single diode and its derivative at `v`.
    #[inline]
    pub fn shockley(&self, v: f64) -> (f64, f64) {
        let n_vt = self.n_vt();
        let x = v / n_vt;
        if x > MAX_EXPONENT {
            let e = MAX_EXPONENT.exp();
            let g = self.is / n_vt * e;
            (self.is * (e - 1.0) + g * (v - MAX_EXPONENT * n_vt), g)
        } else {
            let e = x.exp();
            (self.is * (e - 1.0), self.is / n_vt * e)
        }
    }

    /// Current through an anti-parallel pair and its derivative at `v`.
    #[inline]
    pub fn antiparallel(&self, v: f64) -> (f64, f64) {
        let n_vt = self.n_vt();
        let x = v / n_vt;
        let clamped = x.clamp(-MAX_EXPONENT, MAX_EXPONENT);
        let (sinh, cosh) = sinh_cosh(clamped);
        let two_is = 2.0 * self.is;
        let g = two_is / n_vt * cosh;
        let i = two_is * sinh + g * (x - clamped) * n_vt;
        (i, g)
    }
}

/// Compute sinh and cosh sharing a single exponential.
///
/// With B = e^x: sinh = (B - 1/B)/2, cosh = (B + 1/B)/2.
#[inline]
pub fn sinh_cosh(x: f64) -> (f64, f64) {
    let b = 0.5 * x.exp();
    let br = 0.25 / b;
    (b - br, b + br)
}

/// Asymmetric sinh and its derivative for a pair of mismatched diodes.
///
/// The forward branch uses thermal voltage `vt1` and the reverse branch `vt2`.
/// The second value is the derivative with respect to `x`.
#[inline]
pub fn sinh_cosh_asym(x: f64, vt1: f64, vt2: f64) -> (f64, f64) {
    let b = 0.5 * (x / vt1).min(MAX_EXPONENT).exp();
    let br = 0.5 * (-x / vt2).min(MAX_EXPONENT).exp();
    (b - br, b / vt1 + br / vt2)
}
