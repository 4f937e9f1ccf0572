//! BJT (Bipolar Junction Transistor) model.
//!
//! Uses the Ebers-Moll transport model, expressed as a nonlinear two-port
//! for the NDK solver. Each transistor occupies two nonlinear ports:
//!
//! - port 0 carries the base current, controlled by v0
//! - port 1 carries the collector current, controlled by v1
//!
//! With e_f = exp((v1 - v0) / Vt) and e_r = exp(-v0 / Vt):
//!
//! ```text
//! i0 =  Is * ((e_f - 1) / βF + (e_r - 1) / βR)
//! i1 = -Is * (-(e_r - 1) + αF⁻¹ * (e_f - 1))      αF⁻¹ = (1 + βF) / βF
//! ```

use super::diode::MAX_EXPONENT;

/// Parameters for a BJT model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BjtParams {
    /// Saturation current
    pub is: f64,
    /// Thermal voltage
    pub vt: f64,
    /// Forward current gain (β_F)
    pub beta_f: f64,
    /// Reverse current gain (β_R)
    pub beta_r: f64,
}

impl Default for BjtParams {
    fn default() -> Self {
        Self::ac128()
    }
}

impl BjtParams {
    /// High-gain germanium-era transistor used by the fuzz and wah models.
    pub fn ac128() -> Self {
        Self {
            is: 20.3e-15,
            vt: 26.0e-3,
            beta_f: 1430.0,
            beta_r: 4.0,
        }
    }

    /// Inverse forward alpha, (1 + βF) / βF.
    pub fn inv_alpha_f(&self) -> f64 {
        (1.0 + self.beta_f) / self.beta_f
    }

    /// Port currents and their 2x2 Jacobian at port voltages (v0, v1).
    ///
    /// Returns `([i0, i1], [[di0/dv0, di0/dv1], [di1/dv0, di1/dv1]])`.
    #[inline]
    pub fn port_currents(&self, v0: f64, v1: f64) -> ([f64; 2], [[f64; 2]; 2]) {
        let e_f = ((v1 - v0) / self.vt).min(MAX_EXPONENT).exp();
        let e_r = (-v0 / self.vt).min(MAX_EXPONENT).exp();
        let alpha = self.inv_alpha_f();

        let i0 = self.is * ((e_f - 1.0) / self.beta_f + (e_r - 1.0) / self.beta_r);
        let i1 = -self.is * (-(e_r - 1.0) + alpha * (e_f - 1.0));

        let k = self.is / self.vt;
        let jac = [
            [
                k * (-e_f / self.beta_f - e_r / self.beta_r),
                k * (e_f / self.beta_f),
            ],
            [k * (-e_r + alpha * e_f), k * (-alpha * e_f)],
        ];

        ([i0, i1], jac)
    }

    /// Junction voltage above which Newton updates are damped,
    /// `Vt * ln(Vt / (sqrt(2) * Is))`.
    pub fn critical_voltage(&self) -> f64 {
        self.vt * (self.vt / (std::f64::consts::SQRT_2 * self.is)).ln()
    }

    /// Limit a Newton update of a forward-biased junction.
    ///
    /// Past the critical voltage an increase is replaced by its logarithm, so
    /// one step can raise the junction current by a bounded factor only.
    /// Decreases and small steps pass through.
    pub fn limit_junction(&self, v_new: f64, v_old: f64) -> f64 {
        let v_crit = self.critical_voltage();
        if v_new <= v_crit || (v_new - v_old).abs() <= 2.0 * self.vt {
            return v_new;
        }
        if v_old > 0.0 {
            let arg = 1.0 + (v_new - v_old) / self.vt;
            if arg > 0.0 {
                v_old + self.vt * arg.ln()
            } else {
                v_crit
            }
        } else {
            self.vt * (v_new / self.vt).ln()
        }
    }

    /// Fraction of a port-space update to take so neither junction of a
    /// transistor moves past its limited value.
    ///
    /// Junction voltages are `vbe = v1 - v0` and `vbc = -v0`.
    pub fn step_scale(&self, old: [f64; 2], new: [f64; 2]) -> f64 {
        let junctions = |v: [f64; 2]| [v[1] - v[0], -v[0]];
        let (jo, jn) = (junctions(old), junctions(new));

        let mut scale = 1.0f64;
        for (o, n) in jo.into_iter().zip(jn) {
            if n != o {
                let limited = self.limit_junction(n, o);
                scale = scale.min((limited - o) / (n - o));
            }
        }
        scale.max(0.0)
    }
}
