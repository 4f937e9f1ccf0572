//! Tape-style magnetic hysteresis on a Jiles-Atherton core.
//!
//! The input is the applied field H and the output the magnetisation M. Each
//! sample takes `dH/dt` from an alpha-transform derivative and then solves the
//! implicit update
//!
//! ```text
//! M[n] = M[n-1] + T/1.9 * (f(M[n], H[n], H'[n]) + f(M[n-1], H[n-1], H'[n-1]))
//! ```
//!
//! with the shared scalar Newton-Raphson solver, `f` being the Jiles-Atherton
//! magnetisation slope. A NaN or a magnetisation past ±20 zeroes M and H'.

use log::{debug, warn};

use super::{find_control, Circuit, Control};
use crate::config::IterationPolicy;
use crate::error::{require_sample_rate, Result};
use crate::solver::NewtonRaphson;
use crate::DEFAULT_SAMPLE_RATE;

/// Mean-field coupling between domains.
const ALPHA: f64 = 1.6e-3;
/// Pinning coefficient.
const PINNING: f64 = 0.47875;
const UPPER_LIMIT: f64 = 20.0;
const DERIVATIVE_ALPHA: f64 = 0.75;
const STEP_DAMPING: f64 = 1.9;
const INPUT_GAIN: f64 = 2.0;
const ITERATIONS: usize = 4;

const CONTROLS: &[Control] = &[
    Control::new("drive", 0.0, 1.0, 0.5),
    Control::new("width", 0.0, 1.0, 0.5),
    Control::new("sat", 0.0, 1.0, 0.5),
];

/// Langevin function `L(q) = coth(q) - 1/q` with its first two derivatives.
///
/// Near zero the series `q/3`, `1/3`, `-2q/15` replaces the cancelling terms.
#[inline]
fn langevin(q: f64) -> (f64, f64, f64) {
    if q.abs() < 1.0e-3 {
        return (q / 3.0, 1.0 / 3.0, -2.0 * q / 15.0);
    }
    let coth = 1.0 / q.tanh();
    let inv = 1.0 / q;
    (
        coth - inv,
        1.0 - coth * coth + inv * inv,
        2.0 * coth * (coth * coth - 1.0) - 2.0 * inv * inv * inv,
    )
}

/// Jiles-Atherton material parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JilesAtherton {
    /// Saturation magnetisation
    pub ms: f64,
    /// Anhysteretic shape
    pub a: f64,
    /// Reversible fraction
    pub c: f64,
}

impl JilesAtherton {
    /// Material for 0..1 drive, loop width and saturation settings.
    pub fn from_controls(drive: f64, width: f64, sat: f64) -> Self {
        let ms = 0.5 + 1.5 * (1.0 - sat.clamp(0.0, 1.0));
        Self {
            ms,
            a: ms / (0.01 + 6.0 * drive.clamp(0.0, 1.0)),
            c: (1.0 - width.clamp(0.0, 1.0)).sqrt() - 0.01,
        }
    }

    /// `dM/dt` and its derivative with respect to `m`.
    pub fn slope(&self, m: f64, h: f64, h_d: f64) -> (f64, f64) {
        let nc = 1.0 - self.c;
        let ms_over_a = self.ms / self.a;

        let (l, l_d, l_dd) = langevin((h + ALPHA * m) / self.a);
        let m_diff = self.ms * l - m;
        let delta = if h_d >= 0.0 { 1.0 } else { -1.0 };
        // Irreversible part only moves toward the anhysteretic curve.
        let kappa = if (delta > 0.0) == (m_diff > 0.0) { nc } else { 0.0 };

        let denom = nc * delta * PINNING - ALPHA * m_diff;
        let f1 = kappa * m_diff / denom;
        let f2 = self.c * ms_over_a * l_d;
        let f3 = 1.0 - ALPHA * self.c * ms_over_a * l_d;

        let m_diff_d = ALPHA * ms_over_a * l_d - 1.0;
        let f1_d = kappa * m_diff_d * nc * delta * PINNING / (denom * denom);
        let f2_d = ALPHA * self.c * ms_over_a / self.a * l_dd;
        let f3_d = -ALPHA * ALPHA * self.c * ms_over_a / self.a * l_dd;

        let slope = h_d * (f1 + f2) / f3;
        let slope_d = h_d * ((f1_d + f2_d) * f3 - (f1 + f2) * f3_d) / (f3 * f3);
        (slope, slope_d)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Magnet {
    m: f64,
    h: f64,
    h_d: f64,
}

/// Tape saturation with drive, loop width and saturation controls.
#[derive(Debug, Clone)]
pub struct Hysteresis {
    material: JilesAtherton,
    drive: f64,
    width: f64,
    sat: f64,
    newton: NewtonRaphson,
    period: f64,
    channels: Vec<Magnet>,
    recoveries: u64,
    warned: bool,
}

impl Hysteresis {
    pub fn new(channels: usize) -> Self {
        let (drive, width, sat) = (CONTROLS[0].default, CONTROLS[1].default, CONTROLS[2].default);
        Self {
            material: JilesAtherton::from_controls(drive, width, sat),
            drive,
            width,
            sat,
            newton: NewtonRaphson::fixed(ITERATIONS),
            period: 1.0 / f64::from(DEFAULT_SAMPLE_RATE),
            channels: vec![Magnet::default(); channels.max(1)],
            recoveries: 0,
            warned: false,
        }
    }

    pub fn material(&self) -> JilesAtherton {
        self.material
    }

    fn cook(&mut self) {
        self.material = JilesAtherton::from_controls(self.drive, self.width, self.sat);
    }

    /// Magnetisation held by `channel` after the last sample.
    pub fn magnetisation(&self, channel: usize) -> Option<f64> {
        self.channels.get(channel).map(|c| c.m)
    }
}

impl Circuit for Hysteresis {
    fn name(&self) -> &'static str {
        "hysteresis"
    }

    fn prepare(&mut self, sample_rate: f64) -> Result<()> {
        let fs = require_sample_rate(sample_rate)?;
        self.period = 1.0 / fs;
        self.reset();
        debug!(
            "hysteresis: prepared at {fs} Hz, Ms {:.3}, a {:.3}, c {:.3}",
            self.material.ms, self.material.a, self.material.c
        );
        Ok(())
    }

    fn reset(&mut self) {
        self.channels.fill(Magnet::default());
        self.warned = false;
    }

    #[inline]
    fn process_sample(&mut self, input: f64, channel: usize) -> f64 {
        let Some(prev) = self.channels.get(channel).copied() else {
            return 0.0;
        };
        let material = self.material;
        let step = self.period / STEP_DAMPING;

        let h = INPUT_GAIN * input;
        let h_d = (1.0 + DERIVATIVE_ALPHA) / self.period * (h - prev.h) - DERIVATIVE_ALPHA * prev.h_d;
        let (prev_slope, _) = material.slope(prev.m, prev.h, prev.h_d);

        let solution = self.newton.solve(prev.m, |m| {
            let (slope, slope_d) = material.slope(m, h, h_d);
            (m - prev.m - step * (slope + prev_slope), 1.0 - step * slope_d)
        });

        let m = solution.value;
        let next = if m.is_finite() && m.abs() <= UPPER_LIMIT && h_d.is_finite() {
            Magnet { m, h, h_d }
        } else {
            self.recoveries += 1;
            if !self.warned {
                warn!("hysteresis: magnetisation ran away on channel {channel}, resetting");
                self.warned = true;
            }
            Magnet {
                m: 0.0,
                h: if h.is_finite() { h } else { 0.0 },
                h_d: 0.0,
            }
        };
        self.channels[channel] = next;
        next.m
    }

    fn set_control(&mut self, name: &str, value: f64) -> Result<()> {
        let control = find_control(CONTROLS, self.name(), name)?;
        let value = control.clamp(value);
        match control.name {
            "drive" => self.drive = value,
            "width" => self.width = value,
            _ => self.sat = value,
        }
        self.cook();
        Ok(())
    }

    fn controls(&self) -> &'static [Control] {
        CONTROLS
    }

    fn set_iteration_policy(&mut self, policy: IterationPolicy) {
        self.newton.set_policy(policy);
    }

    fn recoveries(&self) -> u64 {
        self.recoveries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuits::tests::{peak, sine};
    use approx::assert_relative_eq;

    fn tape(drive: f64, sample_rate: f64) -> Hysteresis {
        let mut circuit = Hysteresis::new(1);
        circuit.set_control("drive", drive).unwrap();
        circuit.prepare(sample_rate).unwrap();
        circuit
    }

    #[test]
    fn test_langevin_series_matches_closed_form() {
        for q in [1.0e-3, -1.0e-3] {
            let (l, l_d, l_dd) = langevin(q * 1.0001);
            let (s, s_d, s_dd) = langevin(q * 0.9999);
            assert_relative_eq!(l, s, epsilon = 1e-6);
            assert_relative_eq!(l_d, s_d, epsilon = 1e-6);
            assert_relative_eq!(l_dd, s_dd, epsilon = 1e-5);
        }
        let (l, l_d, _) = langevin(50.0);
        assert_relative_eq!(l, 1.0 - 1.0 / 50.0, epsilon = 1e-12);
        assert_relative_eq!(l_d, 1.0 / 2500.0, epsilon = 1e-12);
    }

    #[test]
    fn test_slope_derivative_matches_difference() {
        let material = JilesAtherton::from_controls(0.5, 0.5, 0.5);
        for (m, h, h_d) in [(0.1, 0.3, 200.0), (-0.4, 0.2, -150.0), (0.8, 1.5, 50.0)] {
            let (_, analytic) = material.slope(m, h, h_d);
            let eps = 1.0e-6;
            let numeric = (material.slope(m + eps, h, h_d).0 - material.slope(m - eps, h, h_d).0) / (2.0 * eps);
            assert_relative_eq!(analytic, numeric, max_relative = 1e-4, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_controls_shape_material() {
        let soft = JilesAtherton::from_controls(0.0, 1.0, 1.0);
        assert_relative_eq!(soft.ms, 0.5);
        assert_relative_eq!(soft.a, 50.0);
        assert_relative_eq!(soft.c, -0.01);

        let hard = JilesAtherton::from_controls(1.0, 0.0, 0.0);
        assert_relative_eq!(hard.ms, 2.0);
        assert_relative_eq!(hard.c, 0.99);
    }

    #[test]
    fn test_silence_in_silence_out_at_any_rate() {
        for sample_rate in [44_100.0, 48_000.0, 96_000.0] {
            let mut circuit = tape(0.5, sample_rate);
            let mut block = vec![0.0f32; 4_800];
            circuit.process(&mut block, 0);
            assert!(block.iter().all(|&s| s == 0.0));
            assert_eq!(circuit.magnetisation(0), Some(0.0));
        }
    }

    #[test]
    fn test_output_saturates_below_ms() {
        let mut circuit = tape(1.0, 48_000.0);
        let ms = circuit.material().ms;
        let mut block = sine(10.0, 100.0, 48_000.0, 9_600);
        circuit.process(&mut block, 0);
        assert!(block.iter().all(|s| s.is_finite()));
        assert!(f64::from(peak(&block)) < ms);
        assert!(f64::from(peak(&block)) > 0.5 * ms);
        assert_eq!(circuit.recoveries(), 0);
    }

    #[test]
    fn test_drive_raises_level() {
        let run = |drive: f64| {
            let mut circuit = tape(drive, 48_000.0);
            let mut block = sine(0.1, 100.0, 48_000.0, 9_600);
            circuit.process(&mut block, 0);
            peak(&block[4_800..])
        };
        assert!(run(1.0) > run(0.5));
        assert!(run(0.5) > 10.0 * run(0.0));
    }

    #[test]
    fn test_response_is_rate_independent() {
        let run = |sample_rate: f64| {
            let mut circuit = tape(0.5, sample_rate);
            let mut block = sine(1.0, 100.0, sample_rate, sample_rate as usize / 5);
            circuit.process(&mut block, 0);
            peak(&block[block.len() / 2..])
        };
        assert_relative_eq!(run(48_000.0), run(96_000.0), epsilon = 1e-2);
    }

    #[test]
    fn test_loop_is_hysteretic() {
        // Rising and falling through H = 0 land on opposite sides of M = 0.
        let mut circuit = tape(0.5, 48_000.0);
        let input = sine(1.0, 100.0, 48_000.0, 960);
        let mut output = input.clone();
        circuit.process(&mut output, 0);
        // 480 samples per cycle: the second cycle crosses zero at 480 (rising) and 720 (falling).
        assert!(output[480] < 0.0);
        assert!(output[720] > 0.0);
    }

    #[test]
    fn test_runaway_is_recovered() {
        let mut circuit = tape(0.5, 48_000.0);
        let mut fresh = tape(0.5, 48_000.0);
        let mut warm = sine(0.5, 100.0, 48_000.0, 480);
        circuit.process(&mut warm, 0);

        assert_eq!(circuit.process_sample(f64::NAN, 0), 0.0);
        assert_eq!(circuit.recoveries(), 1);
        assert_eq!(circuit.magnetisation(0), Some(0.0));

        // Back to the unmagnetised state: it now tracks a fresh instance.
        let mut after = sine(0.5, 100.0, 48_000.0, 480);
        let mut reference = after.clone();
        circuit.process(&mut after, 0);
        fresh.process(&mut reference, 0);
        assert_eq!(after, reference);
    }

    #[test]
    fn test_channels_are_independent() {
        let mut circuit = Hysteresis::new(2);
        circuit.prepare(48_000.0).unwrap();
        circuit.process_sample(0.8, 0);
        assert_ne!(circuit.magnetisation(0), Some(0.0));
        assert_eq!(circuit.magnetisation(1), Some(0.0));
        assert_eq!(circuit.process_sample(0.8, 7), 0.0);
    }
}
