//! First-order diode clipper as a WDF tree.
//!
//! ```text
//!   Vs --[R]--+------+---- out
//!             |      |
//!            C1    D1 D2   (anti-parallel pair, tree root)
//!             |      |
//!   gnd ------+------+
//! ```
//!
//! The source resistance is tuned so `R C1` places the low-pass corner at
//! the cutoff control: `R = 1 / (2π fc C1)`.

use std::f64::consts::PI;

use log::debug;

use super::{drive_gains, find_control, Circuit, Control};
use crate::components::{DiodeParams, DiodeType};
use crate::config::IterationPolicy;
use crate::error::{require_sample_rate, Result};
use crate::wdf::{process_tree, Capacitor, DiodePairRoot, Parallel, ResistiveVoltageSource, WdfPort, WdfRoot};

const C1: f64 = 47.0e-9;

const CONTROLS: &[Control] = &[
    Control::new("cutoff", 200.0, 20_000.0, 4_000.0),
    Control::new("drive", 0.0, 1.0, 0.5),
    Control::new("diode_type", 0.0, 2.0, 0.0),
    Control::new("diodes", 0.3, 3.0, 1.0),
];

type Tree = Parallel<ResistiveVoltageSource, Capacitor>;

#[derive(Debug, Clone)]
struct Channel {
    tree: Tree,
    root: DiodePairRoot,
}

/// Diode clipper with cutoff, drive and diode selection.
#[derive(Debug, Clone)]
pub struct DiodeClipper {
    channels: Vec<Channel>,
    cutoff: f64,
    input_gain: f64,
    output_gain: f64,
    diode_type: DiodeType,
    diode_count: f64,
}

fn source_resistance(cutoff: f64) -> f64 {
    1.0 / (2.0 * PI * cutoff * C1)
}

impl DiodeClipper {
    pub fn new(channels: usize) -> Self {
        let cutoff = CONTROLS[0].default;
        let (input_gain, output_gain) = drive_gains(CONTROLS[1].default);
        let params = DiodeParams::default();
        let channel = Channel {
            tree: Parallel::new(ResistiveVoltageSource::new(source_resistance(cutoff)), Capacitor::new(C1)),
            root: DiodePairRoot::new(params),
        };
        Self {
            channels: vec![channel; channels.max(1)],
            cutoff,
            input_gain,
            output_gain,
            diode_type: DiodeType::Gz34,
            diode_count: 1.0,
        }
    }

    /// Set the low-pass corner in Hz (200..20k).
    pub fn set_cutoff(&mut self, cutoff: f64) {
        let cutoff = CONTROLS[0].clamp(cutoff);
        if cutoff == self.cutoff {
            return;
        }
        self.cutoff = cutoff;
        let r = source_resistance(cutoff);
        for channel in &mut self.channels {
            channel.tree.p1.set_resistance(r);
            channel.tree.propagate_impedance();
        }
    }

    /// Set the drive (0..1).
    pub fn set_drive(&mut self, drive: f64) {
        (self.input_gain, self.output_gain) = drive_gains(drive);
    }

    pub fn set_diode_type(&mut self, diode_type: DiodeType) {
        self.diode_type = diode_type;
        self.update_diodes();
    }

    /// Set the number of series diodes per leg (0.3..3).
    pub fn set_diode_count(&mut self, count: f64) {
        self.diode_count = CONTROLS[3].clamp(count);
        self.update_diodes();
    }

    /// Root residual `|F(v)|` of the last sample on `channel`.
    pub fn residual(&self, channel: usize) -> Option<f64> {
        self.channels.get(channel).map(|c| c.root.residual())
    }

    fn update_diodes(&mut self) {
        let params = DiodeParams::from_type(self.diode_type).with_count(self.diode_count);
        for channel in &mut self.channels {
            channel.root.set_params(params);
        }
    }
}

impl Circuit for DiodeClipper {
    fn name(&self) -> &'static str {
        "diode-clipper"
    }

    fn prepare(&mut self, sample_rate: f64) -> Result<()> {
        require_sample_rate(sample_rate)?;
        for channel in &mut self.channels {
            channel.tree.prepare(sample_rate);
        }
        self.reset();
        debug!("diode-clipper: prepared at {sample_rate} Hz, cutoff {} Hz", self.cutoff);
        Ok(())
    }

    fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.tree.reset();
            channel.root.reset();
        }
    }

    #[inline]
    fn process_sample(&mut self, input: f64, channel: usize) -> f64 {
        let Some(ch) = self.channels.get_mut(channel) else {
            return 0.0;
        };
        ch.tree.p1.set_voltage(self.input_gain * input);
        process_tree(&mut ch.tree, &mut ch.root);
        self.output_gain * ch.root.voltage()
    }

    fn set_control(&mut self, name: &str, value: f64) -> Result<()> {
        let control = find_control(CONTROLS, self.name(), name)?;
        let value = control.clamp(value);
        match control.name {
            "cutoff" => self.set_cutoff(value),
            "drive" => self.set_drive(value),
            "diode_type" => self.set_diode_type(DiodeType::from_index(value.round() as usize)),
            _ => self.set_diode_count(value),
        }
        Ok(())
    }

    fn controls(&self) -> &'static [Control] {
        CONTROLS
    }

    fn set_iteration_policy(&mut self, policy: IterationPolicy) {
        for channel in &mut self.channels {
            channel.root.set_policy(policy);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuits::tests::{peak, sine};

    /// Unity drive, corner far above the test tone.
    fn transparent_clipper(sample_rate: f64) -> DiodeClipper {
        let mut clipper = DiodeClipper::new(1);
        clipper.set_cutoff(20_000.0);
        clipper.set_drive(0.5 / 9.5);
        clipper.prepare(sample_rate).unwrap();
        clipper
    }

    fn crossings(block: &[f32]) -> Vec<usize> {
        (1..block.len())
            .filter(|&n| (block[n - 1] < 0.0) != (block[n] < 0.0))
            .collect()
    }

    #[test]
    fn test_clips_sine_and_keeps_zero_crossings() {
        let mut clipper = transparent_clipper(48_000.0);
        let input = sine(0.8, 100.0, 48_000.0, 4_800);
        let mut output = input.clone();
        clipper.process(&mut output, 0);

        assert!(peak(&output) < 0.7 * 0.8);
        assert!(peak(&output) > 0.2);

        let (cin, cout) = (crossings(&input), crossings(&output));
        assert_eq!(cin.len(), cout.len());
        for (a, b) in cin.iter().zip(&cout) {
            assert!(a.abs_diff(*b) <= 1, "crossing moved from {a} to {b}");
        }
    }

    #[test]
    fn test_symmetric_response() {
        let mut pos = transparent_clipper(48_000.0);
        let mut neg = transparent_clipper(48_000.0);
        let mut up = sine(0.8, 100.0, 48_000.0, 4_800);
        let mut down: Vec<f32> = up.iter().map(|s| -s).collect();
        pos.process(&mut up, 0);
        neg.process(&mut down, 0);
        for (a, b) in up.iter().zip(&down) {
            assert!((a + b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_silence_in_silence_out() {
        let mut clipper = DiodeClipper::new(2);
        clipper.prepare(48_000.0).unwrap();
        let mut block = vec![0.0f32; 1024];
        clipper.process(&mut block, 1);
        assert!(block.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut clipper = DiodeClipper::new(1);
        clipper.prepare(48_000.0).unwrap();
        let mut first = sine(0.5, 440.0, 48_000.0, 512);
        let mut second = first.clone();

        clipper.process(&mut first, 0);
        clipper.reset();
        clipper.reset();
        clipper.process(&mut second, 0);
        assert_eq!(first, second);
    }

    #[test]
    fn test_full_drive_stays_bounded() {
        let mut clipper = DiodeClipper::new(1);
        clipper.set_cutoff(2_000.0);
        clipper.set_drive(1.0);
        clipper.prepare(48_000.0).unwrap();

        let mut block = sine(1.0, 440.0, 48_000.0, 480_000);
        clipper.process(&mut block, 0);
        assert!(block.iter().all(|s| s.is_finite() && s.abs() < 1.0));
    }

    #[test]
    fn test_dc_level_is_rate_independent() {
        let settle = |sample_rate: f64| {
            let mut clipper = transparent_clipper(sample_rate);
            let mut out = 0.0;
            for _ in 0..(sample_rate as usize / 10) {
                out = clipper.process_sample(0.5, 0);
            }
            out
        };
        let (low, high) = (settle(48_000.0), settle(96_000.0));
        assert!(low > 0.1 && low < 0.5);
        assert!((low - high).abs() < 1e-6);
    }

    #[test]
    fn test_more_iterations_lower_residual() {
        let residual = |iterations: usize| {
            let mut clipper = DiodeClipper::new(1);
            clipper.set_cutoff(2_000.0);
            clipper.set_drive(1.0);
            clipper.set_iteration_policy(IterationPolicy::Fixed(iterations));
            clipper.prepare(48_000.0).unwrap();
            clipper.process_sample(1.0, 0);
            clipper.residual(0).unwrap()
        };
        assert!(residual(8) < residual(4));
    }

    #[test]
    fn test_controls_clamp_and_change_output() {
        let run = |clipper: &mut DiodeClipper| {
            clipper.prepare(48_000.0).unwrap();
            let mut block = sine(0.5, 1_000.0, 48_000.0, 2_400);
            clipper.process(&mut block, 0);
            peak(&block[1_200..])
        };

        let mut bright = DiodeClipper::new(1);
        bright.set_control("cutoff", 1.0e6).unwrap();
        assert_eq!(bright.cutoff, 20_000.0);
        let mut dark = DiodeClipper::new(1);
        dark.set_control("cutoff", 200.0).unwrap();
        assert!(run(&mut dark) < 0.8 * run(&mut bright));

        let mut germanium = DiodeClipper::new(1);
        germanium.set_control("diode_type", 1.0).unwrap();
        germanium.set_control("diodes", 2.0).unwrap();
        assert!((run(&mut germanium) - run(&mut DiodeClipper::new(1))).abs() > 1e-3);
    }
}
