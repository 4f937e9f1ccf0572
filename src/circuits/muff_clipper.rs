//! Big Muff style clipping stages, solved as one implicit equation per sample.
//!
//! Each stage is a common-emitter amplifier with an anti-parallel diode pair,
//! R17 and C12 in its feedback path, behind a C5/R19/R20 high-pass:
//!
//! ```text
//! F(y) = A (u + R20 (i_d(v) + v G17 + i_C12(v))) - y,     v = y - Vbias
//! ```
//!
//! `u` is the high-passed input, `A` the stage gain and `i_C12` the
//! trapezoidal companion current of C12. The solve is warm started from the
//! previous sample and the companion state advanced afterwards.
//!
//! Instead of running silence through the circuit until it settles, `reset`
//! places every stage directly at its rest point, the solution of `F` for
//! zero input with C12 in steady state.

use std::f64::consts::PI;

use log::debug;

use super::{find_control, Circuit, Control};
use crate::components::sinh_cosh_asym;
use crate::config::{IterationPolicy, Quality};
use crate::error::{require_sample_rate, Result};
use crate::solver::{companion_update, FirstOrderFilter, NewtonRaphson};
use crate::{DEFAULT_SAMPLE_RATE, THERMAL_VOLTAGE};

const C5: f64 = 100.0e-9;
const R19: f64 = 10.0e3;
const R20: f64 = 100.0e3;
const G17: f64 = 1.0 / 470.0e3;
const TWO_IS: f64 = 2.0 * 2.52e-9;
/// Common-emitter gain
const GAIN: f64 = -10_000.0 / 150.0;
/// Bias point after the input filter
const V_BIAS: f64 = 0.7;

const MUFF_C12: f64 = 470.0e-12;
const BIG_MUFF_C12: f64 = 500.0e-12;
const BIG_MUFF_STAGES: usize = 4;

/// Makeup for the level lost in the clipping stages, in dB.
const MAKEUP_DB: f64 = 13.0;
const DC_BLOCKER_HZ: f64 = 16.0;

const REST_POLICY: IterationPolicy = IterationPolicy::EarlyExit {
    max_iterations: 64,
    tolerance: 1.0e-14,
};

#[derive(Debug, Clone, Default)]
struct StageChannel {
    input: FirstOrderFilter,
    y: f64,
    state: f64,
}

/// One clipping stage for any number of channels.
#[derive(Debug, Clone)]
pub struct ClippingStage {
    channels: Vec<StageChannel>,
    newton: NewtonRaphson,
    sample_rate: f64,
    capacitance: f64,
    g_c12: f64,
    /// Thermal voltages of the forward and reverse diode, scaled by the clip factors
    vt: [f64; 2],
    rest: f64,
}

impl ClippingStage {
    pub fn new(capacitance: f64, channels: usize) -> Self {
        let mut stage = Self {
            channels: vec![StageChannel::default(); channels.max(1)],
            newton: NewtonRaphson::fixed(Quality::default().iterations()),
            sample_rate: f64::from(DEFAULT_SAMPLE_RATE),
            capacitance,
            g_c12: 0.0,
            vt: [THERMAL_VOLTAGE; 2],
            rest: V_BIAS,
        };
        stage.prepare(stage.sample_rate);
        stage
    }

    pub fn prepare(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        for channel in &mut self.channels {
            channel.input.set_analog([C5 * R20, 0.0], [C5 * (R19 + R20), 1.0], sample_rate);
        }
        self.g_c12 = 2.0 * self.capacitance * sample_rate;
        self.rest = self.find_rest();
        self.reset(0.0);
    }

    /// Put every channel at the rest point, with `level` as the DC input.
    pub fn reset(&mut self, level: f64) {
        let state = self.g_c12 * (self.rest - V_BIAS);
        for channel in &mut self.channels {
            channel.input.reset_to(level);
            channel.y = self.rest;
            channel.state = state;
        }
    }

    /// Change C12. The companion state restarts from steady state.
    pub fn set_capacitance(&mut self, capacitance: f64) {
        self.capacitance = capacitance.max(0.0);
        self.g_c12 = 2.0 * self.capacitance * self.sample_rate;
        for channel in &mut self.channels {
            channel.state = self.g_c12 * (channel.y - V_BIAS);
        }
    }

    /// Scale the forward and reverse diode curves. Factors are kept above 0.01.
    pub fn set_clip_factors(&mut self, forward: f64, reverse: f64) {
        self.vt = [THERMAL_VOLTAGE / forward.max(0.01), THERMAL_VOLTAGE / reverse.max(0.01)];
        self.rest = self.find_rest();
    }

    pub fn set_policy(&mut self, policy: IterationPolicy) {
        self.newton.set_policy(policy);
    }

    /// Output voltage for zero input.
    pub fn rest(&self) -> f64 {
        self.rest
    }

    /// Run the Newton solve for filtered input `u` from `guess`.
    #[inline]
    pub fn solve(&self, u: f64, guess: f64, state: f64) -> f64 {
        self.newton.solve(guess, |y| self.equation(u, y, state)).value
    }

    /// |F(y)| for filtered input `u` and companion state `state`.
    pub fn residual(&self, u: f64, y: f64, state: f64) -> f64 {
        self.equation(u, y, state).0.abs()
    }

    #[inline]
    pub fn process_sample(&mut self, x: f64, channel: usize) -> f64 {
        let (g, vt, newton) = (self.g_c12, self.vt, self.newton);
        let Some(ch) = self.channels.get_mut(channel) else {
            return 0.0;
        };
        let u = ch.input.process_sample(x);
        let state = ch.state;
        let y = newton.solve(ch.y, |y| equation(vt, g, u, y, state)).value;
        ch.state = companion_update(g, y, V_BIAS, state);
        ch.y = y;
        y
    }

    #[inline]
    fn equation(&self, u: f64, y: f64, state: f64) -> (f64, f64) {
        equation(self.vt, self.g_c12, u, y, state)
    }

    /// Zero input with C12 in steady state, so its current vanishes.
    fn find_rest(&self) -> f64 {
        let vt = self.vt;
        NewtonRaphson::new(REST_POLICY)
            .solve(V_BIAS, |y| {
                let v = y - V_BIAS;
                let (s, ds) = sinh_cosh_asym(v, vt[0], vt[1]);
                (GAIN * R20 * (TWO_IS * s + v * G17) - y, GAIN * R20 * (TWO_IS * ds + G17) - 1.0)
            })
            .value
    }
}

#[inline]
fn equation(vt: [f64; 2], g_c12: f64, u: f64, y: f64, state: f64) -> (f64, f64) {
    let v = y - V_BIAS;
    let (s, ds) = sinh_cosh_asym(v, vt[0], vt[1]);
    let i = TWO_IS * s + v * G17 + v * g_c12 - state;
    let di = TWO_IS * ds + G17 + g_c12;
    (GAIN * (u + R20 * i) - y, GAIN * R20 * di - 1.0)
}

/// Map `p` in 0..1 onto `start..end` with `centre` at the midpoint.
fn skewed(p: f64, start: f64, end: f64, centre: f64) -> f64 {
    if p <= 0.0 {
        return start;
    }
    let skew = 0.5f64.ln() / ((centre - start) / (end - start)).ln();
    start + (end - start) * (p.min(1.0).ln() / skew).exp()
}

fn db_to_gain(db: f64, floor: f64) -> f64 {
    if db <= floor {
        0.0
    } else {
        10.0f64.powf(db / 20.0)
    }
}

/// Tone filter, sustain gain, cascaded stages, DC blocker and output level.
#[derive(Debug, Clone)]
struct MuffChain {
    tone: Vec<FirstOrderFilter>,
    dc_blockers: Vec<FirstOrderFilter>,
    stages: Vec<ClippingStage>,
    active: usize,
    sample_rate: f64,
    harmonics: f64,
    level: f64,
    /// Input gain from the sustain knob
    sustain_gain: f64,
    /// Level, makeup and polarity folded into one factor
    output_gain: f64,
}

impl MuffChain {
    fn new(capacitance: f64, stages: usize, active: usize, channels: usize) -> Self {
        let channels = channels.max(1);
        let mut chain = Self {
            tone: vec![FirstOrderFilter::default(); channels],
            dc_blockers: vec![FirstOrderFilter::default(); channels],
            stages: vec![ClippingStage::new(capacitance, channels); stages.max(1)],
            active: active.clamp(1, stages.max(1)),
            sample_rate: f64::from(DEFAULT_SAMPLE_RATE),
            harmonics: 0.65,
            level: 0.65,
            sustain_gain: 1.0,
            output_gain: 1.0,
        };
        chain.set_sustain(0.5);
        chain.set_level(chain.level);
        chain.prepare(chain.sample_rate);
        chain
    }

    fn prepare(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        let wc = 2.0 * PI * DC_BLOCKER_HZ;
        for blocker in &mut self.dc_blockers {
            blocker.set_analog([1.0, 0.0], [1.0, wc], sample_rate);
        }
        for stage in &mut self.stages {
            stage.prepare(sample_rate);
        }
        self.set_harmonics(self.harmonics);
        self.reset();
    }

    fn reset(&mut self) {
        for filter in self.tone.iter_mut().chain(&mut self.dc_blockers) {
            filter.reset();
        }
        let mut level = 0.0;
        for stage in &mut self.stages[..self.active] {
            stage.reset(level);
            level = stage.rest();
        }
    }

    /// Tone low-pass corner from 500 Hz to 22 kHz.
    fn set_harmonics(&mut self, harmonics: f64) {
        self.harmonics = harmonics;
        let wc = 2.0 * PI * skewed(harmonics, 500.0, 22_000.0, 1_200.0);
        for filter in &mut self.tone {
            filter.set_analog([0.0, 1.0], [1.0 / wc, 1.0], self.sample_rate);
        }
    }

    fn set_active(&mut self, active: usize) {
        let active = active.clamp(1, self.stages.len());
        if active != self.active {
            self.active = active;
            self.set_level(self.level);
            self.reset();
        }
    }

    /// Input gain from 0.4 to 2.
    fn set_sustain(&mut self, sustain: f64) {
        self.sustain_gain = skewed(sustain, 0.4, 2.0, 1.0);
    }

    /// Output level from -60 dB to 0 dB, plus the fixed makeup.
    fn set_level(&mut self, level: f64) {
        self.level = level;
        let gain = db_to_gain(skewed(level, -60.0, 0.0, -9.0), -60.0);
        // Every stage inverts.
        let polarity = if self.active % 2 == 0 { 1.0 } else { -1.0 };
        self.output_gain = polarity * gain * db_to_gain(MAKEUP_DB, f64::NEG_INFINITY);
    }

    fn set_policy(&mut self, policy: IterationPolicy) {
        for stage in &mut self.stages {
            stage.set_policy(policy);
        }
    }

    #[inline]
    fn process_sample(&mut self, input: f64, channel: usize) -> f64 {
        let (sustain, gain) = (self.sustain_gain, self.output_gain);
        let (Some(tone), Some(blocker)) = (self.tone.get_mut(channel), self.dc_blockers.get_mut(channel)) else {
            return 0.0;
        };
        let mut x = sustain * tone.process_sample(input);
        let mut rest = 0.0;
        for stage in &mut self.stages[..self.active] {
            x = stage.process_sample(x, channel);
            rest = stage.rest();
        }
        gain * blocker.process_sample(x - rest)
    }

    /// Shared controls. Returns `false` for names it does not own.
    fn set_common(&mut self, name: &str, value: f64) -> bool {
        match name {
            "harmonics" => self.set_harmonics(value),
            "sustain" => self.set_sustain(value),
            "level" => self.set_level(value),
            "quality" => {
                let quality = if value >= 0.5 { Quality::High } else { Quality::Standard };
                self.set_policy(IterationPolicy::Fixed(quality.iterations()));
            }
            _ => return false,
        }
        true
    }
}

const MUFF_CONTROLS: &[Control] = &[
    Control::new("harmonics", 0.0, 1.0, 0.65),
    Control::new("sustain", 0.0, 1.0, 0.5),
    Control::new("smoothing", -1.0, 1.0, 0.0),
    Control::new("clip_pos", -1.0, 1.0, 0.0),
    Control::new("clip_neg", -1.0, 1.0, 0.0),
    Control::new("level", 0.0, 1.0, 0.65),
    Control::new("quality", 0.0, 1.0, 1.0),
];

/// Single Muff clipping stage with asymmetric clipping.
#[derive(Debug, Clone)]
pub struct MuffClipper {
    chain: MuffChain,
    clip: [f64; 2],
}

impl MuffClipper {
    pub fn new(channels: usize) -> Self {
        let mut chain = MuffChain::new(MUFF_C12, 1, 1, channels);
        chain.set_policy(IterationPolicy::Fixed(Quality::High.iterations()));
        Self { chain, clip: [0.0; 2] }
    }

    pub fn stage(&self) -> &ClippingStage {
        &self.chain.stages[0]
    }

    /// Scale C12 by `1 + smoothing`, smoothing in -1..1.
    pub fn set_smoothing(&mut self, smoothing: f64) {
        self.chain.stages[0].set_capacitance(MUFF_C12 * (smoothing + 1.0));
    }

    /// Set the positive and negative clip controls, each in -1..1.
    pub fn set_clip(&mut self, positive: f64, negative: f64) {
        self.clip = [positive, negative];
        self.chain.stages[0].set_clip_factors(positive + 1.0, negative + 1.0);
    }
}

impl Circuit for MuffClipper {
    fn name(&self) -> &'static str {
        "muff-clipper"
    }

    fn prepare(&mut self, sample_rate: f64) -> Result<()> {
        require_sample_rate(sample_rate)?;
        self.chain.prepare(sample_rate);
        debug!("muff-clipper: prepared at {sample_rate} Hz, rest at {:.4} V", self.stage().rest());
        Ok(())
    }

    fn reset(&mut self) {
        self.chain.reset();
    }

    #[inline]
    fn process_sample(&mut self, input: f64, channel: usize) -> f64 {
        self.chain.process_sample(input, channel)
    }

    fn set_control(&mut self, name: &str, value: f64) -> Result<()> {
        let control = find_control(MUFF_CONTROLS, self.name(), name)?;
        let value = control.clamp(value);
        if !self.chain.set_common(control.name, value) {
            match control.name {
                "smoothing" => self.set_smoothing(value),
                "clip_pos" => self.set_clip(value, self.clip[1]),
                _ => self.set_clip(self.clip[0], value),
            }
        }
        Ok(())
    }

    fn controls(&self) -> &'static [Control] {
        MUFF_CONTROLS
    }

    fn set_iteration_policy(&mut self, policy: IterationPolicy) {
        self.chain.set_policy(policy);
    }
}

const BIG_MUFF_CONTROLS: &[Control] = &[
    Control::new("harmonics", 0.0, 1.0, 0.65),
    Control::new("sustain", 0.0, 1.0, 0.5),
    Control::new("smoothing", 0.0, 100.0, 50.0),
    Control::new("stages", 1.0, 4.0, 2.0),
    Control::new("level", 0.0, 1.0, 0.65),
    Control::new("quality", 0.0, 1.0, 0.0),
];

/// One to four cascaded Big Muff clipping stages.
#[derive(Debug, Clone)]
pub struct BigMuff {
    chain: MuffChain,
}

impl BigMuff {
    pub fn new(channels: usize) -> Self {
        Self {
            chain: MuffChain::new(BIG_MUFF_C12, BIG_MUFF_STAGES, 2, channels),
        }
    }

    /// Move C12 by 4 pF per step around 500 pF, smoothing in 0..100.
    pub fn set_smoothing(&mut self, smoothing: f64) {
        let capacitance = BIG_MUFF_C12 + (smoothing - 50.0) * 4.0e-12;
        for stage in &mut self.chain.stages {
            stage.set_capacitance(capacitance);
        }
    }

    /// Number of stages in use. Changing it returns the circuit to rest.
    pub fn set_stages(&mut self, stages: usize) {
        self.chain.set_active(stages);
    }

    pub fn stages(&self) -> usize {
        self.chain.active
    }
}

impl Circuit for BigMuff {
    fn name(&self) -> &'static str {
        "big-muff"
    }

    fn prepare(&mut self, sample_rate: f64) -> Result<()> {
        require_sample_rate(sample_rate)?;
        self.chain.prepare(sample_rate);
        debug!("big-muff: prepared at {sample_rate} Hz with {} stages", self.chain.active);
        Ok(())
    }

    fn reset(&mut self) {
        self.chain.reset();
    }

    #[inline]
    fn process_sample(&mut self, input: f64, channel: usize) -> f64 {
        self.chain.process_sample(input, channel)
    }

    fn set_control(&mut self, name: &str, value: f64) -> Result<()> {
        let control = find_control(BIG_MUFF_CONTROLS, self.name(), name)?;
        let value = control.clamp(value);
        if !self.chain.set_common(control.name, value) {
            match control.name {
                "smoothing" => self.set_smoothing(value),
                _ => self.set_stages(value.round() as usize),
            }
        }
        Ok(())
    }

    fn controls(&self) -> &'static [Control] {
        BIG_MUFF_CONTROLS
    }

    fn set_iteration_policy(&mut self, policy: IterationPolicy) {
        self.chain.set_policy(policy);
    }
}
