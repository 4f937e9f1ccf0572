//! Ready-made circuit models built on the WDF, R-type and NDK engines.
//!
//! Every model implements [`Circuit`], so the CLI, the WASM bindings and the
//! tests drive them the same way:
//!
//! ```text
//! prepare(sample_rate)  ->  set_control(..)*  ->  process(block, channel)*
//! ```
//!
//! Controls are named, take physical units or normalized 0..1 values and are
//! clamped to their documented range.

mod bridged_clipper;
mod cry_baby;
mod diode_clipper;
mod fuzz_face;
mod hysteresis;
mod muff_clipper;

use std::fmt;
use std::str::FromStr;

pub use bridged_clipper::BridgedClipper;
pub use cry_baby::CryBaby;
pub use diode_clipper::DiodeClipper;
pub use fuzz_face::FuzzFace;
pub use hysteresis::{Hysteresis, JilesAtherton};
pub use muff_clipper::{BigMuff, ClippingStage, MuffClipper};

use crate::config::IterationPolicy;
use crate::error::{Result, SimError};

/// A user-facing control of a circuit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Control {
    pub name: &'static str,
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

impl Control {
    pub const fn new(name: &'static str, min: f64, max: f64, default: f64) -> Self {
        Self {
            name,
            min,
            max,
            default,
        }
    }

    /// Clamp `value` into the control's range.
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// A complete circuit model, processed sample by sample.
pub trait Circuit: Send {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Discretize for `sample_rate` and reset every channel.
    fn prepare(&mut self, sample_rate: f64) -> Result<()>;

    /// Return every channel to its rest state.
    fn reset(&mut self);

    /// Process one sample on `channel`. Unknown channels produce silence.
    fn process_sample(&mut self, input: f64, channel: usize) -> f64;

    /// Process a block in place.
    fn process(&mut self, block: &mut [f32], channel: usize) {
        for sample in block.iter_mut() {
            *sample = self.process_sample(f64::from(*sample), channel) as f32;
        }
    }

    /// Set a named control. Values outside the control's range are clamped.
    fn set_control(&mut self, name: &str, value: f64) -> Result<()>;

    /// Controls accepted by [`set_control`](Self::set_control).
    fn controls(&self) -> &'static [Control];

    /// Override the Newton-Raphson iteration policy of every solver.
    fn set_iteration_policy(&mut self, policy: IterationPolicy);

    /// Number of unstable samples that were recovered from.
    fn recoveries(&self) -> u64 {
        0
    }
}

/// Look up a control by name, or report it as unknown for `circuit`.
pub(crate) fn find_control(controls: &'static [Control], circuit: &str, name: &str) -> Result<&'static Control> {
    controls
        .iter()
        .find(|c| c.name == name)
        .ok_or_else(|| SimError::invalid_parameter(circuit, name, "unknown control"))
}

/// Input and compensating output gain for a 0..1 drive setting.
///
/// The input gain runs from 0.5 to 10. Gains below one are undone fully,
/// larger ones only by their square root so the clipping stays audible.
pub(crate) fn drive_gains(drive: f64) -> (f64, f64) {
    let gain = 0.5 + 9.5 * drive.clamp(0.0, 1.0);
    let makeup = if gain < 1.0 { 1.0 / gain } else { 1.0 / gain.sqrt() };
    (gain, makeup)
}

/// Every circuit model the crate ships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum CircuitKind {
    DiodeClipper,
    FuzzFace,
    CryBaby,
    MuffClipper,
    BigMuff,
    BridgedClipper,
    Hysteresis,
}

impl CircuitKind {
    pub const ALL: [CircuitKind; 7] = [
        Self::DiodeClipper,
        Self::FuzzFace,
        Self::CryBaby,
        Self::MuffClipper,
        Self::BigMuff,
        Self::BridgedClipper,
        Self::Hysteresis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DiodeClipper => "diode-clipper",
            Self::FuzzFace => "fuzz-face",
            Self::CryBaby => "cry-baby",
            Self::MuffClipper => "muff-clipper",
            Self::BigMuff => "big-muff",
            Self::BridgedClipper => "bridged-clipper",
            Self::Hysteresis => "hysteresis",
        }
    }

    /// Build the circuit for `channels` channels at the default sample rate.
    ///
    /// `policy` replaces the circuit's own iteration policy when given.
    pub fn build(self, channels: usize, policy: Option<IterationPolicy>) -> Result<Box<dyn Circuit>> {
        let mut circuit: Box<dyn Circuit> = match self {
            Self::DiodeClipper => Box::new(DiodeClipper::new(channels)),
            Self::FuzzFace => Box::new(FuzzFace::new(channels)?),
            Self::CryBaby => Box::new(CryBaby::new(channels)?),
            Self::MuffClipper => Box::new(MuffClipper::new(channels)),
            Self::BigMuff => Box::new(BigMuff::new(channels)),
            Self::BridgedClipper => Box::new(BridgedClipper::new(channels)?),
            Self::Hysteresis => Box::new(Hysteresis::new(channels)),
        };
        if let Some(policy) = policy {
            circuit.set_iteration_policy(policy);
        }
        Ok(circuit)
    }
}

impl fmt::Display for CircuitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CircuitKind {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| SimError::UnknownCircuit { name: s.to_string() })
    }
}
