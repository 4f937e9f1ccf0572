//! Device models shared by the WDF and NDK engines.
//!
//! The device laws are pure functions of voltage: they carry no simulation
//! state, so the same parameters can be evaluated from any solver. Controls
//! and the envelope follower turn user settings and input level into pot
//! positions.

mod bjt;
mod controls;
mod diode;
mod envelope;

pub use bjt::BjtParams;
pub use controls::Potentiometer;
pub use diode::{sinh_cosh, sinh_cosh_asym, DiodeParams, DiodeType, MAX_EXPONENT};
pub use envelope::EnvelopeFollower;
