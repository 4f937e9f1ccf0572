//! # Analog Sim
//!
//! Real-time emulation of nonlinear analog circuits, sample by sample, for
//! audio effect chains.
//!
//! This library provides:
//! - A wave digital filter framework with compile-time composed adaptors
//! - R-type adaptors whose scattering matrix comes from nodal analysis, for
//!   topologies with no series/parallel decomposition
//! - A nodal DK-method state-space solver for multi-transistor circuits
//! - Bounded, warm-started Newton-Raphson for per-sample implicit equations
//! - Ready-made circuit models sharing one [`Circuit`] interface
//!
//! ## Architecture
//!
//! - [`wdf`] - Ports, adaptors, leaves, nonlinear roots and the R-type adaptor
//! - [`ndk`] - Netlists, matrix precomputation, the per-sample solver and the
//!   control-thread coefficient hand-off
//! - [`solver`] - Newton-Raphson, linear algebra helpers and bilinear filters
//! - [`components`] - Diode and BJT device laws, potentiometers and the
//!   envelope follower
//! - [`circuits`] - Diode clipper, Fuzz Face, Cry Baby, Muff stages, the
//!   bridged-T clipper and tape hysteresis
//! - [`audio`] - Raw PCM I/O for the CLI (CLI only)
//!
//! ## Usage
//!
//! ### Native CLI
//!
//! ```bash
//! ffmpeg -i input.wav -f f32le -ac 1 -ar 48000 - \
//!   | analog-sim --circuit fuzz-face --fuzz 0.8 \
//!   | ffmpeg -f f32le -ac 1 -ar 48000 -i - output.wav
//! ```
//!
//! ### Library
//!
//! ```no_run
//! use analog_sim::{Circuit, CircuitKind};
//!
//! let mut circuit = CircuitKind::DiodeClipper.build(1, None)?;
//! circuit.prepare(48_000.0)?;
//! circuit.set_control("drive", 0.8)?;
//!
//! let mut block = vec![0.0f32; 256];
//! circuit.process(&mut block, 0);
//! # Ok::<(), analog_sim::SimError>(())
//! ```
//!
//! ### WASM
//!
//! ```javascript
//! import { WasmCircuit } from 'analog_sim';
//!
//! const circuit = new WasmCircuit('big-muff', 48000);
//! circuit.process_block(inputBuffer, outputBuffer);
//! ```
//!
//! ## Real-time behaviour
//!
//! Nothing on a `process` path allocates, locks or returns an error. Each
//! nonlinear solve runs a bounded number of Newton iterations warm started
//! from the previous sample, and a state that goes non-finite is reset
//! rather than propagated.

pub mod circuits;
pub mod components;
pub mod config;
pub mod error;
pub mod ndk;
pub mod solver;
pub mod wdf;

#[cfg(feature = "cli")]
pub mod audio;

// Re-export main types for convenience
pub use circuits::{Circuit, CircuitKind, Control};
pub use config::{IterationPolicy, Quality, SolverConfig};
pub use error::{Result, SimError};

// WASM bindings
#[cfg(feature = "wasm")]
mod wasm;

#[cfg(feature = "wasm")]
pub use wasm::WasmCircuit;

/// Default sample rate in Hz
pub const DEFAULT_SAMPLE_RATE: f32 = 48000.0;

/// Thermal voltage at room temperature (approximately 26mV)
pub const THERMAL_VOLTAGE: f64 = 0.02585;
