//! WASM bindings for Analog Sim.
//!
//! JavaScript-friendly wrappers for running the circuit models inside a Web
//! Audio `AudioWorklet`.
//!
//! ## Usage (JavaScript)
//!
//! ```javascript
//! import init, { WasmCircuit } from 'analog_sim';
//!
//! await init();
//!
//! const circuit = new WasmCircuit('fuzz-face', 48000);
//! circuit.set_control('fuzz', 0.8);
//!
//! // In AudioWorkletProcessor.process():
//! const input = inputBuffer.getChannelData(0);
//! const output = outputBuffer.getChannelData(0);
//! circuit.process_block(input, output);
//! ```

use wasm_bindgen::prelude::*;

use crate::circuits::{Circuit, CircuitKind};
use crate::config::IterationPolicy;

/// Initialize panic hook for better error messages in browser console.
#[wasm_bindgen(start)]
pub fn init_panic_hook() {
    console_error_panic_hook::set_once();
}

fn to_js(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// A circuit model processing one mono channel.
#[wasm_bindgen]
pub struct WasmCircuit {
    circuit: Box<dyn Circuit>,
    sample_rate: f32,
}

#[wasm_bindgen]
impl WasmCircuit {
    /// Create a circuit by name, e.g. `"diode-clipper"` or `"big-muff"`.
    ///
    /// # Example
    /// ```javascript
    /// const circuit = new WasmCircuit('cry-baby', 48000);
    /// ```
    #[wasm_bindgen(constructor)]
    pub fn new(kind: &str, sample_rate: f32) -> Result<WasmCircuit, JsValue> {
        Self::build(kind, sample_rate, None)
    }

    /// Create a circuit with a fixed Newton-Raphson iteration count.
    #[wasm_bindgen]
    pub fn with_iterations(kind: &str, sample_rate: f32, iterations: usize) -> Result<WasmCircuit, JsValue> {
        Self::build(kind, sample_rate, Some(IterationPolicy::Fixed(iterations.max(1))))
    }

    /// Process a block of audio samples.
    ///
    /// Designed to be called from an AudioWorkletProcessor's `process()`.
    /// Only the overlapping length of `input` and `output` is written.
    #[wasm_bindgen]
    pub fn process_block(&mut self, input: &[f32], output: &mut [f32]) {
        let len = input.len().min(output.len());
        output[..len].copy_from_slice(&input[..len]);
        self.circuit.process(&mut output[..len], 0);
    }

    /// Set a named control. Out-of-range values are clamped.
    #[wasm_bindgen]
    pub fn set_control(&mut self, name: &str, value: f64) -> Result<(), JsValue> {
        self.circuit.set_control(name, value).map_err(to_js)
    }

    /// Names of the controls this circuit accepts.
    #[wasm_bindgen]
    pub fn controls(&self) -> Vec<String> {
        self.circuit.controls().iter().map(|c| c.name.to_string()).collect()
    }

    /// Return the circuit to its rest state.
    #[wasm_bindgen]
    pub fn reset(&mut self) {
        self.circuit.reset();
    }

    /// Get the sample rate this circuit was prepared for.
    #[wasm_bindgen(getter)]
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Number of unstable samples recovered from so far.
    #[wasm_bindgen(getter)]
    pub fn recoveries(&self) -> f64 {
        self.circuit.recoveries() as f64
    }
}

impl WasmCircuit {
    fn build(kind: &str, sample_rate: f32, policy: Option<IterationPolicy>) -> Result<WasmCircuit, JsValue> {
        let kind: CircuitKind = kind.parse().map_err(to_js)?;
        let mut circuit = kind.build(1, policy).map_err(to_js)?;
        circuit.prepare(f64::from(sample_rate)).map_err(to_js)?;
        Ok(WasmCircuit { circuit, sample_rate })
    }
}

/// Names of every available circuit.
#[wasm_bindgen]
pub fn circuits() -> Vec<String> {
    CircuitKind::ALL.iter().map(|k| k.to_string()).collect()
}

/// Get the library version.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Get the default sample rate.
#[wasm_bindgen]
pub fn default_sample_rate() -> f32 {
    crate::DEFAULT_SAMPLE_RATE
}
