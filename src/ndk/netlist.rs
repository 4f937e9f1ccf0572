//! Incidence-matrix description of a circuit for the NDK solver.

use nalgebra::DMatrix;

use crate::error::{require_positive, Result, SimError};

/// Energy-storing element, discretized with the trapezoidal rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reactive {
    /// Capacitance in farads
    Capacitor(f64),
    /// Inductance in henries
    Inductor(f64),
}

impl Reactive {
    /// Companion conductance at sample rate `fs`.
    pub fn conductance(&self, fs: f64) -> f64 {
        match *self {
            Self::Capacitor(c) => 2.0 * fs * c,
            Self::Inductor(l) => 1.0 / (2.0 * fs * l),
        }
    }

    /// Sign of the state update: +1 for capacitors, -1 for inductors.
    pub fn sign(&self) -> f64 {
        match self {
            Self::Capacitor(_) => 1.0,
            Self::Inductor(_) => -1.0,
        }
    }

    fn value(&self) -> (&'static str, f64) {
        match *self {
            Self::Capacitor(c) => ("capacitance", c),
            Self::Inductor(l) => ("inductance", l),
        }
    }
}

/// Voltage source feeding the circuit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceKind {
    /// Driven by the audio sample each step
    Input,
    /// Fixed supply voltage
    Constant(f64),
}

/// Circuit topology as incidence matrices over `nodes` non-ground nodes.
///
/// Each row of an incidence matrix has `+1` on the element's positive node
/// and `-1` on its negative node; a row with a single entry connects to
/// ground.
#[derive(Debug, Clone)]
pub struct NdkNetlist {
    /// Short identifier used in errors and logs
    pub name: String,
    pub nodes: usize,
    /// Resistor values (Ω) and their incidence rows
    pub resistors: Vec<f64>,
    pub nr: DMatrix<f64>,
    /// Reactive elements and their incidence rows
    pub reactive: Vec<Reactive>,
    pub nx: DMatrix<f64>,
    /// Voltage sources and their incidence rows
    pub sources: Vec<SourceKind>,
    pub nu: DMatrix<f64>,
    /// Nonlinear port incidence rows
    pub nn: DMatrix<f64>,
    /// Output voltage taps
    pub no: DMatrix<f64>,
    /// Variable resistors, valued at run time through `update_pots`
    pub nv: DMatrix<f64>,
    /// Newton starting point for the nonlinear port voltages
    pub initial_v: Vec<f64>,
}

impl NdkNetlist {
    pub fn num_states(&self) -> usize {
        self.reactive.len()
    }

    pub fn num_nonlinear_ports(&self) -> usize {
        self.nn.nrows()
    }

    pub fn num_sources(&self) -> usize {
        self.sources.len()
    }

    pub fn num_outputs(&self) -> usize {
        self.no.nrows()
    }

    pub fn num_pots(&self) -> usize {
        self.nv.nrows()
    }

    /// Index of the audio input among the sources.
    pub fn input_slot(&self) -> Option<usize> {
        self.sources.iter().position(|s| *s == SourceKind::Input)
    }

    /// Check matrix shapes and component values.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("Nr", &self.nr, self.resistors.len()),
            ("Nx", &self.nx, self.reactive.len()),
            ("Nu", &self.nu, self.sources.len()),
            ("Nn", &self.nn, self.initial_v.len()),
            ("No", &self.no, self.no.nrows()),
            ("Nv", &self.nv, self.nv.nrows()),
        ];
        for (what, m, rows) in checks {
            if m.nrows() != rows {
                return Err(SimError::dimension(format!("{} {what} rows", self.name), rows, m.nrows()));
            }
            if m.ncols() != self.nodes {
                return Err(SimError::dimension(
                    format!("{} {what} columns", self.name),
                    self.nodes,
                    m.ncols(),
                ));
            }
        }

        for (k, &r) in self.resistors.iter().enumerate() {
            require_positive(&format!("{} R{}", self.name, k + 1), "resistance", r)?;
        }
        for (k, element) in self.reactive.iter().enumerate() {
            let (param, value) = element.value();
            require_positive(&format!("{} X{}", self.name, k + 1), param, value)?;
        }

        if self.input_slot().is_none() {
            return Err(SimError::InvalidTopology {
                message: format!("{} has no audio input source", self.name),
            });
        }
        Ok(())
    }
}

/// Build incidence rows from `(positive, negative)` node pairs.
///
/// Nodes are numbered from 1, SPICE style; 0 is ground and leaves its entry
/// out of the row.
pub fn incidence(nodes: usize, branches: &[(usize, usize)]) -> DMatrix<f64> {
    let mut m = DMatrix::zeros(branches.len(), nodes);
    for (row, &(plus, minus)) in branches.iter().enumerate() {
        if let Some(col) = plus.checked_sub(1) {
            m[(row, col)] += 1.0;
        }
        if let Some(col) = minus.checked_sub(1) {
            m[(row, col)] -= 1.0;
        }
    }
    m
}
