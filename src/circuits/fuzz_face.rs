//! Two-transistor Fuzz Face, solved with the NDK method.
//!
//! ```text
//!   Vcc (8) --R1 33k--- (3)  Q1 collector, Q2 base
//!   Vcc (8) --R2 470--- (6) --R3 8.2k-- (9)  Q2 collector
//!   in  (1) --C1 2.2u-- (2)  Q1 base --R4 100k-- (4)  Q2 emitter
//!       (4) --pot-- (5) --pot-- gnd       (5) --C2 20u-- gnd
//!       (6) --C3 10n-- (7) out --R5 500k-- gnd
//! ```
//!
//! The fuzz pot sits in Q2's emitter leg with its 20 µF bypass, so turning
//! it up raises the loop gain. Node numbers match the incidence rows below.

use log::debug;

use super::{find_control, Circuit, Control};
use crate::components::{BjtParams, Potentiometer};
use crate::config::{IterationPolicy, SolverConfig, TRANSISTOR_POLICY};
use crate::error::{require_sample_rate, Result};
use crate::ndk::{incidence, BjtPair, NdkNetlist, NdkSolver, Reactive, SourceKind};

const NODES: usize = 9;
const FUZZ_POT: f64 = 1.0e3;
const SUPPLY: f64 = 9.0;

const CONTROLS: &[Control] = &[Control::new("fuzz", 0.0, 1.0, 0.5)];

type Solver = NdkSolver<BjtPair, 3, 4, 2, 1>;

fn netlist() -> NdkNetlist {
    NdkNetlist {
        name: "fuzz-face".to_string(),
        nodes: NODES,
        resistors: vec![33.0e3, 470.0, 8.2e3, 100.0e3, 500.0e3],
        nr: incidence(NODES, &[(3, 8), (6, 8), (9, 6), (2, 4), (7, 0)]),
        reactive: vec![
            Reactive::Capacitor(2.2e-6),
            Reactive::Capacitor(20.0e-6),
            Reactive::Capacitor(0.01e-6),
        ],
        nx: incidence(NODES, &[(1, 2), (5, 0), (6, 7)]),
        sources: vec![SourceKind::Input, SourceKind::Constant(SUPPLY)],
        nu: incidence(NODES, &[(1, 0), (8, 0)]),
        // Collector-base and collector-emitter ports of Q1, then Q2
        nn: incidence(NODES, &[(3, 2), (3, 0), (9, 3), (9, 4)]),
        no: incidence(NODES, &[(7, 0)]),
        nv: incidence(NODES, &[(4, 5), (5, 0)]),
        initial_v: vec![1.43236, 1.77569, -0.636511, 0.021566],
    }
}

/// Fuzz Face with a single fuzz control.
#[derive(Debug, Clone)]
pub struct FuzzFace {
    solver: Solver,
    fuzz: Potentiometer,
}

impl FuzzFace {
    pub fn new(channels: usize) -> Result<Self> {
        let fuzz = Potentiometer::with_range(FUZZ_POT, CONTROLS[0].default, 0.01, 0.99);
        let ports = BjtPair {
            q1: BjtParams::ac128(),
            q2: BjtParams::ac128(),
        };
        let config = SolverConfig::new().with_iteration_policy(TRANSISTOR_POLICY);
        let solver = NdkSolver::new(netlist(), ports, &fuzz.legs(), config, channels)?;
        Ok(Self { solver, fuzz })
    }

    /// Set the fuzz pot (0..1, kept inside 0.01..0.99).
    pub fn set_fuzz(&mut self, fuzz: f64) -> Result<()> {
        if self.fuzz.set_position(fuzz) {
            self.solver.update_pots(&self.fuzz.legs())?;
        }
        Ok(())
    }

    pub fn solver(&self) -> &Solver {
        &self.solver
    }
}

impl Circuit for FuzzFace {
    fn name(&self) -> &'static str {
        "fuzz-face"
    }

    fn prepare(&mut self, sample_rate: f64) -> Result<()> {
        require_sample_rate(sample_rate)?;
        self.solver.prepare(sample_rate)?;
        self.solver.settle();
        debug!("fuzz-face: fuzz at {:.2}", self.fuzz.position);
        Ok(())
    }

    fn reset(&mut self) {
        self.solver.reset();
        self.solver.settle();
    }

    #[inline]
    fn process_sample(&mut self, input: f64, channel: usize) -> f64 {
        self.solver.process_sample(input, channel)
    }

    fn set_control(&mut self, name: &str, value: f64) -> Result<()> {
        let control = find_control(CONTROLS, self.name(), name)?;
        self.set_fuzz(control.clamp(value))
    }

    fn controls(&self) -> &'static [Control] {
        CONTROLS
    }

    fn set_iteration_policy(&mut self, policy: IterationPolicy) {
        self.solver.set_iteration_policy(policy);
    }

    fn recoveries(&self) -> u64 {
        self.solver.recoveries()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuits::tests::{peak, sine};

    fn fuzz_face(fuzz: f64, sample_rate: f64) -> FuzzFace {
        let mut circuit = FuzzFace::new(1).unwrap();
        circuit.set_control("fuzz", fuzz).unwrap();
        circuit.prepare(sample_rate).unwrap();
        circuit
    }

    #[test]
    fn test_silence_in_silence_out() {
        let mut circuit = fuzz_face(0.5, 48_000.0);
        let mut block = vec![0.0f32; 4_800];
        circuit.process(&mut block, 0);
        assert!(peak(&block) < 1e-9);
    }

    #[test]
    fn test_operating_point_is_rate_independent() {
        let low = fuzz_face(0.5, 48_000.0);
        let high = fuzz_face(0.5, 96_000.0);
        let (a, b) = (low.solver().port_voltages(0).unwrap(), high.solver().port_voltages(0).unwrap());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-6, "{x} != {y}");
        }
    }

    #[test]
    fn test_fuzz_raises_gain() {
        let run = |fuzz: f64| {
            let mut circuit = fuzz_face(fuzz, 48_000.0);
            let mut block = sine(1.0e-4, 440.0, 48_000.0, 9_600);
            circuit.process(&mut block, 0);
            peak(&block[4_800..])
        };
        let (clean, fuzzy) = (run(0.1), run(0.9));
        assert!(clean > 0.0);
        assert!(fuzzy > 3.0 * clean);
    }

    #[test]
    fn test_loud_input_stays_bounded() {
        let mut circuit = fuzz_face(0.9, 48_000.0);
        let mut block = sine(1.0, 440.0, 48_000.0, 480_000);
        circuit.process(&mut block, 0);
        assert!(block.iter().all(|s| s.is_finite()));
        assert!(peak(&block) < 10.0);
        assert_eq!(circuit.recoveries(), 0);
    }

    #[test]
    fn test_more_iterations_converge_more_samples() {
        // Hot input at high fuzz keeps both transistors switching
        let mut circuit = fuzz_face(0.9, 48_000.0);
        let input = sine(0.5, 440.0, 48_000.0, 4_800);
        let (mut after_four, mut after_eight) = (0, 0);
        for &x in &input {
            let x = f64::from(x);
            let r4 = circuit.solver().residual_after(x, 0, 4).unwrap();
            let r8 = circuit.solver().residual_after(x, 0, 8).unwrap();
            after_four += usize::from(r4 < 1e-9);
            after_eight += usize::from(r8 < 1e-9);
            circuit.process_sample(x, 0);
        }
        assert!(after_eight > after_four, "{after_eight} <= {after_four}");
        assert!(after_eight > input.len() * 95 / 100);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut circuit = fuzz_face(0.5, 48_000.0);
        let mut first = sine(0.5, 220.0, 48_000.0, 1_024);
        let mut second = first.clone();

        circuit.process(&mut first, 0);
        circuit.reset();
        circuit.reset();
        circuit.process(&mut second, 0);
        assert_eq!(first, second);
    }
}
