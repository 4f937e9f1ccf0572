//! Cry Baby wah pedal, solved with the NDK method.
//!
//! Two transistors around a 500 mH inductor form a resonant low-pass whose
//! peak follows the treadle pot. The input enters at node 11, the 9 V supply
//! at node 12 and the output is read at node 2. The treadle splits a 100 kΩ
//! pot between node 3 and ground and between nodes 2 and 3.
//!
//! With `depth` above zero the pedal becomes an auto-wah: a peak follower on
//! the input pushes the treadle toward toe down, re-read every 32 samples.
//! Pot moves on that path install coefficient sets from a table built at
//! `prepare`, so the audio thread never rebuilds or frees one.

use std::sync::Arc;

use log::debug;

use super::{find_control, Circuit, Control};
use crate::components::{BjtParams, EnvelopeFollower, Potentiometer};
use crate::config::{IterationPolicy, SolverConfig, TRANSISTOR_POLICY};
use crate::error::{require_sample_rate, Result};
use crate::ndk::{incidence, BjtPair, NdkCoefficients, NdkNetlist, NdkSolver, Reactive, SourceKind};

const NODES: usize = 13;
const WAH_POT: f64 = 100.0e3;
const SUPPLY: f64 = 9.0;
const MIN_SWEEP: f64 = 0.1;
const MAX_SWEEP: f64 = 0.99;

const SWEEP_STEPS: usize = 64;
const FOLLOW_BLOCK: usize = 32;
const LEVEL_DEPTH: f64 = 0.98;

const CONTROLS: &[Control] = &[
    Control::new("wah", 0.0, 1.0, 0.5),
    Control::new("depth", 0.0, 1.0, 0.0),
    Control::new("attack", 0.1, 20.0, 1.0),
    Control::new("release", 1.0, 200.0, 25.0),
];

type Solver = NdkSolver<BjtPair, 6, 4, 2, 1>;
type Coefficients = NdkCoefficients<6, 4, 2, 1>;

fn netlist() -> NdkNetlist {
    NdkNetlist {
        name: "cry-baby".to_string(),
        nodes: NODES,
        resistors: vec![68.0e3, 22.0e3, 390.0, 470.0e3, 470.0e3, 1.5e3, 33.0e3, 82.0e3, 10.0e3, 1.0e3],
        nr: incidence(
            NODES,
            &[
                (11, 9),
                (12, 1),
                (8, 0),
                (1, 13),
                (10, 1),
                (4, 5),
                (13, 5),
                (13, 0),
                (0, 6),
                (12, 7),
            ],
        ),
        reactive: vec![
            Reactive::Capacitor(10.0e-9),
            Reactive::Capacitor(4.7e-6),
            Reactive::Capacitor(10.0e-9),
            Reactive::Capacitor(220.0e-9),
            Reactive::Capacitor(220.0e-9),
            Reactive::Inductor(0.5),
        ],
        nx: incidence(NODES, &[(9, 4), (13, 0), (5, 6), (2, 1), (3, 10), (13, 5)]),
        sources: vec![SourceKind::Input, SourceKind::Constant(SUPPLY)],
        nu: incidence(NODES, &[(11, 0), (12, 0)]),
        nn: incidence(NODES, &[(1, 4), (1, 8), (7, 10), (7, 6)]),
        no: incidence(NODES, &[(2, 0)]),
        nv: incidence(NODES, &[(3, 0), (2, 3)]),
        initial_v: vec![3.9271560942528319, 4.524363916506168, 3.9262980403171812, 4.5429223634080538],
    }
}

/// Pot position for a treadle setting. The square root spreads the sweep
/// more evenly over the treadle travel.
fn sweep(wah: f64) -> f64 {
    (MIN_SWEEP + (MAX_SWEEP - MIN_SWEEP) * wah.clamp(0.0, 1.0).sqrt()).clamp(MIN_SWEEP, MAX_SWEEP)
}

fn table_index(position: f64) -> usize {
    let span = ((position - MIN_SWEEP) / (MAX_SWEEP - MIN_SWEEP)).clamp(0.0, 1.0);
    (span * (SWEEP_STEPS - 1) as f64).round() as usize
}

fn table_position(index: usize) -> f64 {
    MIN_SWEEP + (MAX_SWEEP - MIN_SWEEP) * index as f64 / (SWEEP_STEPS - 1) as f64
}

/// Cry Baby wah with a treadle and an optional envelope-driven sweep.
#[derive(Debug, Clone)]
pub struct CryBaby {
    solver: Solver,
    treadle: Potentiometer,
    wah: f64,
    depth: f64,
    envelope: EnvelopeFollower,
    /// One coefficient set per quantized treadle position, heel first.
    sweep_table: Vec<Arc<Coefficients>>,
    countdown: usize,
}

impl CryBaby {
    pub fn new(channels: usize) -> Result<Self> {
        let wah = CONTROLS[0].default;
        let treadle = Potentiometer::with_range(WAH_POT, sweep(wah), MIN_SWEEP, MAX_SWEEP);
        let ports = BjtPair {
            q1: BjtParams::ac128(),
            q2: BjtParams::ac128(),
        };
        let config = SolverConfig::new().with_iteration_policy(TRANSISTOR_POLICY);
        let solver = NdkSolver::new(netlist(), ports, &treadle.legs(), config, channels)?;
        let envelope = EnvelopeFollower::new(CONTROLS[2].default, CONTROLS[3].default, solver.sample_rate());

        let mut circuit = Self {
            solver,
            treadle,
            wah,
            depth: CONTROLS[1].default,
            envelope,
            sweep_table: Vec::new(),
            countdown: 0,
        };
        circuit.sweep_table = circuit.build_sweep_table()?;
        Ok(circuit)
    }

    fn build_sweep_table(&self) -> Result<Vec<Arc<Coefficients>>> {
        (0..SWEEP_STEPS)
            .map(|index| {
                let pot = Potentiometer::with_range(WAH_POT, table_position(index), MIN_SWEEP, MAX_SWEEP);
                self.solver.build_coefficients(&pot.legs())
            })
            .collect()
    }

    fn is_auto(&self) -> bool {
        self.depth > 0.0
    }

    /// Move the treadle, 0 heel down to 1 toe down.
    pub fn set_wah(&mut self, wah: f64) -> Result<()> {
        self.wah = wah.clamp(0.0, 1.0);
        if self.treadle.set_position(sweep(self.wah)) && !self.is_auto() {
            self.solver.update_pots(&self.treadle.legs())?;
        }
        Ok(())
    }

    /// How far the input level pushes the treadle. Zero is plain manual wah.
    pub fn set_depth(&mut self, depth: f64) -> Result<()> {
        let was_auto = self.is_auto();
        self.depth = depth.clamp(0.0, 1.0);
        if was_auto && !self.is_auto() {
            self.solver.update_pots(&self.treadle.legs())?;
        }
        Ok(())
    }

    /// Pick the table entry for the treadle plus the envelope offset.
    fn follow(&mut self, level: f64) {
        let target = (self.wah + LEVEL_DEPTH * self.depth * level).clamp(0.0, 1.0);
        if let Some(next) = self.sweep_table.get(table_index(sweep(target))) {
            self.solver.install(next);
        }
    }

    /// Put the pots back at the treadle position.
    fn seat_treadle(&mut self) -> Result<()> {
        if self.is_auto() {
            self.follow(0.0);
        } else {
            self.solver.update_pots(&self.treadle.legs())?;
        }
        Ok(())
    }

    pub fn envelope(&self) -> &EnvelopeFollower {
        &self.envelope
    }

    pub fn solver(&self) -> &Solver {
        &self.solver
    }
}

impl Circuit for CryBaby {
    fn name(&self) -> &'static str {
        "cry-baby"
    }

    fn prepare(&mut self, sample_rate: f64) -> Result<()> {
        require_sample_rate(sample_rate)?;
        self.solver.prepare(sample_rate)?;
        self.sweep_table = self.build_sweep_table()?;
        self.seat_treadle()?;
        self.envelope.set_sample_rate(sample_rate);
        self.envelope.reset();
        self.countdown = 0;
        self.solver.settle();
        debug!(
            "cry-baby: treadle pot at {:.3}, envelope depth {:.2}",
            self.treadle.position, self.depth
        );
        Ok(())
    }

    fn reset(&mut self) {
        self.solver.reset();
        self.envelope.reset();
        self.countdown = 0;
        if self.is_auto() {
            self.follow(0.0);
        }
        self.solver.settle();
    }

    #[inline]
    fn process_sample(&mut self, input: f64, channel: usize) -> f64 {
        // Channel 0 drives the sweep for every channel.
        if channel == 0 && self.is_auto() {
            let level = self.envelope.process(input);
            if self.countdown == 0 {
                self.follow(level);
                self.countdown = FOLLOW_BLOCK;
            }
            self.countdown -= 1;
        }
        self.solver.process_sample(input, channel)
    }

    fn set_control(&mut self, name: &str, value: f64) -> Result<()> {
        let control = find_control(CONTROLS, self.name(), name)?;
        let value = control.clamp(value);
        match control.name {
            "wah" => self.set_wah(value),
            "depth" => self.set_depth(value),
            "attack" => {
                self.envelope.set_attack(value);
                Ok(())
            }
            _ => {
                self.envelope.set_release(value);
                Ok(())
            }
        }
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
