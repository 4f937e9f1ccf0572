//! Per-sample NDK solver.

use std::sync::Arc;

use log::{debug, warn};
use nalgebra::{Const, DMatrix, DimMin, SMatrix, SVector};

use super::handoff::{self, CoefficientPublisher, CoefficientReceiver};
use super::matrices::{NdkBase, NdkCoefficients};
use super::netlist::{NdkNetlist, SourceKind};
use crate::components::{BjtParams, DiodeParams};
use crate::config::{IterationPolicy, SolverConfig};
use crate::error::{Result, SimError};
use crate::solver::linalg::{invert, to_static};
use crate::DEFAULT_SAMPLE_RATE;

/// Newton budget for the operating-point search.
const SETTLE_ITERATIONS: usize = 256;
/// Largest per-port voltage change in one operating-point step.
const SETTLE_MAX_STEP: f64 = 0.5;
const SETTLE_TOLERANCE: f64 = 1e-10;

/// Device laws of the nonlinear ports.
///
/// Currents are injected into the circuit at the positive port terminal.
pub trait NonlinearPorts<const NN: usize> {
    /// Write the port currents and their Jacobian `di/dv` at `v`.
    ///
    /// `jac` is zeroed by the caller.
    fn evaluate(&self, v: &SVector<f64, NN>, i: &mut SVector<f64, NN>, jac: &mut SMatrix<f64, NN, NN>);

    /// Fraction of the Newton update `v - delta` to apply.
    ///
    /// Exponential devices override this to keep a single step from landing
    /// far up the curve, where the next evaluation overflows.
    #[inline]
    fn limit_step(&self, _v: &SVector<f64, NN>, _delta: &SVector<f64, NN>) -> f64 {
        1.0
    }
}

/// Two Ebers-Moll transistors, ports (0, 1) and (2, 3).
#[derive(Debug, Clone, Copy, Default)]
pub struct BjtPair {
    pub q1: BjtParams,
    pub q2: BjtParams,
}

impl NonlinearPorts<4> for BjtPair {
    #[inline]
    fn evaluate(&self, v: &SVector<f64, 4>, i: &mut SVector<f64, 4>, jac: &mut SMatrix<f64, 4, 4>) {
        for (o, q) in [(0, &self.q1), (2, &self.q2)] {
            let (ik, jk) = q.port_currents(v[o], v[o + 1]);
            i[o] = ik[0];
            i[o + 1] = ik[1];
            jac[(o, o)] = jk[0][0];
            jac[(o, o + 1)] = jk[0][1];
            jac[(o + 1, o)] = jk[1][0];
            jac[(o + 1, o + 1)] = jk[1][1];
        }
    }

    #[inline]
    fn limit_step(&self, v: &SVector<f64, 4>, delta: &SVector<f64, 4>) -> f64 {
        [(0, &self.q1), (2, &self.q2)]
            .into_iter()
            .map(|(o, q)| {
                let old = [v[o], v[o + 1]];
                q.step_scale(old, [old[0] - delta[o], old[1] - delta[o + 1]])
            })
            .fold(1.0, f64::min)
    }
}

/// Anti-parallel diode pair on a single port.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiodePairPort {
    pub params: DiodeParams,
}

impl NonlinearPorts<1> for DiodePairPort {
    #[inline]
    fn evaluate(&self, v: &SVector<f64, 1>, i: &mut SVector<f64, 1>, jac: &mut SMatrix<f64, 1, 1>) {
        // The pair draws current out of the node.
        let (id, g) = self.params.antiparallel(v[0]);
        i[0] = -id;
        jac[(0, 0)] = -g;
    }
}

#[derive(Debug, Clone, Copy)]
struct ChannelState<const NX: usize, const NN: usize> {
    x: SVector<f64, NX>,
    v: SVector<f64, NN>,
}

/// Nonlinear state-space circuit solved sample by sample.
///
/// Per sample:
///
/// 1. `p = G x + H u`
/// 2. Newton on `v = p + K i(v)`, solving `(K J - I) Δv = p + K i - v`
/// 3. `y = D x + E u + F i`, `x = A x + B u + C i`
///
/// Each channel carries its own state and warm-started port voltages.
#[derive(Debug, Clone)]
pub struct NdkSolver<P, const NX: usize, const NN: usize, const NU: usize, const NO: usize> {
    netlist: NdkNetlist,
    base: NdkBase,
    coefficients: Arc<NdkCoefficients<NX, NN, NU, NO>>,
    ports: P,
    config: SolverConfig,
    sources: SVector<f64, NU>,
    input_slot: usize,
    initial_v: SVector<f64, NN>,
    /// Operating point found by the last `settle`, or the unbiased start.
    rest: ChannelState<NX, NN>,
    channels: Vec<ChannelState<NX, NN>>,
    recoveries: u64,
    warned: bool,
}

impl<P, const NX: usize, const NN: usize, const NU: usize, const NO: usize> NdkSolver<P, NX, NN, NU, NO>
where
    P: NonlinearPorts<NN>,
    Const<NN>: DimMin<Const<NN>, Output = Const<NN>>,
{
    /// Build a solver for `channels` independent channels at the default
    /// sample rate. Call [`prepare`](Self::prepare) before processing.
    pub fn new(netlist: NdkNetlist, ports: P, pots: &[f64], config: SolverConfig, channels: usize) -> Result<Self> {
        let sizes = [
            ("states", NX, netlist.num_states()),
            ("nonlinear ports", NN, netlist.num_nonlinear_ports()),
            ("sources", NU, netlist.num_sources()),
            ("outputs", NO, netlist.num_outputs()),
        ];
        for (what, expected, actual) in sizes {
            if expected != actual {
                return Err(SimError::dimension(format!("{} {what}", netlist.name), expected, actual));
            }
        }
        if NO == 0 {
            return Err(SimError::InvalidTopology {
                message: format!("{} has no output", netlist.name),
            });
        }

        let base = NdkBase::new(&netlist, f64::from(DEFAULT_SAMPLE_RATE))?;
        let coefficients = Arc::new(base.coefficients(pots)?);

        let input_slot = netlist.input_slot().unwrap_or(0);
        let sources = SVector::from_iterator(netlist.sources.iter().map(|s| match *s {
            SourceKind::Input => 0.0,
            SourceKind::Constant(v) => v,
        }));
        let initial_v = SVector::from_iterator(netlist.initial_v.iter().copied());

        let state = ChannelState {
            x: SVector::zeros(),
            v: initial_v,
        };
        Ok(Self {
            netlist,
            base,
            coefficients,
            ports,
            config,
            sources,
            input_slot,
            initial_v,
            rest: state,
            channels: vec![state; channels.max(1)],
            recoveries: 0,
            warned: false,
        })
    }

    /// Rediscretize for a new sample rate, keeping the pot values, and reset.
    pub fn prepare(&mut self, sample_rate: f64) -> Result<()> {
        let base = NdkBase::new(&self.netlist, sample_rate)?;
        self.coefficients = Arc::new(base.coefficients(&self.coefficients.pots)?);
        self.base = base;
        self.reset();
        debug!("{}: prepared at {sample_rate} Hz", self.netlist.name);
        Ok(())
    }

    /// Zero the state and re-seed the port voltages on every channel.
    ///
    /// This also forgets the operating point; biased circuits settle again.
    pub fn reset(&mut self) {
        self.rest = ChannelState {
            x: SVector::zeros(),
            v: self.initial_v,
        };
        self.channels.fill(self.rest);
        self.warned = false;
    }

    /// Apply new pot resistances. Returns `false` when nothing changed.
    pub fn update_pots(&mut self, values: &[f64]) -> Result<bool> {
        if values == self.coefficients.pots.as_slice() {
            return Ok(false);
        }
        self.coefficients = Arc::new(self.base.coefficients(values)?);
        Ok(true)
    }

    /// Split pot updates off to a control thread.
    ///
    /// The publisher starts from the current sample rate and pot values; a
    /// later [`prepare`](Self::prepare) needs a fresh pair.
    pub fn handoff(
        &self,
        capacity: usize,
    ) -> (CoefficientPublisher<NX, NN, NU, NO>, CoefficientReceiver<NX, NN, NU, NO>) {
        handoff::channel(self.base.clone(), &self.coefficients.pots, capacity)
    }

    /// Install the newest coefficient set published by the control thread.
    ///
    /// The installed set carries its pot values, so [`pots`](Self::pots),
    /// `update_pots` and a later `prepare` all follow it.
    pub fn sync(&mut self, receiver: &mut CoefficientReceiver<NX, NN, NU, NO>) -> bool {
        receiver.sync(&mut self.coefficients)
    }

    /// Build the coefficient set for `pots` at the current sample rate
    /// without installing it.
    pub fn build_coefficients(&self, pots: &[f64]) -> Result<Arc<NdkCoefficients<NX, NN, NU, NO>>> {
        Ok(Arc::new(self.base.coefficients(pots)?))
    }

    /// Install a prebuilt set. Only the `Arc` is cloned, so this is safe on
    /// the audio thread as long as the caller keeps its own reference.
    pub fn install(&mut self, next: &Arc<NdkCoefficients<NX, NN, NU, NO>>) -> bool {
        if Arc::ptr_eq(&self.coefficients, next) {
            return false;
        }
        self.coefficients = Arc::clone(next);
        true
    }

    pub fn coefficients(&self) -> &Arc<NdkCoefficients<NX, NN, NU, NO>> {
        &self.coefficients
    }

    pub fn pots(&self) -> &[f64] {
        &self.coefficients.pots
    }

    pub fn sample_rate(&self) -> f64 {
        self.base.sample_rate()
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn set_iteration_policy(&mut self, policy: IterationPolicy) {
        self.config.policy = policy;
    }

    /// Nonlinear port voltages left by the last sample on `channel`.
    pub fn port_voltages(&self, channel: usize) -> Option<&SVector<f64, NN>> {
        self.channels.get(channel).map(|state| &state.v)
    }

    pub fn ports_mut(&mut self) -> &mut P {
        &mut self.ports
    }

    /// Number of times the state was discarded after going non-finite or
    /// out of bounds.
    pub fn recoveries(&self) -> u64 {
        self.recoveries
    }

    /// Newton on `v = p + K i(v)` starting from `v`. Leaves `i` evaluated at
    /// the final `v`.
    #[inline]
    fn newton(
        &self,
        p: &SVector<f64, NN>,
        v: &mut SVector<f64, NN>,
        i: &mut SVector<f64, NN>,
        policy: IterationPolicy,
    ) {
        let k = &self.coefficients.k;
        let mut jac = SMatrix::<f64, NN, NN>::zeros();
        let eye = SMatrix::<f64, NN, NN>::identity();

        for _ in 0..policy.max_iterations() {
            jac.fill(0.0);
            self.ports.evaluate(v, i, &mut jac);

            let mut delta = p + k * *i - *v;
            if !(k * jac - eye).lu().solve_mut(&mut delta) {
                break;
            }
            delta *= self.ports.limit_step(v, &delta);
            *v -= delta;

            if policy.converged(delta.abs().sum()) {
                break;
            }
        }
        jac.fill(0.0);
        self.ports.evaluate(v, i, &mut jac);
    }

    /// Residual `|p + K i(v) - v|₁` of the port equation after `iterations`
    /// Newton steps on `input`, warm started like the next sample on
    /// `channel` would be. The channel itself is left as it was.
    pub fn residual_after(&self, input: f64, channel: usize, iterations: usize) -> Option<f64> {
        let state = self.channels.get(channel)?;
        let m = &*self.coefficients;
        let mut u = self.sources;
        u[self.input_slot] = input;

        let p = m.g * state.x + m.h * u;
        let mut v = state.v;
        let mut i = SVector::<f64, NN>::zeros();
        self.newton(&p, &mut v, &mut i, IterationPolicy::Fixed(iterations));
        Some((p + m.k * i - v).abs().sum())
    }

    /// Advance one sample and return every output.
    #[inline]
    pub fn step(&mut self, input: f64, channel: usize) -> SVector<f64, NO> {
        let Some(&ChannelState { x, mut v }) = self.channels.get(channel) else {
            return SVector::zeros();
        };
        let m = &*self.coefficients;

        let mut u = self.sources;
        u[self.input_slot] = input;

        let p = m.g * x + m.h * u;
        let mut i = SVector::<f64, NN>::zeros();
        self.newton(&p, &mut v, &mut i, self.config.policy);

        let y = m.d * x + m.e * u + m.f * i;
        let x = m.a * x + m.b * u + m.c * i;

        let bound = self.config.sanity_bound;
        let healthy = |values: &[f64]| values.iter().all(|s| s.is_finite() && s.abs() <= bound);
        if healthy(x.as_slice()) && healthy(y.as_slice()) && healthy(v.as_slice()) {
            self.channels[channel] = ChannelState { x, v };
            return y;
        }

        // Back to the operating point rather than the unbiased zero state.
        self.channels[channel] = self.rest;
        self.recoveries += 1;
        if !self.warned {
            warn!(
                "{}: unstable state on channel {channel}, resetting (recoveries: {})",
                self.netlist.name, self.recoveries
            );
            self.warned = true;
        }
        SVector::zeros()
    }

    /// Advance one sample and return the first output.
    #[inline]
    pub fn process_sample(&mut self, input: f64, channel: usize) -> f64 {
        self.step(input, channel)[0]
    }

    /// Process a block in place.
    pub fn process(&mut self, block: &mut [f32], channel: usize) {
        for sample in block.iter_mut() {
            *sample = self.process_sample(f64::from(*sample), channel) as f32;
        }
    }

    /// Move every channel to the DC operating point for zero input.
    ///
    /// In steady state `x = A x + B u + C i`, so with `W = (I - A)⁻¹` the
    /// port equation becomes `v = (G W B + H) u + (G W C + K) i(v)`. That
    /// system is solved with a damped Newton iteration. Returns `false` and
    /// falls back to the zero state if the search fails.
    pub fn settle(&mut self) -> bool {
        match self.operating_point() {
            Ok(Some((x, v))) => {
                self.rest = ChannelState { x, v };
                self.channels.fill(self.rest);
                debug!("{}: settled at v = {:?}", self.netlist.name, v.as_slice());
                true
            }
            Ok(None) => {
                warn!("{}: operating point search did not converge", self.netlist.name);
                self.reset();
                false
            }
            Err(err) => {
                warn!("{}: no operating point: {err}", self.netlist.name);
                self.reset();
                false
            }
        }
    }

    fn operating_point(&self) -> Result<Option<(SVector<f64, NX>, SVector<f64, NN>)>> {
        let m = &*self.coefficients;
        let i_minus_a = DMatrix::from_fn(NX, NX, |r, c| (if r == c { 1.0 } else { 0.0 }) - m.a[(r, c)]);
        let w: SMatrix<f64, NX, NX> = to_static(&invert(&i_minus_a, "I - A")?, "(I - A)^-1")?;

        let u = self.sources;
        let p = m.g * w * m.b * u + m.h * u;
        let k = m.g * w * m.c + m.k;
        let eye = SMatrix::<f64, NN, NN>::identity();

        let mut v = self.initial_v;
        let mut i = SVector::<f64, NN>::zeros();
        let mut jac = SMatrix::<f64, NN, NN>::zeros();
        let mut converged = false;

        for _ in 0..SETTLE_ITERATIONS {
            jac.fill(0.0);
            self.ports.evaluate(&v, &mut i, &mut jac);

            let mut delta = p + k * i - v;
            if !(k * jac - eye).lu().solve_mut(&mut delta) {
                return Err(SimError::singular("operating point Jacobian"));
            }
            delta.apply(|d| *d = d.clamp(-SETTLE_MAX_STEP, SETTLE_MAX_STEP));
            v -= delta;

            if delta.abs().sum() < SETTLE_TOLERANCE {
                converged = true;
                break;
            }
        }

        jac.fill(0.0);
        self.ports.evaluate(&v, &mut i, &mut jac);
        let x = w * (m.b * u + m.c * i);

        let finite = x.iter().chain(v.iter()).all(|s| s.is_finite());
        Ok((converged && finite).then_some((x, v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ndk::netlist::tests::diode_clipper_netlist;
    use crate::ndk::netlist::Reactive;
    use crate::solver::linalg::from_rows;
    use approx::assert_relative_eq;

    type Clipper = NdkSolver<DiodePairPort, 1, 1, 1, 1>;

    fn clipper() -> Clipper {
        let mut solver = NdkSolver::new(
            diode_clipper_netlist(2.2e3, 10.0e-9),
            DiodePairPort::default(),
            &[],
            SolverConfig::new().with_iterations(8),
            2,
        )
        .unwrap();
        solver.prepare(48_000.0).unwrap();
        solver
    }

    fn sine(n: usize, amplitude: f64) -> f64 {
        amplitude * (2.0 * std::f64::consts::PI * 440.0 * n as f64 / 48_000.0).sin()
    }

    #[test]
    fn test_size_mismatch_is_rejected() {
        let result = NdkSolver::<DiodePairPort, 2, 1, 1, 1>::new(
            diode_clipper_netlist(2.2e3, 10.0e-9),
            DiodePairPort::default(),
            &[],
            SolverConfig::default(),
            1,
        );
        assert!(matches!(result, Err(SimError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_silence_in_silence_out() {
        let mut solver = clipper();
        for _ in 0..256 {
            assert_eq!(solver.process_sample(0.0, 0), 0.0);
        }
    }

    #[test]
    fn test_clipper_is_odd_and_bounded() {
        let mut pos = clipper();
        let mut neg = clipper();
        for n in 0..4_800 {
            let x = sine(n, 5.0);
            let yp = pos.process_sample(x, 0);
            let yn = neg.process_sample(-x, 0);
            assert_relative_eq!(yp, -yn, epsilon = 1e-12);
            assert!(yp.abs() < 1.0);
        }
        assert_eq!(pos.recoveries(), 0);
    }

    #[test]
    fn test_small_signal_passes_linear() {
        // Far below the diode knee the stage is a plain RC low-pass at 7.2 kHz.
        let mut solver = clipper();
        let mut peak = 0.0f64;
        for n in 0..4_800 {
            let y = solver.process_sample(sine(n, 1.0e-3), 0);
            if n > 2_400 {
                peak = peak.max(y.abs());
            }
        }
        assert!(peak > 0.98e-3 && peak < 1.0e-3);
    }

    #[test]
    fn test_channels_are_independent() {
        let mut solver = clipper();
        for n in 0..100 {
            solver.process_sample(sine(n, 2.0), 0);
        }
        assert_eq!(solver.process_sample(0.0, 1), 0.0);
        assert_eq!(solver.process_sample(1.0, 7), 0.0);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut solver = clipper();
        let first: Vec<f64> = (0..64).map(|n| solver.process_sample(sine(n, 3.0), 0)).collect();
        solver.reset();
        solver.reset();
        let second: Vec<f64> = (0..64).map(|n| solver.process_sample(sine(n, 3.0), 0)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_early_exit_matches_fixed() {
        let mut fixed = clipper();
        let mut early = clipper();
        early.set_iteration_policy(IterationPolicy::EarlyExit {
            max_iterations: 16,
            tolerance: 1e-12,
        });
        for n in 0..480 {
            let x = sine(n, 2.0);
            assert_relative_eq!(fixed.process_sample(x, 0), early.process_sample(x, 0), epsilon = 1e-6);
        }
    }

    #[test]
    fn test_unstable_state_is_recovered() {
        let mut solver: Clipper = NdkSolver::new(
            diode_clipper_netlist(2.2e3, 10.0e-9),
            DiodePairPort::default(),
            &[],
            SolverConfig::new().with_sanity_bound(1.0e-9),
            1,
        )
        .unwrap();
        assert_eq!(solver.process_sample(1.0, 0), 0.0);
        assert_eq!(solver.recoveries(), 1);
        assert_eq!(solver.process_sample(1.0, 0), 0.0);
        assert_eq!(solver.recoveries(), 2);
    }

    fn clipper_with_pot() -> NdkSolver<DiodePairPort, 1, 1, 1, 1> {
        // Pot in parallel with the capacitor
        let mut netlist = diode_clipper_netlist(2.2e3, 10.0e-9);
        netlist.nv = from_rows(&[&[0.0, 1.0]], 2);
        NdkSolver::new(netlist, DiodePairPort::default(), &[10.0e3], SolverConfig::new(), 1).unwrap()
    }

    #[test]
    fn test_pots_change_output() {
        let mut solver = clipper_with_pot();
        assert!(!solver.update_pots(&[10.0e3]).unwrap());

        let run = |solver: &mut NdkSolver<DiodePairPort, 1, 1, 1, 1>| {
            solver.reset();
            (0..480).map(|n| solver.process_sample(sine(n, 0.1), 0).abs()).fold(0.0, f64::max)
        };
        let loud = run(&mut solver);
        assert!(solver.update_pots(&[100.0]).unwrap());
        let quiet = run(&mut solver);
        assert!(quiet < 0.2 * loud);
        assert!(solver.update_pots(&[-1.0]).is_err());
    }

    #[test]
    fn test_synced_pots_survive_prepare() {
        let mut solver = clipper_with_pot();
        solver.prepare(48_000.0).unwrap();
        let (mut publisher, mut receiver) = solver.handoff(2);

        assert!(publisher.publish(&[100.0]).unwrap());
        assert!(solver.sync(&mut receiver));
        assert_eq!(solver.pots(), [100.0]);

        let synced = Arc::clone(solver.coefficients());
        solver.prepare(48_000.0).unwrap();
        assert_eq!(**solver.coefficients(), *synced);

        // Moving back to the old value is a real change now
        assert!(!solver.update_pots(&[100.0]).unwrap());
        assert!(solver.update_pots(&[10.0e3]).unwrap());
    }

    #[test]
    fn test_install_shares_prebuilt_set() {
        let mut solver = clipper_with_pot();
        solver.prepare(48_000.0).unwrap();
        let prebuilt = solver.build_coefficients(&[1.0e3]).unwrap();
        assert_eq!(solver.pots(), [10.0e3]);

        assert!(solver.install(&prebuilt));
        assert!(!solver.install(&prebuilt));
        assert!(Arc::ptr_eq(solver.coefficients(), &prebuilt));
        assert_eq!(solver.pots(), [1.0e3]);
        assert_eq!(Arc::strong_count(&prebuilt), 2);
    }

    /// 2 V supply through 1k into node 1, where the diode pair and capacitor
    /// sit; the audio input couples in through a 10k resistor.
    fn biased_clipper() -> NdkSolver<DiodePairPort, 1, 1, 2, 1> {
        let netlist = NdkNetlist {
            name: "biased clipper".to_string(),
            nodes: 3,
            resistors: vec![10.0e3, 1.0e3],
            nr: from_rows(&[&[1.0, -1.0, 0.0], &[0.0, -1.0, 1.0]], 3),
            reactive: vec![Reactive::Capacitor(100.0e-9)],
            nx: from_rows(&[&[0.0, 1.0, 0.0]], 3),
            sources: vec![SourceKind::Input, SourceKind::Constant(2.0)],
            nu: from_rows(&[&[1.0, 0.0, 0.0], &[0.0, 0.0, 1.0]], 3),
            nn: from_rows(&[&[0.0, 1.0, 0.0]], 3),
            no: from_rows(&[&[0.0, 1.0, 0.0]], 3),
            nv: DMatrix::zeros(0, 3),
            initial_v: vec![0.0],
        };
        let mut solver = NdkSolver::new(netlist, DiodePairPort::default(), &[], SolverConfig::default(), 1).unwrap();
        solver.prepare(48_000.0).unwrap();
        solver
    }

    #[test]
    fn test_settle_finds_biased_operating_point() {
        let mut solver = biased_clipper();
        assert!(solver.settle());

        let first = solver.process_sample(0.0, 0);
        assert!(first > 0.1 && first < 0.6);
        for _ in 0..1_000 {
            assert_relative_eq!(solver.process_sample(0.0, 0), first, epsilon = 1e-9);
        }

        // KCL at node 1: supply and input currents feed the diodes
        let (id, _) = DiodeParams::default().antiparallel(first);
        assert_relative_eq!((2.0 - first) / 1.0e3 - first / 10.0e3, id, max_relative = 1e-6);
    }

    #[test]
    fn test_recovery_returns_to_operating_point() {
        let mut solver = biased_clipper();
        assert!(solver.settle());
        let rest = solver.process_sample(0.0, 0);

        assert_eq!(solver.process_sample(f64::NAN, 0), 0.0);
        assert_eq!(solver.recoveries(), 1);
        assert_relative_eq!(solver.process_sample(0.0, 0), rest, epsilon = 1e-9);

        // A plain reset forgets the operating point again
        solver.reset();
        assert_eq!(solver.port_voltages(0).unwrap()[0], 0.0);
        assert_ne!(solver.process_sample(0.0, 0), rest);
    }

    #[test]
    fn test_residual_after_leaves_state_alone() {
        let mut solver = clipper();
        for n in 0..50 {
            solver.process_sample(sine(n, 4.0), 0);
        }
        let before = *solver.port_voltages(0).unwrap();
        let r1 = solver.residual_after(4.0, 0, 1).unwrap();
        let r8 = solver.residual_after(4.0, 0, 8).unwrap();
        assert!(r8 < r1);
        assert!(r8 < 1e-9);
        assert_eq!(*solver.port_voltages(0).unwrap(), before);
        assert!(solver.residual_after(4.0, 5, 8).is_none());
    }
}
