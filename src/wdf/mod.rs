//! Wave digital filter framework.
//!
//! A WDF circuit is a rooted tree. Leaves are one-port elements
//! ([`Resistor`], [`Capacitor`], sources, ...), inner nodes are adaptors
//! ([`Series`], [`Parallel`], [`PolarityInverter`], [`RtypeAdaptor`]) and the
//! root is a single element that may depend on its own incident wave, usually
//! a nonlinearity solved by Newton-Raphson ([`DiodePairRoot`]).
//!
//! Every sample runs the same two-phase traversal (see [`process_tree`]):
//!
//! 1. `reflected()` is called on the tree, each adaptor pulling waves up
//!    from its children
//! 2. the root turns the arriving wave into its own reflected wave
//! 3. `incident()` pushes that wave back down, every element latching the
//!    wave it receives as state for the next sample
//!
//! Voltages and currents are only meaningful once the pass has completed.
//!
//! Port resistances are cached inside adaptors. After changing an element's
//! value, call [`WdfPort::propagate_impedance`] on the tree before the next
//! sample; the call recurses to the leaves and rebuilds coefficients on the
//! way back up, so no child ever needs a pointer to its parent.

mod adaptors;
mod leaves;
mod roots;
pub mod rtype;

pub use adaptors::{Parallel, PolarityInverter, Series};
pub use leaves::{Capacitor, Inductor, ResistiveCurrentSource, ResistiveVoltageSource, Resistor};
pub use roots::{DiodePairRoot, DiodeRoot, IdealVoltageSource, OpenCircuit};
pub use rtype::{
    DownPorts, ImpedanceCalculator, ParallelJunction, PortTerminals, RtypeAdaptor, ScatteringMatrix,
    SeriesJunction, WireJunction,
};

/// Incident / reflected wave pair seen at a port.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Wave {
    /// Wave travelling into the element
    pub a: f64,
    /// Wave travelling out of the element
    pub b: f64,
}

impl Wave {
    /// Kirchhoff voltage across the port.
    #[inline]
    pub fn voltage(&self) -> f64 {
        0.5 * (self.a + self.b)
    }

    /// Kirchhoff current into the port for port resistance `r`.
    #[inline]
    pub fn current(&self, r: f64) -> f64 {
        0.5 * (self.a - self.b) / r
    }
}

/// A one-port WDF element or a sub-tree seen from its parent.
pub trait WdfPort {
    /// Port resistance seen looking into this port (Ω).
    fn port_resistance(&self) -> f64;

    /// Compute and return the wave leaving this port.
    fn reflected(&mut self) -> f64;

    /// Accept the wave arriving from the parent and update state.
    fn incident(&mut self, a: f64);

    /// Waves stored during the last traversal.
    fn wave(&self) -> Wave;

    /// Recompute discretization constants for a new sample rate.
    ///
    /// Adaptors forward to their children and re-propagate impedances.
    fn prepare(&mut self, _sample_rate: f64) {}

    /// Clear all stored waves.
    fn reset(&mut self) {}

    /// Rebuild cached adaptor coefficients after a child value changed.
    fn propagate_impedance(&mut self) {}

    /// Voltage across the port after the last traversal.
    #[inline]
    fn voltage(&self) -> f64 {
        self.wave().voltage()
    }

    /// Current into the port after the last traversal.
    #[inline]
    fn current(&self) -> f64 {
        self.wave().current(self.port_resistance())
    }
}

/// Element terminating a WDF tree.
pub trait WdfRoot {
    /// Given the wave `a` arriving from the tree and the tree's port
    /// resistance, return the wave sent back down.
    fn solve(&mut self, a: f64, port_resistance: f64) -> f64;

    /// Waves stored during the last solve.
    fn wave(&self) -> Wave;

    /// Clear warm-start and wave state.
    fn reset(&mut self) {}

    /// Voltage across the root element after the last solve.
    #[inline]
    fn voltage(&self) -> f64 {
        self.wave().voltage()
    }
}

/// Run one reflect-up / solve / incident-down pass.
#[inline]
pub fn process_tree<T, R>(tree: &mut T, root: &mut R)
where
    T: WdfPort + ?Sized,
    R: WdfRoot + ?Sized,
{
    let a = tree.reflected();
    let b = root.solve(a, tree.port_resistance());
    tree.incident(b);
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_resistive_divider() {
        // 1V source with 1k internal resistance into a 1k load via an ideal root
        let mut tree = Series::new(ResistiveVoltageSource::new(1.0e3), Resistor::new(1.0e3));
        tree.p1.set_voltage(1.0);
        let mut root = IdealVoltageSource::new(0.0);

        process_tree(&mut tree, &mut root);

        // Series KVL with a 0V root: the load voltage cancels the source port voltage.
        assert_relative_eq!(tree.p2.voltage(), -0.5, epsilon = 1e-12);
        assert_relative_eq!(tree.p2.current(), -0.5e-3, epsilon = 1e-15);
        assert_relative_eq!(tree.p1.voltage() + tree.p2.voltage(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rc_lowpass_step_response() {
        let fs = 48_000.0;
        let r = 1.0e3;
        let c = 1.0e-6;
        let mut tree = Parallel::new(ResistiveVoltageSource::new(r), Capacitor::new(c));
        tree.prepare(fs);
        tree.p1.set_voltage(1.0);
        let mut root = OpenCircuit::default();

        // One time constant is 48 samples; after 5 tau the cap sits near 1V
        let mut vc = 0.0;
        for _ in 0..240 {
            process_tree(&mut tree, &mut root);
            vc = tree.p2.voltage();
        }
        assert!((vc - (1.0 - (-5.0f64).exp())).abs() < 1e-3);

        for _ in 0..4_800 {
            process_tree(&mut tree, &mut root);
        }
        assert_relative_eq!(tree.p2.voltage(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut tree = Parallel::new(ResistiveVoltageSource::new(100.0), Capacitor::new(1.0e-6));
        tree.prepare(44_100.0);
        tree.p1.set_voltage(0.3);
        let mut root = OpenCircuit::default();
        for _ in 0..10 {
            process_tree(&mut tree, &mut root);
        }
        tree.reset();
        tree.reset();
        assert_eq!(tree.p2.wave(), Wave::default());
        assert_eq!(tree.wave(), Wave::default());
    }
}
