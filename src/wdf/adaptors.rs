//! Two-port series and parallel adaptors, and the polarity inverter.
//!
//! Each adaptor presents itself to its parent as a single adapted port: the
//! wave it reflects upward never depends on the wave arriving from above,
//! which is what lets the tree be evaluated bottom-up without delay-free
//! loops.

use super::{Wave, WdfPort};

// ---------------------------------------------------------------------------
// Series
// ---------------------------------------------------------------------------

/// Series connection: both children carry the same current.
///
/// ```text
/// R = R1 + R2        γ = R1 / R
///
/// up:    b  = -(b1 + b2)
/// down:  a1 = b1 - γ (a + b1 + b2)
///        a2 = -(a + a1)
/// ```
#[derive(Debug, Clone)]
pub struct Series<P1, P2> {
    pub p1: P1,
    pub p2: P2,
    resistance: f64,
    gamma: f64,
    wave: Wave,
}

impl<P1: WdfPort, P2: WdfPort> Series<P1, P2> {
    pub fn new(p1: P1, p2: P2) -> Self {
        let mut adaptor = Self {
            p1,
            p2,
            resistance: 0.0,
            gamma: 0.0,
            wave: Wave::default(),
        };
        adaptor.update_coefficients();
        adaptor
    }

    fn update_coefficients(&mut self) {
        let r1 = self.p1.port_resistance();
        self.resistance = r1 + self.p2.port_resistance();
        self.gamma = r1 / self.resistance;
    }
}

impl<P1: WdfPort, P2: WdfPort> WdfPort for Series<P1, P2> {
    #[inline]
    fn port_resistance(&self) -> f64 {
        self.resistance
    }

    #[inline]
    fn reflected(&mut self) -> f64 {
        self.wave.b = -(self.p1.reflected() + self.p2.reflected());
        self.wave.b
    }

    #[inline]
    fn incident(&mut self, a: f64) {
        let b1 = self.p1.wave().b;
        let b2 = self.p2.wave().b;
        let a1 = b1 - self.gamma * (a + b1 + b2);
        self.p1.incident(a1);
        self.p2.incident(-(a + a1));
        self.wave.a = a;
    }

    fn wave(&self) -> Wave {
        self.wave
    }

    fn prepare(&mut self, sample_rate: f64) {
        self.p1.prepare(sample_rate);
        self.p2.prepare(sample_rate);
        self.update_coefficients();
    }

    fn reset(&mut self) {
        self.p1.reset();
        self.p2.reset();
        self.wave = Wave::default();
    }

    fn propagate_impedance(&mut self) {
        self.p1.propagate_impedance();
        self.p2.propagate_impedance();
        self.update_coefficients();
    }
}

// ---------------------------------------------------------------------------
// Parallel
// ---------------------------------------------------------------------------

/// Parallel connection: both children see the same voltage.
///
/// ```text
/// G = G1 + G2        γ = G1 / G
///
/// up:    b  = b2 - γ (b2 - b1)
/// down:  a2 = a + b - b2
///        a1 = a + b - b1
/// ```
#[derive(Debug, Clone)]
pub struct Parallel<P1, P2> {
    pub p1: P1,
    pub p2: P2,
    resistance: f64,
    gamma: f64,
    wave: Wave,
}

impl<P1: WdfPort, P2: WdfPort> Parallel<P1, P2> {
    pub fn new(p1: P1, p2: P2) -> Self {
        let mut adaptor = Self {
            p1,
            p2,
            resistance: 0.0,
            gamma: 0.0,
            wave: Wave::default(),
        };
        adaptor.update_coefficients();
        adaptor
    }

    fn update_coefficients(&mut self) {
        let g1 = 1.0 / self.p1.port_resistance();
        let g2 = 1.0 / self.p2.port_resistance();
        self.resistance = 1.0 / (g1 + g2);
        self.gamma = g1 / (g1 + g2);
    }
}

impl<P1: WdfPort, P2: WdfPort> WdfPort for Parallel<P1, P2> {
    #[inline]
    fn port_resistance(&self) -> f64 {
        self.resistance
    }

    #[inline]
    fn reflected(&mut self) -> f64 {
        let b1 = self.p1.reflected();
        let b2 = self.p2.reflected();
        self.wave.b = b2 - self.gamma * (b2 - b1);
        self.wave.b
    }

    #[inline]
    fn incident(&mut self, a: f64) {
        let common = a + self.wave.b;
        let b1 = self.p1.wave().b;
        let b2 = self.p2.wave().b;
        self.p1.incident(common - b1);
        self.p2.incident(common - b2);
        self.wave.a = a;
    }

    fn wave(&self) -> Wave {
        self.wave
    }

    fn prepare(&mut self, sample_rate: f64) {
        self.p1.prepare(sample_rate);
        self.p2.prepare(sample_rate);
        self.update_coefficients();
    }

    fn reset(&mut self) {
        self.p1.reset();
        self.p2.reset();
        self.wave = Wave::default();
    }

    fn propagate_impedance(&mut self) {
        self.p1.propagate_impedance();
        self.p2.propagate_impedance();
        self.update_coefficients();
    }
}

// ---------------------------------------------------------------------------
// Polarity inverter
// ---------------------------------------------------------------------------

/// Flips voltage and current of the wrapped port.
#[derive(Debug, Clone)]
pub struct PolarityInverter<P> {
    pub port: P,
    wave: Wave,
}

impl<P: WdfPort> PolarityInverter<P> {
    pub fn new(port: P) -> Self {
        Self {
            port,
            wave: Wave::default(),
        }
    }
}

impl<P: WdfPort> WdfPort for PolarityInverter<P> {
    #[inline]
    fn port_resistance(&self) -> f64 {
        self.port.port_resistance()
    }

    #[inline]
    fn reflected(&mut self) -> f64 {
        self.wave.b = -self.port.reflected();
        self.wave.b
    }

    #[inline]
    fn incident(&mut self, a: f64) {
        self.wave.a = a;
        self.port.incident(-a);
    }

    fn wave(&self) -> Wave {
        self.wave
    }

    fn prepare(&mut self, sample_rate: f64) {
        self.port.prepare(sample_rate);
    }

    fn reset(&mut self) {
        self.port.reset();
        self.wave = Wave::default();
    }

    fn propagate_impedance(&mut self) {
        self.port.propagate_impedance();
    }
}
