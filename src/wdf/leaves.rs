//! One-port WDF leaf elements.
//!
//! Reactive leaves are constructed for [`crate::DEFAULT_SAMPLE_RATE`] and
//! rediscretized by [`WdfPort::prepare`].

use super::{Wave, WdfPort};
use crate::DEFAULT_SAMPLE_RATE;

// ---------------------------------------------------------------------------
// Resistor
// ---------------------------------------------------------------------------

/// Resistor. Matched to its port, so it reflects nothing: `b = 0`.
#[derive(Debug, Clone)]
pub struct Resistor {
    resistance: f64,
    wave: Wave,
}

impl Resistor {
    pub fn new(resistance: f64) -> Self {
        Self {
            resistance,
            wave: Wave::default(),
        }
    }

    /// Change the resistance. The owning tree must re-propagate impedances.
    pub fn set_resistance(&mut self, resistance: f64) {
        self.resistance = resistance;
    }
}

impl WdfPort for Resistor {
    #[inline]
    fn port_resistance(&self) -> f64 {
        self.resistance
    }

    #[inline]
    fn reflected(&mut self) -> f64 {
        self.wave.b = 0.0;
        0.0
    }

    #[inline]
    fn incident(&mut self, a: f64) {
        self.wave.a = a;
    }

    fn wave(&self) -> Wave {
        self.wave
    }

    fn reset(&mut self) {
        self.wave = Wave::default();
    }
}

// ---------------------------------------------------------------------------
// Capacitor
// ---------------------------------------------------------------------------

/// Capacitor, trapezoidal companion model.
///
/// `Rp = 1 / (2 * fs * C)`, `b[n] = a[n - 1]`
#[derive(Debug, Clone)]
pub struct Capacitor {
    capacitance: f64,
    sample_rate: f64,
    resistance: f64,
    state: f64,
    wave: Wave,
}

impl Capacitor {
    pub fn new(capacitance: f64) -> Self {
        let sample_rate = f64::from(DEFAULT_SAMPLE_RATE);
        Self {
            capacitance,
            sample_rate,
            resistance: 1.0 / (2.0 * sample_rate * capacitance),
            state: 0.0,
            wave: Wave::default(),
        }
    }

    pub fn capacitance(&self) -> f64 {
        self.capacitance
    }

    /// Change the capacitance. The owning tree must re-propagate impedances.
    pub fn set_capacitance(&mut self, capacitance: f64) {
        self.capacitance = capacitance;
        self.resistance = 1.0 / (2.0 * self.sample_rate * capacitance);
    }
}

impl WdfPort for Capacitor {
    #[inline]
    fn port_resistance(&self) -> f64 {
        self.resistance
    }

    #[inline]
    fn reflected(&mut self) -> f64 {
        self.wave.b = self.state;
        self.state
    }

    #[inline]
    fn incident(&mut self, a: f64) {
        self.wave.a = a;
        self.state = a;
    }

    fn wave(&self) -> Wave {
        self.wave
    }

    fn prepare(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.set_capacitance(self.capacitance);
    }

    fn reset(&mut self) {
        self.state = 0.0;
        self.wave = Wave::default();
    }
}

// ---------------------------------------------------------------------------
// Inductor
// ---------------------------------------------------------------------------

/// Inductor, trapezoidal companion model.
///
/// `Rp = 2 * fs * L`, `b[n] = -a[n - 1]`
#[derive(Debug, Clone)]
pub struct Inductor {
    inductance: f64,
    sample_rate: f64,
    resistance: f64,
    state: f64,
    wave: Wave,
}

impl Inductor {
    pub fn new(inductance: f64) -> Self {
        let sample_rate = f64::from(DEFAULT_SAMPLE_RATE);
        Self {
            inductance,
            sample_rate,
            resistance: 2.0 * sample_rate * inductance,
            state: 0.0,
            wave: Wave::default(),
        }
    }

    /// Change the inductance. The owning tree must re-propagate impedances.
    pub fn set_inductance(&mut self, inductance: f64) {
        self.inductance = inductance;
        self.resistance = 2.0 * self.sample_rate * inductance;
    }
}

impl WdfPort for Inductor {
    #[inline]
    fn port_resistance(&self) -> f64 {
        self.resistance
    }

    #[inline]
    fn reflected(&mut self) -> f64 {
        self.wave.b = -self.state;
        self.wave.b
    }

    #[inline]
    fn incident(&mut self, a: f64) {
        self.wave.a = a;
        self.state = a;
    }

    fn wave(&self) -> Wave {
        self.wave
    }

    fn prepare(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.set_inductance(self.inductance);
    }

    fn reset(&mut self) {
        self.state = 0.0;
        self.wave = Wave::default();
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Voltage source with series resistance.
///
/// The port is adapted to the series resistance, so the reflected wave is the
/// source voltage alone and never depends on the incident wave.
#[derive(Debug, Clone)]
pub struct ResistiveVoltageSource {
    resistance: f64,
    voltage: f64,
    wave: Wave,
}

impl ResistiveVoltageSource {
    pub fn new(resistance: f64) -> Self {
        Self {
            resistance,
            voltage: 0.0,
            wave: Wave::default(),
        }
    }

    #[inline]
    pub fn set_voltage(&mut self, voltage: f64) {
        self.voltage = voltage;
    }

    /// Change the series resistance. The owning tree must re-propagate impedances.
    pub fn set_resistance(&mut self, resistance: f64) {
        self.resistance = resistance;
    }
}

impl WdfPort for ResistiveVoltageSource {
    #[inline]
    fn port_resistance(&self) -> f64 {
        self.resistance
    }

    #[inline]
    fn reflected(&mut self) -> f64 {
        self.wave.b = self.voltage;
        self.voltage
    }

    #[inline]
    fn incident(&mut self, a: f64) {
        self.wave.a = a;
    }

    fn wave(&self) -> Wave {
        self.wave
    }

    fn reset(&mut self) {
        self.wave = Wave::default();
    }
}

/// Current source with parallel resistance: `b = R * I`.
#[derive(Debug, Clone)]
pub struct ResistiveCurrentSource {
    resistance: f64,
    current: f64,
    wave: Wave,
}

impl ResistiveCurrentSource {
    pub fn new(resistance: f64) -> Self {
        Self {
            resistance,
            current: 0.0,
            wave: Wave::default(),
        }
    }

    #[inline]
    pub fn set_current(&mut self, current: f64) {
        self.current = current;
    }
}

impl WdfPort for ResistiveCurrentSource {
    #[inline]
    fn port_resistance(&self) -> f64 {
        self.resistance
    }

    #[inline]
    fn reflected(&mut self) -> f64 {
        self.wave.b = self.resistance * self.current;
        self.wave.b
    }

    #[inline]
    fn incident(&mut self, a: f64) {
        self.wave.a = a;
    }

    fn wave(&self) -> Wave {
        self.wave
    }

    fn reset(&mut self) {
        self.wave = Wave::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_capacitor_resistance_tracks_sample_rate() {
        let mut c = Capacitor::new(47.0e-9);
        c.prepare(96_000.0);
        assert_relative_eq!(c.port_resistance(), 1.0 / (2.0 * 96_000.0 * 47.0e-9));
        c.set_capacitance(94.0e-9);
        assert_relative_eq!(c.port_resistance(), 1.0 / (2.0 * 96_000.0 * 94.0e-9));
    }

    #[test]
    fn test_capacitor_delays_incident() {
        let mut c = Capacitor::new(1.0e-6);
        assert_eq!(c.reflected(), 0.0);
        c.incident(0.25);
        assert_eq!(c.reflected(), 0.25);
    }

    #[test]
    fn test_inductor_inverts_incident() {
        let mut l = Inductor::new(0.5);
        l.prepare(48_000.0);
        assert_relative_eq!(l.port_resistance(), 48_000.0);
        l.incident(0.25);
        assert_eq!(l.reflected(), -0.25);
    }

    #[test]
    fn test_current_source_open_voltage() {
        // Unloaded (open root: a = b), v = R * I
        let mut src = ResistiveCurrentSource::new(2.0e3);
        src.set_current(1.0e-3);
        let b = src.reflected();
        src.incident(b);
        assert_relative_eq!(src.voltage(), 2.0);
    }
}
