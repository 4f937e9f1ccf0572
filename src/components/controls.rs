//! User controls that map onto circuit resistances.

/// A potentiometer split by its wiper into two legs.
///
/// ```text
///   a ----[(1 - p) * R]---- wiper ----[p * R]---- b
/// ```
///
/// The position is kept inside a range that avoids zero-ohm legs unless the
/// caller explicitly widens it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Potentiometer {
    pub total_resistance: f64,
    /// Position from 0.0 to 1.0
    pub position: f64,
    min_position: f64,
    max_position: f64,
}

impl Potentiometer {
    /// Create a new potentiometer with the default 0.001..0.999 travel.
    pub fn new(total_resistance: f64, position: f64) -> Self {
        Self::with_range(total_resistance, position, 0.001, 0.999)
    }

    /// Create a potentiometer whose wiper is limited to `min..=max`.
    pub fn with_range(total_resistance: f64, position: f64, min: f64, max: f64) -> Self {
        let (min, max) = (min.clamp(0.0, 1.0), max.clamp(0.0, 1.0));
        Self {
            total_resistance: total_resistance.max(1.0), // Minimum 1 ohm
            position: position.clamp(min, max),
            min_position: min,
            max_position: max,
        }
    }

    /// Set the wiper position. Returns `true` if it moved.
    pub fn set_position(&mut self, position: f64) -> bool {
        let position = position.clamp(self.min_position, self.max_position);
        let moved = position != self.position;
        self.position = position;
        moved
    }

    /// Resistance from `a` to the wiper.
    pub fn upper(&self) -> f64 {
        (1.0 - self.position) * self.total_resistance
    }

    /// Resistance from the wiper to `b`.
    pub fn lower(&self) -> f64 {
        self.position * self.total_resistance
    }

    /// Both legs, in the order NDK pot incidence rows expect them.
    pub fn legs(&self) -> [f64; 2] {
        [self.upper(), self.lower()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pot_legs_sum_to_total() {
        let pot = Potentiometer::new(100.0e3, 0.3);
        let [a, b] = pot.legs();
        assert!((a + b - 100.0e3).abs() < 1e-9);
        assert!((b - 30.0e3).abs() < 1e-9);
    }

    #[test]
    fn test_pot_clamping() {
        let mut pot = Potentiometer::with_range(1.0e3, 2.0, 0.1, 0.99);
        assert_eq!(pot.position, 0.99);
        assert!(pot.set_position(-1.0));
        assert_eq!(pot.position, 0.1);
        assert!(!pot.set_position(0.05));
    }
}
