//! Bilinear-transform discretization of small analog transfer functions.

/// Map a first-order analog filter onto the z-plane.
///
/// `b_s` and `a_s` hold `[s^1, s^0]` coefficients; `k` is the bilinear
/// constant `2 * fs`. Returns normalized `([b0, b1], [1, a1])`.
pub fn bilinear_first_order(b_s: [f64; 2], a_s: [f64; 2], k: f64) -> ([f64; 2], [f64; 2]) {
    let a0 = a_s[0] * k + a_s[1];
    let b = [
        (b_s[0] * k + b_s[1]) / a0,
        (-b_s[0] * k + b_s[1]) / a0,
    ];
    let a = [1.0, (-a_s[0] * k + a_s[1]) / a0];
    (b, a)
}

/// Transposed direct-form-II first-order IIR section.
#[derive(Debug, Clone, Default)]
pub struct FirstOrderFilter {
    b: [f64; 2],
    a1: f64,
    z: f64,
}

impl FirstOrderFilter {
    /// Create a filter from analog prototype coefficients at `sample_rate`.
    pub fn from_analog(b_s: [f64; 2], a_s: [f64; 2], sample_rate: f64) -> Self {
        let mut filter = Self::default();
        filter.set_analog(b_s, a_s, sample_rate);
        filter
    }

    /// Replace the coefficients, keeping the filter state.
    pub fn set_analog(&mut self, b_s: [f64; 2], a_s: [f64; 2], sample_rate: f64) {
        let (b, a) = bilinear_first_order(b_s, a_s, 2.0 * sample_rate);
        self.b = b;
        self.a1 = a[1];
    }

    pub fn reset(&mut self) {
        self.z = 0.0;
    }

    /// Set the state to the steady state for a constant `input`.
    pub fn reset_to(&mut self, input: f64) {
        let y = self.dc_gain() * input;
        self.z = y - self.b[0] * input;
    }

    /// Gain at DC.
    pub fn dc_gain(&self) -> f64 {
        (self.b[0] + self.b[1]) / (1.0 + self.a1)
    }

    #[inline]
    pub fn process_sample(&mut self, x: f64) -> f64 {
        let y = self.b[0] * x + self.z;
        self.z = self.b[1] * x - self.a1 * y;
        y
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_highpass_blocks_dc() {
        // C = 100nF, R = 100k high-pass
        let mut hpf = FirstOrderFilter::from_analog([1.0e-2, 0.0], [1.0e-2, 1.0], 48_000.0);
        let mut y = 1.0;
        for _ in 0..48_000 {
            y = hpf.process_sample(1.0);
        }
        assert_abs_diff_eq!(y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_lowpass_passes_dc() {
        let mut lpf = FirstOrderFilter::from_analog([0.0, 1.0], [1.0e-4, 1.0], 48_000.0);
        let mut y = 0.0;
        for _ in 0..4_800 {
            y = lpf.process_sample(0.5);
        }
        assert_abs_diff_eq!(y, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_reset_to_holds_steady_state() {
        let mut hpf = FirstOrderFilter::from_analog([1.0e-2, 0.0], [1.0e-2, 1.0], 48_000.0);
        hpf.reset_to(0.66);
        for _ in 0..16 {
            assert_abs_diff_eq!(hpf.process_sample(0.66), 0.0, epsilon = 1e-12);
        }

        let mut lpf = FirstOrderFilter::from_analog([0.0, 1.0], [1.0e-4, 1.0], 48_000.0);
        assert_abs_diff_eq!(lpf.dc_gain(), 1.0, epsilon = 1e-12);
        lpf.reset_to(-0.25);
        assert_abs_diff_eq!(lpf.process_sample(-0.25), -0.25, epsilon = 1e-12);
    }
}
