//! Peak envelope follower used to drive pots from the input level.

/// Full-wave peak follower with separate attack and release times.
///
/// Each time constant becomes a one-pole coefficient `exp(-1 / (t * fs))`;
/// the attack coefficient applies while the rectified input is above the
/// envelope and the release coefficient while it is below.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvelopeFollower {
    envelope: f64,
    attack_ms: f64,
    release_ms: f64,
    attack_coef: f64,
    release_coef: f64,
    sample_rate: f64,
}

impl EnvelopeFollower {
    pub const MIN_TIME_MS: f64 = 0.01;

    pub fn new(attack_ms: f64, release_ms: f64, sample_rate: f64) -> Self {
        let mut follower = Self {
            envelope: 0.0,
            attack_ms: attack_ms.max(Self::MIN_TIME_MS),
            release_ms: release_ms.max(Self::MIN_TIME_MS),
            attack_coef: 0.0,
            release_coef: 0.0,
            sample_rate,
        };
        follower.update_coefficients();
        follower
    }

    fn update_coefficients(&mut self) {
        self.attack_coef = Self::coefficient(self.attack_ms, self.sample_rate);
        self.release_coef = Self::coefficient(self.release_ms, self.sample_rate);
    }

    fn coefficient(time_ms: f64, sample_rate: f64) -> f64 {
        let samples = (time_ms * 1.0e-3 * sample_rate).max(1.0);
        (-1.0 / samples).exp()
    }

    pub fn set_attack(&mut self, ms: f64) {
        self.attack_ms = ms.max(Self::MIN_TIME_MS);
        self.update_coefficients();
    }

    pub fn set_release(&mut self, ms: f64) {
        self.release_ms = ms.max(Self::MIN_TIME_MS);
        self.update_coefficients();
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.update_coefficients();
    }

    pub fn attack(&self) -> f64 {
        self.attack_ms
    }

    pub fn release(&self) -> f64 {
        self.release_ms
    }

    /// Feed one sample and return the new envelope.
    ///
    /// Non-finite input is skipped so one bad sample cannot latch the
    /// envelope at NaN.
    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let rectified = input.abs();
        if !rectified.is_finite() {
            return self.envelope;
        }
        let coef = if rectified > self.envelope {
            self.attack_coef
        } else {
            self.release_coef
        };
        self.envelope = rectified + coef * (self.envelope - rectified);
        self.envelope
    }

    pub fn envelope(&self) -> f64 {
        self.envelope
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }
}
