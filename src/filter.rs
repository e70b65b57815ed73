//! First-order IIR low-pass, rate-limited differentiator, and the spool
//! warm-up tracker the derived-word calculators share.

use crate::config::{DifferentiatorConfig, LowpassConfig};

/// `y[n] = k1 * y[n-1] + k2 * x[n]`.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Lowpass {
    k1: f32,
    k2: f32,
    prev_output: f32,
    preloaded: bool,
}

impl Lowpass {
    pub const fn new(config: LowpassConfig) -> Self {
        Lowpass {
            k1: config.k1,
            k2: config.k2,
            prev_output: 0.0,
            preloaded: false,
        }
    }

    pub fn reset(&mut self) {
        self.prev_output = 0.0;
        self.preloaded = false;
    }

    /// Seeds the history so the first filtered sample starts from `x`
    /// instead of climbing up from zero.
    pub fn preload(&mut self, x: f32) {
        self.prev_output = x;
        self.preloaded = true;
    }

    pub fn filter(&mut self, x: f32) -> f32 {
        let y = self.k1 * self.prev_output + self.k2 * x;
        self.prev_output = y;
        y
    }

    pub fn last_output(&self) -> f32 {
        self.prev_output
    }

    pub fn is_preloaded(&self) -> bool {
        self.preloaded
    }
}

/// Rate-limited first-difference differentiator.
///
/// The output is the input step scaled by the sample rate and clamped to
/// the configured limits. Steps outside the delta window are treated as
/// discontinuities (heading wrapping through +/-180 degrees) and the
/// previous output is held instead.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Differentiator {
    /// Smoothing coefficient reserved in the configuration block.
    #[allow(dead_code)]
    k1: f32,
    sample_rate_hz: f32,
    upper_limit: f32,
    lower_limit: f32,
    upper_delta: f32,
    lower_delta: f32,
    prev_input: f32,
    prev_output: f32,
}

impl Differentiator {
    pub const fn new(config: DifferentiatorConfig) -> Self {
        Differentiator {
            k1: config.k1,
            sample_rate_hz: config.sample_rate_hz,
            upper_limit: config.upper_limit,
            lower_limit: config.lower_limit,
            upper_delta: config.upper_delta,
            lower_delta: config.lower_delta,
            prev_input: 0.0,
            prev_output: 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.prev_input = 0.0;
        self.prev_output = 0.0;
    }

    /// Seeds the input history so the first derivative after a restart is
    /// computed against `x` rather than zero.
    pub fn preload(&mut self, x: f32) {
        self.prev_input = x;
    }

    pub fn step(&mut self, x: f32) -> f32 {
        let delta = x - self.prev_input;
        self.prev_input = x;

        if delta > self.upper_delta || delta < self.lower_delta {
            // discontinuity: hold the previous rate
            return self.prev_output;
        }

        let rate = (delta * self.sample_rate_hz).clamp(self.lower_limit, self.upper_limit);
        self.prev_output = rate;
        rate
    }

    pub fn last_output(&self) -> f32 {
        self.prev_output
    }
}

/// Number of consecutive valid samples a filter must see before its output
/// is trusted.
pub const SPOOL_THRESHOLD: usize = 10;

/// What a valid sample means for the filter this cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpoolStep {
    /// First valid sample after a reset: preload, output zero.
    Preload,
    /// Filter runs but its output is not yet trusted.
    Spooling,
    /// Filter output is trusted.
    Settled,
}

/// Warm-up tracker. One invalid sample restarts the spool from scratch.
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Spool {
    good: bool,
    count: usize,
}

impl Spool {
    pub const fn new() -> Self {
        Spool {
            good: false,
            count: 0,
        }
    }

    /// Registers a valid sample and reports how to treat it.
    pub fn advance(&mut self) -> SpoolStep {
        if self.good {
            return SpoolStep::Settled;
        }
        let first = self.count == 0;
        self.count += 1;
        if self.count > SPOOL_THRESHOLD {
            self.good = true;
        }
        if first {
            SpoolStep::Preload
        } else if self.good {
            SpoolStep::Settled
        } else {
            SpoolStep::Spooling
        }
    }

    /// Registers an invalid sample.
    pub fn invalidate(&mut self) {
        self.good = false;
        self.count = 0;
    }

    pub fn is_settled(&self) -> bool {
        self.good
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IopConfig;

    fn diff() -> Differentiator {
        Differentiator::new(IopConfig::DEFAULT.differentiator)
    }

    #[test]
    fn test_lowpass_preload_and_recurrence() {
        let mut lp = Lowpass::new(IopConfig::DEFAULT.lowpass);
        lp.preload(1.0);
        // coefficients sum to one, so a constant input is a fixed point
        let y = lp.filter(1.0);
        assert!(libm::fabsf(y - 1.0) < 1e-6);
        // step change converges toward the new value from the old one
        let y = lp.filter(2.0);
        assert!(y > 1.0 && y < 2.0);
    }

    #[test]
    fn test_lowpass_reset_zeroes_history() {
        let mut lp = Lowpass::new(IopConfig::DEFAULT.lowpass);
        lp.preload(5.0);
        assert!(lp.is_preloaded());
        lp.filter(5.0);
        lp.reset();
        assert_eq!(lp.last_output(), 0.0);
        assert!(!lp.is_preloaded());
    }

    #[test]
    fn test_differentiator_constant_slope() {
        let mut d = diff();
        d.preload(10.0);
        // +0.1 degrees per 20 ms sample is 5 deg/s
        let mut x = 10.0;
        for _ in 0..10 {
            x += 0.1;
            let rate = d.step(x);
            assert!(libm::fabsf(rate - 5.0) < 0.01, "rate {}", rate);
        }
    }

    #[test]
    fn test_differentiator_output_limits() {
        let mut d = diff();
        d.preload(0.0);
        // 10 degrees in one 50 Hz sample is 500 deg/s, beyond the limit
        assert_eq!(d.step(10.0), 180.0);
        d.preload(0.0);
        assert_eq!(d.step(-10.0), -180.0);
    }

    #[test]
    fn test_differentiator_wrap_guard() {
        let mut d = diff();
        d.preload(170.0);
        let settled = d.step(179.0); // establishes a normal rate
        // heading wraps +179 -> -179: a -358 step, inside the +/-360 window
        let rate = d.step(-179.0);
        assert_eq!(rate, -180.0); // clamped, but a real derivative
        assert!(rate != settled);

        // a +400 step falls outside the window and holds the previous output
        let held = d.step(221.0);
        assert_eq!(held, rate);
    }

    #[test]
    fn test_spool_settles_on_eleventh_sample() {
        let mut spool = Spool::new();
        assert_eq!(spool.advance(), SpoolStep::Preload);
        for _ in 0..9 {
            assert_eq!(spool.advance(), SpoolStep::Spooling);
        }
        assert_eq!(spool.advance(), SpoolStep::Settled);
        assert!(spool.is_settled());
        assert_eq!(spool.advance(), SpoolStep::Settled);
    }

    #[test]
    fn test_spool_restarts_after_invalid_sample() {
        let mut spool = Spool::new();
        for _ in 0..20 {
            spool.advance();
        }
        assert!(spool.is_settled());
        spool.invalidate();
        assert!(!spool.is_settled());
        assert_eq!(spool.advance(), SpoolStep::Preload);
    }
}
