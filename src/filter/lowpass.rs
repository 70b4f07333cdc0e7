use std::f64::consts::TAU;

// ---------------------------------------------------------------------------
// First-order low-pass (RC) filter
// ---------------------------------------------------------------------------

/// Blend coefficient of a first-order low-pass for a given sample period.
///
/// Returns 1.0 (pass-through) when either `dt` or `cutoff_hz` is not
/// strictly positive, so a zero cutoff means "filter off". A NaN or
/// infinite `dt` also passes through.
pub fn lowpass_alpha(dt: f64, cutoff_hz: f64) -> f64 {
    if !(dt > 0.0) || !(cutoff_hz > 0.0) || dt.is_infinite() {
        return 1.0;
    }
    let rc = 1.0 / (TAU * cutoff_hz);
    dt / (dt + rc)
}

#[derive(Debug, Clone)]
pub struct LowPassFilter {
    cutoff_hz: f64,
    output: f64,
}

impl LowPassFilter {
    pub fn new(cutoff_hz: f64) -> Self {
        Self { cutoff_hz, output: 0.0 }
    }

    /// Advance the filter by one sample taken `dt` seconds after the last.
    pub fn apply(&mut self, sample: f64, dt: f64) -> f64 {
        self.output += lowpass_alpha(dt, self.cutoff_hz) * (sample - self.output);
        self.output
    }

    pub fn reset(&mut self, value: f64) {
        self.output = value;
    }

    pub fn set_cutoff_frequency(&mut self, cutoff_hz: f64) {
        self.cutoff_hz = cutoff_hz;
    }

    pub fn cutoff_frequency(&self) -> f64 {
        self.cutoff_hz
    }

    pub fn output(&self) -> f64 {
        self.output
    }
}
