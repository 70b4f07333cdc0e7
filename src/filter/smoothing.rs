use super::lowpass::lowpass_alpha;

// ---------------------------------------------------------------------------
// Single-pole exponential smoothing
// ---------------------------------------------------------------------------

/// Exponential smoother used to shape stick-derived demands before they
/// reach the attitude controllers.
///
/// `smoothed = alpha * input + (1 - alpha) * previous`
///
/// One instance per consumer; the owning controller holds it by value.
/// Not internally synchronised: share across threads only behind the
/// caller's own lock.
#[derive(Debug, Clone)]
pub struct ExponentialSmoother {
    alpha: f64,
    previous: f64,
}

impl ExponentialSmoother {
    /// `alpha` is clamped into `[0, 1]`.
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            previous: 0.0,
        }
    }

    /// Smoother equivalent to an RC low-pass at `cutoff_hz` sampled every `dt`.
    pub fn from_cutoff(cutoff_hz: f64, dt: f64) -> Self {
        Self::new(lowpass_alpha(dt, cutoff_hz))
    }

    /// Set a new coefficient and forget the previous value.
    pub fn initialize(&mut self, alpha: f64) {
        self.alpha = alpha.clamp(0.0, 1.0);
        self.previous = 0.0;
    }

    pub fn apply(&mut self, value: f64) -> f64 {
        self.previous = self.alpha * value + (1.0 - self.alpha) * self.previous;
        self.previous
    }

    pub fn value(&self) -> f64 {
        self.previous
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}
