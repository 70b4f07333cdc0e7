use tracing::trace;

use super::lowpass::LowPassFilter;
use super::ring::EventRing;

// ---------------------------------------------------------------------------
// Slew-rate gain limiter
// ---------------------------------------------------------------------------
//
// Watches the P+D output of a PID loop and returns a gain multiplier in
// (0, 1] that shrinks when the output slews faster than the actuator can
// follow. Letting demand outrun a rate-limited actuator puts the achieved
// deflection out of phase with the demand, which shows up as a limit cycle.

/// Half period of the slowest oscillation we expect to catch, s.
pub const WINDOW: f64 = 0.3;
/// Gain reduction per unit of slew-rate exceedance ratio.
pub const MODIFIER_GAIN: f64 = 1.5;
/// Cutoff of the filter applied to the differentiated output, Hz.
pub const DERIVATIVE_CUTOFF_HZ: f64 = 25.0;
/// Exceedance events remembered per polarity.
pub const N_EVENTS: usize = 2;
/// Peak slew rates are clipped to this multiple of the limit before use.
const PEAK_CLIP_RATIO: f64 = 10.0;

#[derive(Debug, Clone)]
pub struct SlewLimiter {
    slew_rate_max: f64, // output units per second, <= 0 disables
    slew_rate_tau: f64, // s

    now: f64, // s, advanced by every accepted dt
    last_sample: f64,
    slew_filter: LowPassFilter,

    max_pos_slew_rate: f64,
    max_pos_slew_time: f64,
    max_neg_slew_rate: f64,
    max_neg_slew_time: f64,

    output_slew_rate: f64,
    modifier_slew_rate: f64,

    pos_events: EventRing<N_EVENTS>,
    neg_events: EventRing<N_EVENTS>,
    pos_event_stored: bool,
    neg_event_stored: bool,
}

impl SlewLimiter {
    pub fn new(slew_rate_max: f64, slew_rate_tau: f64) -> Self {
        let mut slew_filter = LowPassFilter::new(DERIVATIVE_CUTOFF_HZ);
        slew_filter.reset(0.0);
        Self {
            slew_rate_max,
            slew_rate_tau,
            now: 0.0,
            last_sample: 0.0,
            slew_filter,
            max_pos_slew_rate: 0.0,
            max_pos_slew_time: 0.0,
            max_neg_slew_rate: 0.0,
            max_neg_slew_time: 0.0,
            output_slew_rate: 0.0,
            modifier_slew_rate: 0.0,
            pos_events: EventRing::new(),
            neg_events: EventRing::new(),
            pos_event_stored: false,
            neg_event_stored: false,
        }
    }

    pub fn set_slew_rate_max(&mut self, slew_rate_max: f64) {
        self.slew_rate_max = slew_rate_max;
    }

    pub fn set_slew_rate_tau(&mut self, slew_rate_tau: f64) {
        self.slew_rate_tau = slew_rate_tau;
    }

    /// Smoothed peak slew rate of the observed signal. Tracked even when the
    /// limit is disabled.
    pub fn slew_rate(&self) -> f64 {
        self.output_slew_rate
    }

    pub fn last_sample(&self) -> f64 {
        self.last_sample
    }

    /// Feed the next output sample and get the P/D gain multiplier.
    pub fn modifier(&mut self, sample: f64, dt: f64) -> f64 {
        if !(dt > 0.0) {
            return 1.0;
        }

        let slew_rate = self.slew_filter.apply((sample - self.last_sample) / dt, dt);
        self.last_sample = sample;
        self.now += dt;
        let now = self.now;

        let decay_alpha = if self.slew_rate_tau > 0.0 {
            dt.min(self.slew_rate_tau) / self.slew_rate_tau
        } else {
            1.0
        };
        let attack_alpha = (2.0 * decay_alpha).min(1.0);

        // Peaks hold for one window after they were last exceeded, then decay
        if slew_rate > self.max_pos_slew_rate {
            self.max_pos_slew_rate = slew_rate;
            self.max_pos_slew_time = now;
        } else if now - self.max_pos_slew_time > WINDOW {
            self.max_pos_slew_rate *= 1.0 - decay_alpha;
        }

        if -slew_rate > self.max_neg_slew_rate {
            self.max_neg_slew_rate = -slew_rate;
            self.max_neg_slew_time = now;
        } else if now - self.max_neg_slew_time > WINDOW {
            self.max_neg_slew_rate *= 1.0 - decay_alpha;
        }

        let raw_slew_rate = 0.5 * (self.max_pos_slew_rate + self.max_neg_slew_rate);
        self.output_slew_rate = attack_decay(self.output_slew_rate, raw_slew_rate, attack_alpha);

        if self.slew_rate_max <= 0.0 {
            return 1.0;
        }

        let clip = PEAK_CLIP_RATIO * self.slew_rate_max;
        let limited_raw_slew_rate =
            0.5 * (self.max_pos_slew_rate.min(clip) + self.max_neg_slew_rate.min(clip));

        self.record_exceedance(slew_rate, now);

        // A single old spike (mode change, setpoint jump) must not hold the
        // gains down: once the oldest remembered event is older than the
        // span N events would take, bleed the modifier input away.
        let oldest = self.pos_events.oldest(now).min(self.neg_events.oldest(now));
        let stale_after = (N_EVENTS as f64 + 1.0) * WINDOW;
        let mut modifier_input = limited_raw_slew_rate;
        if now - oldest > stale_after {
            let beyond = now - oldest - stale_after;
            modifier_input *= if self.slew_rate_tau > 0.0 {
                (-beyond / self.slew_rate_tau).exp()
            } else {
                0.0
            };
        }

        self.modifier_slew_rate = attack_decay(self.modifier_slew_rate, modifier_input, attack_alpha);

        if self.modifier_slew_rate > self.slew_rate_max {
            let gain = self.slew_rate_max
                / (self.slew_rate_max + MODIFIER_GAIN * (self.modifier_slew_rate - self.slew_rate_max));
            trace!(
                slew_rate = self.modifier_slew_rate,
                limit = self.slew_rate_max,
                gain,
                "slew limiter reducing gain"
            );
            gain
        } else {
            1.0
        }
    }

    /// Events alternate polarity: storing one side re-arms the other.
    fn record_exceedance(&mut self, slew_rate: f64, now: f64) {
        if !self.pos_event_stored && slew_rate > self.slew_rate_max {
            self.pos_events.push(now);
            self.pos_event_stored = true;
            self.neg_event_stored = false;
        }

        if !self.neg_event_stored && -slew_rate > self.slew_rate_max {
            self.neg_events.push(now);
            self.neg_event_stored = true;
            self.pos_event_stored = false;
        }
    }
}

/// Follow `raw` with `alpha`, but never sit above it.
fn attack_decay(smoothed: f64, raw: f64, alpha: f64) -> f64 {
    ((1.0 - alpha) * smoothed + alpha * raw).min(raw)
}
