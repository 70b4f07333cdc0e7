use tracing::{debug, trace};

use crate::filter::{lowpass_alpha, SlewLimiter};
use super::gains::ControllerGains;
use super::info::ControlInfo;

// ---------------------------------------------------------------------------
// Cross-cycle PID state
// ---------------------------------------------------------------------------

/// Filter and integrator memory carried from one update to the next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidState {
    pub integrator: f64,
    pub target: f64,            // filtered target
    pub error: f64,             // filtered error
    pub derivative: f64,        // filtered error derivative
    pub target_derivative: f64, // derivative of the filtered target
    pub reset_filter: bool,     // re-seed filters from the next sample
    pub i_set: bool,            // integrator written externally since last update
}

impl Default for PidState {
    fn default() -> Self {
        Self {
            integrator: 0.0,
            target: 0.0,
            error: 0.0,
            derivative: 0.0,
            target_derivative: 0.0,
            reset_filter: true,
            i_set: false,
        }
    }
}

impl PidState {
    /// Low-pass the target and error, then differentiate them.
    ///
    /// Rate terms are only refreshed when `dt > 0`.
    fn filter_inputs(&mut self, gains: &ControllerGains, target: f64, measurement: f64, dt: f64) {
        if self.reset_filter {
            self.reset_filter = false;
            self.target = target;
            self.error = target - measurement;
            self.derivative = 0.0;
            self.target_derivative = 0.0;
            return;
        }

        let error_last = self.error;
        let target_last = self.target;

        self.target += lowpass_alpha(dt, gains.filt_t_hz) * (target - self.target);
        self.error += lowpass_alpha(dt, gains.filt_e_hz) * ((self.target - measurement) - self.error);

        if dt > 0.0 {
            let derivative = (self.error - error_last) / dt;
            self.derivative += lowpass_alpha(dt, gains.filt_d_hz) * (derivative - self.derivative);
            self.target_derivative = (self.target - target_last) / dt;
        }
    }

    /// Error-only variant of [`PidState::filter_inputs`]: the target and its
    /// derivative are pinned to zero and only the error is filtered.
    fn filter_error(&mut self, gains: &ControllerGains, error: f64, dt: f64) {
        self.target = 0.0;
        self.target_derivative = 0.0;

        if self.reset_filter {
            self.reset_filter = false;
            self.error = error;
            self.derivative = 0.0;
            return;
        }

        let error_last = self.error;
        self.error += lowpass_alpha(dt, gains.filt_e_hz) * (error - self.error);

        if dt > 0.0 {
            let derivative = (self.error - error_last) / dt;
            self.derivative += lowpass_alpha(dt, gains.filt_d_hz) * (derivative - self.derivative);
        }
    }

    /// Accumulate `ki * error * dt` into the integrator.
    ///
    /// While `limit` is set the integrator may only move toward zero and
    /// stops there. An externally written value is held for this cycle.
    /// Returns whether the integrator had been written externally.
    fn integrate(&mut self, gains: &ControllerGains, dt: f64, limit: bool) -> bool {
        let was_set = self.i_set;
        self.i_set = false;

        if was_set {
            // hold the value the caller wrote
        } else if gains.ki == 0.0 {
            self.integrator = 0.0;
        } else if dt > 0.0 {
            let delta = self.error * gains.ki * dt;
            self.integrator = if !limit {
                self.integrator + delta
            } else if opposes(self.integrator, self.error) {
                let next = self.integrator + delta;
                if next.signum() == self.integrator.signum() { next } else { 0.0 }
            } else {
                self.integrator
            };
        }

        self.integrator = constrain(self.integrator, gains.imax);
        was_set
    }
}

/// A non-finite sample period is treated like a zero one.
fn usable_dt(dt: f64) -> f64 {
    if dt.is_finite() { dt } else { 0.0 }
}

/// True when `error` pushes `integrator` back toward zero.
fn opposes(integrator: f64, error: f64) -> bool {
    (integrator > 0.0 && error < 0.0) || (integrator < 0.0 && error > 0.0)
}

/// Symmetric clamp that tolerates a negative limit.
fn constrain(value: f64, limit: f64) -> f64 {
    let limit = limit.abs();
    value.max(-limit).min(limit)
}

/// Target feed-forward and target-derivative feed-forward contributions.
pub fn feed_forward(gains: &ControllerGains, state: &PidState) -> (f64, f64) {
    (state.target * gains.kff, state.target_derivative * gains.kdff)
}

/// Scale P and D together so that `|P + D| <= pd_max`. A zero limit is off.
pub fn limit_pd(p: f64, d: f64, pd_max: f64) -> (f64, f64, bool) {
    let sum = (p + d).abs();
    if pd_max > 0.0 && sum > pd_max {
        let scale = pd_max / sum;
        (p * scale, d * scale, true)
    } else {
        (p, d, false)
    }
}

// ---------------------------------------------------------------------------
// Filtered PID with slew-rate gain limiting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Pid {
    gains: ControllerGains,
    state: PidState,
    slew_limiter: SlewLimiter,
    slew_limit_scale: i8,
    info: ControlInfo,
}

impl Pid {
    pub fn new(gains: ControllerGains) -> Self {
        Self {
            slew_limiter: SlewLimiter::new(gains.slew_rate_max, gains.slew_rate_tau),
            gains,
            state: PidState::default(),
            slew_limit_scale: 1,
            info: ControlInfo::default(),
        }
    }

    /// Run one control cycle and return P + I + D + FF + DFF.
    ///
    /// `limit` reports that the actuator this loop drives is saturated.
    /// `boost` scales P and D for this call only.
    pub fn update_all(&mut self, target: f64, measurement: f64, dt: f64, limit: bool, boost: f64) -> f64 {
        if !target.is_finite() || !measurement.is_finite() {
            debug!(target, measurement, "ignoring non-finite PID input");
            return 0.0;
        }

        let dt = usable_dt(dt);
        self.state.filter_inputs(&self.gains, target, measurement, dt);
        self.finish_update(measurement, dt, limit, boost)
    }

    /// Update from a precomputed error with the target held at zero.
    ///
    /// Target and actual in the diagnostics keep whatever was last set
    /// through [`Pid::set_target_rate`] / [`Pid::set_actual_rate`].
    pub fn update_error(&mut self, error: f64, dt: f64, limit: bool) -> f64 {
        if !error.is_finite() {
            debug!(error, "ignoring non-finite PID error");
            return 0.0;
        }

        let dt = usable_dt(dt);
        let (target, actual) = (self.info.target, self.info.actual);
        self.state.filter_error(&self.gains, error, dt);
        let out = self.finish_update(-error, dt, limit, 1.0);
        self.info.target = target;
        self.info.actual = actual;
        out
    }

    /// Integrator, slew-modified P and D, PD clamp and feed-forward on the
    /// already filtered state.
    fn finish_update(&mut self, measurement: f64, dt: f64, limit: bool, boost: f64) -> f64 {
        let i_term_set = self.state.integrate(&self.gains, dt, limit);

        let mut p = self.state.error * self.gains.kp;
        let mut d = self.state.derivative * self.gains.kd;

        // The limiter watches the P+D this loop last put out
        self.slew_limiter.set_slew_rate_max(self.gains.slew_rate_max);
        self.slew_limiter.set_slew_rate_tau(self.gains.slew_rate_tau);
        let d_mod = self
            .slew_limiter
            .modifier((self.info.p + self.info.d) * f64::from(self.slew_limit_scale), dt);

        p *= d_mod * boost;
        d *= d_mod * boost;

        let (p, d, pd_limit) = limit_pd(p, d, self.gains.pd_max);
        if pd_limit {
            trace!(pd_max = self.gains.pd_max, "P+D limited");
        }

        let (ff, dff) = feed_forward(&self.gains, &self.state);

        self.info = ControlInfo {
            target: self.state.target,
            actual: measurement,
            error: self.state.error,
            p,
            i: self.state.integrator,
            d,
            ff,
            dff,
            d_mod,
            slew_rate: self.slew_limiter.slew_rate(),
            limit,
            pd_limit,
            i_term_set,
        };

        self.info.total()
    }

    // -- results ------------------------------------------------------------

    pub fn p(&self) -> f64 {
        self.state.error * self.gains.kp
    }

    pub fn i(&self) -> f64 {
        self.state.integrator
    }

    pub fn d(&self) -> f64 {
        self.state.derivative * self.gains.kd
    }

    pub fn ff(&self) -> f64 {
        let (ff, dff) = feed_forward(&self.gains, &self.state);
        ff + dff
    }

    pub fn info(&self) -> &ControlInfo {
        &self.info
    }

    pub fn state(&self) -> &PidState {
        &self.state
    }

    /// Smoothed P+D slew rate, reported even with the limit disabled.
    pub fn slew_rate(&self) -> f64 {
        self.slew_limiter.slew_rate()
    }

    // -- integrator ---------------------------------------------------------

    pub fn reset_i(&mut self) {
        debug!("integrator reset");
        self.state.i_set = true;
        self.state.integrator = 0.0;
    }

    /// Overwrite the integrator, clamped to `imax`. The value is held
    /// through the next update.
    pub fn set_integrator(&mut self, integrator: f64) {
        trace!(integrator, "integrator set");
        self.state.i_set = true;
        self.state.integrator = constrain(integrator, self.gains.imax);
    }

    /// Move the integrator toward `integrator` with first-order lag `time_constant`.
    pub fn relax_integrator(&mut self, integrator: f64, dt: f64, time_constant: f64) {
        let integrator = constrain(integrator, self.gains.imax);
        if dt > 0.0 {
            self.state.i_set = true;
            self.state.integrator += (integrator - self.state.integrator) * (dt / (dt + time_constant));
        }
    }

    // -- filters ------------------------------------------------------------

    /// Re-seed the target and error filters from the next sample.
    pub fn reset_filter(&mut self) {
        debug!("PID filters will re-seed on next update");
        self.state.reset_filter = true;
    }

    pub fn filt_t_alpha(&self, dt: f64) -> f64 {
        lowpass_alpha(dt, self.gains.filt_t_hz)
    }

    pub fn filt_e_alpha(&self, dt: f64) -> f64 {
        lowpass_alpha(dt, self.gains.filt_e_hz)
    }

    pub fn filt_d_alpha(&self, dt: f64) -> f64 {
        lowpass_alpha(dt, self.gains.filt_d_hz)
    }

    // -- tuning -------------------------------------------------------------

    pub fn gains(&self) -> &ControllerGains {
        &self.gains
    }

    /// Direct access for live tuning; changes apply from the next update.
    pub fn gains_mut(&mut self) -> &mut ControllerGains {
        &mut self.gains
    }

    pub fn set_kp(&mut self, v: f64) {
        self.gains.kp = v;
    }

    pub fn set_ki(&mut self, v: f64) {
        self.gains.ki = v;
    }

    pub fn set_kd(&mut self, v: f64) {
        self.gains.kd = v;
    }

    pub fn set_ff(&mut self, v: f64) {
        self.gains.kff = v;
    }

    pub fn set_kdff(&mut self, v: f64) {
        self.gains.kdff = v;
    }

    pub fn set_imax(&mut self, v: f64) {
        self.gains.imax = v.abs();
    }

    pub fn set_pd_max(&mut self, v: f64) {
        self.gains.pd_max = v.abs();
    }

    pub fn set_filt_t_hz(&mut self, v: f64) {
        self.gains.filt_t_hz = v.abs();
    }

    pub fn set_filt_e_hz(&mut self, v: f64) {
        self.gains.filt_e_hz = v.abs();
    }

    pub fn set_filt_d_hz(&mut self, v: f64) {
        self.gains.filt_d_hz = v.abs();
    }

    pub fn set_slew_limit(&mut self, v: f64) {
        self.gains.slew_rate_max = v.abs();
    }

    pub fn set_slew_limit_scale(&mut self, scale: i8) {
        self.slew_limit_scale = scale;
    }

    // -- logging overrides --------------------------------------------------

    pub fn set_target_rate(&mut self, target: f64) {
        self.info.target = target;
    }

    pub fn set_actual_rate(&mut self, actual: f64) {
        self.info.actual = actual;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unfiltered(kp: f64, ki: f64, kd: f64) -> ControllerGains {
        ControllerGains {
            kp,
            ki,
            kd,
            imax: 10.0,
            filt_d_hz: 0.0,
            ..ControllerGains::default()
        }
    }

    #[test]
    fn pure_proportional() {
        let mut pid = Pid::new(unfiltered(1.0, 0.0, 0.0));
        let out = pid.update_all(10.0, 0.0, 0.1, false, 1.0);
        assert!((out - 10.0).abs() < 1e-12, "Pure P should output Kp * error, got {}", out);
        assert!((pid.info().p - 10.0).abs() < 1e-12);
        assert_eq!(pid.info().d_mod, 1.0);
    }

    #[test]
    fn preset_integrator_survives_zero_error() {
        let mut pid = Pid::new(unfiltered(0.0, 1.0, 0.0));
        pid.set_integrator(5.0);
        let out = pid.update_all(0.0, 0.0, 0.1, false, 1.0);
        assert!((pid.i() - 5.0).abs() < 1e-12);
        assert!((out - 5.0).abs() < 1e-12);
        assert!(pid.info().i_term_set);
    }

    #[test]
    fn external_set_holds_for_one_cycle() {
        let mut pid = Pid::new(unfiltered(0.0, 1.0, 0.0));
        pid.set_integrator(2.0);
        pid.update_all(1.0, 0.0, 0.1, false, 1.0);
        assert!((pid.i() - 2.0).abs() < 1e-12, "Held on the cycle after set");
        pid.update_all(1.0, 0.0, 0.1, false, 1.0);
        assert!((pid.i() - 2.1).abs() < 1e-12, "Accumulates again afterwards");
        assert!(!pid.info().i_term_set);
    }

    #[test]
    fn integral_accumulates() {
        let mut pid = Pid::new(unfiltered(0.0, 1.0, 0.0));
        pid.update_all(1.0, 0.0, 0.1, false, 1.0);
        let out = pid.update_all(1.0, 0.0, 0.1, false, 1.0);
        assert!((out - 0.2).abs() < 1e-12, "Integral should accumulate, got {}", out);
    }

    #[test]
    fn integrator_respects_imax() {
        let mut gains = unfiltered(0.0, 5.0, 0.0);
        gains.imax = 0.5;
        let mut pid = Pid::new(gains);
        for i in 0..200 {
            let target = if (i / 40) % 2 == 0 { 30.0 } else { -30.0 };
            pid.update_all(target, 0.0, 0.02, false, 1.0);
            assert!(pid.i().abs() <= 0.5 + 1e-12, "|I| = {}", pid.i());
        }
        pid.set_integrator(99.0);
        assert_eq!(pid.i(), 0.5);
    }

    #[test]
    fn limit_flag_only_shrinks_integrator() {
        let mut pid = Pid::new(unfiltered(0.0, 1.0, 0.0));
        for _ in 0..10 {
            pid.update_all(2.0, 0.0, 0.1, false, 1.0);
        }
        let wound = pid.i();
        assert!(wound > 0.0);

        // same-sign error under saturation: frozen
        let mut last = wound;
        for _ in 0..10 {
            pid.update_all(2.0, 0.0, 0.1, true, 1.0);
            assert!(pid.i().abs() <= last.abs());
            last = pid.i();
        }

        // opposing error under saturation: shrinks, stops at zero
        for _ in 0..50 {
            pid.update_all(-3.0, 0.0, 0.1, true, 1.0);
            assert!(pid.i().abs() <= last.abs(), "Magnitude grew: {} -> {}", last, pid.i());
            assert!(pid.i() >= 0.0, "Should not cross zero under saturation");
            last = pid.i();
        }
        assert_eq!(pid.i(), 0.0);
        assert!(pid.info().limit);
    }

    #[test]
    fn zero_ki_clears_integrator() {
        let mut pid = Pid::new(unfiltered(1.0, 1.0, 0.0));
        pid.update_all(1.0, 0.0, 0.1, false, 1.0);
        pid.update_all(1.0, 0.0, 0.1, false, 1.0);
        assert!(pid.i() > 0.0);
        pid.set_ki(0.0);
        pid.update_all(1.0, 0.0, 0.1, false, 1.0);
        assert_eq!(pid.i(), 0.0);
    }

    #[test]
    fn non_positive_dt_freezes_rate_terms() {
        let mut pid = Pid::new(unfiltered(1.0, 1.0, 1.0));
        pid.update_all(0.0, 0.0, 0.1, false, 1.0);
        pid.update_all(1.0, 0.0, 0.1, false, 1.0);
        let before = *pid.state();
        let out = pid.update_all(4.0, 0.0, 0.0, false, 1.0);
        assert!(out.is_finite());
        assert_eq!(pid.state().integrator, before.integrator);
        assert_eq!(pid.state().derivative, before.derivative);
        assert_eq!(pid.info().d_mod, 1.0);
        let out = pid.update_all(4.0, 0.0, -0.1, false, 1.0);
        assert!(out.is_finite());
    }

    #[test]
    fn non_finite_input_is_rejected() {
        let mut pid = Pid::new(unfiltered(1.0, 1.0, 0.0));
        pid.update_all(1.0, 0.0, 0.1, false, 1.0);
        let before = *pid.state();
        assert_eq!(pid.update_all(f64::NAN, 0.0, 0.1, false, 1.0), 0.0);
        assert_eq!(pid.update_all(1.0, f64::INFINITY, 0.1, false, 1.0), 0.0);
        assert_eq!(*pid.state(), before);
    }

    #[test]
    fn derivative_on_error_change() {
        let mut pid = Pid::new(unfiltered(0.0, 0.0, 1.0));
        pid.update_all(0.0, 0.0, 0.1, false, 1.0);
        let out = pid.update_all(1.0, 0.0, 0.1, false, 1.0);
        assert!((out - 10.0).abs() < 1e-9, "D of a unit step over 0.1 s, got {}", out);
    }

    #[test]
    fn target_filter_lags_and_reset_reseeds() {
        let gains = ControllerGains { kp: 1.0, filt_t_hz: 1.0, filt_d_hz: 0.0, ..Default::default() };
        let mut pid = Pid::new(gains);
        pid.update_all(0.0, 0.0, 0.01, false, 1.0);
        let lagged = pid.update_all(10.0, 0.0, 0.01, false, 1.0);
        assert!(lagged > 0.0 && lagged < 1.0, "Filtered step should lag, got {}", lagged);

        pid.reset_filter();
        let seeded = pid.update_all(10.0, 0.0, 0.01, false, 1.0);
        assert!((seeded - 10.0).abs() < 1e-12);
        assert_eq!(pid.state().derivative, 0.0);
    }

    #[test]
    fn feed_forward_terms() {
        let gains = ControllerGains { kff: 0.5, kdff: 0.1, filt_d_hz: 0.0, ..Default::default() };
        let mut pid = Pid::new(gains);
        pid.update_all(2.0, 2.0, 0.1, false, 1.0);
        assert!((pid.info().ff - 1.0).abs() < 1e-12);
        assert_eq!(pid.info().dff, 0.0);
        let out = pid.update_all(3.0, 3.0, 0.1, false, 1.0);
        assert!((pid.info().dff - 1.0).abs() < 1e-9, "dff = 0.1 * 10/s");
        assert!((out - 2.5).abs() < 1e-9);
        assert!((pid.ff() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn pd_max_scales_both_terms() {
        let (p, d, limited) = limit_pd(3.0, 1.0, 2.0);
        assert!(limited);
        assert!((p - 1.5).abs() < 1e-12 && (d - 0.5).abs() < 1e-12);
        assert_eq!(limit_pd(3.0, 1.0, 0.0), (3.0, 1.0, false));

        let mut pid = Pid::new(ControllerGains { pd_max: 2.0, ..unfiltered(1.0, 0.0, 0.0) });
        let out = pid.update_all(5.0, 0.0, 0.1, false, 1.0);
        assert!((out - 2.0).abs() < 1e-12);
        assert!(pid.info().pd_limit);
    }

    #[test]
    fn boost_scales_p_and_d_only() {
        let mut gains = unfiltered(1.0, 1.0, 0.0);
        gains.kff = 1.0;
        let mut pid = Pid::new(gains);
        pid.set_integrator(0.5);
        let out = pid.update_all(2.0, 1.0, 0.1, false, 2.0);
        // P = 1*1*2, I held at 0.5, FF = 2
        assert!((out - 4.5).abs() < 1e-12, "got {}", out);
    }

    #[test]
    fn relax_and_reset_integrator() {
        let mut pid = Pid::new(unfiltered(0.0, 1.0, 0.0));
        pid.relax_integrator(4.0, 0.1, 0.1);
        assert!((pid.i() - 2.0).abs() < 1e-12);
        pid.relax_integrator(4.0, 0.0, 0.1);
        assert!((pid.i() - 2.0).abs() < 1e-12, "dt = 0 leaves it alone");
        pid.relax_integrator(50.0, 1e6, 0.1);
        assert!((pid.i() - 10.0).abs() < 1e-6, "Target is clamped to imax");
        pid.reset_i();
        assert_eq!(pid.i(), 0.0);
    }

    #[test]
    fn update_error_targets_zero() {
        let mut pid = Pid::new(unfiltered(2.0, 0.0, 0.0));
        pid.set_target_rate(7.0);
        let out = pid.update_error(1.5, 0.1, false);
        assert!((out - 3.0).abs() < 1e-12);
        assert_eq!(pid.info().target, 7.0);
    }

    #[test]
    fn update_error_ignores_filtered_target() {
        let gains = ControllerGains { kp: 1.0, kff: 0.5, filt_t_hz: 1.0, filt_d_hz: 0.0, ..Default::default() };
        let mut pid = Pid::new(gains);
        for _ in 0..50 {
            pid.update_all(10.0, 0.0, 0.02, false, 1.0);
        }
        assert!(pid.state().target > 1.0, "Target filter should have moved");

        let out = pid.update_error(1.5, 0.02, false);
        assert!((out - 1.5).abs() < 1e-12, "Only Kp * error expected, got {}", out);
        assert_eq!(pid.state().target, 0.0);
        assert_eq!(pid.state().target_derivative, 0.0);
        assert_eq!(pid.info().ff, 0.0);
    }

    #[test]
    fn non_finite_dt_is_treated_as_zero() {
        let gains = ControllerGains { kp: 1.0, ki: 1.0, imax: 10.0, filt_t_hz: 3.0, ..Default::default() };
        let mut pid = Pid::new(gains);
        pid.update_all(1.0, 0.0, 0.02, false, 1.0);
        let integrator = pid.i();

        for dt in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let out = pid.update_all(1.0, 0.0, dt, false, 1.0);
            assert!(out.is_finite(), "dt = {} gave {}", dt, out);
            assert_eq!(pid.i(), integrator, "Integrator frozen for dt = {}", dt);
        }

        let out = pid.update_all(1.0, 0.0, 0.02, false, 1.0);
        assert!(out.is_finite());
        assert!(pid.state().target.is_finite() && pid.state().error.is_finite());
        assert!((pid.state().target - 1.0).abs() < 1e-12);

        assert!(pid.update_error(0.5, f64::NAN, false).is_finite());
        assert_eq!(pid.update_error(f64::NAN, 0.02, false), 0.0);
    }

    #[test]
    fn slew_limiter_reduces_gain_in_oscillation() {
        let gains = ControllerGains {
            kp: 2.0,
            slew_rate_max: 5.0,
            filt_d_hz: 0.0,
            ..Default::default()
        };
        let mut pid = Pid::new(gains);
        let dt = 0.01;
        let mut min_mod = 1.0_f64;
        for i in 0..400 {
            let t = i as f64 * dt;
            let measurement = 3.0 * (std::f64::consts::TAU * 2.0 * t).sin();
            pid.update_all(0.0, measurement, dt, false, 1.0);
            let m = pid.info().d_mod;
            assert!(m > 0.0 && m <= 1.0);
            min_mod = min_mod.min(m);
        }
        assert!(min_mod < 0.5, "Expected gain reduction, min modifier {}", min_mod);
        assert!(pid.slew_rate() > 0.0);
    }
}
