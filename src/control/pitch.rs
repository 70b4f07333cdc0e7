use std::fs;
use std::path::Path;

use eyre::{eyre, Result, WrapErr};
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::filter::ExponentialSmoother;
use super::controller::AxisController;
use super::gains::ControllerGains;
use super::info::ControlInfo;
use super::pid::Pid;

pub const GRAVITY_MSS: f64 = 9.80665;

/// Per-cycle integrator bleed while the surfaces have little authority
/// (about 95% over 2 s at 400 Hz).
pub const I_DECAY: f64 = 0.995;
/// Output magnitude, in degrees, above which the integrator stops growing.
const I_LIMIT_OUT_DEG: f64 = 45.0;
/// Elevator command limit, centidegrees.
const SERVO_LIMIT_CD: f64 = 4500.0;
/// Turn coordination is skipped above this pitch, deg.
const COORDINATION_PITCH_MAX_DEG: f64 = 70.0;
const TAU_MIN: f64 = 0.05;

// ---------------------------------------------------------------------------
// Pitch axis configuration
// ---------------------------------------------------------------------------

/// Pitch controller parameters. A partially specified `[rate]` table falls
/// back to [`ControllerGains::default`] for the missing keys, not to the
/// pitch defaults below.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchConfig {
    pub rate: ControllerGains, // inner rate loop, radians
    pub tau: f64,              // angle error to rate demand time constant, s
    pub max_rate_pos: f64,     // deg/s, 0 = unlimited
    pub max_rate_neg: f64,     // deg/s, 0 = unlimited
    pub roll_ff: f64,          // turn coordination gain
    pub roll_limit_deg: f64,
    pub airspeed_min: f64,     // m/s
    pub airspeed_max: f64,     // m/s
    pub scaling_speed: f64,    // m/s, airspeed where the speed scaler is 1
    pub demand_alpha: f64,     // pitch demand smoothing coefficient, 1 = off
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            rate: ControllerGains {
                kp: 0.04,
                ki: 0.15,
                kd: 0.0,
                kff: 0.345,
                kdff: 0.0,
                imax: 0.666,
                pd_max: 0.0,
                filt_t_hz: 3.0,
                filt_e_hz: 0.0,
                filt_d_hz: 12.0,
                slew_rate_max: 150.0,
                slew_rate_tau: 1.0,
            },
            tau: 0.5,
            max_rate_pos: 0.0,
            max_rate_neg: 0.0,
            roll_ff: 1.0,
            roll_limit_deg: 45.0,
            airspeed_min: 9.0,
            airspeed_max: 22.0,
            scaling_speed: 15.0,
            demand_alpha: 0.1,
        }
    }
}

impl PitchConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .wrap_err_with(|| format!("reading pitch config from {}", path.display()))?;
        let config: PitchConfig = toml::from_str(&content)
            .wrap_err_with(|| format!("parsing pitch config in {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.rate.validate().wrap_err("invalid rate gains")?;

        if !(self.airspeed_min > 0.0) || self.airspeed_max < self.airspeed_min {
            return Err(eyre!(
                "airspeed range [{}, {}] is invalid",
                self.airspeed_min,
                self.airspeed_max
            ));
        }
        if !(self.scaling_speed > 0.0) {
            return Err(eyre!("scaling_speed must be positive, got {}", self.scaling_speed));
        }
        if !(self.demand_alpha > 0.0 && self.demand_alpha <= 1.0) {
            return Err(eyre!("demand_alpha must be in (0, 1], got {}", self.demand_alpha));
        }
        if self.max_rate_pos < 0.0 || self.max_rate_neg < 0.0 {
            return Err(eyre!("pitch rate limits must not be negative"));
        }
        Ok(())
    }

    fn default_airspeed(&self) -> f64 {
        0.5 * (self.airspeed_min + self.airspeed_max)
    }
}

// ---------------------------------------------------------------------------
// Inputs supplied by the vehicle each cycle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct FlightContext {
    pub attitude: UnitQuaternion<f64>, // body -> earth
    pub gyro: Vector3<f64>,            // rad/s, body frame
    pub airspeed: Option<f64>,         // m/s equivalent airspeed, None if no estimate
    pub eas2tas: f64,
    pub disable_integrator: bool,
    pub ground_mode: bool,             // on the ground: drop D and half of P
    pub low_authority: bool,           // e.g. quadplane hover: bleed the integrator
}

impl FlightContext {
    /// Wings-level, non-rotating context at the given airspeed.
    pub fn level(airspeed: f64) -> Self {
        Self {
            attitude: UnitQuaternion::identity(),
            gyro: Vector3::zeros(),
            airspeed: Some(airspeed),
            eas2tas: 1.0,
            disable_integrator: false,
            ground_mode: false,
            low_authority: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Pitch controller: angle error -> rate demand -> elevator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PitchController {
    config: PitchConfig,
    rate_pid: Pid,
    demand_filter: ExponentialSmoother,
    info: ControlInfo,
    last_out: f64, // deg
    ff_scale: f64,
}

impl PitchController {
    pub fn new(config: PitchConfig) -> Self {
        Self {
            rate_pid: Pid::new(config.rate),
            demand_filter: ExponentialSmoother::new(config.demand_alpha),
            config,
            info: ControlInfo::default(),
            last_out: 0.0,
            ff_scale: 1.0,
        }
    }

    pub fn config(&self) -> &PitchConfig {
        &self.config
    }

    pub fn rate_pid(&self) -> &Pid {
        &self.rate_pid
    }

    pub fn rate_pid_mut(&mut self) -> &mut Pid {
        &mut self.rate_pid
    }

    /// Diagnostics in degrees, with target/actual as unscaled pitch rates.
    pub fn pid_info(&self) -> &ControlInfo {
        &self.info
    }

    /// One-cycle multiplier on the rate feed-forward; replaces any previous scale.
    pub fn set_ff_scale(&mut self, ff_scale: f64) {
        self.ff_scale = ff_scale;
    }

    pub fn reset_i(&mut self) {
        self.info.i = 0.0;
        self.rate_pid.reset_i();
    }

    /// Geometric integrator bleed used while surfaces lack authority.
    pub fn decay_i(&mut self) {
        self.info.i *= I_DECAY;
        let decayed = self.rate_pid.i() * I_DECAY;
        self.rate_pid.set_integrator(decayed);
    }

    /// Smooth the stick-derived pitch demand (centidegrees).
    pub fn shape_pitch_demand(&mut self, nav_pitch_cd: f64) -> f64 {
        self.demand_filter.apply(nav_pitch_cd)
    }

    /// Surface effectiveness scaler: 1 at `scaling_speed`, larger when slower.
    pub fn speed_scaler(&self, airspeed: Option<f64>) -> f64 {
        let c = &self.config;
        let scaler = match airspeed {
            Some(aspeed) if aspeed > 1e-4 => c.scaling_speed / aspeed,
            _ => 2.0,
        };
        let scale_min = 0.5_f64.min(c.scaling_speed / (2.0 * c.airspeed_max));
        let scale_max = 2.0_f64.max(c.scaling_speed / (0.7 * c.airspeed_min));
        scaler.max(scale_min).min(scale_max)
    }

    /// Pitch rate (deg/s) needed to hold attitude in a level coordinated
    /// turn, and whether the aircraft is inverted.
    pub fn coordination_rate_offset(&self, ctx: &FlightContext) -> (f64, bool) {
        let (roll, pitch, _) = ctx.attitude.euler_angles();

        let inverted = roll.abs() >= 90.0_f64.to_radians();
        let bank = if !inverted {
            roll.clamp(-80.0_f64.to_radians(), 80.0_f64.to_radians())
        } else if roll > 0.0 {
            roll.clamp(100.0_f64.to_radians(), 180.0_f64.to_radians())
        } else {
            roll.clamp(-180.0_f64.to_radians(), -100.0_f64.to_radians())
        };

        let aspeed = ctx.airspeed.unwrap_or_else(|| self.config.default_airspeed());
        let rate_offset = if pitch.to_degrees().abs() > COORDINATION_PITCH_MAX_DEG {
            0.0
        } else {
            let tas = (aspeed * ctx.eas2tas).max(self.config.airspeed_min.max(1.0));
            let turn_rate = GRAVITY_MSS / tas * bank.tan() * bank.sin();
            pitch.cos() * turn_rate.to_degrees().abs() * self.config.roll_ff
        };

        (if inverted { -rate_offset } else { rate_offset }, inverted)
    }

    /// Elevator command (centidegrees) for a desired pitch rate (deg/s).
    pub fn rate_out(&mut self, desired_rate: f64, scaler: f64, ctx: &FlightContext, dt: f64) -> f64 {
        let aspeed = ctx.airspeed.unwrap_or_else(|| self.config.default_airspeed());
        let rate_y = ctx.gyro.y;

        let underspeed = aspeed <= 0.5 * self.config.airspeed_min;
        let limit_i = underspeed || self.last_out.abs() >= I_LIMIT_OUT_DEG;
        let old_i = self.rate_pid.i();

        // P and I act on scaler^2; FF is scaled separately below
        let s2 = scaler * scaler;
        self.rate_pid
            .update_all(desired_rate.to_radians() * s2, rate_y * s2, dt, limit_i, 1.0);

        if underspeed {
            self.rate_pid.set_integrator(old_i);
        }

        let ff_div = scaler * ctx.eas2tas;
        let ff = if ff_div > 0.0 {
            (self.ff_scale * self.rate_pid.info().ff / ff_div).to_degrees()
        } else {
            0.0
        };
        self.ff_scale = 1.0;

        if ctx.disable_integrator {
            self.rate_pid.reset_i();
        }

        let deg = 1.0_f64.to_degrees();
        let mut info = *self.rate_pid.info();
        info.ff = ff;
        info.p *= deg;
        info.i *= deg;
        info.d *= deg;
        info.dff *= deg;
        info.target = desired_rate;
        info.actual = rate_y.to_degrees();

        let mut out = info.total();
        if ctx.ground_mode {
            out -= info.d + 0.5 * info.p;
        }

        self.last_out = out;
        self.info = info;

        (out * 100.0).clamp(-SERVO_LIMIT_CD, SERVO_LIMIT_CD)
    }

    /// Elevator command (centidegrees) for a pitch angle error (centidegrees).
    pub fn servo_out(&mut self, angle_err_cd: f64, scaler: f64, ctx: &FlightContext, dt: f64) -> f64 {
        let c = self.config;
        let tau = c.tau.max(TAU_MIN);
        let (rate_offset, inverted) = self.coordination_rate_offset(ctx);

        let mut desired_rate = angle_err_cd * 0.01 / tau;

        // Rate limits are tuned upright; inverted flight often needs more
        if !inverted {
            desired_rate += rate_offset;
            if c.max_rate_neg > 0.0 && desired_rate < -c.max_rate_neg {
                desired_rate = -c.max_rate_neg;
            } else if c.max_rate_pos > 0.0 && desired_rate > c.max_rate_pos {
                desired_rate = c.max_rate_pos;
            }
        } else {
            desired_rate = -desired_rate + rate_offset;
        }

        // Past the roll limit the elevator mostly yaws the aircraft; fade the
        // pitch demand out linearly, reaching zero at 90 deg of bank
        let (roll, pitch, _) = ctx.attitude.euler_angles();
        let mut roll_wrapped = roll.to_degrees().abs();
        if roll_wrapped > 90.0 {
            roll_wrapped = 180.0 - roll_wrapped;
        }
        let roll_limit_margin = (c.roll_limit_deg + 5.0).min(85.0);
        if roll_wrapped > roll_limit_margin && pitch.to_degrees().abs() < COORDINATION_PITCH_MAX_DEG {
            let roll_prop = (roll_wrapped - roll_limit_margin) / (90.0 - roll_limit_margin);
            desired_rate *= 1.0 - roll_prop;
        }

        self.rate_out(desired_rate, scaler, ctx, dt)
    }
}

impl Default for PitchController {
    fn default() -> Self {
        Self::new(PitchConfig::default())
    }
}

impl AxisController for PitchController {
    fn control(&mut self, demand_cd: f64, ctx: &FlightContext, dt: f64) -> f64 {
        if ctx.low_authority {
            self.decay_i();
        }
        let demand = self.shape_pitch_demand(demand_cd);
        let (_, pitch, _) = ctx.attitude.euler_angles();
        let angle_err_cd = demand - pitch.to_degrees() * 100.0;
        let scaler = self.speed_scaler(ctx.airspeed);
        self.servo_out(angle_err_cd, scaler, ctx, dt)
    }

    fn reset(&mut self) {
        debug!("pitch controller reset");
        self.reset_i();
        self.rate_pid.reset_filter();
        self.demand_filter.initialize(self.config.demand_alpha);
        self.last_out = 0.0;
    }

    fn info(&self) -> ControlInfo {
        self.info
    }

    fn name(&self) -> &str {
        "PitchController"
    }
}
