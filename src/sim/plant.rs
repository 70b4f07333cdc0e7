use std::fs;
use std::path::Path;

use eyre::{eyre, Result, WrapErr};
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Short-period pitch model with a rate-limited elevator servo
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Airframe {
    pub m_delta: f64,        // pitch acceleration per radian of elevator, 1/s^2
    pub m_q: f64,            // pitch rate damping, 1/s
    pub servo_rate_dps: f64, // elevator slew limit, deg/s
    pub servo_max_deg: f64,  // elevator travel
}

impl Default for Airframe {
    fn default() -> Self {
        Self {
            m_delta: 8.7,
            m_q: 3.0,
            servo_rate_dps: 60.0,
            servo_max_deg: 45.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub dt: f64,           // s
    pub duration: f64,     // s
    pub step_time: f64,    // s, when the pitch demand steps
    pub step_cd: f64,      // centidegrees
    pub airspeed: f64,     // m/s
    pub bank_deg: f64,     // held constant
    pub airframe: Airframe,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            dt: 0.02,       // 50 Hz attitude loop
            duration: 8.0,
            step_time: 1.0,
            step_cd: 1000.0,
            airspeed: 15.0,
            bank_deg: 0.0,
            airframe: Airframe::default(),
        }
    }
}

impl SimConfig {
    /// Load a scenario from TOML. Missing keys, and a missing
    /// `[airframe]` table, keep their defaults.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .wrap_err_with(|| format!("reading scenario from {}", path.display()))?;
        let config: SimConfig = toml::from_str(&content)
            .wrap_err_with(|| format!("parsing scenario in {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.dt > 0.0) || !self.dt.is_finite() {
            return Err(eyre!("dt must be positive, got {}", self.dt));
        }
        if !(self.duration >= 0.0) || !self.duration.is_finite() {
            return Err(eyre!("duration must be non-negative, got {}", self.duration));
        }
        if !(self.airspeed > 0.0) {
            return Err(eyre!("airspeed must be positive, got {}", self.airspeed));
        }
        let af = &self.airframe;
        if !(af.servo_rate_dps > 0.0) || !(af.servo_max_deg > 0.0) {
            return Err(eyre!(
                "servo rate and travel must be positive, got {} deg/s and {} deg",
                af.servo_rate_dps,
                af.servo_max_deg
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlantState {
    pub time: f64,
    pub theta: f64,     // pitch angle, rad
    pub q: f64,         // pitch rate, rad/s
    pub elevator: f64,  // achieved deflection, deg
}

impl PlantState {
    pub fn apply(&self, d: &Deriv, dt: f64) -> PlantState {
        PlantState {
            time: self.time + dt,
            theta: self.theta + d.dtheta * dt,
            q: self.q + d.dq * dt,
            elevator: self.elevator,
        }
    }

    pub fn attitude(&self, bank: f64) -> UnitQuaternion<f64> {
        UnitQuaternion::from_euler_angles(bank, self.theta, 0.0)
    }

    pub fn gyro(&self) -> Vector3<f64> {
        Vector3::new(0.0, self.q, 0.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Deriv {
    pub dtheta: f64,
    pub dq: f64,
}

/// Rigid-body pitch dynamics with the elevator held over the step.
pub fn derivatives(state: &PlantState, airframe: &Airframe) -> Deriv {
    Deriv {
        dtheta: state.q,
        dq: airframe.m_delta * state.elevator.to_radians() - airframe.m_q * state.q,
    }
}

/// Move the elevator toward `command_deg` no faster than the servo allows.
pub fn drive_servo(current_deg: f64, command_deg: f64, airframe: &Airframe, dt: f64) -> f64 {
    let command = command_deg.max(-airframe.servo_max_deg).min(airframe.servo_max_deg);
    let max_step = airframe.servo_rate_dps * dt;
    current_deg + (command - current_deg).max(-max_step).min(max_step)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn servo_is_rate_limited() {
        let af = Airframe::default();
        let next = drive_servo(0.0, 30.0, &af, 0.02);
        assert!((next - 1.2).abs() < 1e-12, "60 deg/s over 20 ms, got {}", next);
        let next = drive_servo(0.0, -0.5, &af, 0.02);
        assert!((next + 0.5).abs() < 1e-12);
    }

    #[test]
    fn servo_respects_travel() {
        let af = Airframe { servo_rate_dps: 1e6, ..Airframe::default() };
        assert_eq!(drive_servo(0.0, 90.0, &af, 0.02), af.servo_max_deg);
    }

    #[test]
    fn scenario_from_partial_toml() {
        let config: SimConfig = toml::from_str(
            r#"
            airspeed = 20.0
            bank_deg = 30.0

            [airframe]
            servo_rate_dps = 40.0
            "#,
        )
        .unwrap();
        assert_eq!(config.airspeed, 20.0);
        assert_eq!(config.bank_deg, 30.0);
        assert_eq!(config.airframe.servo_rate_dps, 40.0);
        assert_eq!(config.airframe.m_delta, Airframe::default().m_delta);
        assert_eq!(config.dt, SimConfig::default().dt);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn scenario_validation_rejects_bad_timing() {
        let config = SimConfig { dt: 0.0, ..SimConfig::default() };
        assert!(config.validate().is_err());
        let config = SimConfig { airspeed: -1.0, ..SimConfig::default() };
        assert!(config.validate().is_err());
        assert!(SimConfig::load_from_file("/nonexistent/scenario.toml").is_err());
    }

    #[test]
    fn elevator_drives_pitch_rate() {
        let af = Airframe::default();
        let s = PlantState { elevator: 5.0, ..Default::default() };
        let d = derivatives(&s, &af);
        assert!(d.dq > 0.0, "Positive elevator should pitch nose up");
        assert_eq!(d.dtheta, 0.0);
    }
}
