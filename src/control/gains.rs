use std::fs;
use std::path::Path;

use eyre::{eyre, Result, WrapErr};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Tunable PID parameters
// ---------------------------------------------------------------------------

/// Default derivative filter cutoff, Hz.
pub const FILT_D_HZ_DEFAULT: f64 = 20.0;
/// Default slew-rate time constant, s.
pub const SLEW_RATE_TAU_DEFAULT: f64 = 1.0;

/// Live-tunable gains, clamps and filter settings for one PID axis.
///
/// A cutoff of 0 disables that filter; a non-positive `slew_rate_max`
/// disables slew-rate gain reduction; a zero `pd_max` disables the P+D clamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub kff: f64,
    pub kdff: f64,
    pub imax: f64,          // integrator magnitude limit
    pub pd_max: f64,        // combined P+D magnitude limit
    pub filt_t_hz: f64,     // target filter cutoff
    pub filt_e_hz: f64,     // error filter cutoff
    pub filt_d_hz: f64,     // derivative filter cutoff
    pub slew_rate_max: f64, // output units per second
    pub slew_rate_tau: f64, // s
}

impl Default for ControllerGains {
    fn default() -> Self {
        Self {
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            kff: 0.0,
            kdff: 0.0,
            imax: 0.0,
            pd_max: 0.0,
            filt_t_hz: 0.0,
            filt_e_hz: 0.0,
            filt_d_hz: FILT_D_HZ_DEFAULT,
            slew_rate_max: 0.0,
            slew_rate_tau: SLEW_RATE_TAU_DEFAULT,
        }
    }
}

impl ControllerGains {
    /// Plain P/I/D gains with every other setting at its default.
    pub fn pid(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd, ..Self::default() }
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .wrap_err_with(|| format!("reading gains from {}", path.display()))?;
        let gains: ControllerGains = toml::from_str(&content)
            .wrap_err_with(|| format!("parsing gains in {}", path.display()))?;
        gains.validate()?;
        Ok(gains)
    }

    pub fn validate(&self) -> Result<()> {
        let named = [
            ("kp", self.kp),
            ("ki", self.ki),
            ("kd", self.kd),
            ("kff", self.kff),
            ("kdff", self.kdff),
            ("imax", self.imax),
            ("pd_max", self.pd_max),
            ("filt_t_hz", self.filt_t_hz),
            ("filt_e_hz", self.filt_e_hz),
            ("filt_d_hz", self.filt_d_hz),
            ("slew_rate_max", self.slew_rate_max),
            ("slew_rate_tau", self.slew_rate_tau),
        ];
        if let Some((name, value)) = named.iter().find(|(_, v)| !v.is_finite()) {
            return Err(eyre!("{} must be finite, got {}", name, value));
        }

        for (name, value) in [
            ("imax", self.imax),
            ("pd_max", self.pd_max),
            ("filt_t_hz", self.filt_t_hz),
            ("filt_e_hz", self.filt_e_hz),
            ("filt_d_hz", self.filt_d_hz),
        ] {
            if value < 0.0 {
                return Err(eyre!("{} must not be negative, got {}", name, value));
            }
        }

        if self.slew_rate_tau <= 0.0 {
            return Err(eyre!(
                "slew_rate_tau must be positive, got {}",
                self.slew_rate_tau
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ControllerGains::default().validate().is_ok());
        assert!(ControllerGains::pid(1.0, 0.5, 0.01).validate().is_ok());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let gains: ControllerGains = toml::from_str(
            r#"
            kp = 0.08
            ki = 0.15
            imax = 0.666
            slew_rate_max = 150.0
            "#,
        )
        .unwrap();
        assert_eq!(gains.kp, 0.08);
        assert_eq!(gains.imax, 0.666);
        assert_eq!(gains.filt_d_hz, FILT_D_HZ_DEFAULT);
        assert_eq!(gains.slew_rate_tau, SLEW_RATE_TAU_DEFAULT);
    }

    #[test]
    fn rejects_bad_values() {
        let neg_imax = ControllerGains { imax: -1.0, ..Default::default() };
        assert!(neg_imax.validate().is_err());

        let nan_gain = ControllerGains { kd: f64::NAN, ..Default::default() };
        let err = nan_gain.validate().unwrap_err();
        assert!(err.to_string().contains("kd"));

        let zero_tau = ControllerGains { slew_rate_tau: 0.0, ..Default::default() };
        assert!(zero_tau.validate().is_err());
    }

    #[test]
    fn load_missing_file_fails() {
        assert!(ControllerGains::load_from_file("/nonexistent/gains.toml").is_err());
    }
}
