use std::io::{self, Write};

use serde::Serialize;

use crate::sim::Sample;

/// Step-response figures of merit.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseSummary {
    pub target_deg: f64,
    pub overshoot_pct: f64,
    #[serde(rename = "rise_time_s")]
    pub rise_time: Option<f64>, // s, 10% -> 90% of the step; None if never reached
    #[serde(rename = "settling_time_s")]
    pub settling_time: f64, // s after the step, last exit from a 5% band
    pub final_error_deg: f64,
    pub max_servo_rate_dps: f64,
    pub min_d_mod: f64,
}

impl ResponseSummary {
    /// Compute summary from a step response that starts at zero demand.
    pub fn from_samples(samples: &[Sample]) -> Self {
        let target_deg = samples.last().map(|s| s.demand_cd * 0.01).unwrap_or(0.0);
        let step_time = samples
            .iter()
            .find(|s| s.demand_cd != 0.0)
            .map(|s| s.time)
            .unwrap_or(0.0);

        let peak = samples
            .iter()
            .map(|s| s.pitch_deg * target_deg.signum())
            .fold(0.0_f64, f64::max);
        let overshoot_pct = if target_deg != 0.0 {
            ((peak - target_deg.abs()) / target_deg.abs() * 100.0).max(0.0)
        } else {
            0.0
        };

        let crossing = |frac: f64| {
            samples
                .iter()
                .find(|s| s.pitch_deg * target_deg.signum() >= frac * target_deg.abs())
                .map(|s| s.time)
        };
        let rise_time = match (crossing(0.1), crossing(0.9)) {
            (Some(t10), Some(t90)) => Some(t90 - t10),
            _ => None,
        };

        let band = 0.05 * target_deg.abs();
        let settling_time = samples
            .iter()
            .rev()
            .find(|s| (s.pitch_deg - target_deg).abs() > band)
            .map(|s| s.time - step_time)
            .unwrap_or(0.0)
            .max(0.0);

        let max_servo_rate_dps = samples
            .windows(2)
            .map(|w| {
                let dt = w[1].time - w[0].time;
                if dt > 0.0 {
                    (w[1].elevator_deg - w[0].elevator_deg).abs() / dt
                } else {
                    0.0
                }
            })
            .fold(0.0_f64, f64::max);

        let min_d_mod = samples.iter().map(|s| s.info.d_mod).fold(1.0_f64, f64::min);

        ResponseSummary {
            target_deg,
            overshoot_pct,
            rise_time,
            settling_time,
            final_error_deg: samples.last().map(|s| s.pitch_deg - target_deg).unwrap_or(0.0),
            max_servo_rate_dps,
            min_d_mod,
        }
    }
}

#[derive(Serialize)]
struct SummaryDocument<'a> {
    run: &'a str,
    response: &'a ResponseSummary,
}

/// Write a response summary as JSON to a writer.
pub fn write_summary<W: Write>(writer: &mut W, name: &str, summary: &ResponseSummary) -> io::Result<()> {
    let document = SummaryDocument { run: name, response: summary };
    serde_json::to_writer_pretty(&mut *writer, &document)?;
    writeln!(writer)?;
    Ok(())
}

/// Write a response summary JSON to a file.
pub fn write_summary_file(path: &str, name: &str, summary: &ResponseSummary) -> io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    write_summary(&mut file, name, summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlInfo;

    fn sample(time: f64, demand_cd: f64, pitch_deg: f64, d_mod: f64) -> Sample {
        Sample {
            time,
            demand_cd,
            pitch_deg,
            rate_dps: 0.0,
            command_cd: 0.0,
            elevator_deg: pitch_deg * 0.1,
            info: ControlInfo { d_mod, ..ControlInfo::default() },
        }
    }

    fn simple_response() -> Vec<Sample> {
        vec![
            sample(0.0, 0.0, 0.0, 1.0),
            sample(1.0, 1000.0, 0.0, 1.0),
            sample(2.0, 1000.0, 5.0, 0.8),
            sample(3.0, 1000.0, 12.0, 0.6),
            sample(4.0, 1000.0, 10.2, 0.9),
            sample(5.0, 1000.0, 10.0, 1.0),
        ]
    }

    #[test]
    fn summary_computes_overshoot() {
        let s = ResponseSummary::from_samples(&simple_response());
        assert!((s.target_deg - 10.0).abs() < 1e-9);
        assert!((s.overshoot_pct - 20.0).abs() < 1e-9);
        assert!((s.settling_time - 2.0).abs() < 1e-9, "Last out of band at t=3");
        assert!((s.min_d_mod - 0.6).abs() < 1e-12);
        assert!(s.final_error_deg.abs() < 1e-9);
    }

    #[test]
    fn json_output_is_valid() {
        let summary = ResponseSummary::from_samples(&simple_response());
        let mut buf = Vec::new();
        write_summary(&mut buf, "Test", &summary).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(json["run"], "Test");
        let response = &json["response"];
        assert!((response["overshoot_pct"].as_f64().unwrap() - 20.0).abs() < 1e-9);
        assert!(response["rise_time_s"].as_f64().unwrap() > 0.0);
        assert!(response["min_d_mod"].is_number());
    }

    #[test]
    fn response_that_never_rises_has_no_rise_time() {
        let samples = vec![sample(0.0, 1000.0, 0.0, 1.0), sample(1.0, 1000.0, 0.0, 1.0)];
        let summary = ResponseSummary::from_samples(&samples);
        assert_eq!(summary.rise_time, None);

        let mut buf = Vec::new();
        write_summary(&mut buf, "Flat", &summary).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert!(json["response"]["rise_time_s"].is_null());
        assert!((json["response"]["final_error_deg"].as_f64().unwrap() + 10.0).abs() < 1e-9);
    }
}
