use eyre::{eyre, Result, WrapErr};
use tracing::info;

use slew_pid::control::{PitchConfig, PitchController};
use slew_pid::io::{csv, json};
use slew_pid::io::json::ResponseSummary;
use slew_pid::sim::{simulate_with, Sample, SimConfig};

struct Args {
    config: Option<String>,
    sim: Option<String>,
    csv: Option<String>,
    json: Option<String>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args { config: None, sim: None, csv: None, json: None };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--sim" => args.sim = Some(it.next().ok_or_else(|| eyre!("--sim needs a path"))?),
            "--csv" => args.csv = Some(it.next().ok_or_else(|| eyre!("--csv needs a path"))?),
            "--json" => args.json = Some(it.next().ok_or_else(|| eyre!("--json needs a path"))?),
            flag if flag.starts_with("--") => return Err(eyre!("unknown option {}", flag)),
            path => args.config = Some(path.to_string()),
        }
    }
    Ok(args)
}

fn main() -> Result<()> {
    let _guard = slew_pid::init_tracing();
    let args = parse_args()?;

    // -----------------------------------------------------------------------
    // Controller: default pitch tune, or one loaded from TOML
    // -----------------------------------------------------------------------
    let pitch = match &args.config {
        Some(path) => PitchConfig::load_from_file(path)?,
        None => PitchConfig::default(),
    };
    pitch.validate().wrap_err("pitch configuration")?;

    // Without a scenario file, a slow servo so an aggressive tune can outrun it
    let sim = match &args.sim {
        Some(path) => SimConfig::load_from_file(path)?,
        None => {
            let mut sim = SimConfig::default();
            sim.airframe.servo_rate_dps = 40.0;
            sim
        }
    };

    let mut unlimited = pitch;
    unlimited.rate.slew_rate_max = 0.0;

    // -----------------------------------------------------------------------
    // Run simulation
    // -----------------------------------------------------------------------
    let limited_run = simulate_with(&sim, &mut PitchController::new(pitch));
    let unlimited_run = simulate_with(&sim, &mut PitchController::new(unlimited));

    let limited = ResponseSummary::from_samples(&limited_run);
    let free = ResponseSummary::from_samples(&unlimited_run);

    // -----------------------------------------------------------------------
    // Print results
    // -----------------------------------------------------------------------
    println!();
    println!("====================================================================");
    println!("  PITCH STEP RESPONSE: {:.1} deg at {:.1} m/s", sim.step_cd * 0.01, sim.airspeed);
    println!("====================================================================");
    println!();
    println!("  Rate Loop");
    println!("  ──────────────────────────────────────────────────────────────────");
    println!(
        "  P:             {:>8.3}       I:            {:>8.3}",
        pitch.rate.kp, pitch.rate.ki
    );
    println!(
        "  D:             {:>8.4}       FF:           {:>8.3}",
        pitch.rate.kd, pitch.rate.kff
    );
    println!(
        "  IMAX:          {:>8.3}       SMAX:         {:>8.1}",
        pitch.rate.imax, pitch.rate.slew_rate_max
    );
    println!(
        "  Servo rate:    {:>8.1} deg/s Tau:          {:>8.2} s",
        sim.airframe.servo_rate_dps, pitch.tau
    );
    println!();

    println!("  Performance Summary          slew limited     unlimited");
    println!("  ──────────────────────────────────────────────────────────────────");
    print_row("Overshoot (%)", limited.overshoot_pct, free.overshoot_pct);
    print_row(
        "Rise time (s)",
        limited.rise_time.unwrap_or(f64::NAN),
        free.rise_time.unwrap_or(f64::NAN),
    );
    print_row("Settling (s)", limited.settling_time, free.settling_time);
    print_row("Final err (deg)", limited.final_error_deg, free.final_error_deg);
    print_row("Servo rate (dps)", limited.max_servo_rate_dps, free.max_servo_rate_dps);
    print_row("Min gain mod", limited.min_d_mod, free.min_d_mod);
    println!();

    print_trajectory(&limited_run);

    if let Some(path) = &args.csv {
        csv::write_response_file(path, &limited_run)
            .wrap_err_with(|| format!("writing {}", path))?;
        info!(path = %path, "wrote response CSV");
    }
    if let Some(path) = &args.json {
        json::write_summary_file(path, "slew limited", &limited)
            .wrap_err_with(|| format!("writing {}", path))?;
        info!(path = %path, "wrote response summary");
    }

    Ok(())
}

fn print_row(label: &str, limited: f64, unlimited: f64) {
    println!("  {:<24} {:>12.3} {:>13.3}", label, limited, unlimited);
}

fn print_trajectory(samples: &[Sample]) {
    println!("  Trajectory (slew limited)");
    println!("  ──────────────────────────────────────────────────────────────────");
    println!(
        "  {:>6}  {:>8}  {:>8}  {:>8}  {:>8}  {:>7}",
        "t (s)", "dem(deg)", "pitch", "q (dps)", "elev", "Dmod"
    );
    println!("  {}", "─".repeat(58));

    let sample_interval = (samples.len() / 30).max(1);
    for (i, s) in samples.iter().enumerate() {
        if i % sample_interval != 0 && i != samples.len() - 1 {
            continue;
        }
        println!(
            "  {:>6.2}  {:>8.2}  {:>8.2}  {:>8.2}  {:>8.2}  {:>7.3}",
            s.time,
            s.demand_cd * 0.01,
            s.pitch_deg,
            s.rate_dps,
            s.elevator_deg,
            s.info.d_mod
        );
    }

    println!();
    println!("====================================================================");
    println!();
}
