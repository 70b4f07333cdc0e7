use tracing::{debug, info};

use crate::control::{AxisController, ControlInfo, FlightContext, PitchController};
use super::integrator::rk4_step;
use super::plant::{drive_servo, PlantState, SimConfig};

/// One closed-loop cycle as seen by the controller.
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub time: f64,
    pub demand_cd: f64,
    pub pitch_deg: f64,
    pub rate_dps: f64,
    pub command_cd: f64,  // controller output
    pub elevator_deg: f64, // achieved after the servo slew limit
    pub info: ControlInfo,
}

// ---------------------------------------------------------------------------
// Closed-loop pitch step response
// ---------------------------------------------------------------------------

/// Fly a pitch-demand step with a custom controller.
pub fn simulate_with(config: &SimConfig, controller: &mut dyn AxisController) -> Vec<Sample> {
    let bank = config.bank_deg.to_radians();
    let steps = (config.duration / config.dt).max(0.0) as usize;
    let mut samples = Vec::with_capacity(steps.min(200_000));
    let mut state = PlantState::default();

    debug!(controller = controller.name(), steps, "starting pitch step response");

    for _ in 0..steps {
        let demand_cd = if state.time >= config.step_time { config.step_cd } else { 0.0 };

        let ctx = FlightContext {
            attitude: state.attitude(bank),
            gyro: state.gyro(),
            ..FlightContext::level(config.airspeed)
        };

        let command_cd = controller.control(demand_cd, &ctx, config.dt);
        state.elevator = drive_servo(state.elevator, command_cd * 0.01, &config.airframe, config.dt);

        samples.push(Sample {
            time: state.time,
            demand_cd,
            pitch_deg: state.theta.to_degrees(),
            rate_dps: state.q.to_degrees(),
            command_cd,
            elevator_deg: state.elevator,
            info: controller.info(),
        });

        state = rk4_step(&state, &config.airframe, config.dt);
    }

    if let Some(last) = samples.last() {
        info!(
            controller = controller.name(),
            final_pitch_deg = last.pitch_deg,
            "step response complete"
        );
    }

    samples
}

/// Simulate with a default-configured PitchController (convenience wrapper).
pub fn simulate(config: &SimConfig) -> Vec<Sample> {
    let mut controller = PitchController::default();
    simulate_with(config, &mut controller)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
