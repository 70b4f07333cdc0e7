use super::info::ControlInfo;
use super::pitch::FlightContext;

/// Trait for single-axis attitude controllers.
///
/// Implement this to plug a custom axis law into the closed-loop runner.
pub trait AxisController {
    /// Compute the actuator command (centidegrees of deflection) for a raw
    /// attitude demand (centidegrees) given the current flight context.
    fn control(&mut self, demand_cd: f64, ctx: &FlightContext, dt: f64) -> f64;

    /// Reset controller internal state (integrators, filters).
    fn reset(&mut self) {}

    /// Diagnostics of the most recent cycle.
    fn info(&self) -> ControlInfo {
        ControlInfo::default()
    }

    /// Human-readable name for logging/display.
    fn name(&self) -> &str {
        "unnamed"
    }
}
