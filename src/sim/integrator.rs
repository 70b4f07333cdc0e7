use super::plant::{derivatives, Airframe, PlantState};

// ---------------------------------------------------------------------------
// RK4 integrator with the elevator held constant over the step
// ---------------------------------------------------------------------------

/// Single RK4 step of the pitch dynamics.
pub fn rk4_step(state: &PlantState, airframe: &Airframe, dt: f64) -> PlantState {
    let k1 = derivatives(state, airframe);
    let k2 = derivatives(&state.apply(&k1, dt * 0.5), airframe);
    let k3 = derivatives(&state.apply(&k2, dt * 0.5), airframe);
    let k4 = derivatives(&state.apply(&k3, dt), airframe);

    PlantState {
        time: state.time + dt,
        theta: state.theta + (k1.dtheta + 2.0 * k2.dtheta + 2.0 * k3.dtheta + k4.dtheta) * (dt / 6.0),
        q: state.q + (k1.dq + 2.0 * k2.dq + 2.0 * k3.dq + k4.dq) * (dt / 6.0),
        elevator: state.elevator,
    }
}
