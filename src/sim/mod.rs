pub mod integrator;
pub mod plant;
pub mod runner;

pub use integrator::rk4_step;
pub use plant::{Airframe, PlantState, SimConfig};
pub use runner::{simulate, simulate_with, Sample};
