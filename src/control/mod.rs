pub mod controller;
pub mod gains;
pub mod info;
pub mod pid;
pub mod pitch;

pub use controller::AxisController;
pub use gains::ControllerGains;
pub use info::ControlInfo;
pub use pid::{Pid, PidState};
pub use pitch::{FlightContext, PitchConfig, PitchController};
