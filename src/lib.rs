pub mod filter;
pub mod control;
pub mod sim;
pub mod io;
pub mod logging;

pub use control::{AxisController, ControlInfo, ControllerGains, Pid, PidState, PitchConfig, PitchController};
pub use filter::{ExponentialSmoother, SlewLimiter};
pub use logging::init_tracing;
