pub mod lowpass;
pub mod ring;
pub mod slew;
pub mod smoothing;

pub use lowpass::{lowpass_alpha, LowPassFilter};
pub use ring::EventRing;
pub use slew::SlewLimiter;
pub use smoothing::ExponentialSmoother;
