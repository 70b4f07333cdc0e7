// ---------------------------------------------------------------------------
// Per-cycle diagnostics snapshot
// ---------------------------------------------------------------------------

/// Terms of the most recent PID update, for telemetry and logging.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControlInfo {
    pub target: f64,
    pub actual: f64,
    pub error: f64,
    pub p: f64,
    pub i: f64,
    pub d: f64,
    pub ff: f64,
    pub dff: f64,
    pub d_mod: f64,       // slew limiter gain multiplier applied to P and D
    pub slew_rate: f64,   // smoothed output slew rate seen by the limiter
    pub limit: bool,      // saturation flag passed to the update
    pub pd_limit: bool,   // P+D was scaled down to pd_max
    pub i_term_set: bool, // integrator was written externally before this update
}

impl ControlInfo {
    /// Sum of all output contributions.
    pub fn total(&self) -> f64 {
        self.p + self.i + self.d + self.ff + self.dff
    }
}
