// ---------------------------------------------------------------------------
// Fixed-capacity ring of event timestamps
// ---------------------------------------------------------------------------

/// Circular buffer holding the most recent `N` event times (seconds).
///
/// Slots start at 0.0, so an unfilled ring reports the clock origin as its
/// oldest entry.
#[derive(Debug, Clone, Copy)]
pub struct EventRing<const N: usize> {
    times: [f64; N],
    cursor: usize,
}

impl<const N: usize> EventRing<N> {
    pub const CAPACITY: usize = N;

    pub fn new() -> Self {
        Self { times: [0.0; N], cursor: 0 }
    }

    /// Overwrite the slot under the cursor and advance it, wrapping at `N`.
    pub fn push(&mut self, time: f64) {
        self.times[self.cursor] = time;
        self.cursor = (self.cursor + 1) % N;
    }

    /// Oldest stored time, never later than `now`.
    pub fn oldest(&self, now: f64) -> f64 {
        self.times.iter().copied().fold(now, f64::min)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

impl<const N: usize> Default for EventRing<N> {
    fn default() -> Self {
        Self::new()
    }
}
