// Timed phases advanced by the tick loop instead of blocking waits.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Phase {
    pub start: Duration,
    pub duration: Duration,
}

impl Phase {
    pub fn starting_at(start: Duration, duration: Duration) -> Self {
        Self { start, duration }
    }

    pub fn elapsed(&self, now: Duration) -> Duration {
        now.saturating_sub(self.start)
    }

    pub fn is_complete(&self, now: Duration) -> bool {
        self.elapsed(now) >= self.duration
    }

    /// Seconds left, clamped to `[0, duration]`.
    pub fn remaining_secs(&self, now: Duration) -> f32 {
        self.duration.saturating_sub(self.elapsed(now)).as_secs_f32()
    }
}
