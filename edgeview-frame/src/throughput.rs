use std::time::{Duration, Instant};

pub const REPORT_INTERVAL: Duration = Duration::from_millis(1000);

/// Counts events and reports how many happened in each window of at least [`REPORT_INTERVAL`].
pub struct ThroughputCounter {
    count: u32,
    window_start: Instant,
}

impl ThroughputCounter {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(now: Instant) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }

    /// Counts one event. Returns the window's count once a full window has elapsed, and starts a new one.
    pub fn tick(&mut self) -> Option<u32> {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> Option<u32> {
        self.count += 1;

        if now.saturating_duration_since(self.window_start) < REPORT_INTERVAL {
            return None;
        }

        let count = self.count;
        self.count = 0;
        self.window_start = now;
        Some(count)
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}
