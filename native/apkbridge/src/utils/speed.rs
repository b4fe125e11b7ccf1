use std::{collections::VecDeque, time::Duration};

use tokio::time::Instant;

/// Calculates average speed from running totals observed within a time window.
///
/// **Notes:**
/// - The two most recent observations are always kept, even when older than the window.
/// - Uses the tokio clock, so a paused test runtime drives it deterministically.
#[derive(Debug)]
pub struct AverageSpeed {
    /// Time window over which average speed is calculated.
    pub time_window: Duration,
    /// Running totals with the time they were observed, oldest first.
    observations: VecDeque<(u64, Instant)>,
}

impl AverageSpeed {
    pub fn new(time_window: Duration) -> Self {
        Self { time_window, observations: VecDeque::new() }
    }

    /// Records the running total observed now.
    pub fn add_from_total(&mut self, total: u64) {
        self.add_from_total_at(total, Instant::now());
    }

    fn add_from_total_at(&mut self, total: u64, now: Instant) {
        self.observations.push_back((total, now));
        while self.observations.len() > 2 {
            match self.observations.front() {
                Some(&(_, at)) if now.duration_since(at) > self.time_window => {
                    self.observations.pop_front();
                }
                _ => break,
            }
        }
    }

    /// Bytes per second across the window.
    ///
    /// Returns 0 until two observations span a non-zero duration.
    pub fn average(&self) -> u64 {
        let (Some(&(first, since)), Some(&(last, until))) =
            (self.observations.front(), self.observations.back())
        else {
            return 0;
        };
        let elapsed = until.duration_since(since).as_secs_f64();
        if elapsed <= 0.0 {
            return 0;
        }
        (last.saturating_sub(first) as f64 / elapsed) as u64
    }
}
