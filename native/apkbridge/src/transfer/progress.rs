use std::time::Duration;

use crate::utils::AverageSpeed;

/// One progress sample of a running transfer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferProgress {
    /// Bytes known to have reached the destination.
    pub transferred: u64,
    /// Source length, when known.
    pub total: Option<u64>,
    /// `transferred / total` in `0.0..=1.0`. Absent without a known, non-zero total.
    pub fraction: Option<f64>,
    /// Absent without a known total or before a speed could be measured.
    pub eta: Option<Duration>,
    /// Average speed in bytes per second.
    pub speed: u64,
    /// Set on the single terminal sample emitted after the writer completed.
    pub finished: bool,
}

/// Turns raw size observations into non-decreasing progress samples.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    total: Option<u64>,
    transferred: u64,
    speed: AverageSpeed,
}

impl ProgressTracker {
    const SPEED_WINDOW: Duration = Duration::from_millis(5500);

    pub(crate) fn new(total: Option<u64>) -> Self {
        Self { total, transferred: 0, speed: AverageSpeed::new(Self::SPEED_WINDOW) }
    }

    /// Records an observed destination size. Sizes below an earlier observation are clamped.
    pub(crate) fn observe(&mut self, size: u64) -> TransferProgress {
        self.transferred = self.transferred.max(size);
        self.speed.add_from_total(self.transferred);
        self.sample(false)
    }

    /// Terminal sample carrying the exact number of bytes read from the source.
    pub(crate) fn finish(&mut self, transferred: u64) -> TransferProgress {
        self.transferred = transferred;
        self.speed.add_from_total(transferred);
        self.sample(true)
    }

    fn sample(&self, finished: bool) -> TransferProgress {
        let speed = self.speed.average();
        let total = self.total.filter(|&t| t > 0);
        let fraction = total.map(|t| (self.transferred as f64 / t as f64).min(1.0));
        let eta = total.and_then(|t| {
            let remaining = t.saturating_sub(self.transferred);
            if remaining == 0 {
                Some(Duration::ZERO)
            } else if speed > 0 {
                Some(Duration::from_secs_f64(remaining as f64 / speed as f64))
            } else {
                None
            }
        });
        TransferProgress { transferred: self.transferred, total: self.total, fraction, eta, speed, finished }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_never_decrease() {
        let mut tracker = ProgressTracker::new(Some(1000));
        assert_eq!(tracker.observe(400).transferred, 400);
        assert_eq!(tracker.observe(100).transferred, 400);
        assert_eq!(tracker.observe(900).fraction, Some(0.9));
    }

    #[test]
    fn unknown_total_has_no_fraction_or_eta() {
        let mut tracker = ProgressTracker::new(None);
        let sample = tracker.observe(12345);
        assert_eq!(sample.fraction, None);
        assert_eq!(sample.eta, None);
        let last = tracker.finish(20000);
        assert_eq!((last.fraction, last.eta, last.finished), (None, None, true));
    }

    #[test]
    fn zero_total_counts_as_unknown() {
        let mut tracker = ProgressTracker::new(Some(0));
        assert_eq!(tracker.observe(0).fraction, None);
    }

    #[tokio::test(start_paused = true)]
    async fn estimates_remaining_time_from_speed() {
        let mut tracker = ProgressTracker::new(Some(1_000_000));
        assert_eq!(tracker.observe(0).eta, None);
        tokio::time::advance(Duration::from_secs(1)).await;
        let sample = tracker.observe(250_000);
        assert_eq!(sample.speed, 250_000);
        assert_eq!(sample.eta, Some(Duration::from_secs(3)));
        assert_eq!(tracker.finish(1_000_000).eta, Some(Duration::ZERO));
    }
}
