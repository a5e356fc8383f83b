//! Time-based coalescing throttle.
//!
//! Wraps "is it time to run again" as a pure decision over an injected
//! clock, so the aggregate-count resync can be rate limited without tying
//! the engine to any UI framework timer.

use std::time::{Duration, Instant};

/// Lower bound for the scaled resync interval.
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);
/// Upper bound for the scaled resync interval.
pub const MAX_INTERVAL: Duration = Duration::from_millis(2000);

/// A coalescing throttle: `poll` answers true at most once per interval.
///
/// This only decides WHEN work runs; it never affects the correctness of
/// the final value (callers recompute from current state when allowed).
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last_run: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last_run: None }
    }

    /// Interval scaled to dataset size: larger sheets throttle harder so a
    /// full-table rescan stays off the hot path while typing.
    pub fn scaled_to(cell_count: usize) -> Self {
        let millis = (cell_count / 50) as u64;
        let interval = Duration::from_millis(millis)
            .clamp(MIN_INTERVAL, MAX_INTERVAL);
        Self::new(interval)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Re-derive the interval after the dataset changed size.
    pub fn rescale(&mut self, cell_count: usize) {
        self.interval = Self::scaled_to(cell_count).interval;
    }

    /// Returns true if enough time has passed since the last accepted poll.
    /// The first poll always passes.
    pub fn poll(&mut self, now: Instant) -> bool {
        let due = match self.last_run {
            None => true,
            Some(last) => now.duration_since(last) >= self.interval,
        };
        if due {
            self.last_run = Some(now);
        }
        due
    }

    /// Forget the last run so the next poll passes unconditionally.
    pub fn reset(&mut self) {
        self.last_run = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_poll_passes() {
        let mut t = Throttle::new(Duration::from_millis(500));
        assert!(t.poll(Instant::now()));
    }

    #[test]
    fn test_poll_coalesces_within_interval() {
        let mut t = Throttle::new(Duration::from_millis(500));
        let start = Instant::now();

        assert!(t.poll(start));
        assert!(!t.poll(start + Duration::from_millis(100)));
        assert!(!t.poll(start + Duration::from_millis(499)));
        assert!(t.poll(start + Duration::from_millis(500)));
        // Interval restarts from the accepted poll
        assert!(!t.poll(start + Duration::from_millis(900)));
        assert!(t.poll(start + Duration::from_millis(1000)));
    }

    #[test]
    fn test_reset_forces_next_poll() {
        let mut t = Throttle::new(Duration::from_millis(500));
        let start = Instant::now();
        assert!(t.poll(start));
        t.reset();
        assert!(t.poll(start + Duration::from_millis(1)));
    }

    #[test]
    fn test_scaled_interval_bounds() {
        // Tiny sheet clamps to the minimum
        assert_eq!(Throttle::scaled_to(100).interval(), MIN_INTERVAL);
        // 50k cells scale linearly: 1000ms
        assert_eq!(Throttle::scaled_to(50_000).interval(), Duration::from_millis(1000));
        // Huge sheet clamps to the maximum
        assert_eq!(Throttle::scaled_to(10_000_000).interval(), MAX_INTERVAL);
    }

    #[test]
    fn test_rescale_keeps_schedule() {
        let mut t = Throttle::scaled_to(100);
        let start = Instant::now();
        assert!(t.poll(start));
        t.rescale(50_000);
        assert_eq!(t.interval(), Duration::from_millis(1000));
        assert!(!t.poll(start + Duration::from_millis(500)));
        assert!(t.poll(start + Duration::from_millis(1000)));
    }
}
