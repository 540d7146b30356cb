//! FailureTracker: counts app-caused executor failures in a sliding
//! time window and exposes a fatal-threshold predicate.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

pub struct FailureTracker {
    window: Duration,
    max_failures: Option<u32>,
    failures: Mutex<Vec<Instant>>,
}

impl FailureTracker {
    pub fn new(window: Duration, max_failures: Option<u32>) -> Self {
        Self {
            window,
            max_failures,
            failures: Mutex::new(Vec::new()),
        }
    }

    /// Record an executor completion. Only failures attributable to the
    /// application count.
    pub fn record_completion(&self, exit_caused_by_app: bool) {
        if exit_caused_by_app {
            self.failures.lock().push(Instant::now());
        }
    }

    /// Number of app-caused failures still inside the sliding window.
    /// Expired entries are pruned as a side effect.
    pub fn num_failed_executors(&self) -> u32 {
        let mut failures = self.failures.lock();
        let cutoff = Instant::now().checked_sub(self.window);
        if let Some(cutoff) = cutoff {
            failures.retain(|t| *t >= cutoff);
        }
        failures.len() as u32
    }

    pub fn is_past_fatal_threshold(&self) -> bool {
        match self.max_failures {
            Some(max) => self.num_failed_executors() >= max,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn counts_only_app_caused_failures() {
        let tracker = FailureTracker::new(Duration::from_secs(60), None);
        tracker.record_completion(true);
        tracker.record_completion(false);
        tracker.record_completion(true);
        assert_eq!(tracker.num_failed_executors(), 2);
    }

    #[test]
    fn entries_expire_outside_the_window() {
        let tracker = FailureTracker::new(Duration::from_millis(20), None);
        tracker.record_completion(true);
        assert_eq!(tracker.num_failed_executors(), 1);
        sleep(Duration::from_millis(40));
        assert_eq!(tracker.num_failed_executors(), 0);
    }

    #[test]
    fn fatal_threshold_predicate() {
        let tracker = FailureTracker::new(Duration::from_secs(60), Some(2));
        assert!(!tracker.is_past_fatal_threshold());
        tracker.record_completion(true);
        assert!(!tracker.is_past_fatal_threshold());
        tracker.record_completion(true);
        assert!(tracker.is_past_fatal_threshold());
    }

    #[test]
    fn no_threshold_configured_never_trips() {
        let tracker = FailureTracker::new(Duration::from_secs(60), None);
        for _ in 0..100 {
            tracker.record_completion(true);
        }
        assert!(!tracker.is_past_fatal_threshold());
    }
}
