//! Per-compartment bookkeeping.

use std::time::{Duration, Instant};

/// Public snapshot of one compartment.
#[derive(Debug, Clone)]
pub struct CompartmentStats {
    pub name: String,
    pub max_concurrent: usize,
    pub active: usize,
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub isolated: bool,
    /// failures / requests × 100, 0.0 when no requests were made yet.
    pub failure_rate: f64,
    pub mean_response: Duration,
}

/// Mutable compartment state. Guarded by the slot's mutex; never held
/// across a suspension point.
pub(crate) struct CompartmentState {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub last_failure: Option<Instant>,
    pub isolated: bool,
    pub isolated_at: Option<Instant>,
    pub mean_response: Duration,
}

impl CompartmentState {
    pub fn new() -> Self {
        Self {
            requests: 0,
            successes: 0,
            failures: 0,
            last_failure: None,
            isolated: false,
            isolated_at: None,
            mean_response: Duration::ZERO,
        }
    }

    pub fn failure_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.failures as f64 / self.requests as f64 * 100.0
        }
    }

    /// Folds a response-time sample into the rolling mean.
    ///
    /// The update is `mean = (mean + sample) / 2`: an exponential-style
    /// smoother with a fixed weight of one half, not an arithmetic mean.
    /// Recent samples dominate quickly, which is the intended bias.
    pub fn record_sample(&mut self, sample: Duration) {
        if self.mean_response.is_zero() {
            self.mean_response = sample;
        } else {
            self.mean_response = (self.mean_response + sample) / 2;
        }
    }

    /// Clears isolation and zeroes the counters.
    pub fn recover(&mut self) {
        self.isolated = false;
        self.isolated_at = None;
        self.requests = 0;
        self.successes = 0;
        self.failures = 0;
        self.last_failure = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_rate_handles_empty() {
        let state = CompartmentState::new();
        assert_eq!(state.failure_rate(), 0.0);
    }

    #[test]
    fn sample_smoother_tracks_recent_values() {
        let mut state = CompartmentState::new();
        state.record_sample(Duration::from_millis(100));
        assert_eq!(state.mean_response, Duration::from_millis(100));

        state.record_sample(Duration::from_millis(300));
        assert_eq!(state.mean_response, Duration::from_millis(200));

        // Half the weight goes to the newest sample each time.
        state.record_sample(Duration::from_millis(200));
        assert_eq!(state.mean_response, Duration::from_millis(200));
    }

    #[test]
    fn recover_zeroes_counters() {
        let mut state = CompartmentState::new();
        state.requests = 10;
        state.failures = 6;
        state.successes = 4;
        state.isolated = true;
        state.isolated_at = Some(Instant::now());
        state.last_failure = Some(Instant::now());

        state.recover();
        assert!(!state.isolated);
        assert_eq!(state.requests, 0);
        assert_eq!(state.failures, 0);
        assert!(state.last_failure.is_none());
    }
}
