// Retry backoff for long-lived background subscriptions
use rand::Rng;
use std::time::Duration;

const DEFAULT_MULTIPLIER: f64 = 1.5;
const DEFAULT_RANDOMIZATION_FACTOR: f64 = 0.5;

/// Exponential backoff without an elapsed-time limit.
///
/// Each call to [`ExponentialBackoff::next_backoff`] returns the current
/// interval randomized by ±`randomization_factor`, then grows the interval by
/// `multiplier` up to `max_interval`. There is no give-up point: callers retry
/// until they succeed or their own lifetime ends.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_interval: Duration,
    max_interval: Duration,
    multiplier: f64,
    randomization_factor: f64,
    current_interval: Duration,
}

impl ExponentialBackoff {
    /// Create a backoff starting at `initial_interval`, capped at `max_interval`
    pub fn new(initial_interval: Duration, max_interval: Duration) -> Self {
        Self {
            initial_interval,
            max_interval,
            multiplier: DEFAULT_MULTIPLIER,
            randomization_factor: DEFAULT_RANDOMIZATION_FACTOR,
            current_interval: initial_interval,
        }
    }

    /// Disable jitter (deterministic intervals, for tests)
    pub fn without_jitter(mut self) -> Self {
        self.randomization_factor = 0.0;
        self
    }

    /// Delay before the next attempt
    pub fn next_backoff(&mut self) -> Duration {
        let current = self.current_interval.as_secs_f64();
        let delay = if self.randomization_factor > 0.0 {
            // Spread retries to avoid a thundering herd after an outage
            let delta = self.randomization_factor * current;
            rand::thread_rng().gen_range((current - delta)..=(current + delta))
        } else {
            current
        };

        let grown = Duration::from_secs_f64(current * self.multiplier);
        self.current_interval = grown.min(self.max_interval);

        Duration::from_secs_f64(delay.max(0.0))
    }

    /// Start over from the initial interval
    pub fn reset(&mut self) {
        self.current_interval = self.initial_interval;
    }
}
