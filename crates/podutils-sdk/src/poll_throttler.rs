use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Multiplier for exponential growth.
const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Relative jitter applied to each sleep, so sibling pollers drift apart.
const JITTER: f64 = 0.1;

/// Exponential poll throttler between `min` and `max`, used for filesystem
/// polling on a volume shared by many pollers.
///
/// Each call to `wait` sleeps for the current delay (with jitter) and then
/// doubles it, capped at `max`.
#[derive(Debug, Clone)]
pub struct PollThrottler {
    min: Duration,
    max: Duration,
    current_delay: Duration,
}

impl PollThrottler {
    /// Create a throttler. `max` is raised to `min` if it is smaller.
    pub fn new(min: Duration, max: Duration) -> Self {
        let max = max.max(min);
        Self {
            min,
            max,
            current_delay: min,
        }
    }

    /// Returns the current (un-jittered) delay without incrementing.
    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    /// Advance to the next delay without waiting.
    pub fn increment(&mut self) {
        let next_ms = (self.current_delay.as_millis() as f64 * BACKOFF_MULTIPLIER) as u64;
        self.current_delay = Duration::from_millis(next_ms).clamp(self.min, self.max);
    }

    /// Sleep for the current delay, then increment.
    ///
    /// Returns `true` if the delay completed normally, `false` if cancelled.
    pub async fn wait(&mut self, cancel: &CancellationToken) -> bool {
        let delay = jittered(self.current_delay);

        let completed = tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = cancel.cancelled() => false,
        };

        self.increment();
        completed
    }
}

fn jittered(delay: Duration) -> Duration {
    if delay.is_zero() {
        return delay;
    }
    let factor = rand::thread_rng().gen_range((1.0 - JITTER)..=(1.0 + JITTER));
    delay.mul_f64(factor)
}
