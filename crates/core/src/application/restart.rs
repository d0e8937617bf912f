// Restart policy for crashed worker processes
//
// Exponential backoff with jitter, capped, reset after a worker has stayed up
// long enough. Never an immediate restart loop, never giving up for good.
use super::worker::constants::*;
use rand::Rng;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct RestartPolicy {
    base_delay: Duration,
    max_delay: Duration,
    backoff_factor: f64,
    stable_after: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_RESTART_BASE_DELAY,
            max_delay: DEFAULT_RESTART_MAX_DELAY,
            backoff_factor: DEFAULT_RESTART_BACKOFF_FACTOR,
            stable_after: DEFAULT_RESTART_STABLE_AFTER,
        }
    }
}

impl RestartPolicy {
    /// Create a new restart policy
    ///
    /// # Arguments
    /// * `base_delay` - Delay before the first respawn
    /// * `max_delay` - Upper bound for any delay
    /// * `backoff_factor` - Growth per consecutive crash (>= 1.0)
    /// * `stable_after` - Uptime after which a worker's crash history is forgotten
    pub fn new(
        base_delay: Duration,
        max_delay: Duration,
        backoff_factor: f64,
        stable_after: Duration,
    ) -> Self {
        Self {
            base_delay,
            max_delay,
            backoff_factor: backoff_factor.max(1.0),
            stable_after,
        }
    }

    /// Consecutive crash count after a worker exited following `uptime`
    pub fn record_exit(&self, previous_failures: u32, uptime: Duration) -> u32 {
        if uptime >= self.stable_after {
            1
        } else {
            previous_failures.saturating_add(1)
        }
    }

    /// Delay before respawning a worker that has crashed `failures` times in a row.
    ///
    /// delay = min(base * factor^(failures - 1), max) * (1.0 ± 0.1)
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(32) as i32;
        let base = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        // ±10% jitter so a fleet-wide failure does not respawn in lockstep
        let jitter_factor = rand::thread_rng().gen_range(0.9..=1.1);
        let delay = Duration::from_secs_f64(capped * jitter_factor);

        info!(
            failures = failures,
            delay_ms = delay.as_millis() as u64,
            "Scheduling worker respawn"
        );
        delay
    }
}
