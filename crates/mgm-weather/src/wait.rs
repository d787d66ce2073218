//! Bounded polling with exponential backoff.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// How long and how often to poll a condition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaitPolicy {
    /// Give up after this many milliseconds
    pub timeout_ms: u64,
    /// First delay between polls
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Upper bound for the delay after backoff
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
    /// Multiplier applied to the delay after each miss
    #[serde(default = "default_backoff")]
    pub backoff: f64,
}

fn default_interval_ms() -> u64 {
    250
}

fn default_max_interval_ms() -> u64 {
    1000
}

fn default_backoff() -> f64 {
    1.5
}

impl WaitPolicy {
    /// Poll at a fixed interval, no backoff.
    pub fn fixed(interval_ms: u64, timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            interval_ms,
            max_interval_ms: interval_ms,
            backoff: 1.0,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay to use after `delay` when the condition was not met.
    fn next_delay(&self, delay: Duration) -> Duration {
        let factor = if self.backoff.is_finite() && self.backoff >= 1.0 {
            self.backoff
        } else {
            1.0
        };
        delay
            .mul_f64(factor)
            .min(Duration::from_millis(self.max_interval_ms.max(self.interval_ms)))
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: 15_000,
            interval_ms: default_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            backoff: default_backoff(),
        }
    }
}

/// Poll `condition` until it returns true or the policy times out.
///
/// The condition is always checked at least once, and once more at the
/// deadline. Returns whether it was met.
pub async fn poll_until<F, Fut>(policy: &WaitPolicy, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + policy.timeout();
    let mut delay = Duration::from_millis(policy.interval_ms.max(1));

    loop {
        if condition().await {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        tokio::time::sleep(delay.min(deadline - now)).await;
        delay = policy.next_delay(delay);
    }
}
