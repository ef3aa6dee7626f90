use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Exponential backoff with full jitter: `base * multiplier^attempt`,
/// clamped to `max`, then scaled by a uniform random factor in `[0, 1)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    #[serde(default = "default_base_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_base_ms() -> u64 {
    20
}
fn default_max_ms() -> u64 {
    500
}
fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay_ms: default_base_ms(),
            max_delay_ms: default_max_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetryConfig {
    /// Delay before the `attempt`-th retry (0-based, 0 = first retry after
    /// the initial failed call).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms as f64;
        let raw = base * self.multiplier.powi(attempt as i32);
        let capped = raw.min(self.max_delay_ms as f64);
        let jittered = rand::thread_rng().gen_range(0.0..=capped);
        Duration::from_millis(jittered as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_never_exceeds_max() {
        let cfg = RetryConfig {
            max_attempts: 5,
            base_delay_ms: 20,
            max_delay_ms: 200,
            multiplier: 2.0,
        };
        for attempt in 0..10 {
            assert!(cfg.delay_for(attempt) <= Duration::from_millis(200));
        }
    }

    #[test]
    fn default_allows_two_attempts() {
        assert_eq!(RetryConfig::default().max_attempts, 2);
    }
}
