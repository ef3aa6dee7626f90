use async_trait::async_trait;

use crate::domain::{Algorithm, DenyReason, Policy, RateLimitResult};
use crate::store::{counter_key, CounterStore};

use super::error::AlgorithmError;
use super::LimiterStrategy;

pub struct FixedWindowStrategy;

#[async_trait]
impl LimiterStrategy for FixedWindowStrategy {
    fn algorithm(&self) -> Algorithm {
        Algorithm::FixedWindow
    }

    async fn check(
        &self,
        store: &dyn CounterStore,
        policy: &Policy,
        identifier: &str,
        now_ms: i64,
    ) -> Result<RateLimitResult, AlgorithmError> {
        let key = counter_key("fixed", policy.scope.as_str(), identifier);
        let limit = i64::from(policy.max_requests);
        let now_sec = now_ms.div_euclid(1000);
        let outcome = store.take_fixed_window(&key, limit, policy.window_seconds, now_sec).await?;

        Ok(if outcome.allowed {
            RateLimitResult::allow(
                limit,
                outcome.remaining,
                outcome.reset_in_seconds,
                policy.id,
                self.algorithm().as_str(),
            )
        } else {
            RateLimitResult::deny(
                limit,
                outcome.reset_in_seconds,
                outcome.reset_in_seconds,
                policy.id,
                self.algorithm().as_str(),
                DenyReason::RateLimitExceeded,
            )
        })
    }
}
