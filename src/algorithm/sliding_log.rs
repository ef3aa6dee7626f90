use async_trait::async_trait;

use crate::domain::{Algorithm, DenyReason, Policy, RateLimitResult};
use crate::store::{counter_key, CounterStore};

use super::error::AlgorithmError;
use super::LimiterStrategy;

pub struct SlidingLogStrategy;

#[async_trait]
impl LimiterStrategy for SlidingLogStrategy {
    fn algorithm(&self) -> Algorithm {
        Algorithm::SlidingLog
    }

    async fn check(
        &self,
        store: &dyn CounterStore,
        policy: &Policy,
        identifier: &str,
        now_ms: i64,
    ) -> Result<RateLimitResult, AlgorithmError> {
        let key = counter_key("sliding", policy.scope.as_str(), identifier);
        let limit = i64::from(policy.max_requests);
        let outcome = store
            .take_sliding_log(&key, limit, policy.window_seconds, now_ms)
            .await?;

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
