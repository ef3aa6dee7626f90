use async_trait::async_trait;

use crate::domain::{Algorithm, Policy, RateLimitResult};
use crate::store::{counter_key, CounterStore};

use super::error::AlgorithmError;
use super::LimiterStrategy;

pub struct TokenBucketStrategy;

#[async_trait]
impl LimiterStrategy for TokenBucketStrategy {
    fn algorithm(&self) -> Algorithm {
        Algorithm::TokenBucket
    }

    async fn check(
        &self,
        store: &dyn CounterStore,
        policy: &Policy,
        identifier: &str,
        now_ms: i64,
    ) -> Result<RateLimitResult, AlgorithmError> {
        let key = counter_key("token", policy.scope.as_str(), identifier);
        let capacity = i64::from(policy.effective_capacity());
        let outcome = store
            .take_token_bucket(
                &key,
                capacity,
                policy.effective_refill_rate(),
                policy.window_seconds,
                now_ms,
            )
            .await?;

        Ok(if outcome.allowed {
            RateLimitResult::allow(
                capacity,
                outcome.remaining,
                outcome.reset_in_seconds,
                policy.id,
                self.algorithm().as_str(),
            )
        } else {
            RateLimitResult::deny(
                capacity,
                outcome.reset_in_seconds,
                outcome.reset_in_seconds,
                policy.id,
                self.algorithm().as_str(),
                crate::domain::DenyReason::RateLimitExceeded,
            )
        })
    }
}
