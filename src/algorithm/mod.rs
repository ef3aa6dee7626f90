mod error;
mod fixed_window;
mod sliding_log;
mod token_bucket;

pub use error::AlgorithmError;
pub use fixed_window::FixedWindowStrategy;
pub use sliding_log::SlidingLogStrategy;
pub use token_bucket::TokenBucketStrategy;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::{Algorithm, Policy, RateLimitResult};
use crate::store::CounterStore;

#[async_trait]
pub trait LimiterStrategy: Send + Sync {
    fn algorithm(&self) -> Algorithm;

    async fn check(
        &self,
        store: &dyn CounterStore,
        policy: &Policy,
        identifier: &str,
        now_ms: i64,
    ) -> Result<RateLimitResult, AlgorithmError>;
}

/// Dispatches a policy's configured algorithm to its strategy. Built once at
/// startup; `verify` confirms every [`Algorithm`] variant has a registered
/// strategy so a missing wiring fails fast instead of at request time.
pub struct AlgorithmRegistry {
    strategies: HashMap<Algorithm, Box<dyn LimiterStrategy>>,
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        let mut strategies: HashMap<Algorithm, Box<dyn LimiterStrategy>> = HashMap::new();
        register(&mut strategies, Box::new(TokenBucketStrategy));
        register(&mut strategies, Box::new(FixedWindowStrategy));
        register(&mut strategies, Box::new(SlidingLogStrategy));
        Self { strategies }
    }
}

fn register(map: &mut HashMap<Algorithm, Box<dyn LimiterStrategy>>, strategy: Box<dyn LimiterStrategy>) {
    map.insert(strategy.algorithm(), strategy);
}

impl AlgorithmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails startup if any [`Algorithm::ALL`] member lacks a strategy.
    pub fn verify(&self) -> Result<(), AlgorithmError> {
        for algorithm in Algorithm::ALL {
            if !self.strategies.contains_key(&algorithm) {
                return Err(AlgorithmError::Unregistered(algorithm));
            }
        }
        Ok(())
    }

    pub async fn check(
        &self,
        store: &dyn CounterStore,
        policy: &Policy,
        identifier: &str,
        now_ms: i64,
    ) -> Result<RateLimitResult, AlgorithmError> {
        if identifier.trim().is_empty() {
            return Err(AlgorithmError::EmptyIdentifier);
        }
        let strategy = self
            .strategies
            .get(&policy.algorithm)
            .ok_or(AlgorithmError::Unregistered(policy.algorithm))?;
        strategy.check(store, policy, identifier, now_ms).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_verifies_all_algorithms() {
        let registry = AlgorithmRegistry::new();
        assert!(registry.verify().is_ok());
    }
}
