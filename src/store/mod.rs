mod error;
mod memory;
mod redis_store;
mod scripts;

pub use error::StoreError;
pub use memory::MemoryCounterStore;
pub use redis_store::{RedisCounterStore, RedisStoreConfig};

use async_trait::async_trait;

/// Outcome of a single counter check, independent of which algorithm
/// produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CounterOutcome {
    pub allowed: bool,
    pub remaining: i64,
    pub reset_in_seconds: u64,
}

/// Backend for the three rate-limiting algorithms' counter state. A policy's
/// algorithm selects which method is called; the key is namespaced by the
/// caller as `rl:{token|fixed|sliding}:{scope}:{identifier}`.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn take_token_bucket(
        &self,
        key: &str,
        capacity: i64,
        refill_rate: f64,
        window_seconds: u32,
        now_ms: i64,
    ) -> Result<CounterOutcome, StoreError>;

    async fn take_fixed_window(
        &self,
        key: &str,
        limit: i64,
        window_seconds: u32,
        now_sec: i64,
    ) -> Result<CounterOutcome, StoreError>;

    async fn take_sliding_log(
        &self,
        key: &str,
        limit: i64,
        window_seconds: u32,
        now_ms: i64,
    ) -> Result<CounterOutcome, StoreError>;

    /// Deletes every key matching a `*`-suffixed glob, used when an admin
    /// disables or deletes a policy and wants its counters cleared.
    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64, StoreError>;
}

/// Namespaced key for a counter, shared by every algorithm and store impl.
pub fn counter_key(algorithm_prefix: &str, scope: &str, identifier: &str) -> String {
    format!("rl:{algorithm_prefix}:{}:{identifier}", scope.to_lowercase())
}
