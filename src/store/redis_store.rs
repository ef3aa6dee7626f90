use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::{AsyncCommands, Script};
use serde::{Deserialize, Serialize};

use super::{scripts, CounterOutcome, CounterStore, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisStoreConfig {
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: Duration,
}

fn default_pool_size() -> usize {
    16
}

fn default_connection_timeout() -> Duration {
    Duration::from_secs(2)
}

/// Redis-backed [`CounterStore`]. Each algorithm is a single round trip via
/// `EVALSHA`/`EVAL` through [`redis::Script`], so concurrent callers hitting
/// the same key never race on read-modify-write.
pub struct RedisCounterStore {
    pool: Pool,
    token_bucket: Script,
    fixed_window: Script,
    sliding_log: Script,
    seq: AtomicU64,
}

impl RedisCounterStore {
    pub fn new(config: &RedisStoreConfig) -> Result<Self, StoreError> {
        let cfg = Config::from_url(&config.url);
        let pool = cfg
            .builder()
            .map(|b| {
                b.max_size(config.pool_size)
                    .wait_timeout(Some(config.connection_timeout))
                    .runtime(Runtime::Tokio1)
                    .build()
            })
            .map_err(|e| StoreError::Connection(e.to_string()))?
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(Self {
            pool,
            token_bucket: Script::new(scripts::TOKEN_BUCKET),
            fixed_window: Script::new(scripts::FIXED_WINDOW),
            sliding_log: Script::new(scripts::SLIDING_LOG),
            seq: AtomicU64::new(0),
        })
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn take_token_bucket(
        &self,
        key: &str,
        capacity: i64,
        refill_rate: f64,
        window_seconds: u32,
        now_ms: i64,
    ) -> Result<CounterOutcome, StoreError> {
        let mut conn = self.conn().await?;
        let ttl_ms = i64::from(window_seconds) * 2 * 1000;

        let (allowed, remaining, reset_in_seconds): (i64, i64, i64) = self
            .token_bucket
            .key(key)
            .arg(capacity)
            .arg(refill_rate)
            .arg(now_ms)
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StoreError::Script(e.to_string()))?;

        Ok(CounterOutcome {
            allowed: allowed == 1,
            remaining: remaining.max(0),
            reset_in_seconds: reset_in_seconds.max(0) as u64,
        })
    }

    async fn take_fixed_window(
        &self,
        key: &str,
        limit: i64,
        window_seconds: u32,
        now_sec: i64,
    ) -> Result<CounterOutcome, StoreError> {
        let mut conn = self.conn().await?;

        let (allowed, remaining, reset_in_seconds): (i64, i64, i64) = self
            .fixed_window
            .key(key)
            .arg(limit)
            .arg(window_seconds)
            .arg(now_sec)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StoreError::Script(e.to_string()))?;

        Ok(CounterOutcome {
            allowed: allowed == 1,
            remaining: remaining.max(0),
            reset_in_seconds: reset_in_seconds.max(0) as u64,
        })
    }

    async fn take_sliding_log(
        &self,
        key: &str,
        limit: i64,
        window_seconds: u32,
        now_ms: i64,
    ) -> Result<CounterOutcome, StoreError> {
        let mut conn = self.conn().await?;
        let window_ms = i64::from(window_seconds) * 1000;
        let ttl_ms = window_ms * 2;
        let suffix = self.seq.fetch_add(1, Ordering::Relaxed);

        let (allowed, remaining): (i64, i64) = self
            .sliding_log
            .key(key)
            .arg(limit)
            .arg(window_ms)
            .arg(now_ms)
            .arg(suffix)
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StoreError::Script(e.to_string()))?;

        Ok(CounterOutcome {
            allowed: allowed == 1,
            remaining: remaining.max(0),
            reset_in_seconds: u64::from(window_seconds),
        })
    }

    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn().await?;
        let mut cursor: u64 = 0;
        let mut deleted: u64 = 0;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;

            if !keys.is_empty() {
                deleted += conn
                    .del::<_, u64>(keys)
                    .await
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        Ok(deleted)
    }
}
