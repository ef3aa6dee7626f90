use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Duration;

use super::{CounterOutcome, CounterStore, StoreError};

struct BucketEntry {
    tokens: f64,
    last_ts_ms: i64,
    /// Consecutive denials since the last allowed request. Used only to
    /// report an increasing `reset_in_seconds` to a client hammering an
    /// exhausted bucket; never folded back into `tokens`.
    denied_streak: u32,
}

struct WindowEntry {
    count: i64,
    window_id: i64,
}

/// In-memory [`CounterStore`], backed by [`DashMap`]s. Used in tests and as
/// a fallback when no Redis URL is configured. Not shared across process
/// instances, so it only makes sense for single-node deployments or tests.
#[derive(Default)]
pub struct MemoryCounterStore {
    buckets: DashMap<String, BucketEntry>,
    windows: DashMap<String, WindowEntry>,
    logs: DashMap<String, Mutex<Vec<i64>>>,
    seq: AtomicU64,
    deleted_counter: AtomicI64,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn take_token_bucket(
        &self,
        key: &str,
        capacity: i64,
        refill_rate: f64,
        _window_seconds: u32,
        now_ms: i64,
    ) -> Result<CounterOutcome, StoreError> {
        let mut entry = self.buckets.entry(key.to_string()).or_insert_with(|| BucketEntry {
            tokens: capacity as f64,
            last_ts_ms: now_ms,
            denied_streak: 0,
        });

        let elapsed_s = (now_ms - entry.last_ts_ms).max(0) as f64 / 1000.0;
        entry.tokens = (entry.tokens + elapsed_s * refill_rate).min(capacity as f64);
        entry.last_ts_ms = now_ms;

        let allowed = entry.tokens >= 1.0;
        let reset_in_seconds = if allowed {
            entry.tokens -= 1.0;
            entry.denied_streak = 0;
            0
        } else {
            entry.denied_streak += 1;
            let deficit = f64::from(entry.denied_streak) - entry.tokens;
            if refill_rate > 0.0 {
                (deficit / refill_rate).ceil().max(0.0) as u64
            } else {
                0
            }
        };

        let remaining = entry.tokens.floor().max(0.0) as i64;

        Ok(CounterOutcome {
            allowed,
            remaining,
            reset_in_seconds,
        })
    }

    async fn take_fixed_window(
        &self,
        key: &str,
        limit: i64,
        window_seconds: u32,
        now_sec: i64,
    ) -> Result<CounterOutcome, StoreError> {
        let window_seconds_i64 = i64::from(window_seconds).max(1);
        let window_id = now_sec.div_euclid(window_seconds_i64);

        let mut entry = self.windows.entry(key.to_string()).or_insert_with(|| WindowEntry { count: 0, window_id });

        if entry.window_id != window_id {
            entry.count = 0;
            entry.window_id = window_id;
        }

        entry.count += 1;
        let allowed = entry.count <= limit;
        let remaining = if allowed { limit - entry.count } else { 0 };
        let window_end = (window_id + 1) * window_seconds_i64;
        let reset_in_seconds = (window_end - now_sec).max(0) as u64;

        Ok(CounterOutcome {
            allowed,
            remaining,
            reset_in_seconds,
        })
    }

    async fn take_sliding_log(
        &self,
        key: &str,
        limit: i64,
        window_seconds: u32,
        now_ms: i64,
    ) -> Result<CounterOutcome, StoreError> {
        let log = self.logs.entry(key.to_string()).or_insert_with(|| Mutex::new(Vec::new()));
        let mut entries = log.lock().expect("sliding log mutex poisoned");

        let window_ms = i64::from(window_seconds) * 1000;
        entries.retain(|&ts| ts > now_ms - window_ms);

        let allowed = (entries.len() as i64) < limit;
        if allowed {
            entries.push(now_ms);
            self.seq.fetch_add(1, Ordering::Relaxed);
        }

        let remaining = (limit - entries.len() as i64).max(0);

        Ok(CounterOutcome {
            allowed,
            remaining,
            reset_in_seconds: u64::from(window_seconds),
        })
    }

    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64, StoreError> {
        let prefix = pattern.trim_end_matches('*');
        let mut deleted = 0u64;

        self.buckets.retain(|k, _| {
            let hit = k.starts_with(prefix);
            if hit {
                deleted += 1;
            }
            !hit
        });
        self.windows.retain(|k, _| {
            let hit = k.starts_with(prefix);
            if hit {
                deleted += 1;
            }
            !hit
        });
        self.logs.retain(|k, _| {
            let hit = k.starts_with(prefix);
            if hit {
                deleted += 1;
            }
            !hit
        });

        self.deleted_counter.fetch_add(deleted as i64, Ordering::Relaxed);
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn token_bucket_denies_once_exhausted() {
        let store = MemoryCounterStore::new();
        for _ in 0..3 {
            let outcome = store
                .take_token_bucket("rl:token:tenant:t1", 3, 1.0, 10, 0)
                .await
                .unwrap();
            assert!(outcome.allowed);
        }
        let outcome = store.take_token_bucket("rl:token:tenant:t1", 3, 1.0, 10, 0).await.unwrap();
        assert!(!outcome.allowed);
    }

    #[tokio::test]
    async fn token_bucket_refills_over_time() {
        let store = MemoryCounterStore::new();
        for _ in 0..5 {
            store.take_token_bucket("rl:token:tenant:t2", 5, 1.0, 10, 0).await.unwrap();
        }
        let denied = store.take_token_bucket("rl:token:tenant:t2", 5, 1.0, 10, 0).await.unwrap();
        assert!(!denied.allowed);

        let allowed = store
            .take_token_bucket("rl:token:tenant:t2", 5, 1.0, 10, 2_000)
            .await
            .unwrap();
        assert!(allowed.allowed);
    }

    #[tokio::test]
    async fn token_bucket_reports_increasing_retry_after_while_exhausted() {
        let store = MemoryCounterStore::new();
        for _ in 0..10 {
            let outcome = store.take_token_bucket("rl:token:tenant:t3", 10, 1.0, 10, 0).await.unwrap();
            assert!(outcome.allowed);
        }

        let mut retry_afters = Vec::new();
        for _ in 0..5 {
            let denied = store.take_token_bucket("rl:token:tenant:t3", 10, 1.0, 10, 0).await.unwrap();
            assert!(!denied.allowed);
            retry_afters.push(denied.reset_in_seconds);
        }
        assert_eq!(retry_afters, vec![1, 2, 3, 4, 5]);

        // Five seconds later the bucket has refilled roughly halfway and the
        // denial streak resets.
        let allowed = store.take_token_bucket("rl:token:tenant:t3", 10, 1.0, 10, 5_000).await.unwrap();
        assert!(allowed.allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn fixed_window_resets_after_expiry() {
        let store = MemoryCounterStore::new();
        for _ in 0..2 {
            let outcome = store.take_fixed_window("rl:fixed:tenant:t1", 2, 1, 0).await.unwrap();
            assert!(outcome.allowed);
        }
        let denied = store.take_fixed_window("rl:fixed:tenant:t1", 2, 1, 0).await.unwrap();
        assert!(!denied.allowed);

        tokio::time::advance(Duration::from_secs(2)).await;

        let allowed = store.take_fixed_window("rl:fixed:tenant:t1", 2, 1, 2).await.unwrap();
        assert!(allowed.allowed);
    }

    #[tokio::test]
    async fn fixed_window_allows_independent_bursts_across_an_epoch_boundary() {
        let store = MemoryCounterStore::new();
        for _ in 0..3 {
            let outcome = store.take_fixed_window("rl:fixed:tenant:t4", 3, 60, 59).await.unwrap();
            assert!(outcome.allowed);
        }
        // t=60 lands in the next 60-second window, so this burst gets its
        // own allowance even though only one second of wall-clock time has
        // passed since the first burst.
        for _ in 0..3 {
            let outcome = store.take_fixed_window("rl:fixed:tenant:t4", 3, 60, 60).await.unwrap();
            assert!(outcome.allowed);
        }
        let denied = store.take_fixed_window("rl:fixed:tenant:t4", 3, 60, 60).await.unwrap();
        assert!(!denied.allowed);
    }

    #[tokio::test]
    async fn sliding_log_evicts_old_entries() {
        let store = MemoryCounterStore::new();
        for i in 0..3 {
            let outcome = store
                .take_sliding_log("rl:sliding:tenant:t1", 3, 1, i * 100)
                .await
                .unwrap();
            assert!(outcome.allowed);
        }
        let denied = store.take_sliding_log("rl:sliding:tenant:t1", 3, 1, 250).await.unwrap();
        assert!(!denied.allowed);

        let allowed = store
            .take_sliding_log("rl:sliding:tenant:t1", 3, 1, 1_300)
            .await
            .unwrap();
        assert!(allowed.allowed);
    }

    #[tokio::test]
    async fn delete_by_pattern_clears_matching_keys() {
        let store = MemoryCounterStore::new();
        store.take_fixed_window("rl:fixed:tenant:t1", 5, 10, 0).await.unwrap();
        store.take_fixed_window("rl:fixed:tenant:t2", 5, 10, 0).await.unwrap();

        let deleted = store.delete_by_pattern("rl:fixed:tenant:t1*").await.unwrap();
        assert_eq!(deleted, 1);
    }
}
