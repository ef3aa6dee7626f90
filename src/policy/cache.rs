use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{CheckRequest, Policy};

use super::resolver::{PolicyResolver, ResolveError};

struct CacheEntry {
    policy: Policy,
    expires_at: Instant,
}

/// Cache key: resolution depends on every field the resolver consults, so a
/// cache hit must reproduce the exact lookup path, not just the identifier.
fn cache_key(request: &CheckRequest) -> String {
    format!(
        "{:?}|{:?}|{:?}|{:?}|{:?}|{:?}",
        request.policy_id,
        request.tenant_id,
        request.api_key,
        request.ip_address,
        request.resource,
        request.method,
    )
}

/// Bounded TTL cache in front of [`PolicyResolver`]. Only successful
/// resolutions are cached — `ResolveError::NotFound`/`Disabled` always hit
/// the resolver again, since a missing or disabled policy is exactly the
/// case an operator is likely to fix and expect to take effect immediately.
///
/// Concurrent misses for the same key are coalesced onto a single resolver
/// call: each key gets its own `Mutex`, so a cache stampede becomes a single
/// resolve plus N waiters rather than N duplicate resolves.
pub struct PolicyCache {
    resolver: PolicyResolver,
    ttl: Duration,
    max_entries: usize,
    entries: DashMap<String, CacheEntry>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl PolicyCache {
    pub fn new(resolver: PolicyResolver, ttl: Duration, max_entries: usize) -> Self {
        Self {
            resolver,
            ttl,
            max_entries,
            entries: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    pub async fn resolve(&self, request: &CheckRequest) -> Result<Policy, ResolveError> {
        let key = cache_key(request);

        if let Some(entry) = self.entries.get(&key) {
            if entry.expires_at > Instant::now() {
                metrics::counter!("ratelimit_policy_cache_hits_total").increment(1);
                return Ok(entry.policy.clone());
            }
        }

        let lock = self.locks.entry(key.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).clone();
        let _guard = lock.lock().await;

        // Re-check: another waiter may have just populated this entry.
        if let Some(entry) = self.entries.get(&key) {
            if entry.expires_at > Instant::now() {
                metrics::counter!("ratelimit_policy_cache_hits_total").increment(1);
                return Ok(entry.policy.clone());
            }
        }

        metrics::counter!("ratelimit_policy_cache_misses_total").increment(1);
        let policy = self.resolver.resolve(request).await?;

        if self.entries.len() >= self.max_entries {
            self.evict_one();
        }
        self.entries.insert(
            key,
            CacheEntry {
                policy: policy.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );

        Ok(policy)
    }

    /// Drops every cached entry referencing `policy_id`. Called by the admin
    /// surface on policy update/delete so a stale resolution never outlives
    /// an operator's edit by more than one cache lookup.
    pub fn invalidate_policy(&self, policy_id: Uuid) {
        self.entries.retain(|_, entry| entry.policy.id != policy_id);
    }

    pub fn invalidate_all(&self) {
        self.entries.clear();
    }

    /// Snapshot used by the periodic cache-statistics log line. Not exact
    /// under concurrent writers, which is fine for an operational log.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn evict_one(&self) {
        if let Some(oldest_key) = self
            .entries
            .iter()
            .min_by_key(|e| e.value().expires_at)
            .map(|e| e.key().clone())
        {
            self.entries.remove(&oldest_key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Algorithm, FailMode, Scope};
    use crate::repository::memory::MemoryRepositories;

    fn policy() -> Policy {
        Policy {
            id: Uuid::new_v4(),
            name: "p".into(),
            tenant_id: None,
            scope: Scope::Global,
            algorithm: Algorithm::TokenBucket,
            max_requests: 10,
            window_seconds: 60,
            burst_capacity: None,
            refill_rate: None,
            fail_mode: FailMode::FailClosed,
            enabled: true,
            is_default: true,
        }
    }

    fn request() -> CheckRequest {
        CheckRequest {
            identifier: "x".into(),
            scope: Scope::Global,
            policy_id: None,
            tenant_id: None,
            ip_address: None,
            api_key: None,
            resource: None,
            method: None,
        }
    }

    #[tokio::test]
    async fn caches_successful_resolution() {
        let repos = Arc::new(MemoryRepositories::new());
        let global = policy();
        repos.policies.insert(global.id, global.clone());
        let resolver = PolicyResolver::new(repos.clone(), repos.clone(), repos.clone(), repos.clone(), repos.clone(), repos);
        let cache = PolicyCache::new(resolver, Duration::from_secs(60), 100);

        let first = cache.resolve(&request()).await.unwrap();
        assert_eq!(first.id, global.id);
        assert_eq!(cache.entries.len(), 1);

        let second = cache.resolve(&request()).await.unwrap();
        assert_eq!(second.id, global.id);
    }

    #[tokio::test]
    async fn does_not_cache_not_found() {
        let repos = Arc::new(MemoryRepositories::new());
        let resolver = PolicyResolver::new(repos.clone(), repos.clone(), repos.clone(), repos.clone(), repos.clone(), repos);
        let cache = PolicyCache::new(resolver, Duration::from_secs(60), 100);

        assert!(cache.resolve(&request()).await.is_err());
        assert_eq!(cache.entries.len(), 0);
    }

    #[tokio::test]
    async fn invalidate_policy_drops_matching_entries() {
        let repos = Arc::new(MemoryRepositories::new());
        let global = policy();
        repos.policies.insert(global.id, global.clone());
        let resolver = PolicyResolver::new(repos.clone(), repos.clone(), repos.clone(), repos.clone(), repos.clone(), repos);
        let cache = PolicyCache::new(resolver, Duration::from_secs(60), 100);

        cache.resolve(&request()).await.unwrap();
        assert_eq!(cache.entries.len(), 1);
        cache.invalidate_policy(global.id);
        assert_eq!(cache.entries.len(), 0);
    }
}
