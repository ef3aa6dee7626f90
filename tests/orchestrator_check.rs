use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ratelimitd::algorithm::AlgorithmRegistry;
use ratelimitd::domain::{Algorithm, CheckRequest, DenyReason, FailMode, Policy, Scope};
use ratelimitd::events::{EventSink, EventSinkConfig};
use ratelimitd::orchestrator::Orchestrator;
use ratelimitd::policy::{PolicyCache, PolicyResolver};
use ratelimitd::repository::memory::MemoryRepositories;
use ratelimitd::resilience::{BreakerConfig, BreakerRegistry, RetryConfig};
use ratelimitd::store::{CounterOutcome, CounterStore, MemoryCounterStore, StoreError};
use uuid::Uuid;

/// A store every call fails against, used to drive the circuit breaker open.
#[derive(Default)]
struct AlwaysFailingStore;

#[async_trait]
impl CounterStore for AlwaysFailingStore {
    async fn take_token_bucket(
        &self,
        _key: &str,
        _capacity: i64,
        _refill_rate: f64,
        _window_seconds: u32,
        _now_ms: i64,
    ) -> Result<CounterOutcome, StoreError> {
        Err(StoreError::Backend("store unavailable".into()))
    }

    async fn take_fixed_window(
        &self,
        _key: &str,
        _limit: i64,
        _window_seconds: u32,
        _now_sec: i64,
    ) -> Result<CounterOutcome, StoreError> {
        Err(StoreError::Backend("store unavailable".into()))
    }

    async fn take_sliding_log(
        &self,
        _key: &str,
        _limit: i64,
        _window_seconds: u32,
        _now_ms: i64,
    ) -> Result<CounterOutcome, StoreError> {
        Err(StoreError::Backend("store unavailable".into()))
    }

    async fn delete_by_pattern(&self, _pattern: &str) -> Result<u64, StoreError> {
        Ok(0)
    }
}

fn token_bucket_policy(max_requests: u32, fail_mode: FailMode) -> Policy {
    Policy {
        id: Uuid::new_v4(),
        name: "global-default".into(),
        tenant_id: None,
        scope: Scope::Global,
        algorithm: Algorithm::TokenBucket,
        max_requests,
        window_seconds: 60,
        burst_capacity: None,
        refill_rate: None,
        fail_mode,
        enabled: true,
        is_default: true,
    }
}

fn build_orchestrator(policy: Policy) -> (Arc<Orchestrator>, Arc<MemoryRepositories>) {
    let repos = Arc::new(MemoryRepositories::new());
    repos.policies.insert(policy.id, policy);

    let resolver = PolicyResolver::new(
        repos.clone(),
        repos.clone(),
        repos.clone(),
        repos.clone(),
        repos.clone(),
        repos.clone(),
    );
    let cache = PolicyCache::new(resolver, Duration::from_secs(30), 1_000);

    let breakers = Arc::new(BreakerRegistry::new(BreakerConfig::default()));
    let events = EventSink::start(EventSinkConfig::default(), repos.clone());
    let store = Arc::new(MemoryCounterStore::default());

    let orchestrator = Arc::new(Orchestrator::new(
        cache,
        AlgorithmRegistry::default(),
        store,
        breakers,
        RetryConfig::default(),
        events,
    ));

    (orchestrator, repos)
}

fn build_orchestrator_with_failing_store(policy: Policy) -> Arc<Orchestrator> {
    let repos = Arc::new(MemoryRepositories::new());
    repos.policies.insert(policy.id, policy);

    let resolver = PolicyResolver::new(
        repos.clone(),
        repos.clone(),
        repos.clone(),
        repos.clone(),
        repos.clone(),
        repos.clone(),
    );
    let cache = PolicyCache::new(resolver, Duration::from_secs(30), 1_000);

    let breaker_config = BreakerConfig {
        minimum_calls: 2,
        sliding_window_size: 2,
        wait_duration_in_open_secs: 60,
        ..BreakerConfig::default()
    };
    let breakers = Arc::new(BreakerRegistry::new(breaker_config));
    let events = EventSink::start(EventSinkConfig::default(), repos.clone());
    let store = Arc::new(AlwaysFailingStore);

    Arc::new(Orchestrator::new(
        cache,
        AlgorithmRegistry::default(),
        store,
        breakers,
        RetryConfig { max_attempts: 1, ..RetryConfig::default() },
        events,
    ))
}

fn request() -> CheckRequest {
    CheckRequest {
        identifier: "user-1".into(),
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
async fn allows_requests_within_the_policy_limit() {
    let (orchestrator, _repos) = build_orchestrator(token_bucket_policy(5, FailMode::FailClosed));

    let result = orchestrator.check(&request()).await;

    assert!(result.allowed);
    assert_eq!(result.limit, 5);
    assert_eq!(result.remaining, 4);
}

#[tokio::test]
async fn denies_once_the_bucket_is_exhausted() {
    let (orchestrator, _repos) = build_orchestrator(token_bucket_policy(2, FailMode::FailClosed));

    for _ in 0..2 {
        let result = orchestrator.check(&request()).await;
        assert!(result.allowed);
    }

    let denied = orchestrator.check(&request()).await;
    assert!(!denied.allowed);
    assert_eq!(denied.reason, Some(DenyReason::RateLimitExceeded));
}

#[tokio::test]
async fn unknown_policy_id_is_reported_as_not_found() {
    let (orchestrator, _repos) = build_orchestrator(token_bucket_policy(5, FailMode::FailClosed));

    let mut req = request();
    req.policy_id = Some(Uuid::new_v4());

    let result = orchestrator.check(&req).await;
    assert!(!result.allowed);
    assert_eq!(result.reason, Some(DenyReason::PolicyNotFound));
}

#[tokio::test]
async fn disabled_policy_is_reported_as_disabled() {
    let mut policy = token_bucket_policy(5, FailMode::FailClosed);
    policy.enabled = false;
    let policy_id = policy.id;
    let (orchestrator, _repos) = build_orchestrator(policy);

    let mut req = request();
    req.policy_id = Some(policy_id);

    let result = orchestrator.check(&req).await;
    assert!(!result.allowed);
    assert_eq!(result.reason, Some(DenyReason::PolicyDisabled));
}

#[tokio::test]
async fn checked_requests_are_recorded_as_events() {
    let (orchestrator, repos) = build_orchestrator(token_bucket_policy(5, FailMode::FailClosed));

    orchestrator.check(&request()).await;

    // Events are submitted to a background queue; give the worker a moment.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(repos.events.read().unwrap().len(), 1);
}

#[tokio::test]
async fn fail_open_policy_allows_once_the_breaker_trips() {
    let orchestrator = build_orchestrator_with_failing_store(token_bucket_policy(5, FailMode::FailOpen));

    // Drive the breaker open: each of these checks hits the always-failing
    // store and is denied/allowed per fail_mode, but records a failure.
    for _ in 0..2 {
        orchestrator.check(&request()).await;
    }

    // The breaker is now open; this check never touches the store.
    let result = orchestrator.check(&request()).await;
    assert!(result.allowed);
    assert_eq!(result.remaining, 5);
    assert_eq!(result.limit, 5);
    assert_eq!(result.reset_in_seconds, 0);
}

#[tokio::test]
async fn fail_closed_policy_denies_once_the_breaker_trips() {
    let orchestrator = build_orchestrator_with_failing_store(token_bucket_policy(5, FailMode::FailClosed));

    for _ in 0..2 {
        orchestrator.check(&request()).await;
    }

    let result = orchestrator.check(&request()).await;
    assert!(!result.allowed);
    assert_eq!(result.reason, Some(DenyReason::CircuitBreakerOpen));
    assert_eq!(result.reset_in_seconds, 0);
    assert_eq!(result.retry_after_seconds, Some(0));
}

#[tokio::test]
async fn distinct_scopes_get_independent_limiter_keys() {
    let mut tenant_policy = token_bucket_policy(3, FailMode::FailClosed);
    tenant_policy.scope = Scope::User;
    let (orchestrator, _repos) = build_orchestrator(tenant_policy);

    let mut req_a = request();
    req_a.identifier = "user-a".into();
    let mut req_b = request();
    req_b.identifier = "user-b".into();

    for _ in 0..3 {
        assert!(orchestrator.check(&req_a).await.allowed);
    }
    assert!(!orchestrator.check(&req_a).await.allowed);

    // user-b has its own bucket and is unaffected by user-a's exhaustion.
    assert!(orchestrator.check(&req_b).await.allowed);
}
