use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;

use crate::algorithm::AlgorithmRegistry;
use crate::domain::{CheckRequest, DenyReason, FailMode, IdentifierType, Policy, RateLimitEvent, RateLimitResult, Scope};
use crate::events::EventSink;
use crate::policy::{PolicyCache, ResolveError};
use crate::resilience::{BreakerRegistry, EnvelopeOutcome, RetryConfig};
use crate::store::CounterStore;

/// Ties policy resolution (C4), the algorithm registry (C3), and the
/// resilience envelope (C2) into the single operation the HTTP layer calls:
/// resolve → derive key → check under retry/breaker → shape response → emit
/// event. No step here talks to a socket; this is pure orchestration.
pub struct Orchestrator {
    cache: PolicyCache,
    algorithms: AlgorithmRegistry,
    store: Arc<dyn CounterStore>,
    breakers: Arc<BreakerRegistry>,
    retry: RetryConfig,
    events: Arc<EventSink>,
}

impl Orchestrator {
    pub fn new(
        cache: PolicyCache,
        algorithms: AlgorithmRegistry,
        store: Arc<dyn CounterStore>,
        breakers: Arc<BreakerRegistry>,
        retry: RetryConfig,
        events: Arc<EventSink>,
    ) -> Self {
        Self {
            cache,
            algorithms,
            store,
            breakers,
            retry,
            events,
        }
    }

    pub async fn check(&self, request: &CheckRequest) -> RateLimitResult {
        if !request.is_valid() {
            return RateLimitResult::policy_not_found();
        }

        let policy = match self.cache.resolve(request).await {
            Ok(policy) => policy,
            Err(ResolveError::NotFound) => return RateLimitResult::policy_not_found(),
            Err(ResolveError::Disabled(id)) => return RateLimitResult::policy_disabled(id),
        };

        let key = limiter_key(request, &policy);
        let now_ms = now_ms();

        let algorithms = &self.algorithms;
        let store = self.store.clone();
        let policy_for_call = policy.clone();
        let key_for_call = key.clone();

        let outcome = crate::resilience::run_with_resilience(
            &self.breakers,
            policy.id,
            &self.retry,
            policy.fail_mode,
            || {
                let store = store.clone();
                let policy = policy_for_call.clone();
                let key = key_for_call.clone();
                async move {
                    algorithms.check(store.as_ref(), &policy, &key, now_ms).await.map_err(|err| match err {
                        crate::algorithm::AlgorithmError::Store(e) => e,
                        other => crate::store::StoreError::Backend(other.to_string()),
                    })
                }
            },
        )
        .await;

        let result = match outcome {
            EnvelopeOutcome::Completed(result) => result,
            EnvelopeOutcome::BreakerOpen => store_unavailable_result(&policy, policy.fail_mode),
            EnvelopeOutcome::Exhausted { fail_mode } => store_unavailable_result(&policy, fail_mode),
        };

        self.emit_event(request, &policy, &result);
        result
    }

    fn emit_event(&self, request: &CheckRequest, policy: &Policy, result: &RateLimitResult) {
        let event = RateLimitEvent {
            policy_id: policy.id,
            identifier: request.identifier.clone(),
            identifier_type: identifier_type_for(request.scope),
            allowed: result.allowed,
            remaining: result.remaining,
            limit_value: result.limit,
            ip_address: request.ip_address,
            resource: request.resource.clone(),
            event_time: Utc::now(),
        };
        self.events.submit(event);
    }
}

/// The counter key an algorithm takes a token against — namespaced by scope
/// so a policy's limit applies per-tenant, per-user, per-key, per-ip, or
/// globally, according to `policy.scope`.
fn limiter_key(request: &CheckRequest, policy: &Policy) -> String {
    match policy.scope {
        Scope::Global => "global".to_string(),
        Scope::Tenant => request
            .tenant_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| request.identifier.clone()),
        Scope::User => request.identifier.clone(),
        Scope::Api => request.api_key.clone().unwrap_or_else(|| request.identifier.clone()),
        Scope::Ip => request
            .ip_address
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| request.identifier.clone()),
    }
}

fn identifier_type_for(scope: Scope) -> IdentifierType {
    match scope {
        Scope::Global => IdentifierType::Global,
        Scope::Tenant => IdentifierType::Tenant,
        Scope::User => IdentifierType::User,
        Scope::Api => IdentifierType::ApiKey,
        Scope::Ip => IdentifierType::Ip,
    }
}

/// Both `BreakerOpen` and `Exhausted` mean the same thing to a caller: the
/// counter store is currently unreachable for this policy. `failMode`
/// governs the response the same way regardless of which of the two caused
/// it. There is no real reset/retry time to report since no counter was
/// actually consulted, so both shapes carry `0`.
fn store_unavailable_result(policy: &Policy, fail_mode: FailMode) -> RateLimitResult {
    match fail_mode {
        FailMode::FailOpen => RateLimitResult::allow(
            i64::from(policy.effective_capacity()),
            i64::from(policy.effective_capacity()),
            0,
            policy.id,
            policy.algorithm.as_str(),
        ),
        FailMode::FailClosed => fallback_result(policy, DenyReason::CircuitBreakerOpen),
    }
}

fn fallback_result(policy: &Policy, reason: DenyReason) -> RateLimitResult {
    RateLimitResult::deny(
        i64::from(policy.effective_capacity()),
        0,
        0,
        policy.id,
        policy.algorithm.as_str(),
        reason,
    )
}

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_millis() as i64
}
