use std::future::Future;
use std::time::{Duration, Instant};

use uuid::Uuid;

use super::breaker::{BreakerCheck, BreakerRegistry, CallOutcome};
use super::retry::RetryConfig;
use crate::domain::FailMode;
use crate::store::StoreError;

/// Outcome of running a counter-store call through retry + circuit breaker.
pub enum EnvelopeOutcome<T> {
    /// The call (possibly after retries) succeeded.
    Completed(T),
    /// The breaker was open; no attempt was made.
    BreakerOpen,
    /// Every attempt failed and retries were exhausted; `fail_mode` governs
    /// what the caller should do next.
    Exhausted { fail_mode: FailMode },
}

/// Runs `call` under the policy's circuit breaker, retrying transient store
/// failures with backoff. Retries are skipped entirely while the breaker is
/// open — a deliberate choice so an unhealthy backend is never hammered
/// harder by retry traffic.
pub async fn run_with_resilience<F, Fut, T>(
    breakers: &BreakerRegistry,
    policy_id: Uuid,
    retry: &RetryConfig,
    fail_mode: FailMode,
    mut call: F,
) -> EnvelopeOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    match breakers.check(policy_id) {
        BreakerCheck::Rejected => return EnvelopeOutcome::BreakerOpen,
        BreakerCheck::Allowed | BreakerCheck::Probe => {}
    }

    let mut attempt = 0u32;
    loop {
        let started = Instant::now();
        let result = call().await;
        let elapsed = started.elapsed();

        match result {
            Ok(value) => {
                breakers.record(policy_id, CallOutcome { success: true, elapsed });
                return EnvelopeOutcome::Completed(value);
            }
            Err(err) => {
                breakers.record(policy_id, CallOutcome { success: false, elapsed });
                tracing::warn!(policy_id = %policy_id, attempt, error = %err, "counter store call failed");

                if attempt + 1 >= retry.max_attempts {
                    return EnvelopeOutcome::Exhausted { fail_mode };
                }
                if breakers.is_open(policy_id) {
                    return EnvelopeOutcome::BreakerOpen;
                }

                metrics::counter!("ratelimit_retry_attempts_total", "policy_id" => policy_id.to_string()).increment(1);
                tokio::time::sleep(retry.delay_for(attempt)).await;
                attempt += 1;
            }
        }
    }
}

pub async fn with_deadline<Fut, T>(deadline: Duration, fut: Fut) -> Option<T>
where
    Fut: Future<Output = T>,
{
    tokio::time::timeout(deadline, fut).await.ok()
}
