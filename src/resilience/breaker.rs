use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Circuit breaker state machine: Closed → Open → HalfOpen → Closed/Open.
///
/// Per-policy granularity — each policy gets its own breaker, keyed on
/// `policy_id`, so one tenant's flaky backend can't trip limits for
/// everyone else's policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Percentage (0-100) of failed calls in the window that trips the breaker.
    #[serde(default = "default_failure_rate_threshold")]
    pub failure_rate_threshold: f64,
    /// Percentage (0-100) of slow calls in the window that trips the breaker.
    #[serde(default = "default_slow_call_rate_threshold")]
    pub slow_call_rate_threshold: f64,
    /// A call slower than this (in milliseconds) counts toward the slow-call rate.
    #[serde(default = "default_slow_call_duration_ms")]
    pub slow_call_duration_ms: u64,
    /// Minimum number of calls recorded before rates are evaluated.
    #[serde(default = "default_minimum_calls")]
    pub minimum_calls: u32,
    /// Number of most recent calls kept for rate computation.
    #[serde(default = "default_sliding_window_size")]
    pub sliding_window_size: usize,
    #[serde(default = "default_wait_duration_in_open_secs")]
    pub wait_duration_in_open_secs: u64,
    #[serde(default = "default_permitted_calls_in_half_open")]
    pub permitted_calls_in_half_open: u32,
}

impl BreakerConfig {
    pub fn slow_call_duration(&self) -> Duration {
        Duration::from_millis(self.slow_call_duration_ms)
    }

    pub fn wait_duration_in_open(&self) -> Duration {
        Duration::from_secs(self.wait_duration_in_open_secs)
    }
}

fn default_failure_rate_threshold() -> f64 {
    50.0
}
fn default_slow_call_rate_threshold() -> f64 {
    100.0
}
fn default_slow_call_duration_ms() -> u64 {
    1_000
}
fn default_minimum_calls() -> u32 {
    10
}
fn default_sliding_window_size() -> usize {
    50
}
fn default_wait_duration_in_open_secs() -> u64 {
    30
}
fn default_permitted_calls_in_half_open() -> u32 {
    5
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: default_failure_rate_threshold(),
            slow_call_rate_threshold: default_slow_call_rate_threshold(),
            slow_call_duration_ms: default_slow_call_duration_ms(),
            minimum_calls: default_minimum_calls(),
            sliding_window_size: default_sliding_window_size(),
            wait_duration_in_open_secs: default_wait_duration_in_open_secs(),
            permitted_calls_in_half_open: default_permitted_calls_in_half_open(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CallOutcome {
    pub success: bool,
    pub elapsed: Duration,
}

pub enum BreakerCheck {
    Allowed,
    Probe,
    Rejected,
}

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

struct PolicyBreaker {
    policy_id: Uuid,
    state: AtomicU8,
    half_open_successes: AtomicU32,
    half_open_probes: AtomicU32,
    opened_at: Mutex<Option<Instant>>,
    window: Mutex<VecDeque<CallOutcome>>,
    config: BreakerConfig,
}

impl PolicyBreaker {
    fn new(policy_id: Uuid, config: BreakerConfig) -> Self {
        Self {
            policy_id,
            state: AtomicU8::new(STATE_CLOSED),
            half_open_successes: AtomicU32::new(0),
            half_open_probes: AtomicU32::new(0),
            opened_at: Mutex::new(None),
            window: Mutex::new(VecDeque::with_capacity(config.sliding_window_size)),
            config,
        }
    }

    fn check(&self) -> BreakerCheck {
        let state = self.state.load(Ordering::Acquire);
        match state {
            STATE_CLOSED => BreakerCheck::Allowed,
            STATE_OPEN => {
                let mut opened_at = self.opened_at.lock().expect("breaker mutex poisoned");
                if let Some(at) = *opened_at {
                    if at.elapsed() >= self.config.wait_duration_in_open() {
                        *opened_at = None;
                        drop(opened_at);
                        if self
                            .state
                            .compare_exchange(STATE_OPEN, STATE_HALF_OPEN, Ordering::AcqRel, Ordering::Acquire)
                            .is_ok()
                        {
                            self.half_open_successes.store(0, Ordering::Relaxed);
                            self.half_open_probes.store(0, Ordering::Relaxed);
                            self.record_transition("half_open", 2);
                            return BreakerCheck::Probe;
                        }
                        return BreakerCheck::Rejected;
                    }
                }
                BreakerCheck::Rejected
            }
            STATE_HALF_OPEN => {
                let probes = self.half_open_probes.fetch_add(1, Ordering::AcqRel) + 1;
                if probes <= self.config.permitted_calls_in_half_open {
                    BreakerCheck::Probe
                } else {
                    BreakerCheck::Rejected
                }
            }
            _ => BreakerCheck::Allowed,
        }
    }

    fn record(&self, outcome: CallOutcome) {
        let state = self.state.load(Ordering::Acquire);
        match state {
            STATE_CLOSED => self.record_closed(outcome),
            STATE_HALF_OPEN => self.record_half_open(outcome),
            _ => {}
        }
    }

    fn record_closed(&self, outcome: CallOutcome) {
        let mut window = self.window.lock().expect("breaker mutex poisoned");
        if window.len() == self.config.sliding_window_size {
            window.pop_front();
        }
        window.push_back(outcome);

        if (window.len() as u32) < self.config.minimum_calls {
            return;
        }

        let total = window.len() as f64;
        let failures = window.iter().filter(|o| !o.success).count() as f64;
        let slow = window
            .iter()
            .filter(|o| o.elapsed >= self.config.slow_call_duration())
            .count() as f64;
        let failure_rate = failures / total * 100.0;
        let slow_rate = slow / total * 100.0;
        drop(window);

        if failure_rate >= self.config.failure_rate_threshold || slow_rate >= self.config.slow_call_rate_threshold {
            self.trip();
        }
    }

    fn record_half_open(&self, outcome: CallOutcome) {
        if !outcome.success || outcome.elapsed >= self.config.slow_call_duration() {
            self.trip();
            return;
        }
        let count = self.half_open_successes.fetch_add(1, Ordering::AcqRel) + 1;
        if count >= self.config.permitted_calls_in_half_open {
            self.state.store(STATE_CLOSED, Ordering::Release);
            self.window.lock().expect("breaker mutex poisoned").clear();
            tracing::info!("circuit_breaker: closed (recovered after {count} half-open successes)");
            self.record_transition("closed", 0);
        }
    }

    fn trip(&self) {
        self.state.store(STATE_OPEN, Ordering::Release);
        *self.opened_at.lock().expect("breaker mutex poisoned") = Some(Instant::now());
        tracing::warn!("circuit_breaker: opened");
        self.record_transition("open", 1);
    }

    fn record_transition(&self, state: &'static str, gauge_value: u8) {
        let policy_id = self.policy_id.to_string();
        metrics::counter!("ratelimit_circuit_breaker_transitions_total", "policy_id" => policy_id.clone(), "state" => state)
            .increment(1);
        metrics::gauge!("ratelimit_circuit_breaker_state", "policy_id" => policy_id).set(gauge_value as f64);
    }
}

/// Registry of per-policy breakers, created lazily on first use.
pub struct BreakerRegistry {
    breakers: DashMap<Uuid, Arc<PolicyBreaker>>,
    default_config: BreakerConfig,
}

impl BreakerRegistry {
    pub fn new(default_config: BreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            default_config,
        }
    }

    pub fn check(&self, policy_id: Uuid) -> BreakerCheck {
        self.get_or_create(policy_id).check()
    }

    pub fn record(&self, policy_id: Uuid, outcome: CallOutcome) {
        self.get_or_create(policy_id).record(outcome);
    }

    pub fn is_open(&self, policy_id: Uuid) -> bool {
        matches!(self.check(policy_id), BreakerCheck::Rejected)
    }

    fn get_or_create(&self, policy_id: Uuid) -> Arc<PolicyBreaker> {
        if let Some(entry) = self.breakers.get(&policy_id) {
            return entry.value().clone();
        }
        self.breakers
            .entry(policy_id)
            .or_insert_with(|| Arc::new(PolicyBreaker::new(policy_id, self.default_config.clone())))
            .clone()
    }
}
