use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Histogram bucket boundaries for check latency (seconds).
const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Thin handle around the global metrics recorder.
///
/// After `Metrics::install()` the `metrics` crate macros (`counter!`, `gauge!`,
/// `histogram!`) can be used anywhere in the codebase. The `PrometheusHandle`
/// is retained solely for rendering the `/metrics` endpoint.
#[derive(Clone)]
pub struct Metrics {
    handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and register metric descriptions.
    ///
    /// Must be called **once** at startup before any `counter!` / `gauge!` /
    /// `histogram!` calls.
    pub fn install() -> Self {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                metrics_exporter_prometheus::Matcher::Suffix("_duration_seconds".to_string()),
                LATENCY_BUCKETS,
            )
            .expect("valid matcher")
            .install_recorder()
            .expect("failed to install metrics recorder");

        // --- check path ---
        describe_counter!(
            "ratelimit_checks_total",
            Unit::Count,
            "Total rate limit checks processed, labeled by verdict/algorithm/scope"
        );
        describe_histogram!(
            "ratelimit_check_duration_seconds",
            Unit::Seconds,
            "Time to resolve and evaluate a single check"
        );

        // --- resilience envelope ---
        describe_gauge!(
            "ratelimit_circuit_breaker_state",
            Unit::Count,
            "Per-policy circuit breaker state: 0=closed 1=open 2=half_open"
        );
        describe_counter!(
            "ratelimit_circuit_breaker_transitions_total",
            Unit::Count,
            "Total circuit breaker state transitions"
        );
        describe_counter!(
            "ratelimit_retry_attempts_total",
            Unit::Count,
            "Total counter-store retry attempts"
        );

        // --- event sink ---
        describe_counter!(
            "ratelimit_events_enqueued_total",
            Unit::Count,
            "Total rate limit events submitted to the event sink"
        );
        describe_counter!(
            "ratelimit_events_dropped_total",
            Unit::Count,
            "Total rate limit events dropped, labeled by reason"
        );
        describe_counter!(
            "ratelimit_events_persisted_total",
            Unit::Count,
            "Total rate limit events persisted to the event store"
        );

        // --- policy cache ---
        describe_counter!(
            "ratelimit_policy_cache_hits_total",
            Unit::Count,
            "Total policy cache hits"
        );
        describe_counter!(
            "ratelimit_policy_cache_misses_total",
            Unit::Count,
            "Total policy cache misses"
        );

        // --- alerting ---
        describe_counter!(
            "ratelimit_alerts_fired_total",
            Unit::Count,
            "Total alert rules fired"
        );
        describe_counter!(
            "ratelimit_notifier_failures_total",
            Unit::Count,
            "Total notifier send failures, labeled by notifier name"
        );

        Self { handle }
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
