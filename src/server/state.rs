use std::sync::Arc;

use crate::alerts::AlertEvaluator;
use crate::config::RateLimiterConfig;
use crate::events::EventSink;
use crate::metrics::Metrics;
use crate::metrics_agg::MetricsAggregator;
use crate::orchestrator::Orchestrator;

/// Shared service state, cheaply cloneable. Composed of the pieces each
/// server loop needs: the check path touches only `orchestrator`; the admin
/// path touches `metrics` and `alerts` (for `testAlert`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RateLimiterConfig>,
    pub metrics: Metrics,
    pub orchestrator: Arc<Orchestrator>,
    pub metrics_aggregator: Arc<MetricsAggregator>,
    pub alerts: Arc<AlertEvaluator>,
    pub events: Arc<EventSink>,
}
