use serde::{Deserialize, Serialize};

use crate::alerts::AlertEvaluatorConfig;
use crate::alerts::notifiers::EmailConfig;
use crate::events::EventSinkConfig;
use crate::repository::postgres::PostgresConfig;
use crate::resilience::{BreakerConfig, RetryConfig};
use crate::store::RedisStoreConfig;

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub breaker: BreakerConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub policy_cache: PolicyCacheConfig,

    #[serde(default)]
    pub event_sink: EventSinkConfig,

    #[serde(default)]
    pub alerting: AlertingConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub listen: ListenConfig,
}

/// Selects the counter-store and repository backends. Both default to the
/// in-memory adapters so the service starts with zero configuration for
/// local development and tests; production deployments set `counters.backend
/// = "redis"` and `repository.backend = "postgres"`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub counters: CounterStoreConfig,

    #[serde(default)]
    pub repository: RepositoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum CounterStoreConfig {
    Memory,
    Redis(RedisStoreConfig),
}

impl Default for CounterStoreConfig {
    fn default() -> Self {
        CounterStoreConfig::Memory
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum RepositoryConfig {
    Memory,
    Postgres(PostgresConfig),
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        RepositoryConfig::Memory
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyCacheConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,

    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

impl Default for PolicyCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
            max_entries: default_cache_max_entries(),
        }
    }
}

fn default_cache_ttl_secs() -> u64 {
    30
}

fn default_cache_max_entries() -> usize {
    100_000
}

/// Alert evaluator tick timing plus the set of notifiers to fan out to.
/// Each notifier section is `None` when the operator has not configured it;
/// the log notifier is always constructed (it has no external dependency)
/// and defaults to enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertingConfig {
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,

    #[serde(default = "default_true")]
    pub log_notifier_enabled: bool,

    #[serde(default)]
    pub webhook: Option<WebhookConfig>,

    #[serde(default)]
    pub slack: Option<SlackConfig>,

    #[serde(default)]
    pub email: Option<EmailConfig>,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            initial_delay_secs: default_initial_delay_secs(),
            log_notifier_enabled: true,
            webhook: None,
            slack: None,
            email: None,
        }
    }
}

impl AlertingConfig {
    pub fn evaluator_config(&self) -> AlertEvaluatorConfig {
        AlertEvaluatorConfig {
            tick_interval: std::time::Duration::from_secs(self.tick_interval_secs),
            initial_delay: std::time::Duration::from_secs(self.initial_delay_secs),
        }
    }
}

fn default_tick_interval_secs() -> u64 {
    60
}

fn default_initial_delay_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    pub webhook_url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Intervals for the two scheduler hooks: alert evaluation owns its own
/// timing (`AlertingConfig`) — this section covers the operational
/// cache-statistics tick only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_cache_stats_interval_secs")]
    pub cache_stats_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cache_stats_interval_secs: default_cache_stats_interval_secs(),
        }
    }
}

fn default_cache_stats_interval_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    #[serde(default = "default_check_listen")]
    pub check: String,

    #[serde(default = "default_admin_listen")]
    pub admin: String,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            check: default_check_listen(),
            admin: default_admin_listen(),
        }
    }
}

fn default_check_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_admin_listen() -> String {
    "0.0.0.0:9091".to_string()
}
