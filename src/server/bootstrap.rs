use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Notify;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::alerts::notifiers::{EmailNotifier, LogNotifier, SlackNotifier, WebhookNotifier};
use crate::alerts::{AlertEvaluator, Notifier};
use crate::algorithm::AlgorithmRegistry;
use crate::config::{CounterStoreConfig, RateLimiterConfig, RepositoryConfig};
use crate::events::EventSink;
use crate::metrics::Metrics;
use crate::metrics_agg::MetricsAggregator;
use crate::orchestrator::Orchestrator;
use crate::policy::{PolicyCache, PolicyResolver};
use crate::repository::memory::MemoryRepositories;
use crate::repository::postgres::PostgresRepositories;
use crate::repository::{
    AlertRuleRepository, ApiKeyRepository, EventRepository, IpRuleRepository, PolicyRepository,
    PolicyRuleRepository, TenantRepository, UserPolicyRepository,
};
use crate::store::{CounterStore, MemoryCounterStore, RedisCounterStore};

use super::AppState;

/// CLI arguments forwarded from `main()`.
pub struct BootstrapArgs {
    pub config_path: std::path::PathBuf,
    pub listen: Option<String>,
    pub admin_listen: Option<String>,
}

/// Service lifecycle: init → wire → serve → shutdown.
pub async fn run(args: BootstrapArgs) -> Result<()> {
    init_tracing();

    let mut config = RateLimiterConfig::load(&args.config_path)?;
    if let Some(listen) = args.listen {
        config.listen.check = listen;
    }
    if let Some(admin_listen) = args.admin_listen {
        config.listen.admin = admin_listen;
    }

    let metrics = Metrics::install();

    let counters = build_counter_store(&config.storage.counters)?;
    let repos = build_repositories(&config.storage.repository).await?;

    let resolver = PolicyResolver::new(
        repos.policies.clone(),
        repos.tenants.clone(),
        repos.api_keys.clone(),
        repos.ip_rules.clone(),
        repos.user_policies.clone(),
        repos.policy_rules.clone(),
    );
    let cache = PolicyCache::new(
        resolver,
        std::time::Duration::from_secs(config.policy_cache.ttl_secs),
        config.policy_cache.max_entries,
    );

    let breakers = Arc::new(crate::resilience::BreakerRegistry::new(config.breaker.clone()));
    let events = EventSink::start(config.event_sink.clone(), repos.events.clone());

    let orchestrator = Arc::new(Orchestrator::new(
        cache,
        AlgorithmRegistry::default(),
        counters,
        breakers,
        config.retry.clone(),
        events.clone(),
    ));

    let metrics_aggregator = Arc::new(MetricsAggregator::new(repos.events.clone()));
    let notifiers = build_notifiers(&config);
    let alerts = Arc::new(AlertEvaluator::new(
        config.alerting.evaluator_config(),
        repos.alert_rules.clone(),
        repos.policies.clone(),
        metrics_aggregator.clone(),
        notifiers,
    ));

    let state = AppState {
        config: Arc::new(config.clone()),
        metrics,
        orchestrator,
        metrics_aggregator,
        alerts: alerts.clone(),
        events: events.clone(),
    };

    let shutdown = Arc::new(Notify::new());
    let alert_handle = alerts.clone().spawn();
    start_cache_stats_tick(&state, &config, &shutdown);

    tracing::info!("server: starting check api, listen={}", config.listen.check);
    let check_handle = tokio::spawn({
        let listen = config.listen.check.clone();
        let state = state.clone();
        let shutdown = shutdown.clone();
        async move { super::run_check_server(&listen, state, shutdown).await }
    });

    start_admin_server(&state, &config.listen.admin);

    wait_for_shutdown(&shutdown).await;

    alert_handle.abort();
    events.shutdown().await;

    if let Err(e) = check_handle.await {
        tracing::error!("server: check api task error: {}", e);
    }

    tracing::info!("server: shutdown complete");
    Ok(())
}

fn init_tracing() {
    let (non_blocking, _guard) = tracing_appender::non_blocking::NonBlockingBuilder::default()
        .buffered_lines_limit(128_000)
        .lossy(true)
        .finish(std::io::stdout());

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false)
                .json(),
        )
        .init();

    std::mem::forget(_guard);
}

fn build_counter_store(config: &CounterStoreConfig) -> Result<Arc<dyn CounterStore>> {
    match config {
        CounterStoreConfig::Memory => Ok(Arc::new(MemoryCounterStore::new())),
        CounterStoreConfig::Redis(redis_config) => {
            Ok(Arc::new(RedisCounterStore::new(redis_config)?))
        }
    }
}

/// Every trait-object handle the orchestrator, resolver, event sink, and
/// alert evaluator need, wired to whichever concrete backend the config
/// selects. Both `MemoryRepositories` and `PostgresRepositories` implement
/// every repository trait on a single struct, so each field below is a
/// clone of the same `Arc` cast to its narrower trait object.
struct Repositories {
    policies: Arc<dyn PolicyRepository>,
    tenants: Arc<dyn TenantRepository>,
    api_keys: Arc<dyn ApiKeyRepository>,
    ip_rules: Arc<dyn IpRuleRepository>,
    user_policies: Arc<dyn UserPolicyRepository>,
    policy_rules: Arc<dyn PolicyRuleRepository>,
    alert_rules: Arc<dyn AlertRuleRepository>,
    events: Arc<dyn EventRepository>,
}

async fn build_repositories(config: &RepositoryConfig) -> Result<Repositories> {
    match config {
        RepositoryConfig::Memory => {
            let repos = Arc::new(MemoryRepositories::new());
            Ok(Repositories {
                policies: repos.clone(),
                tenants: repos.clone(),
                api_keys: repos.clone(),
                ip_rules: repos.clone(),
                user_policies: repos.clone(),
                policy_rules: repos.clone(),
                alert_rules: repos.clone(),
                events: repos,
            })
        }
        RepositoryConfig::Postgres(pg_config) => {
            let pool = crate::repository::postgres::connect(pg_config).await?;
            let repos = Arc::new(PostgresRepositories::new(pool));
            Ok(Repositories {
                policies: repos.clone(),
                tenants: repos.clone(),
                api_keys: repos.clone(),
                ip_rules: repos.clone(),
                user_policies: repos.clone(),
                policy_rules: repos.clone(),
                alert_rules: repos.clone(),
                events: repos,
            })
        }
    }
}

fn build_notifiers(config: &RateLimiterConfig) -> Vec<Arc<dyn Notifier>> {
    let mut notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::new(LogNotifier::new(
        config.alerting.log_notifier_enabled,
    ))];

    if let Some(webhook) = &config.alerting.webhook {
        notifiers.push(Arc::new(WebhookNotifier::new(
            webhook.name.clone(),
            webhook.url.clone(),
            webhook.enabled,
        )));
    }

    if let Some(slack) = &config.alerting.slack {
        notifiers.push(Arc::new(SlackNotifier::new(
            slack.webhook_url.clone(),
            slack.enabled,
        )));
    }

    if let Some(email) = &config.alerting.email {
        match EmailNotifier::new(email.clone()) {
            Ok(notifier) => notifiers.push(Arc::new(notifier)),
            Err(err) => tracing::error!(error = %err, "alerts: email notifier misconfigured, skipping"),
        }
    }

    notifiers
}

fn start_cache_stats_tick(state: &AppState, config: &RateLimiterConfig, shutdown: &Arc<Notify>) {
    let interval = std::time::Duration::from_secs(config.scheduler.cache_stats_interval_secs);
    let events = state.events.clone();
    let shutdown = shutdown.clone();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.notified() => return,
            }
            let queued_events = events.queue_len().await;
            tracing::info!(queued_events, "scheduler: cache statistics tick");
        }
    });
}

fn start_admin_server(state: &AppState, admin_listen: &str) {
    let state = state.clone();
    let admin_addr = admin_listen.to_string();
    tokio::spawn(async move {
        if let Err(e) = super::run_admin_server(&admin_addr, state).await {
            tracing::error!("server: admin failed, error={}", e);
        }
    });
}

async fn wait_for_shutdown(shutdown: &Arc<Notify>) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("server: received SIGINT, shutting down"),
        _ = terminate => tracing::info!("server: received SIGTERM, shutting down"),
    }

    shutdown.notify_waiters();
}
