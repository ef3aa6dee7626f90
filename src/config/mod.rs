pub mod types;

pub use types::*;

use anyhow::Result;
use std::path::Path;

use crate::repository::postgres::PostgresConfig;
use crate::store::RedisStoreConfig;

impl RateLimiterConfig {
    /// Load configuration from a file (if it exists) and apply environment
    /// variable overrides for connection strings and secrets. When the file
    /// does not exist, built-in defaults are used — every backend defaults
    /// to its in-memory adapter, so the service starts with zero
    /// configuration for local development.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: RateLimiterConfig = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            match path.extension().and_then(|e| e.to_str()) {
                Some("toml") => toml::from_str(&content)?,
                Some("json") => serde_json::from_str(&content)?,
                Some(ext) => anyhow::bail!("unsupported config format: .{ext}, use .toml or .json"),
                None => anyhow::bail!("config file has no extension, use .toml or .json"),
            }
        } else {
            tracing::info!(
                "config file not found at {}, using defaults",
                path.display()
            );
            RateLimiterConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        tracing::info!("loaded rate limiter configuration");
        Ok(config)
    }

    /// Apply environment variable overrides for connection strings and
    /// secrets. Business config (policies, tenants, alert rules) is managed
    /// exclusively via the admin store — never from local files or env vars.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("RL_REDIS_URL") {
            self.storage.counters = CounterStoreConfig::Redis(RedisStoreConfig {
                url: v,
                pool_size: match &self.storage.counters {
                    CounterStoreConfig::Redis(existing) => existing.pool_size,
                    CounterStoreConfig::Memory => 16,
                },
                connection_timeout: match &self.storage.counters {
                    CounterStoreConfig::Redis(existing) => existing.connection_timeout,
                    CounterStoreConfig::Memory => std::time::Duration::from_secs(2),
                },
            });
        }

        if let Ok(v) = std::env::var("RL_DATABASE_URL") {
            self.storage.repository = RepositoryConfig::Postgres(PostgresConfig {
                url: v,
                pool_size: match &self.storage.repository {
                    RepositoryConfig::Postgres(existing) => existing.pool_size,
                    RepositoryConfig::Memory => 10,
                },
            });
        }

        if let Ok(v) = std::env::var("RL_LISTEN") {
            self.listen.check = v;
        }
        if let Ok(v) = std::env::var("RL_ADMIN_LISTEN") {
            self.listen.admin = v;
        }

        if let Ok(v) = std::env::var("RL_SLACK_WEBHOOK_URL") {
            self.alerting.slack = Some(SlackConfig {
                webhook_url: v,
                enabled: true,
            });
        }

        if let Ok(v) = std::env::var("RL_SMTP_PASSWORD") {
            if let Some(email) = self.alerting.email.as_mut() {
                email.password = Some(v);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let CounterStoreConfig::Redis(redis) = &self.storage.counters {
            if redis.url.is_empty() {
                anyhow::bail!("storage.counters.url cannot be empty when backend=redis");
            }
        }
        if let RepositoryConfig::Postgres(pg) = &self.storage.repository {
            if pg.url.is_empty() {
                anyhow::bail!("storage.repository.url cannot be empty when backend=postgres");
            }
        }
        if self.policy_cache.max_entries == 0 {
            anyhow::bail!("policy_cache.max_entries must be greater than zero");
        }
        Ok(())
    }
}
