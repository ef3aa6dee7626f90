use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::net::IpAddr;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::{
    Algorithm, AlertRule, ApiKey, FailMode, IdentifierType, IpRule, Policy, PolicyRule, RateLimitEvent, RuleType,
    Scope, Tenant, UserPolicy,
};

use super::super::{
    AlertRuleRepository, ApiKeyRepository, EventCounts, EventRepository, IpRuleRepository, PolicyRepository,
    PolicyRuleRepository, RepositoryError, TenantRepository, UserPolicyRepository,
};

/// Bundles every repository trait over one shared [`PgPool`]. Cheap to
/// clone; callers hand out `Arc<PostgresRepositories>` from the
/// composition root.
#[derive(Clone)]
pub struct PostgresRepositories {
    pool: PgPool,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_scope(s: &str) -> Scope {
    match s {
        "TENANT" => Scope::Tenant,
        "USER" => Scope::User,
        "API" => Scope::Api,
        "IP" => Scope::Ip,
        _ => Scope::Global,
    }
}

fn parse_algorithm(s: &str) -> Algorithm {
    match s {
        "FIXED_WINDOW" => Algorithm::FixedWindow,
        "SLIDING_LOG" => Algorithm::SlidingLog,
        _ => Algorithm::TokenBucket,
    }
}

fn parse_fail_mode(s: &str) -> FailMode {
    match s {
        "FAIL_OPEN" => FailMode::FailOpen,
        _ => FailMode::FailClosed,
    }
}

fn row_to_policy(row: &sqlx::postgres::PgRow) -> Policy {
    Policy {
        id: row.get("id"),
        name: row.get("name"),
        tenant_id: row.get("tenant_id"),
        scope: parse_scope(row.get::<String, _>("scope").as_str()),
        algorithm: parse_algorithm(row.get::<String, _>("algorithm").as_str()),
        max_requests: row.get::<i32, _>("max_requests") as u32,
        window_seconds: row.get::<i32, _>("window_seconds") as u32,
        burst_capacity: row.get::<Option<i32>, _>("burst_capacity").map(|v| v as u32),
        refill_rate: row.get("refill_rate"),
        fail_mode: parse_fail_mode(row.get::<String, _>("fail_mode").as_str()),
        enabled: row.get("enabled"),
        is_default: row.get("is_default"),
    }
}

const POLICY_COLUMNS: &str =
    "id, name, tenant_id, scope, algorithm, max_requests, window_seconds, burst_capacity, refill_rate, fail_mode, enabled, is_default";

#[async_trait]
impl PolicyRepository for PostgresRepositories {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Policy>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {POLICY_COLUMNS} FROM policies WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_policy))
    }

    async fn find_default_for_tenant(&self, tenant_id: Uuid) -> Result<Option<Policy>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {POLICY_COLUMNS} FROM policies WHERE tenant_id = $1 AND is_default = TRUE AND enabled = TRUE LIMIT 1"
        ))
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_policy))
    }

    async fn find_global_default(&self) -> Result<Option<Policy>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {POLICY_COLUMNS} FROM policies WHERE tenant_id IS NULL AND is_default = TRUE AND enabled = TRUE LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_policy))
    }
}

#[async_trait]
impl TenantRepository for PostgresRepositories {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Tenant>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, tier, enabled FROM tenants WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Tenant {
            id: r.get("id"),
            name: r.get("name"),
            tier: r.get("tier"),
            enabled: r.get("enabled"),
        }))
    }
}

#[async_trait]
impl ApiKeyRepository for PostgresRepositories {
    async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, key_hash, key_prefix, tenant_id, policy_id, enabled, expires_at FROM api_keys WHERE key_hash = $1",
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| ApiKey {
            id: r.get("id"),
            key_hash: r.get("key_hash"),
            key_prefix: r.get("key_prefix"),
            tenant_id: r.get("tenant_id"),
            policy_id: r.get("policy_id"),
            enabled: r.get("enabled"),
            expires_at: r.get("expires_at"),
        }))
    }
}

#[async_trait]
impl IpRuleRepository for PostgresRepositories {
    async fn find_candidates(&self, tenant_id: Option<Uuid>, _ip: IpAddr) -> Result<Vec<IpRule>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, rule_type, ip_address, ip_cidr, tenant_id, policy_id, enabled, created_at \
             FROM ip_rules WHERE enabled = TRUE AND (tenant_id IS NULL OR tenant_id = $1)",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|r| {
                let rule_type_str: String = r.get("rule_type");
                let rule_type = match rule_type_str.as_str() {
                    "BLACKLIST" => RuleType::Blacklist,
                    "WHITELIST" => RuleType::Whitelist,
                    _ => RuleType::RateLimit,
                };
                let ip_address: Option<String> = r.get("ip_address");
                let ip_cidr: Option<String> = r.get("ip_cidr");
                Some(IpRule {
                    id: r.get("id"),
                    rule_type,
                    ip_address: ip_address.and_then(|s| IpAddr::from_str(&s).ok()),
                    ip_cidr: ip_cidr.and_then(|s| ipnetwork::IpNetwork::from_str(&s).ok()),
                    tenant_id: r.get("tenant_id"),
                    policy_id: r.get("policy_id"),
                    enabled: r.get("enabled"),
                    created_at: r.get("created_at"),
                })
            })
            .collect())
    }
}

#[async_trait]
impl UserPolicyRepository for PostgresRepositories {
    async fn find_for_user(&self, tenant_id: Uuid, user_id: &str) -> Result<Option<UserPolicy>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, user_id, tenant_id, policy_id, enabled FROM user_policies \
             WHERE tenant_id = $1 AND user_id = $2 AND enabled = TRUE",
        )
        .bind(tenant_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| UserPolicy {
            id: r.get("id"),
            user_id: r.get("user_id"),
            tenant_id: r.get("tenant_id"),
            policy_id: r.get("policy_id"),
            enabled: r.get("enabled"),
        }))
    }
}

#[async_trait]
impl PolicyRuleRepository for PostgresRepositories {
    async fn find_enabled(&self) -> Result<Vec<PolicyRule>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, policy_id, resource_pattern, methods, priority, enabled, created_at \
             FROM policy_rules WHERE enabled = TRUE",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| PolicyRule {
                id: r.get("id"),
                policy_id: r.get("policy_id"),
                resource_pattern: r.get("resource_pattern"),
                methods: r.get("methods"),
                priority: r.get("priority"),
                enabled: r.get("enabled"),
                created_at: r.get("created_at"),
            })
            .collect())
    }
}

#[async_trait]
impl AlertRuleRepository for PostgresRepositories {
    async fn find_enabled(&self) -> Result<Vec<AlertRule>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, policy_id, threshold_percentage, window_seconds, cooldown_seconds, enabled, last_triggered_at \
             FROM alert_rules WHERE enabled = TRUE",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| AlertRule {
                id: r.get("id"),
                name: r.get("name"),
                policy_id: r.get("policy_id"),
                threshold_percentage: r.get("threshold_percentage"),
                window_seconds: r.get::<i32, _>("window_seconds") as u32,
                cooldown_seconds: r.get::<i32, _>("cooldown_seconds") as u32,
                enabled: r.get("enabled"),
                last_triggered_at: r.get("last_triggered_at"),
            })
            .collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AlertRule>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, policy_id, threshold_percentage, window_seconds, cooldown_seconds, enabled, last_triggered_at \
             FROM alert_rules WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| AlertRule {
            id: r.get("id"),
            name: r.get("name"),
            policy_id: r.get("policy_id"),
            threshold_percentage: r.get("threshold_percentage"),
            window_seconds: r.get::<i32, _>("window_seconds") as u32,
            cooldown_seconds: r.get::<i32, _>("cooldown_seconds") as u32,
            enabled: r.get("enabled"),
            last_triggered_at: r.get("last_triggered_at"),
        }))
    }

    async fn update_last_triggered(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE alert_rules SET last_triggered_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn identifier_type_str(kind: IdentifierType) -> &'static str {
    match kind {
        IdentifierType::User => "USER",
        IdentifierType::ApiKey => "API_KEY",
        IdentifierType::Ip => "IP",
        IdentifierType::Tenant => "TENANT",
        IdentifierType::Global => "GLOBAL",
    }
}

#[async_trait]
impl EventRepository for PostgresRepositories {
    async fn insert_batch(&self, events: &[RateLimitEvent]) -> Result<(), RepositoryError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for event in events {
            sqlx::query(
                "INSERT INTO rate_limit_events \
                 (policy_id, identifier, identifier_type, allowed, remaining, limit_value, ip_address, resource, event_time, partition_key) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(event.policy_id)
            .bind(&event.identifier)
            .bind(identifier_type_str(event.identifier_type))
            .bind(event.allowed)
            .bind(event.remaining)
            .bind(event.limit_value)
            .bind(event.ip_address.map(|ip| ip.to_string()))
            .bind(&event.resource)
            .bind(event.event_time)
            .bind(event.partition_key())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn counts(&self, policy_id: Uuid, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<EventCounts, RepositoryError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, COUNT(*) FILTER (WHERE allowed) AS allowed \
             FROM rate_limit_events WHERE policy_id = $1 AND event_time >= $2 AND event_time < $3",
        )
        .bind(policy_id)
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;

        Ok(EventCounts {
            total: row.get("total"),
            allowed: row.get("allowed"),
        })
    }

    async fn rejected_by_identifier_since(
        &self,
        policy_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<(String, i64)>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT identifier, COUNT(*) AS denied FROM rate_limit_events \
             WHERE policy_id = $1 AND event_time >= $2 AND allowed = FALSE \
             GROUP BY identifier ORDER BY denied DESC",
        )
        .bind(policy_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| (r.get("identifier"), r.get("denied"))).collect())
    }
}
