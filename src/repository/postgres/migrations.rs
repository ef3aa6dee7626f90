use sqlx::PgPool;

use super::RepositoryError;

/// Creates every table this service needs if it does not already exist.
/// Raw SQL rather than a migration framework — this service owns a small,
/// stable schema and ships as a single binary.
pub async fn run_migrations(pool: &PgPool) -> Result<(), RepositoryError> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS tenants (
            id UUID PRIMARY KEY,
            name TEXT NOT NULL,
            tier TEXT NOT NULL DEFAULT 'default',
            enabled BOOLEAN NOT NULL DEFAULT TRUE
        )",
        "CREATE TABLE IF NOT EXISTS policies (
            id UUID PRIMARY KEY,
            name TEXT NOT NULL,
            tenant_id UUID REFERENCES tenants(id),
            scope TEXT NOT NULL,
            algorithm TEXT NOT NULL,
            max_requests INTEGER NOT NULL,
            window_seconds INTEGER NOT NULL,
            burst_capacity INTEGER,
            refill_rate DOUBLE PRECISION,
            fail_mode TEXT NOT NULL DEFAULT 'FAIL_CLOSED',
            enabled BOOLEAN NOT NULL DEFAULT TRUE,
            is_default BOOLEAN NOT NULL DEFAULT FALSE
        )",
        "CREATE TABLE IF NOT EXISTS api_keys (
            id UUID PRIMARY KEY,
            key_hash TEXT NOT NULL UNIQUE,
            key_prefix TEXT NOT NULL,
            tenant_id UUID NOT NULL REFERENCES tenants(id),
            policy_id UUID REFERENCES policies(id),
            enabled BOOLEAN NOT NULL DEFAULT TRUE,
            expires_at TIMESTAMPTZ
        )",
        "CREATE TABLE IF NOT EXISTS ip_rules (
            id UUID PRIMARY KEY,
            rule_type TEXT NOT NULL,
            ip_address TEXT,
            ip_cidr TEXT,
            tenant_id UUID REFERENCES tenants(id),
            policy_id UUID NOT NULL REFERENCES policies(id),
            enabled BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
        "CREATE TABLE IF NOT EXISTS user_policies (
            id UUID PRIMARY KEY,
            user_id TEXT NOT NULL,
            tenant_id UUID NOT NULL REFERENCES tenants(id),
            policy_id UUID NOT NULL REFERENCES policies(id),
            enabled BOOLEAN NOT NULL DEFAULT TRUE,
            UNIQUE (tenant_id, user_id)
        )",
        "CREATE TABLE IF NOT EXISTS policy_rules (
            id UUID PRIMARY KEY,
            policy_id UUID NOT NULL REFERENCES policies(id),
            resource_pattern TEXT NOT NULL,
            methods TEXT[] NOT NULL DEFAULT '{}',
            priority INTEGER NOT NULL DEFAULT 0,
            enabled BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
        "CREATE TABLE IF NOT EXISTS alert_rules (
            id UUID PRIMARY KEY,
            name TEXT NOT NULL,
            policy_id UUID NOT NULL REFERENCES policies(id),
            threshold_percentage DOUBLE PRECISION NOT NULL,
            window_seconds INTEGER NOT NULL,
            cooldown_seconds INTEGER NOT NULL,
            enabled BOOLEAN NOT NULL DEFAULT TRUE,
            last_triggered_at TIMESTAMPTZ
        )",
        "CREATE TABLE IF NOT EXISTS rate_limit_events (
            id BIGSERIAL PRIMARY KEY,
            policy_id UUID NOT NULL,
            identifier TEXT NOT NULL,
            identifier_type TEXT NOT NULL,
            allowed BOOLEAN NOT NULL,
            remaining BIGINT NOT NULL,
            limit_value BIGINT NOT NULL,
            ip_address TEXT,
            resource TEXT,
            event_time TIMESTAMPTZ NOT NULL,
            partition_key TEXT NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_events_policy_time ON rate_limit_events (policy_id, event_time)",
        "CREATE INDEX IF NOT EXISTS idx_events_identifier_time ON rate_limit_events (identifier, event_time)",
        "CREATE INDEX IF NOT EXISTS idx_events_partition ON rate_limit_events (partition_key)",
    ];

    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}
