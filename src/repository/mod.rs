mod error;
pub mod memory;
pub mod postgres;

pub use error::RepositoryError;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::net::IpAddr;
use uuid::Uuid;

use crate::domain::{AlertRule, ApiKey, IpRule, Policy, PolicyRule, RateLimitEvent, Tenant, UserPolicy};

#[async_trait]
pub trait PolicyRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Policy>, RepositoryError>;
    async fn find_default_for_tenant(&self, tenant_id: Uuid) -> Result<Option<Policy>, RepositoryError>;
    async fn find_global_default(&self) -> Result<Option<Policy>, RepositoryError>;
}

#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Tenant>, RepositoryError>;
}

#[async_trait]
pub trait ApiKeyRepository: Send + Sync {
    async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, RepositoryError>;
}

#[async_trait]
pub trait IpRuleRepository: Send + Sync {
    /// All enabled rate-limit rules visible to `tenant_id` (global rules have
    /// `tenant_id = None` and apply everywhere); the caller narrows this down
    /// with [`IpRule::matches`] and [`IpRule::precedence_key`].
    async fn find_candidates(&self, tenant_id: Option<Uuid>, ip: IpAddr) -> Result<Vec<IpRule>, RepositoryError>;
}

#[async_trait]
pub trait UserPolicyRepository: Send + Sync {
    async fn find_for_user(&self, tenant_id: Uuid, user_id: &str) -> Result<Option<UserPolicy>, RepositoryError>;
}

#[async_trait]
pub trait PolicyRuleRepository: Send + Sync {
    async fn find_enabled(&self) -> Result<Vec<PolicyRule>, RepositoryError>;
}

#[async_trait]
pub trait AlertRuleRepository: Send + Sync {
    async fn find_enabled(&self) -> Result<Vec<AlertRule>, RepositoryError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<AlertRule>, RepositoryError>;
    async fn update_last_triggered(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), RepositoryError>;
}

#[derive(Debug, Clone, Copy)]
pub struct EventCounts {
    pub total: i64,
    pub allowed: i64,
}

impl EventCounts {
    pub fn denied(&self) -> i64 {
        self.total - self.allowed
    }

    pub fn deny_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.denied() as f64 / self.total as f64
        }
    }
}

#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn insert_batch(&self, events: &[RateLimitEvent]) -> Result<(), RepositoryError>;

    /// Counts over the half-open interval `[from, to)`.
    async fn counts(&self, policy_id: Uuid, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<EventCounts, RepositoryError>;

    async fn rejected_by_identifier_since(
        &self,
        policy_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<(String, i64)>, RepositoryError>;
}
