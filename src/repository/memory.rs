//! In-memory fakes for every repository trait. Used by integration tests
//! and by `ratelimitd --backend memory` for local runs without Postgres.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::RwLock;
use uuid::Uuid;

use crate::domain::{AlertRule, ApiKey, IpRule, Policy, PolicyRule, RateLimitEvent, Tenant, UserPolicy};

use super::{
    AlertRuleRepository, ApiKeyRepository, EventCounts, EventRepository, IpRuleRepository, PolicyRepository,
    PolicyRuleRepository, RepositoryError, TenantRepository, UserPolicyRepository,
};

#[derive(Default)]
pub struct MemoryRepositories {
    pub tenants: DashMap<Uuid, Tenant>,
    pub policies: DashMap<Uuid, Policy>,
    pub api_keys: DashMap<String, ApiKey>,
    pub ip_rules: DashMap<Uuid, IpRule>,
    pub user_policies: DashMap<(Uuid, String), UserPolicy>,
    pub policy_rules: DashMap<Uuid, PolicyRule>,
    pub alert_rules: DashMap<Uuid, AlertRule>,
    pub events: RwLock<Vec<RateLimitEvent>>,
}

impl MemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PolicyRepository for MemoryRepositories {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Policy>, RepositoryError> {
        Ok(self.policies.get(&id).map(|e| e.value().clone()))
    }

    async fn find_default_for_tenant(&self, tenant_id: Uuid) -> Result<Option<Policy>, RepositoryError> {
        Ok(self
            .policies
            .iter()
            .map(|e| e.value().clone())
            .find(|p| p.tenant_id == Some(tenant_id) && p.is_default && p.enabled))
    }

    async fn find_global_default(&self) -> Result<Option<Policy>, RepositoryError> {
        Ok(self
            .policies
            .iter()
            .map(|e| e.value().clone())
            .find(|p| p.tenant_id.is_none() && p.is_default && p.enabled))
    }
}

#[async_trait]
impl TenantRepository for MemoryRepositories {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Tenant>, RepositoryError> {
        Ok(self.tenants.get(&id).map(|e| e.value().clone()))
    }
}

#[async_trait]
impl ApiKeyRepository for MemoryRepositories {
    async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, RepositoryError> {
        Ok(self.api_keys.get(key_hash).map(|e| e.value().clone()))
    }
}

#[async_trait]
impl IpRuleRepository for MemoryRepositories {
    async fn find_candidates(&self, tenant_id: Option<Uuid>, _ip: IpAddr) -> Result<Vec<IpRule>, RepositoryError> {
        Ok(self
            .ip_rules
            .iter()
            .map(|e| e.value().clone())
            .filter(|r| r.enabled && (r.tenant_id.is_none() || r.tenant_id == tenant_id))
            .collect())
    }
}

#[async_trait]
impl UserPolicyRepository for MemoryRepositories {
    async fn find_for_user(&self, tenant_id: Uuid, user_id: &str) -> Result<Option<UserPolicy>, RepositoryError> {
        Ok(self
            .user_policies
            .get(&(tenant_id, user_id.to_string()))
            .map(|e| e.value().clone())
            .filter(|p| p.enabled))
    }
}

#[async_trait]
impl PolicyRuleRepository for MemoryRepositories {
    async fn find_enabled(&self) -> Result<Vec<PolicyRule>, RepositoryError> {
        Ok(self
            .policy_rules
            .iter()
            .map(|e| e.value().clone())
            .filter(|r| r.enabled)
            .collect())
    }
}

#[async_trait]
impl AlertRuleRepository for MemoryRepositories {
    async fn find_enabled(&self) -> Result<Vec<AlertRule>, RepositoryError> {
        Ok(self
            .alert_rules
            .iter()
            .map(|e| e.value().clone())
            .filter(|r| r.enabled)
            .collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AlertRule>, RepositoryError> {
        Ok(self.alert_rules.get(&id).map(|e| e.value().clone()))
    }

    async fn update_last_triggered(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        if let Some(mut rule) = self.alert_rules.get_mut(&id) {
            rule.last_triggered_at = Some(at);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }
}

#[async_trait]
impl EventRepository for MemoryRepositories {
    async fn insert_batch(&self, events: &[RateLimitEvent]) -> Result<(), RepositoryError> {
        self.events.write().unwrap().extend_from_slice(events);
        Ok(())
    }

    async fn counts(&self, policy_id: Uuid, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<EventCounts, RepositoryError> {
        let events = self.events.read().unwrap();
        let matching = events
            .iter()
            .filter(|e| e.policy_id == policy_id && e.event_time >= from && e.event_time < to);
        let mut total = 0i64;
        let mut allowed = 0i64;
        for e in matching {
            total += 1;
            if e.allowed {
                allowed += 1;
            }
        }
        Ok(EventCounts { total, allowed })
    }

    async fn rejected_by_identifier_since(
        &self,
        policy_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<(String, i64)>, RepositoryError> {
        let events = self.events.read().unwrap();
        let mut counts: std::collections::HashMap<String, i64> = std::collections::HashMap::new();
        for e in events
            .iter()
            .filter(|e| e.policy_id == policy_id && e.event_time >= since && !e.allowed)
        {
            *counts.entry(e.identifier.clone()).or_insert(0) += 1;
        }
        let mut result: Vec<(String, i64)> = counts.into_iter().collect();
        result.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(result)
    }
}
