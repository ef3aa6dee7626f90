use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{CheckRequest, Policy, RuleType};
use crate::repository::{
    ApiKeyRepository, IpRuleRepository, PolicyRepository, PolicyRuleRepository, RepositoryError,
    TenantRepository, UserPolicyRepository,
};

use super::glob::match_pattern;

/// Why a resolution attempt failed, one level more granular than
/// [`crate::domain::DenyReason`] — the orchestrator collapses both
/// `NotFound` and `Disabled` the same way the caller always sees them
/// (`POLICY_NOT_FOUND` vs `POLICY_DISABLED`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    NotFound,
    Disabled(Uuid),
}

impl From<RepositoryError> for ResolveError {
    fn from(_: RepositoryError) -> Self {
        ResolveError::NotFound
    }
}

/// Resolves the policy that applies to a request, in precedence order:
///
/// 1. explicit `policy_id` on the request
/// 2. the caller's API key's bound policy
/// 3. the most specific matching IP rule
/// 4. the most specific matching URL-pattern rule (`policy_rules`)
/// 5. a per-user policy binding
/// 6. the tenant's default policy
/// 7. the global default policy
///
/// Each step that matches something disabled short-circuits immediately
/// with [`ResolveError::Disabled`] rather than falling through to the next
/// step — an explicitly disabled binding should not be silently skipped.
pub struct PolicyResolver {
    policies: Arc<dyn PolicyRepository>,
    tenants: Arc<dyn TenantRepository>,
    api_keys: Arc<dyn ApiKeyRepository>,
    ip_rules: Arc<dyn IpRuleRepository>,
    user_policies: Arc<dyn UserPolicyRepository>,
    policy_rules: Arc<dyn PolicyRuleRepository>,
}

impl PolicyResolver {
    pub fn new(
        policies: Arc<dyn PolicyRepository>,
        tenants: Arc<dyn TenantRepository>,
        api_keys: Arc<dyn ApiKeyRepository>,
        ip_rules: Arc<dyn IpRuleRepository>,
        user_policies: Arc<dyn UserPolicyRepository>,
        policy_rules: Arc<dyn PolicyRuleRepository>,
    ) -> Self {
        Self {
            policies,
            tenants,
            api_keys,
            ip_rules,
            user_policies,
            policy_rules,
        }
    }

    pub async fn resolve(&self, request: &CheckRequest) -> Result<Policy, ResolveError> {
        if let Some(policy_id) = request.policy_id {
            return self.load_and_check(policy_id).await;
        }

        if let Some(api_key) = &request.api_key {
            if let Some(id) = self.via_api_key(api_key).await? {
                return self.load_and_check(id).await;
            }
        }

        if let Some(ip) = request.ip_address {
            if let Some(id) = self.via_ip_rule(request.tenant_id, ip).await? {
                return self.load_and_check(id).await;
            }
        }

        if let Some(resource) = &request.resource {
            if let Some(id) = self.via_url_pattern(resource, request.method.as_deref()).await? {
                return self.load_and_check(id).await;
            }
        }

        if let Some(tenant_id) = request.tenant_id {
            if let Some(id) = self.via_user_binding(tenant_id, &request.identifier).await? {
                return self.load_and_check(id).await;
            }

            if let Some(policy) = self.policies.find_default_for_tenant(tenant_id).await? {
                return Ok(policy);
            }
        }

        self.policies
            .find_global_default()
            .await?
            .ok_or(ResolveError::NotFound)
    }

    async fn load_and_check(&self, policy_id: Uuid) -> Result<Policy, ResolveError> {
        let policy = self
            .policies
            .find_by_id(policy_id)
            .await?
            .ok_or(ResolveError::NotFound)?;
        if !policy.enabled {
            return Err(ResolveError::Disabled(policy.id));
        }
        Ok(policy)
    }

    async fn via_api_key(&self, raw_key: &str) -> Result<Option<Uuid>, ResolveError> {
        let key_hash = crate::crypto::hash_api_key(raw_key);
        let Some(api_key) = self.api_keys.find_by_hash(&key_hash).await? else {
            return Ok(None);
        };
        if !api_key.is_active(chrono::Utc::now()) {
            return Ok(None);
        }
        Ok(api_key.policy_id)
    }

    async fn via_ip_rule(&self, tenant_id: Option<Uuid>, ip: std::net::IpAddr) -> Result<Option<Uuid>, ResolveError> {
        let mut candidates: Vec<_> = self
            .ip_rules
            .find_candidates(tenant_id, ip)
            .await?
            .into_iter()
            .filter(|rule| rule.rule_type == RuleType::RateLimit && rule.matches(ip))
            .collect();
        candidates.sort_by_key(|rule| std::cmp::Reverse(rule.precedence_key(tenant_id)));
        Ok(candidates.into_iter().next().map(|rule| rule.policy_id))
    }

    async fn via_url_pattern(&self, resource: &str, method: Option<&str>) -> Result<Option<Uuid>, ResolveError> {
        let rules = self.policy_rules.find_enabled().await?;
        let best = rules
            .iter()
            .filter(|rule| rule.method_matches(method.unwrap_or("GET")))
            .filter_map(|rule| match_pattern(&rule.resource_pattern, resource).map(|_| rule))
            .max_by_key(|rule| rule.precedence_key());
        Ok(best.map(|rule| rule.policy_id))
    }

    async fn via_user_binding(&self, tenant_id: Uuid, user_id: &str) -> Result<Option<Uuid>, ResolveError> {
        Ok(self
            .user_policies
            .find_for_user(tenant_id, user_id)
            .await?
            .map(|binding| binding.policy_id))
    }

    /// Exposed for the admin surface: confirms a tenant exists before an
    /// operator wires policies or rules to it.
    pub async fn tenant_exists(&self, tenant_id: Uuid) -> Result<bool, ResolveError> {
        Ok(self.tenants.find_by_id(tenant_id).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Algorithm, FailMode, Scope};
    use crate::repository::memory::MemoryRepositories;

    fn policy(is_default: bool, tenant_id: Option<Uuid>, enabled: bool) -> Policy {
        Policy {
            id: Uuid::new_v4(),
            name: "p".into(),
            tenant_id,
            scope: Scope::Tenant,
            algorithm: Algorithm::TokenBucket,
            max_requests: 10,
            window_seconds: 60,
            burst_capacity: None,
            refill_rate: None,
            fail_mode: FailMode::FailClosed,
            enabled,
            is_default,
        }
    }

    fn request(tenant_id: Option<Uuid>) -> CheckRequest {
        CheckRequest {
            identifier: "user-1".into(),
            scope: Scope::Tenant,
            policy_id: None,
            tenant_id,
            ip_address: None,
            api_key: None,
            resource: None,
            method: None,
        }
    }

    fn resolver(repos: Arc<MemoryRepositories>) -> PolicyResolver {
        PolicyResolver::new(
            repos.clone(),
            repos.clone(),
            repos.clone(),
            repos.clone(),
            repos.clone(),
            repos,
        )
    }

    #[tokio::test]
    async fn falls_back_to_global_default_when_no_tenant_policy_exists() {
        let repos = Arc::new(MemoryRepositories::new());
        let global = policy(true, None, true);
        repos.policies.insert(global.id, global.clone());

        let resolved = resolver(repos).resolve(&request(None)).await.unwrap();
        assert_eq!(resolved.id, global.id);
    }

    #[tokio::test]
    async fn explicit_policy_id_short_circuits_everything_else() {
        let repos = Arc::new(MemoryRepositories::new());
        let explicit = policy(false, None, true);
        let global = policy(true, None, true);
        repos.policies.insert(explicit.id, explicit.clone());
        repos.policies.insert(global.id, global);

        let mut req = request(None);
        req.policy_id = Some(explicit.id);
        let resolved = resolver(repos).resolve(&req).await.unwrap();
        assert_eq!(resolved.id, explicit.id);
    }

    #[tokio::test]
    async fn disabled_explicit_policy_short_circuits_as_disabled() {
        let repos = Arc::new(MemoryRepositories::new());
        let disabled = policy(false, None, false);
        repos.policies.insert(disabled.id, disabled.clone());

        let mut req = request(None);
        req.policy_id = Some(disabled.id);
        let err = resolver(repos).resolve(&req).await.unwrap_err();
        assert_eq!(err, ResolveError::Disabled(disabled.id));
    }

    #[tokio::test]
    async fn missing_policy_is_not_found() {
        let repos = Arc::new(MemoryRepositories::new());
        let err = resolver(repos).resolve(&request(None)).await.unwrap_err();
        assert_eq!(err, ResolveError::NotFound);
    }

    #[tokio::test]
    async fn url_pattern_precedence_prefers_priority_over_specificity() {
        use crate::domain::PolicyRule;

        let repos = Arc::new(MemoryRepositories::new());
        let low_priority_literal = policy(false, None, true);
        let high_priority_wildcard = policy(false, None, true);
        repos.policies.insert(low_priority_literal.id, low_priority_literal.clone());
        repos.policies.insert(high_priority_wildcard.id, high_priority_wildcard.clone());

        let now = chrono::Utc::now();
        repos.policy_rules.insert(
            Uuid::new_v4(),
            PolicyRule {
                id: Uuid::new_v4(),
                policy_id: low_priority_literal.id,
                resource_pattern: "/api/v1/users".into(),
                methods: vec![],
                priority: 1,
                enabled: true,
                created_at: now,
            },
        );
        repos.policy_rules.insert(
            Uuid::new_v4(),
            PolicyRule {
                id: Uuid::new_v4(),
                policy_id: high_priority_wildcard.id,
                resource_pattern: "/api/*/users".into(),
                methods: vec![],
                priority: 100,
                enabled: true,
                created_at: now,
            },
        );

        let mut req = request(None);
        req.resource = Some("/api/v1/users".into());
        let resolved = resolver(repos).resolve(&req).await.unwrap();
        assert_eq!(resolved.id, high_priority_wildcard.id);
    }
}
