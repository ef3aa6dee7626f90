use chrono::{DateTime, Utc};
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

/// The repository exposes queries for all three kinds, but write-time
/// validation (`IpRule::validate`) only accepts `RateLimit`. The intended
/// lifecycle of `Blacklist`/`Whitelist` rows is an open question noted in
/// `DESIGN.md` — not guessed at here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleType {
    RateLimit,
    Blacklist,
    Whitelist,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpRule {
    pub id: Uuid,
    pub rule_type: RuleType,
    pub ip_address: Option<IpAddr>,
    pub ip_cidr: Option<IpNetwork>,
    pub tenant_id: Option<Uuid>,
    pub policy_id: Uuid,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum IpRuleError {
    #[error("exactly one of ip_address or ip_cidr must be set")]
    AmbiguousTarget,
}

impl IpRule {
    /// Write-time invariant: exactly one of `ip_address`/`ip_cidr` is set.
    pub fn validate(&self) -> Result<(), IpRuleError> {
        match (self.ip_address.is_some(), self.ip_cidr.is_some()) {
            (true, false) | (false, true) => Ok(()),
            _ => Err(IpRuleError::AmbiguousTarget),
        }
    }

    /// True if this rule's target contains `addr` — exact match for
    /// single-IP rules, CIDR containment otherwise.
    pub fn matches(&self, addr: IpAddr) -> bool {
        if let Some(exact) = self.ip_address {
            return exact == addr;
        }
        if let Some(cidr) = self.ip_cidr {
            return cidr.contains(addr);
        }
        false
    }

    /// A rule scoped to the requesting tenant outranks a global rule
    /// regardless of age; among rules with the same tenant-scoping, exact-IP
    /// rules outrank CIDR rules, and among those, newer wins.
    pub fn precedence_key(&self, requesting_tenant_id: Option<Uuid>) -> (bool, bool, DateTime<Utc>) {
        let tenant_scoped = requesting_tenant_id.is_some() && self.tenant_id == requesting_tenant_id;
        (tenant_scoped, self.ip_address.is_some(), self.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn rule(tenant_id: Option<Uuid>, created_at: DateTime<Utc>) -> IpRule {
        IpRule {
            id: Uuid::new_v4(),
            rule_type: RuleType::RateLimit,
            ip_address: Some("10.0.0.1".parse().unwrap()),
            ip_cidr: None,
            tenant_id,
            policy_id: Uuid::new_v4(),
            enabled: true,
            created_at,
        }
    }

    #[test]
    fn tenant_scoped_rule_outranks_a_newer_global_rule() {
        let now = Utc::now();
        let tenant_id = Uuid::new_v4();
        let older_tenant_rule = rule(Some(tenant_id), now - Duration::days(30));
        let newer_global_rule = rule(None, now);

        assert!(older_tenant_rule.precedence_key(Some(tenant_id)) > newer_global_rule.precedence_key(Some(tenant_id)));
    }

    #[test]
    fn exactness_then_recency_break_ties_within_the_same_scope() {
        let now = Utc::now();
        let older = rule(None, now - Duration::days(1));
        let newer = rule(None, now);

        assert!(newer.precedence_key(None) > older.precedence_key(None));
    }
}
