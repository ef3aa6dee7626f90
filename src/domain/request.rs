use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

use super::policy::Scope;

/// Inbound check request. `identifier` is the raw key the caller supplies
/// (user id, api key value, ip, or tenant id) and is interpreted according
/// to `scope`; `policy_id`, when present, bypasses resolution entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    pub identifier: String,
    pub scope: Scope,
    pub policy_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub ip_address: Option<IpAddr>,
    pub api_key: Option<String>,
    pub resource: Option<String>,
    pub method: Option<String>,
}

impl CheckRequest {
    pub fn is_valid(&self) -> bool {
        !self.identifier.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenyReason {
    RateLimitExceeded,
    PolicyNotFound,
    PolicyDisabled,
    CircuitBreakerOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitResult {
    pub allowed: bool,
    pub remaining: i64,
    pub limit: i64,
    pub reset_in_seconds: u64,
    pub retry_after_seconds: Option<u64>,
    pub policy_id: Option<Uuid>,
    pub algorithm: Option<String>,
    pub reason: Option<DenyReason>,
}

impl RateLimitResult {
    pub fn allow(limit: i64, remaining: i64, reset_in_seconds: u64, policy_id: Uuid, algorithm: &str) -> Self {
        Self {
            allowed: true,
            remaining,
            limit,
            reset_in_seconds,
            retry_after_seconds: None,
            policy_id: Some(policy_id),
            algorithm: Some(algorithm.to_string()),
            reason: None,
        }
    }

    pub fn deny(
        limit: i64,
        reset_in_seconds: u64,
        retry_after_seconds: u64,
        policy_id: Uuid,
        algorithm: &str,
        reason: DenyReason,
    ) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            limit,
            reset_in_seconds,
            retry_after_seconds: Some(retry_after_seconds),
            policy_id: Some(policy_id),
            algorithm: Some(algorithm.to_string()),
            reason: Some(reason),
        }
    }

    /// No policy could be resolved; nothing to rate limit against.
    pub fn policy_not_found() -> Self {
        Self {
            allowed: false,
            remaining: 0,
            limit: 0,
            reset_in_seconds: 0,
            retry_after_seconds: None,
            policy_id: None,
            algorithm: None,
            reason: Some(DenyReason::PolicyNotFound),
        }
    }

    pub fn policy_disabled(policy_id: Uuid) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            limit: 0,
            reset_in_seconds: 0,
            retry_after_seconds: None,
            policy_id: Some(policy_id),
            algorithm: None,
            reason: Some(DenyReason::PolicyDisabled),
        }
    }
}
