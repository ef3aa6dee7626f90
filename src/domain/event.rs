use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentifierType {
    User,
    ApiKey,
    Ip,
    Tenant,
    Global,
}

/// One outcome of a rate-limit check, destined for the event sink (C6).
/// Append-only; never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitEvent {
    pub policy_id: Uuid,
    pub identifier: String,
    pub identifier_type: IdentifierType,
    pub allowed: bool,
    pub remaining: i64,
    pub limit_value: i64,
    pub ip_address: Option<IpAddr>,
    pub resource: Option<String>,
    pub event_time: DateTime<Utc>,
}

impl RateLimitEvent {
    /// `yyyy-MM` of `event_time`, used to partition the event table.
    pub fn partition_key(&self) -> String {
        format!("{:04}-{:02}", self.event_time.year(), self.event_time.month())
    }
}
