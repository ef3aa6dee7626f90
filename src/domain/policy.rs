use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who a policy is keyed by. Determines the limiter key the orchestrator
/// derives for a request (see `orchestrator::limiter_key`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Scope {
    Global,
    Tenant,
    User,
    Api,
    Ip,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Global => "GLOBAL",
            Scope::Tenant => "TENANT",
            Scope::User => "USER",
            Scope::Api => "API",
            Scope::Ip => "IP",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Algorithm {
    TokenBucket,
    FixedWindow,
    SlidingLog,
}

impl Algorithm {
    pub const ALL: [Algorithm; 3] = [
        Algorithm::TokenBucket,
        Algorithm::FixedWindow,
        Algorithm::SlidingLog,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::TokenBucket => "TOKEN_BUCKET",
            Algorithm::FixedWindow => "FIXED_WINDOW",
            Algorithm::SlidingLog => "SLIDING_LOG",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailMode {
    FailOpen,
    FailClosed,
}

/// Rate-limit policy: selects an algorithm and its parameters for a class of
/// callers. See `spec.md` §3 for the field-level invariants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: Uuid,
    pub name: String,
    pub tenant_id: Option<Uuid>,
    pub scope: Scope,
    pub algorithm: Algorithm,
    pub max_requests: u32,
    pub window_seconds: u32,
    pub burst_capacity: Option<u32>,
    pub refill_rate: Option<f64>,
    pub fail_mode: FailMode,
    pub enabled: bool,
    pub is_default: bool,
}

impl Policy {
    /// Effective token-bucket capacity: `burstCapacity ?? maxRequests`.
    pub fn effective_capacity(&self) -> u32 {
        self.burst_capacity.unwrap_or(self.max_requests)
    }

    /// Effective token-bucket refill rate: `refillRate ?? maxRequests/windowSeconds`.
    pub fn effective_refill_rate(&self) -> f64 {
        self.refill_rate
            .unwrap_or(self.max_requests as f64 / self.window_seconds as f64)
    }
}
