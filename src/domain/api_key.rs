use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    /// Opaque hash of the raw key. The raw key is never stored or logged;
    /// see `crypto::hash_api_key`.
    pub key_hash: String,
    pub key_prefix: String,
    pub tenant_id: Uuid,
    pub policy_id: Option<Uuid>,
    pub enabled: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    /// Active iff `enabled ∧ (expiresAt == null ∨ expiresAt > now)`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.expires_at.map_or(true, |exp| exp > now)
    }
}
