use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// URL-pattern binding. `resource_pattern` is a glob understood by
/// `policy::glob` (`*`, `**`, `{var}`). `methods` empty means "all methods".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: Uuid,
    pub policy_id: Uuid,
    pub resource_pattern: String,
    pub methods: Vec<String>,
    pub priority: i32,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl PolicyRule {
    pub fn method_matches(&self, method: &str) -> bool {
        self.methods.is_empty() || self.methods.iter().any(|m| m.eq_ignore_ascii_case(method))
    }

    /// Higher priority wins; ties broken by earlier creation.
    pub fn precedence_key(&self) -> (i32, std::cmp::Reverse<DateTime<Utc>>) {
        (self.priority, std::cmp::Reverse(self.created_at))
    }
}
