use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: Uuid,
    pub name: String,
    pub policy_id: Uuid,
    pub threshold_percentage: f64,
    pub window_seconds: u32,
    pub cooldown_seconds: u32,
    pub enabled: bool,
    pub last_triggered_at: Option<DateTime<Utc>>,
}

impl AlertRule {
    pub fn is_in_cooldown(&self, now: DateTime<Utc>) -> bool {
        match self.last_triggered_at {
            None => false,
            Some(last) => {
                let elapsed = (now - last).num_seconds().max(0) as u64;
                elapsed < self.cooldown_seconds as u64
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Attention,
    Warning,
    Critical,
}

impl Severity {
    /// `≥80% CRITICAL`, `≥50% WARNING`, else `ATTENTION`.
    pub fn from_deny_rate(deny_rate: f64) -> Self {
        if deny_rate >= 0.80 {
            Severity::Critical
        } else if deny_rate >= 0.50 {
            Severity::Warning
        } else {
            Severity::Attention
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertNotification {
    pub rule_id: Uuid,
    pub rule_name: String,
    pub policy_id: Uuid,
    pub policy_name: String,
    pub current_deny_rate: f64,
    pub threshold_percentage: f64,
    pub window_seconds: u32,
    pub total_requests: i64,
    pub denied_requests: i64,
    pub triggered_at: DateTime<Utc>,
}

impl AlertNotification {
    pub fn severity(&self) -> Severity {
        Severity::from_deny_rate(self.current_deny_rate)
    }
}
