//! Read-only aggregation facade (C7) over the event store. C8 is the only
//! caller today, but this stays separate from the evaluator so a future
//! admin "usage" endpoint can read the same windowed counts without
//! depending on alert-evaluation internals.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use uuid::Uuid;

use crate::repository::{EventRepository, RepositoryError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyUsage {
    pub total: i64,
    pub allowed: i64,
    pub denied: i64,
    pub deny_rate: f64,
}

pub struct MetricsAggregator {
    events: Arc<dyn EventRepository>,
}

impl MetricsAggregator {
    pub fn new(events: Arc<dyn EventRepository>) -> Self {
        Self { events }
    }

    /// Usage for `policy_id` over the trailing `window_seconds`, as of now.
    pub async fn usage_over_window(&self, policy_id: Uuid, window_seconds: u32, now: DateTime<Utc>) -> Result<PolicyUsage, RepositoryError> {
        let from = now - ChronoDuration::seconds(window_seconds as i64);
        let counts = self.events.counts(policy_id, from, now).await?;
        Ok(PolicyUsage {
            total: counts.total,
            allowed: counts.allowed,
            denied: counts.denied(),
            deny_rate: counts.deny_rate(),
        })
    }

    /// Identifiers with the most denials for `policy_id` since `since`,
    /// ordered by denial count descending.
    pub async fn top_rejected_identifiers(&self, policy_id: Uuid, since: DateTime<Utc>) -> Result<Vec<(String, i64)>, RepositoryError> {
        self.events.rejected_by_identifier_since(policy_id, since).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{IdentifierType, RateLimitEvent};
    use crate::repository::memory::MemoryRepositories;

    fn event(policy_id: Uuid, allowed: bool, minutes_ago: i64) -> RateLimitEvent {
        RateLimitEvent {
            policy_id,
            identifier: "user-1".into(),
            identifier_type: IdentifierType::User,
            allowed,
            remaining: if allowed { 1 } else { 0 },
            limit_value: 10,
            ip_address: None,
            resource: None,
            event_time: Utc::now() - ChronoDuration::minutes(minutes_ago),
        }
    }

    #[tokio::test]
    async fn usage_over_window_excludes_events_outside_window() {
        let repos = Arc::new(MemoryRepositories::new());
        let policy_id = Uuid::new_v4();
        repos.events.write().unwrap().push(event(policy_id, true, 1));
        repos.events.write().unwrap().push(event(policy_id, false, 1));
        repos.events.write().unwrap().push(event(policy_id, false, 120));

        let aggregator = MetricsAggregator::new(repos);
        let usage = aggregator.usage_over_window(policy_id, 60, Utc::now()).await.unwrap();

        assert_eq!(usage.total, 2);
        assert_eq!(usage.denied, 1);
        assert_eq!(usage.deny_rate, 0.5);
    }
}
