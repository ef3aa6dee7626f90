use async_trait::async_trait;

use crate::alerts::error::NotifierError;
use crate::alerts::notifier::Notifier;
use crate::domain::AlertNotification;

/// Always-available fallback notifier: writes the fired alert to the
/// structured log at `warn` level. Useful on its own in environments with no
/// external notification channel, and as a sanity check that the evaluator
/// is firing at all.
pub struct LogNotifier {
    enabled: bool,
}

impl LogNotifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn send_notification(&self, notification: &AlertNotification) -> Result<(), NotifierError> {
        tracing::warn!(
            rule = %notification.rule_name,
            policy = %notification.policy_name,
            severity = ?notification.severity(),
            deny_rate = notification.current_deny_rate,
            threshold = notification.threshold_percentage,
            total = notification.total_requests,
            denied = notification.denied_requests,
            "alert fired"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn notification() -> AlertNotification {
        AlertNotification {
            rule_id: Uuid::new_v4(),
            rule_name: "high-deny-rate".into(),
            policy_id: Uuid::new_v4(),
            policy_name: "default".into(),
            current_deny_rate: 0.6,
            threshold_percentage: 50.0,
            window_seconds: 60,
            total_requests: 100,
            denied_requests: 60,
            triggered_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn disabled_notifier_reports_disabled() {
        let notifier = LogNotifier::new(false);
        assert!(!notifier.is_enabled());
    }

    #[tokio::test]
    async fn send_notification_always_succeeds() {
        let notifier = LogNotifier::new(true);
        assert!(notifier.send_notification(&notification()).await.is_ok());
    }
}
