use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::AlertNotification;
use crate::metrics_agg::MetricsAggregator;
use crate::repository::{AlertRuleRepository, PolicyRepository, RepositoryError};

use super::notifier::Notifier;

#[derive(Debug, Clone)]
pub struct AlertEvaluatorConfig {
    pub tick_interval: Duration,
    pub initial_delay: Duration,
}

impl Default for AlertEvaluatorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            initial_delay: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("policy {0} referenced by alert rule no longer exists")]
    PolicyMissing(Uuid),
}

/// Periodically checks every enabled alert rule's policy against its recent
/// deny rate and fans out notifications for the ones that cross threshold.
/// A tick that overruns its interval is never allowed to stack: the next
/// tick is skipped rather than queued, see [`AlertEvaluator::spawn`].
pub struct AlertEvaluator {
    config: AlertEvaluatorConfig,
    rules: Arc<dyn AlertRuleRepository>,
    policies: Arc<dyn PolicyRepository>,
    metrics: Arc<MetricsAggregator>,
    notifiers: Vec<Arc<dyn Notifier>>,
    busy: AtomicBool,
}

impl AlertEvaluator {
    pub fn new(
        config: AlertEvaluatorConfig,
        rules: Arc<dyn AlertRuleRepository>,
        policies: Arc<dyn PolicyRepository>,
        metrics: Arc<MetricsAggregator>,
        notifiers: Vec<Arc<dyn Notifier>>,
    ) -> Self {
        Self {
            config,
            rules,
            policies,
            metrics,
            notifiers,
            busy: AtomicBool::new(false),
        }
    }

    /// Starts the evaluation loop on a detached task. The returned handle is
    /// for graceful-shutdown abort; the evaluator has no state to drain, so
    /// a plain `abort()` is sufficient.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tokio::time::sleep(self.config.initial_delay).await;
            let mut ticker = tokio::time::interval(self.config.tick_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                if self.busy.swap(true, Ordering::SeqCst) {
                    tracing::warn!("alert evaluation tick skipped: previous tick still running");
                    continue;
                }

                let this = self.clone();
                tokio::spawn(async move {
                    this.evaluate_all(Utc::now()).await;
                    this.busy.store(false, Ordering::SeqCst);
                });
            }
        })
    }

    /// Evaluates every enabled rule. A single rule's failure is logged and
    /// never stops the remaining rules from being checked.
    pub async fn evaluate_all(&self, now: chrono::DateTime<Utc>) {
        let rules = match self.rules.find_enabled().await {
            Ok(rules) => rules,
            Err(err) => {
                tracing::error!(error = %err, "failed to load alert rules");
                return;
            }
        };

        for rule in rules {
            if rule.is_in_cooldown(now) {
                continue;
            }
            if let Err(err) = self.evaluate_rule(&rule, now).await {
                tracing::error!(error = %err, rule = %rule.name, "alert rule evaluation failed");
            }
        }
    }

    async fn evaluate_rule(&self, rule: &crate::domain::AlertRule, now: chrono::DateTime<Utc>) -> Result<(), EvalError> {
        let usage = self.metrics.usage_over_window(rule.policy_id, rule.window_seconds, now).await?;

        if usage.deny_rate * 100.0 < rule.threshold_percentage {
            return Ok(());
        }

        let policy = self.policies.find_by_id(rule.policy_id).await?.ok_or(EvalError::PolicyMissing(rule.policy_id))?;

        let notification = AlertNotification {
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            policy_id: policy.id,
            policy_name: policy.name,
            current_deny_rate: usage.deny_rate,
            threshold_percentage: rule.threshold_percentage,
            window_seconds: rule.window_seconds,
            total_requests: usage.total,
            denied_requests: usage.denied,
            triggered_at: now,
        };

        self.rules.update_last_triggered(rule.id, now).await?;
        metrics::counter!("ratelimit_alerts_fired_total", "rule" => rule.name.clone()).increment(1);
        self.fan_out(&notification).await;
        Ok(())
    }

    /// Triggers a fan-out for a single rule regardless of cooldown or
    /// threshold, for the admin `testAlert` operation.
    pub async fn test_alert(&self, rule_id: Uuid) -> Result<(), EvalError> {
        let rule = self.rules.find_by_id(rule_id).await?.ok_or(EvalError::Repository(RepositoryError::NotFound))?;
        let policy = self.policies.find_by_id(rule.policy_id).await?.ok_or(EvalError::PolicyMissing(rule.policy_id))?;
        let now = Utc::now();
        let usage = self.metrics.usage_over_window(rule.policy_id, rule.window_seconds, now).await?;

        let notification = AlertNotification {
            rule_id: rule.id,
            rule_name: rule.name,
            policy_id: policy.id,
            policy_name: policy.name,
            current_deny_rate: usage.deny_rate,
            threshold_percentage: rule.threshold_percentage,
            window_seconds: rule.window_seconds,
            total_requests: usage.total,
            denied_requests: usage.denied,
            triggered_at: now,
        };

        self.fan_out(&notification).await;
        Ok(())
    }

    async fn fan_out(&self, notification: &AlertNotification) {
        for notifier in &self.notifiers {
            if !notifier.is_enabled() {
                continue;
            }
            if let Err(err) = notifier.send_notification(notification).await {
                tracing::error!(error = %err, notifier = notifier.name(), "notifier failed");
                metrics::counter!("ratelimit_notifier_failures_total", "notifier" => notifier.name().to_string()).increment(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Algorithm, AlertRule, FailMode, IdentifierType, Policy, RateLimitEvent, Scope};
    use crate::repository::memory::MemoryRepositories;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct RecordingNotifier {
        name: &'static str,
        enabled: bool,
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        fn name(&self) -> &str {
            self.name
        }
        fn is_enabled(&self) -> bool {
            self.enabled
        }
        async fn send_notification(&self, _notification: &AlertNotification) -> Result<(), crate::alerts::error::NotifierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(crate::alerts::error::NotifierError::Transport("boom".into()))
            } else {
                Ok(())
            }
        }
    }

    fn policy(id: Uuid) -> Policy {
        Policy {
            id,
            name: "checkout".into(),
            tenant_id: None,
            scope: Scope::Global,
            algorithm: Algorithm::TokenBucket,
            max_requests: 10,
            window_seconds: 60,
            burst_capacity: None,
            refill_rate: None,
            fail_mode: FailMode::FailClosed,
            enabled: true,
            is_default: true,
        }
    }

    fn rule(policy_id: Uuid, threshold: f64, cooldown: u32) -> AlertRule {
        AlertRule {
            id: Uuid::new_v4(),
            name: "high-deny-rate".into(),
            policy_id,
            threshold_percentage: threshold,
            window_seconds: 60,
            cooldown_seconds: cooldown,
            enabled: true,
            last_triggered_at: None,
        }
    }

    fn seed_events(repos: &Arc<MemoryRepositories>, policy_id: Uuid, allowed: usize, denied: usize) {
        let mut events = repos.events.write().unwrap();
        for _ in 0..allowed {
            events.push(RateLimitEvent {
                policy_id,
                identifier: "u".into(),
                identifier_type: IdentifierType::User,
                allowed: true,
                remaining: 1,
                limit_value: 10,
                ip_address: None,
                resource: None,
                event_time: Utc::now(),
            });
        }
        for _ in 0..denied {
            events.push(RateLimitEvent {
                policy_id,
                identifier: "u".into(),
                identifier_type: IdentifierType::User,
                allowed: false,
                remaining: 0,
                limit_value: 10,
                ip_address: None,
                resource: None,
                event_time: Utc::now(),
            });
        }
    }

    #[tokio::test]
    async fn fires_and_sets_cooldown_when_threshold_crossed() {
        let repos = Arc::new(MemoryRepositories::new());
        let policy_id = Uuid::new_v4();
        repos.policies.insert(policy_id, policy(policy_id));
        let alert_rule = rule(policy_id, 50.0, 300);
        repos.alert_rules.insert(alert_rule.id, alert_rule.clone());
        seed_events(&repos, policy_id, 10, 10);

        let notifier = Arc::new(RecordingNotifier { name: "log", enabled: true, calls: AtomicUsize::new(0), fail: false });
        let evaluator = AlertEvaluator::new(
            AlertEvaluatorConfig::default(),
            repos.clone(),
            repos.clone(),
            Arc::new(MetricsAggregator::new(repos.clone())),
            vec![notifier.clone()],
        );

        evaluator.evaluate_all(Utc::now()).await;

        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
        let stored = repos.alert_rules.get(&alert_rule.id).unwrap();
        assert!(stored.last_triggered_at.is_some());
    }

    #[tokio::test]
    async fn does_not_fire_again_during_cooldown() {
        let repos = Arc::new(MemoryRepositories::new());
        let policy_id = Uuid::new_v4();
        repos.policies.insert(policy_id, policy(policy_id));
        let mut alert_rule = rule(policy_id, 50.0, 300);
        alert_rule.last_triggered_at = Some(Utc::now());
        repos.alert_rules.insert(alert_rule.id, alert_rule.clone());
        seed_events(&repos, policy_id, 10, 10);

        let notifier = Arc::new(RecordingNotifier { name: "log", enabled: true, calls: AtomicUsize::new(0), fail: false });
        let evaluator = AlertEvaluator::new(
            AlertEvaluatorConfig::default(),
            repos.clone(),
            repos.clone(),
            Arc::new(MetricsAggregator::new(repos.clone())),
            vec![notifier.clone()],
        );

        evaluator.evaluate_all(Utc::now()).await;
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn one_failing_notifier_does_not_block_another() {
        let repos = Arc::new(MemoryRepositories::new());
        let policy_id = Uuid::new_v4();
        repos.policies.insert(policy_id, policy(policy_id));
        let alert_rule = rule(policy_id, 50.0, 300);
        repos.alert_rules.insert(alert_rule.id, alert_rule.clone());
        seed_events(&repos, policy_id, 10, 10);

        let failing = Arc::new(RecordingNotifier { name: "webhook", enabled: true, calls: AtomicUsize::new(0), fail: true });
        let succeeding = Arc::new(RecordingNotifier { name: "log", enabled: true, calls: AtomicUsize::new(0), fail: false });
        let evaluator = AlertEvaluator::new(
            AlertEvaluatorConfig::default(),
            repos.clone(),
            repos.clone(),
            Arc::new(MetricsAggregator::new(repos.clone())),
            vec![failing.clone(), succeeding.clone()],
        );

        evaluator.evaluate_all(Utc::now()).await;

        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(succeeding.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_alert_fires_regardless_of_threshold() {
        let repos = Arc::new(MemoryRepositories::new());
        let policy_id = Uuid::new_v4();
        repos.policies.insert(policy_id, policy(policy_id));
        let alert_rule = rule(policy_id, 99.0, 300);
        repos.alert_rules.insert(alert_rule.id, alert_rule.clone());
        seed_events(&repos, policy_id, 10, 1);

        let notifier = Arc::new(RecordingNotifier { name: "log", enabled: true, calls: AtomicUsize::new(0), fail: false });
        let evaluator = AlertEvaluator::new(
            AlertEvaluatorConfig::default(),
            repos.clone(),
            repos.clone(),
            Arc::new(MetricsAggregator::new(repos.clone())),
            vec![notifier.clone()],
        );

        evaluator.test_alert(alert_rule.id).await.unwrap();
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
    }
}
