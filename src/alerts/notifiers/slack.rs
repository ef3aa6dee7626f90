use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::alerts::error::NotifierError;
use crate::alerts::notifier::Notifier;
use crate::domain::AlertNotification;

#[derive(Serialize)]
struct SlackMessage {
    text: String,
}

/// Posts a one-line summary to a Slack incoming-webhook URL. Slack's message
/// formatting (blocks, attachments) is left for the operator to layer on top
/// of the webhook URL itself; this notifier sends the minimal `text` payload
/// Slack's webhook API requires.
pub struct SlackNotifier {
    webhook_url: String,
    client: Client,
    enabled: bool,
}

impl SlackNotifier {
    pub fn new(webhook_url: impl Into<String>, enabled: bool) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            client: Client::new(),
            enabled,
        }
    }
}

fn format_message(notification: &AlertNotification) -> String {
    format!(
        "[{:?}] {} ({:.0}% deny rate ≥ {:.0}% threshold on policy `{}`, {}/{} requests denied in the last {}s)",
        notification.severity(),
        notification.rule_name,
        notification.current_deny_rate * 100.0,
        notification.threshold_percentage,
        notification.policy_name,
        notification.denied_requests,
        notification.total_requests,
        notification.window_seconds,
    )
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn name(&self) -> &str {
        "slack"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn send_notification(&self, notification: &AlertNotification) -> Result<(), NotifierError> {
        let message = SlackMessage {
            text: format_message(notification),
        };

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&message)
            .send()
            .await
            .map_err(|err| NotifierError::Transport(err.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(NotifierError::Transport(format!("slack webhook returned {}", response.status())))
        }
    }
}
