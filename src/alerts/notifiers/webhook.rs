use async_trait::async_trait;
use reqwest::Client;

use crate::alerts::error::NotifierError;
use crate::alerts::notifier::Notifier;
use crate::domain::AlertNotification;

/// Posts the notification as JSON to an arbitrary HTTP endpoint. Payload
/// shaping for specific receivers (PagerDuty, OpsGenie, ...) is left to
/// whatever sits behind the URL; this notifier only guarantees delivery of
/// the raw [`AlertNotification`] fields.
pub struct WebhookNotifier {
    name: String,
    url: String,
    client: Client,
    enabled: bool,
}

impl WebhookNotifier {
    pub fn new(name: impl Into<String>, url: impl Into<String>, enabled: bool) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            client: Client::new(),
            enabled,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn send_notification(&self, notification: &AlertNotification) -> Result<(), NotifierError> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|err| NotifierError::Transport(err.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(NotifierError::Transport(format!("webhook returned {}", response.status())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_webhook_reports_disabled() {
        let notifier = WebhookNotifier::new("ops", "https://example.com/hook", false);
        assert!(!notifier.is_enabled());
        assert_eq!(notifier.name(), "ops");
    }
}
