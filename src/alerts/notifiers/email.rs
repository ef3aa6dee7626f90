use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};

use crate::alerts::error::NotifierError;
use crate::alerts::notifier::Notifier;
use crate::domain::AlertNotification;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: String,
    pub to_address: String,
    pub enabled: bool,
}

/// Sends a plain-text summary over SMTP. One fixed recipient per notifier
/// instance; operators who need per-rule routing configure multiple email
/// notifiers.
pub struct EmailNotifier {
    config: EmailConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig) -> Result<Self, NotifierError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|err| NotifierError::Configuration(err.to_string()))?
            .port(config.smtp_port);
        let transport = if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            transport.credentials(Credentials::new(user.clone(), pass.clone()))
        } else {
            transport
        };
        Ok(Self {
            config,
            transport: transport.build(),
        })
    }
}

fn format_body(notification: &AlertNotification) -> String {
    format!(
        "Alert rule \"{}\" fired for policy \"{}\".\n\n\
         Severity: {:?}\n\
         Deny rate: {:.1}% (threshold {:.1}%)\n\
         Requests in window: {} total, {} denied, over {}s\n\
         Triggered at: {}\n",
        notification.rule_name,
        notification.policy_name,
        notification.severity(),
        notification.current_deny_rate * 100.0,
        notification.threshold_percentage,
        notification.total_requests,
        notification.denied_requests,
        notification.window_seconds,
        notification.triggered_at.to_rfc3339(),
    )
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &str {
        "email"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn send_notification(&self, notification: &AlertNotification) -> Result<(), NotifierError> {
        let from: Mailbox = self
            .config
            .from_address
            .parse()
            .map_err(|err| NotifierError::Configuration(format!("invalid from address: {err}")))?;
        let to: Mailbox = self
            .config
            .to_address
            .parse()
            .map_err(|err| NotifierError::Configuration(format!("invalid to address: {err}")))?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(format!("[rate-limit alert] {}", notification.rule_name))
            .body(format_body(notification))
            .map_err(|err| NotifierError::Transport(err.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|err| NotifierError::Transport(err.to_string()))?;
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

    #[test]
    fn body_mentions_rule_and_percentages() {
        let body = format_body(&notification());
        assert!(body.contains("high-deny-rate"));
        assert!(body.contains("60.0%"));
    }

    #[tokio::test]
    async fn invalid_from_address_is_a_configuration_error() {
        let config = EmailConfig {
            smtp_host: "localhost".into(),
            smtp_port: 2525,
            username: None,
            password: None,
            from_address: "not-an-address".into(),
            to_address: "ops@example.com".into(),
            enabled: true,
        };
        let notifier = EmailNotifier::new(config).unwrap();
        let err = notifier.send_notification(&notification()).await.unwrap_err();
        assert!(matches!(err, NotifierError::Configuration(_)));
    }
}
