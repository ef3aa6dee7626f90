use async_trait::async_trait;

use crate::domain::AlertNotification;

use super::error::NotifierError;

/// A destination for fired alerts. The evaluator fans out to every enabled
/// notifier and isolates failures per-notifier — see
/// [`super::evaluator::AlertEvaluator`].
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;
    fn is_enabled(&self) -> bool;
    async fn send_notification(&self, notification: &AlertNotification) -> Result<(), NotifierError>;
}
