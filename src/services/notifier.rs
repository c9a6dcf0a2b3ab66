use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use thiserror::Error;
use tokio::sync::broadcast;

use super::evaluator::AlertNotification;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification channel unavailable: {0}")]
    ChannelUnavailable(String),
}

/// Delivery boundary. Called at most once per claimed alert; a failure is
/// logged by the caller and never rolls the claim back.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        user_id: ObjectId,
        payload: &AlertNotification,
    ) -> Result<(), NotifyError>;
}

/// Publishes triggered alerts onto the process event bus as JSON. The
/// delivery channels the app runs (SSE feeds, push workers) subscribe
/// there and fan the message out to the user.
#[derive(Clone)]
pub struct EventBusNotifier {
    events_tx: broadcast::Sender<String>,
}

impl EventBusNotifier {
    pub fn new(events_tx: broadcast::Sender<String>) -> Self {
        Self { events_tx }
    }
}

#[async_trait]
impl Notifier for EventBusNotifier {
    async fn notify(
        &self,
        user_id: ObjectId,
        payload: &AlertNotification,
    ) -> Result<(), NotifyError> {
        let event = serde_json::json!({
            "event": "alertTriggered",
            "user_id": user_id.to_hex(),
            "message": payload.message(),
            "payload": payload,
        });

        self.events_tx
            .send(event.to_string())
            .map(|_| ())
            .map_err(|e| NotifyError::ChannelUnavailable(e.to_string()))
    }
}
