use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use echelon_core::domain::message::OutboundMessage;
use echelon_core::errors::ApplicationError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub provider_message_id: String,
    pub accepted_at: DateTime<Utc>,
}

impl DeliveryReceipt {
    pub fn accepted_now() -> Self {
        Self {
            provider_message_id: format!("local.{}", Uuid::new_v4().simple()),
            accepted_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("gateway rejected message: {0}")]
    Rejected(String),
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

impl From<GatewayError> for ApplicationError {
    fn from(error: GatewayError) -> Self {
        Self::Delivery(error.to_string())
    }
}

/// The `send` half of the messaging provider.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    async fn send(&self, message: OutboundMessage) -> Result<DeliveryReceipt, GatewayError>;
}

/// Keeps every sent message in memory; optionally fails each send.
#[derive(Clone, Default)]
pub struct RecordingGateway {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    failure: Option<GatewayError>,
}

impl RecordingGateway {
    pub fn failing(error: GatewayError) -> Self {
        Self { sent: Arc::default(), failure: Some(error) }
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn take_sent(&self) -> Vec<OutboundMessage> {
        match self.sent.lock() {
            Ok(mut sent) => std::mem::take(&mut *sent),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

#[async_trait]
impl MessagingGateway for RecordingGateway {
    async fn send(&self, message: OutboundMessage) -> Result<DeliveryReceipt, GatewayError> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        match self.sent.lock() {
            Ok(mut sent) => sent.push(message),
            Err(poisoned) => poisoned.into_inner().push(message),
        }
        Ok(DeliveryReceipt::accepted_now())
    }
}

#[cfg(test)]
mod tests {
    use echelon_core::domain::conversation::SenderId;
    use echelon_core::domain::message::OutboundMessage;

    use super::{GatewayError, MessagingGateway, RecordingGateway};

    fn message(text: &str) -> OutboundMessage {
        OutboundMessage { recipient: SenderId::new("X"), text: text.to_owned(), buttons: None }
    }

    #[tokio::test]
    async fn recording_gateway_keeps_messages_in_order() {
        let gateway = RecordingGateway::default();
        gateway.send(message("one")).await.expect("send one");
        let receipt = gateway.send(message("two")).await.expect("send two");

        assert!(receipt.provider_message_id.starts_with("local."));
        let texts =
            gateway.take_sent().into_iter().map(|message| message.text).collect::<Vec<_>>();
        assert_eq!(texts, vec!["one", "two"]);
        assert!(gateway.sent().is_empty());
    }

    #[tokio::test]
    async fn failing_gateway_records_nothing() {
        let gateway = RecordingGateway::failing(GatewayError::Unavailable("timeout".to_owned()));
        let error = gateway.send(message("lost")).await.expect_err("send fails");

        assert_eq!(error, GatewayError::Unavailable("timeout".to_owned()));
        assert!(gateway.sent().is_empty());
    }
}
