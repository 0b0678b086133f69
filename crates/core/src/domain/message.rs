use serde::{Deserialize, Serialize};

use crate::domain::conversation::SenderId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboundEventKind {
    Text,
    ButtonReply,
}

/// One message received from the chat platform. Never mutated after receipt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub sender_id: SenderId,
    pub kind: InboundEventKind,
    pub text_body: Option<String>,
    pub button_id: Option<String>,
    /// Provider message id (`wamid.*`), used to drop redelivered webhooks.
    pub message_id: Option<String>,
}

impl InboundEvent {
    pub fn text(sender_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            sender_id: SenderId::new(sender_id),
            kind: InboundEventKind::Text,
            text_body: Some(body.into()),
            button_id: None,
            message_id: None,
        }
    }

    pub fn button(sender_id: impl Into<String>, button_id: impl Into<String>) -> Self {
        Self {
            sender_id: SenderId::new(sender_id),
            kind: InboundEventKind::ButtonReply,
            text_body: None,
            button_id: Some(button_id.into()),
            message_id: None,
        }
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyButton {
    pub id: String,
    pub label: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub recipient: SenderId,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buttons: Option<Vec<ReplyButton>>,
}

impl OutboundMessage {
    pub fn button_ids(&self) -> Vec<&str> {
        self.buttons
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|button| button.id.as_str())
            .collect()
    }
}
