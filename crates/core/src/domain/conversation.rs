use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::flows::states::ConversationStep;

/// Opaque chat-platform identifier of a participant (a WhatsApp number for the Cloud API).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SenderId(pub String);

impl SenderId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last `len` characters of the identifier, or the whole identifier when it is shorter.
    pub fn suffix(&self, len: usize) -> &str {
        let count = self.0.chars().count();
        if count <= len {
            return &self.0;
        }
        let start = self.0.char_indices().nth(count - len).map(|(index, _)| index).unwrap_or(0);
        &self.0[start..]
    }
}

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    pub sender_id: SenderId,
    pub step: ConversationStep,
    pub pending_start_date: Option<NaiveDate>,
    pub last_message_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    pub fn new(sender_id: SenderId) -> Self {
        Self {
            sender_id,
            step: ConversationStep::Idle,
            pending_start_date: None,
            last_message_id: None,
            updated_at: Utc::now(),
        }
    }

    /// An idle conversation never expires; anything mid-flow expires after `timeout` of silence.
    pub fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.step != ConversationStep::Idle && now - self.updated_at > timeout
    }

    pub fn is_duplicate(&self, message_id: Option<&str>) -> bool {
        matches!(
            (message_id, self.last_message_id.as_deref()),
            (Some(incoming), Some(last)) if incoming == last
        )
    }
}

/// Overwrite applied by `ConversationRepository::set_step`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepUpdate {
    pub step: ConversationStep,
    pub pending_start_date: Option<NaiveDate>,
    pub message_id: Option<String>,
}

impl StepUpdate {
    pub fn to(step: ConversationStep) -> Self {
        Self { step, pending_start_date: None, message_id: None }
    }

    pub fn with_pending_start(mut self, date: Option<NaiveDate>) -> Self {
        self.pending_start_date = date;
        self
    }

    pub fn with_message_id(mut self, message_id: Option<&str>) -> Self {
        self.message_id = message_id.map(str::to_owned);
        self
    }

    pub fn apply(&self, state: &mut ConversationState, now: DateTime<Utc>) {
        state.step = self.step;
        state.pending_start_date = self.pending_start_date;
        if let Some(message_id) = &self.message_id {
            state.last_message_id = Some(message_id.clone());
        }
        state.updated_at = now;
    }
}
