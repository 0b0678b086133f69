use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::info;

use echelon_core::domain::conversation::{ConversationState, SenderId, StepUpdate};
use echelon_core::domain::leave::LeaveApplication;
use echelon_core::flows::ConversationStep;
use echelon_db::repositories::{ConversationRepository, RepositoryError};

use crate::locks::{SenderGuard, SenderLocks};

/// Conversation state access for the router: the repository plus per-sender serialization
/// and optional inactivity expiry.
#[derive(Clone)]
pub struct ConversationStore {
    repository: Arc<dyn ConversationRepository>,
    locks: SenderLocks,
    session_timeout: Option<Duration>,
}

impl ConversationStore {
    pub fn new(repository: Arc<dyn ConversationRepository>) -> Self {
        Self { repository, locks: SenderLocks::default(), session_timeout: None }
    }

    pub fn with_session_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.session_timeout = timeout;
        self
    }

    /// Held for the whole handling of one event.
    pub async fn lock(&self, sender_id: &SenderId) -> SenderGuard {
        self.locks.acquire(sender_id).await
    }

    #[cfg(test)]
    pub(crate) fn locks(&self) -> &SenderLocks {
        &self.locks
    }

    pub async fn get_or_create(
        &self,
        sender_id: &SenderId,
    ) -> Result<ConversationState, RepositoryError> {
        let state = self.repository.get_or_create(sender_id).await?;
        let Some(timeout) = self.session_timeout else {
            return Ok(state);
        };
        if !state.is_expired(Utc::now(), timeout) {
            return Ok(state);
        }

        info!(
            event_name = "state.session_expired",
            sender_id = %sender_id,
            step = state.step.as_str(),
            idle_since = %state.updated_at,
            "conversation expired; resetting to idle"
        );
        self.repository.set_step(sender_id, StepUpdate::to(ConversationStep::Idle)).await
    }

    pub async fn set_step(
        &self,
        sender_id: &SenderId,
        update: StepUpdate,
    ) -> Result<ConversationState, RepositoryError> {
        self.repository.set_step(sender_id, update).await
    }

    pub async fn complete(
        &self,
        application: &LeaveApplication,
        message_id: Option<&str>,
    ) -> Result<ConversationState, RepositoryError> {
        self.repository.complete(application, message_id).await
    }
}
