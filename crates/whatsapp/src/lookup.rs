use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use echelon_core::config::DEFAULT_SENDER_SUFFIX_LEN;
use echelon_core::domain::conversation::SenderId;
use echelon_core::domain::employee::EmployeeRecord;
use echelon_db::repositories::{EmployeeRepository, RepositoryError};

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("no employee is registered under key `{key}`")]
    NotFound { key: String },
    #[error(transparent)]
    Store(#[from] RepositoryError),
}

/// Resolves a chat sender to the employee whose stored WhatsApp number ends with the same digits.
#[derive(Clone)]
pub struct EmployeeLookup {
    repository: Arc<dyn EmployeeRepository>,
    suffix_len: usize,
}

impl EmployeeLookup {
    pub fn new(repository: Arc<dyn EmployeeRepository>) -> Self {
        Self::with_suffix_len(repository, DEFAULT_SENDER_SUFFIX_LEN)
    }

    pub fn with_suffix_len(repository: Arc<dyn EmployeeRepository>, suffix_len: usize) -> Self {
        Self { repository, suffix_len: suffix_len.max(1) }
    }

    pub fn key_for<'a>(&self, sender_id: &'a SenderId) -> &'a str {
        sender_id.suffix(self.suffix_len)
    }

    pub async fn resolve(&self, sender_id: &SenderId) -> Result<EmployeeRecord, LookupError> {
        let key = self.key_for(sender_id);
        let found = self.repository.find_by_whatsapp_suffix(key).await?;
        debug!(
            event_name = "lookup.employee_resolved",
            sender_id = %sender_id,
            key,
            found = found.is_some(),
            "employee lookup finished"
        );
        found.ok_or_else(|| LookupError::NotFound { key: key.to_owned() })
    }
}
