use async_trait::async_trait;
use thiserror::Error;

use echelon_core::domain::conversation::{ConversationState, SenderId, StepUpdate};
use echelon_core::domain::employee::EmployeeRecord;
use echelon_core::domain::leave::LeaveApplication;

pub mod conversation;
pub mod employee;
pub mod leave;
pub mod memory;

pub use conversation::SqlConversationRepository;
pub use employee::SqlEmployeeRepository;
pub use leave::SqlLeaveApplicationRepository;
pub use memory::{InMemoryConversationRepository, InMemoryEmployeeRepository};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait EmployeeRepository: Send + Sync {
    /// Single indexed lookup on the stored WhatsApp suffix.
    async fn find_by_whatsapp_suffix(
        &self,
        suffix: &str,
    ) -> Result<Option<EmployeeRecord>, RepositoryError>;
    /// Upserts every record or none of them.
    async fn save_all(&self, employees: &[EmployeeRecord]) -> Result<(), RepositoryError>;
    async fn count(&self) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn find(&self, sender_id: &SenderId)
        -> Result<Option<ConversationState>, RepositoryError>;
    /// Returns the stored state, inserting an `Idle` one on first contact.
    async fn get_or_create(&self, sender_id: &SenderId)
        -> Result<ConversationState, RepositoryError>;
    async fn set_step(
        &self,
        sender_id: &SenderId,
        update: StepUpdate,
    ) -> Result<ConversationState, RepositoryError>;
    /// Records `application` and moves its sender to `Complete` in one transaction.
    async fn complete(
        &self,
        application: &LeaveApplication,
        message_id: Option<&str>,
    ) -> Result<ConversationState, RepositoryError>;
}

#[async_trait]
pub trait LeaveApplicationRepository: Send + Sync {
    async fn latest_for_sender(
        &self,
        sender_id: &SenderId,
    ) -> Result<Option<LeaveApplication>, RepositoryError>;
}

fn parse_timestamp(
    column: &str,
    value: String,
) -> Result<chrono::DateTime<chrono::Utc>, RepositoryError> {
    chrono::DateTime::parse_from_rfc3339(&value)
        .map(|timestamp| timestamp.with_timezone(&chrono::Utc))
        .map_err(|error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        })
}

fn parse_date(column: &str, value: String) -> Result<chrono::NaiveDate, RepositoryError> {
    chrono::NaiveDate::parse_from_str(&value, DATE_FORMAT).map_err(|error| {
        RepositoryError::Decode(format!("invalid date in `{column}`: `{value}` ({error})"))
    })
}

fn parse_optional_date(
    column: &str,
    value: Option<String>,
) -> Result<Option<chrono::NaiveDate>, RepositoryError> {
    value.map(|date| parse_date(column, date)).transpose()
}

fn format_date(date: chrono::NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

const DATE_FORMAT: &str = "%Y-%m-%d";
