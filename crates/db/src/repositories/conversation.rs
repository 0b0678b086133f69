use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};

use echelon_core::domain::conversation::{ConversationState, SenderId, StepUpdate};
use echelon_core::domain::leave::LeaveApplication;
use echelon_core::flows::ConversationStep;

use super::leave::insert_application;
use super::{
    format_date, parse_optional_date, parse_timestamp, ConversationRepository, RepositoryError,
};
use crate::DbPool;

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const UPSERT_STEP: &str = "INSERT INTO conversation_state (
        sender_id,
        step,
        pending_start_date,
        last_message_id,
        created_at,
        updated_at
     ) VALUES (?, ?, ?, ?, ?, ?)
     ON CONFLICT(sender_id) DO UPDATE SET
        step = excluded.step,
        pending_start_date = excluded.pending_start_date,
        last_message_id = COALESCE(excluded.last_message_id, conversation_state.last_message_id),
        updated_at = excluded.updated_at
     RETURNING sender_id, step, pending_start_date, last_message_id, updated_at";

#[async_trait::async_trait]
impl ConversationRepository for SqlConversationRepository {
    async fn find(
        &self,
        sender_id: &SenderId,
    ) -> Result<Option<ConversationState>, RepositoryError> {
        let row = sqlx::query(
            "SELECT sender_id, step, pending_start_date, last_message_id, updated_at
             FROM conversation_state
             WHERE sender_id = ?",
        )
        .bind(sender_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(state_from_row).transpose()
    }

    async fn get_or_create(
        &self,
        sender_id: &SenderId,
    ) -> Result<ConversationState, RepositoryError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO conversation_state (sender_id, step, created_at, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(sender_id) DO NOTHING",
        )
        .bind(sender_id.as_str())
        .bind(ConversationStep::Idle.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.find(sender_id).await?.ok_or_else(|| {
            RepositoryError::Decode(format!("conversation state for `{sender_id}` vanished"))
        })
    }

    async fn set_step(
        &self,
        sender_id: &SenderId,
        update: StepUpdate,
    ) -> Result<ConversationState, RepositoryError> {
        let now = Utc::now().to_rfc3339();
        let row = sqlx::query(UPSERT_STEP)
            .bind(sender_id.as_str())
            .bind(update.step.as_str())
            .bind(update.pending_start_date.map(format_date))
            .bind(update.message_id.as_deref())
            .bind(&now)
            .bind(&now)
            .fetch_one(&self.pool)
            .await?;

        state_from_row(row)
    }

    async fn complete(
        &self,
        application: &LeaveApplication,
        message_id: Option<&str>,
    ) -> Result<ConversationState, RepositoryError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(UPSERT_STEP)
            .bind(application.sender_id.as_str())
            .bind(ConversationStep::Complete.as_str())
            .bind(Option::<String>::None)
            .bind(message_id)
            .bind(&now)
            .bind(&now)
            .fetch_one(&mut *tx)
            .await?;
        let state = state_from_row(row)?;

        insert_application(&mut *tx, application).await?;
        tx.commit().await?;

        Ok(state)
    }
}

fn state_from_row(row: SqliteRow) -> Result<ConversationState, RepositoryError> {
    let step_raw = row.try_get::<String, _>("step")?;
    let step = ConversationStep::parse(&step_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown conversation step `{step_raw}`")))?;

    Ok(ConversationState {
        sender_id: SenderId(row.try_get("sender_id")?),
        step,
        pending_start_date: parse_optional_date(
            "pending_start_date",
            row.try_get("pending_start_date")?,
        )?,
        last_message_id: row.try_get("last_message_id")?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
