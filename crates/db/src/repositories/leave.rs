use sqlx::{sqlite::SqliteRow, Row};

use echelon_core::domain::conversation::SenderId;
use echelon_core::domain::employee::EmployeeId;
use echelon_core::domain::leave::{LeaveApplication, LeaveApplicationId, LeaveApplicationStatus};

use super::{
    format_date, parse_date, parse_optional_date, parse_timestamp, LeaveApplicationRepository,
    RepositoryError,
};
use crate::DbPool;

pub struct SqlLeaveApplicationRepository {
    pool: DbPool,
}

impl SqlLeaveApplicationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const SELECT_APPLICATION: &str = "SELECT
        id,
        sender_id,
        employee_id,
        start_date,
        end_date,
        status,
        submitted_at
     FROM leave_application";

#[async_trait::async_trait]
impl LeaveApplicationRepository for SqlLeaveApplicationRepository {
    async fn latest_for_sender(
        &self,
        sender_id: &SenderId,
    ) -> Result<Option<LeaveApplication>, RepositoryError> {
        let row = sqlx::query(&format!(
            "{SELECT_APPLICATION}
             WHERE sender_id = ?
             ORDER BY submitted_at DESC, rowid DESC
             LIMIT 1"
        ))
        .bind(sender_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(application_from_row).transpose()
    }
}

pub(super) async fn insert_application<'c, E>(
    executor: E,
    application: &LeaveApplication,
) -> Result<(), RepositoryError>
where
    E: sqlx::Executor<'c, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO leave_application (
            id,
            sender_id,
            employee_id,
            start_date,
            end_date,
            status,
            submitted_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&application.id.0)
    .bind(application.sender_id.as_str())
    .bind(application.employee_id.as_ref().map(|id| id.0.as_str()))
    .bind(application.start_date.map(format_date))
    .bind(format_date(application.end_date))
    .bind(application.status.as_str())
    .bind(application.submitted_at.to_rfc3339())
    .execute(executor)
    .await?;

    Ok(())
}

fn application_from_row(row: SqliteRow) -> Result<LeaveApplication, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = LeaveApplicationStatus::parse(&status_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown leave application status `{status_raw}`"))
    })?;

    Ok(LeaveApplication {
        id: LeaveApplicationId(row.try_get("id")?),
        sender_id: SenderId(row.try_get("sender_id")?),
        employee_id: row.try_get::<Option<String>, _>("employee_id")?.map(EmployeeId),
        start_date: parse_optional_date("start_date", row.try_get("start_date")?)?,
        end_date: parse_date("end_date", row.try_get("end_date")?)?,
        status,
        submitted_at: parse_timestamp("submitted_at", row.try_get("submitted_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, NaiveDate, Utc};

    use echelon_core::domain::conversation::SenderId;
    use echelon_core::domain::leave::LeaveApplication;

    use super::SqlLeaveApplicationRepository;
    use crate::migrations;
    use crate::repositories::{
        ConversationRepository, LeaveApplicationRepository, SqlConversationRepository,
    };
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn latest_for_sender_returns_most_recent_submission() {
        let pool = setup_pool().await;
        let conversations = SqlConversationRepository::new(pool.clone());
        let repo = SqlLeaveApplicationRepository::new(pool.clone());
        let sender = SenderId::new("263771234567");

        let mut first = LeaveApplication::submit(
            sender.clone(),
            None,
            Some(date(2025, 1, 24)),
            date(2025, 1, 30),
        );
        first.submitted_at = parse_ts("2025-01-20T08:00:00Z");
        let mut second = LeaveApplication::submit(sender.clone(), None, None, date(2025, 3, 2));
        second.submitted_at = first.submitted_at + Duration::days(14);

        conversations.complete(&first, Some("wamid.1")).await.expect("first application");
        conversations.complete(&second, Some("wamid.2")).await.expect("second application");

        let latest = repo.latest_for_sender(&sender).await.expect("latest");
        assert_eq!(latest, Some(second));

        pool.close().await;
    }

    #[tokio::test]
    async fn sender_without_applications_has_none() {
        let pool = setup_pool().await;
        let repo = SqlLeaveApplicationRepository::new(pool.clone());

        let latest = repo.latest_for_sender(&SenderId::new("nobody")).await.expect("latest");
        assert_eq!(latest, None);

        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("fixture date")
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }
}
