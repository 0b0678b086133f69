use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use echelon_core::domain::employee::{EmployeeId, EmployeeRecord};

use super::{EmployeeRepository, RepositoryError};
use crate::DbPool;

pub struct SqlEmployeeRepository {
    pool: DbPool,
}

impl SqlEmployeeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl EmployeeRepository for SqlEmployeeRepository {
    async fn find_by_whatsapp_suffix(
        &self,
        suffix: &str,
    ) -> Result<Option<EmployeeRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                first_name,
                surname,
                whatsapp_suffix,
                leave_approver_name,
                leave_days_balance
             FROM employee
             WHERE whatsapp_suffix = ?",
        )
        .bind(suffix)
        .fetch_optional(&self.pool)
        .await?;

        row.map(employee_from_row).transpose()
    }

    async fn save_all(&self, employees: &[EmployeeRecord]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        for employee in employees {
            upsert_employee(&mut *tx, employee).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM employee").fetch_one(&self.pool).await?;
        u64::try_from(count)
            .map_err(|_| RepositoryError::Decode(format!("negative employee count {count}")))
    }
}

async fn upsert_employee<'c, E>(
    executor: E,
    employee: &EmployeeRecord,
) -> Result<(), RepositoryError>
where
    E: sqlx::Executor<'c, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO employee (
            id,
            first_name,
            surname,
            whatsapp_suffix,
            leave_approver_name,
            leave_days_balance
         ) VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            first_name = excluded.first_name,
            surname = excluded.surname,
            whatsapp_suffix = excluded.whatsapp_suffix,
            leave_approver_name = excluded.leave_approver_name,
            leave_days_balance = excluded.leave_days_balance",
    )
    .bind(&employee.id.0)
    .bind(&employee.first_name)
    .bind(&employee.surname)
    .bind(&employee.whatsapp_suffix)
    .bind(&employee.leave_approver_name)
    .bind(employee.leave_days_balance.map(|balance| balance.to_string()))
    .execute(executor)
    .await?;

    Ok(())
}

fn employee_from_row(row: SqliteRow) -> Result<EmployeeRecord, RepositoryError> {
    let leave_days_balance = row
        .try_get::<Option<String>, _>("leave_days_balance")?
        .map(|value| {
            Decimal::from_str(&value).map_err(|error| {
                RepositoryError::Decode(format!(
                    "invalid decimal in `leave_days_balance`: `{value}` ({error})"
                ))
            })
        })
        .transpose()?;

    Ok(EmployeeRecord {
        id: EmployeeId(row.try_get("id")?),
        first_name: row.try_get("first_name")?,
        surname: row.try_get("surname")?,
        whatsapp_suffix: row.try_get("whatsapp_suffix")?,
        leave_approver_name: row.try_get("leave_approver_name")?,
        leave_days_balance,
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use echelon_core::domain::employee::{EmployeeId, EmployeeRecord};

    use super::SqlEmployeeRepository;
    use crate::migrations;
    use crate::repositories::{EmployeeRepository, RepositoryError};
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn lookup_by_suffix_round_trips_the_record() {
        let pool = setup_pool().await;
        let repo = SqlEmployeeRepository::new(pool.clone());
        let employee = sample_employee("E-001", "771234567");

        repo.save_all(&[employee.clone()]).await.expect("save employee");

        let found = repo.find_by_whatsapp_suffix("771234567").await.expect("find employee");
        assert_eq!(found, Some(employee));
        assert_eq!(repo.count().await.expect("count"), 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn unknown_suffix_returns_none() {
        let pool = setup_pool().await;
        let repo = SqlEmployeeRepository::new(pool.clone());
        repo.save_all(&[sample_employee("E-001", "771234567")]).await.expect("save employee");

        let found = repo.find_by_whatsapp_suffix("000000000").await.expect("lookup");
        assert_eq!(found, None);

        pool.close().await;
    }

    #[tokio::test]
    async fn save_updates_existing_employee() {
        let pool = setup_pool().await;
        let repo = SqlEmployeeRepository::new(pool.clone());
        let mut employee = sample_employee("E-001", "771234567");
        repo.save_all(&[employee.clone()]).await.expect("save employee");

        employee.leave_days_balance = None;
        employee.leave_approver_name = String::new();
        repo.save_all(&[employee.clone()]).await.expect("update employee");

        let found = repo.find_by_whatsapp_suffix("771234567").await.expect("find employee");
        assert_eq!(found, Some(employee));
        assert_eq!(repo.count().await.expect("count"), 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn duplicate_suffix_is_rejected_by_the_unique_index() {
        let pool = setup_pool().await;
        let repo = SqlEmployeeRepository::new(pool.clone());
        repo.save_all(&[sample_employee("E-001", "771234567")]).await.expect("save first");

        let error = repo
            .save_all(&[sample_employee("E-002", "771234567")])
            .await
            .expect_err("second employee with the same suffix");
        assert!(matches!(error, RepositoryError::Database(_)));

        pool.close().await;
    }

    #[tokio::test]
    async fn failed_batch_saves_nothing() {
        let pool = setup_pool().await;
        let repo = SqlEmployeeRepository::new(pool.clone());
        repo.save_all(&[sample_employee("E-001", "771234567")]).await.expect("save first");

        let batch = [sample_employee("E-002", "772000111"), sample_employee("E-003", "771234567")];
        let error = repo.save_all(&batch).await.expect_err("E-003 clashes with E-001");
        assert!(matches!(error, RepositoryError::Database(_)));

        assert_eq!(repo.find_by_whatsapp_suffix("772000111").await.expect("lookup"), None);
        assert_eq!(repo.count().await.expect("count"), 1);

        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn sample_employee(id: &str, suffix: &str) -> EmployeeRecord {
        EmployeeRecord {
            id: EmployeeId(id.to_string()),
            first_name: "Tariro".to_string(),
            surname: "Moyo".to_string(),
            whatsapp_suffix: suffix.to_string(),
            leave_approver_name: "Rudo Chikore".to_string(),
            leave_days_balance: Some(Decimal::new(125, 1)),
        }
    }
}
