use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use echelon_core::domain::conversation::{ConversationState, SenderId, StepUpdate};
use echelon_core::domain::employee::EmployeeRecord;
use echelon_core::domain::leave::LeaveApplication;
use echelon_core::flows::ConversationStep;

use super::{
    ConversationRepository, EmployeeRepository, LeaveApplicationRepository, RepositoryError,
};

#[derive(Default)]
pub struct InMemoryEmployeeRepository {
    employees: RwLock<HashMap<String, EmployeeRecord>>,
}

impl InMemoryEmployeeRepository {
    pub fn with_employees(employees: impl IntoIterator<Item = EmployeeRecord>) -> Self {
        Self {
            employees: RwLock::new(
                employees.into_iter().map(|employee| (employee.id.0.clone(), employee)).collect(),
            ),
        }
    }
}

#[async_trait::async_trait]
impl EmployeeRepository for InMemoryEmployeeRepository {
    async fn find_by_whatsapp_suffix(
        &self,
        suffix: &str,
    ) -> Result<Option<EmployeeRecord>, RepositoryError> {
        let employees = self.employees.read().await;
        Ok(employees.values().find(|employee| employee.whatsapp_suffix == suffix).cloned())
    }

    async fn save_all(&self, employees: &[EmployeeRecord]) -> Result<(), RepositoryError> {
        let mut table = self.employees.write().await;
        for employee in employees {
            table.insert(employee.id.0.clone(), employee.clone());
        }
        Ok(())
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let employees = self.employees.read().await;
        Ok(employees.len() as u64)
    }
}

/// Conversation states and submitted applications behind one lock, so `complete` is atomic.
#[derive(Default)]
pub struct InMemoryConversationRepository {
    inner: RwLock<ConversationTables>,
}

#[derive(Default)]
struct ConversationTables {
    states: HashMap<SenderId, ConversationState>,
    applications: Vec<LeaveApplication>,
}

impl InMemoryConversationRepository {
    pub async fn applications(&self) -> Vec<LeaveApplication> {
        self.inner.read().await.applications.clone()
    }

    /// Test hook for seeding a state with an arbitrary `updated_at`.
    pub async fn insert_state(&self, state: ConversationState) {
        self.inner.write().await.states.insert(state.sender_id.clone(), state);
    }
}

#[async_trait::async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn find(
        &self,
        sender_id: &SenderId,
    ) -> Result<Option<ConversationState>, RepositoryError> {
        Ok(self.inner.read().await.states.get(sender_id).cloned())
    }

    async fn get_or_create(
        &self,
        sender_id: &SenderId,
    ) -> Result<ConversationState, RepositoryError> {
        let mut tables = self.inner.write().await;
        let state = tables
            .states
            .entry(sender_id.clone())
            .or_insert_with(|| ConversationState::new(sender_id.clone()));
        Ok(state.clone())
    }

    async fn set_step(
        &self,
        sender_id: &SenderId,
        update: StepUpdate,
    ) -> Result<ConversationState, RepositoryError> {
        let mut tables = self.inner.write().await;
        let state = tables
            .states
            .entry(sender_id.clone())
            .or_insert_with(|| ConversationState::new(sender_id.clone()));
        update.apply(state, Utc::now());
        Ok(state.clone())
    }

    async fn complete(
        &self,
        application: &LeaveApplication,
        message_id: Option<&str>,
    ) -> Result<ConversationState, RepositoryError> {
        let mut tables = self.inner.write().await;
        let sender_id = application.sender_id.clone();
        let state = tables
            .states
            .entry(sender_id.clone())
            .or_insert_with(|| ConversationState::new(sender_id));
        StepUpdate::to(ConversationStep::Complete)
            .with_message_id(message_id)
            .apply(state, Utc::now());
        let state = state.clone();
        tables.applications.push(application.clone());
        Ok(state)
    }
}

#[async_trait::async_trait]
impl LeaveApplicationRepository for InMemoryConversationRepository {
    async fn latest_for_sender(
        &self,
        sender_id: &SenderId,
    ) -> Result<Option<LeaveApplication>, RepositoryError> {
        let tables = self.inner.read().await;
        Ok(tables
            .applications
            .iter()
            .filter(|application| &application.sender_id == sender_id)
            .max_by_key(|application| application.submitted_at)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use echelon_core::domain::conversation::{SenderId, StepUpdate};
    use echelon_core::domain::employee::{EmployeeId, EmployeeRecord};
    use echelon_core::domain::leave::LeaveApplication;
    use echelon_core::flows::ConversationStep;

    use crate::repositories::{
        ConversationRepository, EmployeeRepository, InMemoryConversationRepository,
        InMemoryEmployeeRepository, LeaveApplicationRepository,
    };

    #[tokio::test]
    async fn in_memory_employee_repo_finds_by_suffix() {
        let employee = EmployeeRecord {
            id: EmployeeId("E-001".to_string()),
            first_name: "Tariro".to_string(),
            surname: "Moyo".to_string(),
            whatsapp_suffix: "771234567".to_string(),
            leave_approver_name: "Rudo Chikore".to_string(),
            leave_days_balance: Some(Decimal::new(12, 0)),
        };
        let repo = InMemoryEmployeeRepository::with_employees([employee.clone()]);

        assert_eq!(repo.find_by_whatsapp_suffix("771234567").await.expect("find"), Some(employee));
        assert_eq!(repo.find_by_whatsapp_suffix("771234568").await.expect("miss"), None);
        assert_eq!(repo.count().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn in_memory_conversation_repo_follows_the_store_contract() {
        let repo = InMemoryConversationRepository::default();
        let sender = SenderId::new("263771234567");

        let state = repo.get_or_create(&sender).await.expect("create");
        assert_eq!(state.step, ConversationStep::Idle);

        let start = NaiveDate::from_ymd_opt(2025, 1, 24).expect("fixture date");
        let state = repo
            .set_step(
                &sender,
                StepUpdate::to(ConversationStep::AwaitingEnd).with_pending_start(Some(start)),
            )
            .await
            .expect("set step");
        assert_eq!(state.pending_start_date, Some(start));

        let end = NaiveDate::from_ymd_opt(2025, 1, 30).expect("fixture date");
        let application = LeaveApplication::submit(sender.clone(), None, Some(start), end);
        let state = repo.complete(&application, Some("wamid.3")).await.expect("complete");

        assert_eq!(state.step, ConversationStep::Complete);
        assert_eq!(state.pending_start_date, None);
        assert_eq!(
            repo.latest_for_sender(&sender).await.expect("latest"),
            Some(application.clone())
        );
        assert_eq!(repo.applications().await, vec![application]);
        assert_eq!(repo.get_or_create(&sender).await.expect("reload"), state);
    }
}
