use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use echelon_core::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink,
};
use echelon_core::config::{AppConfig, UnknownSenderPolicy};
use echelon_core::errors::ApplicationError;
use echelon_core::domain::conversation::{ConversationState, StepUpdate};
use echelon_core::domain::employee::EmployeeRecord;
use echelon_core::domain::leave::LeaveApplication;
use echelon_core::domain::message::{InboundEvent, OutboundMessage};
use echelon_core::flows::{
    ConversationStep, FlowAction, FlowContext, FlowEngine, FlowTransitionError,
    LeaveApplicationFlow,
};
use echelon_core::intent::classify;
use echelon_db::repositories::{LeaveApplicationRepository, RepositoryError};

use crate::events::EventContext;
use crate::locks::SenderGuard;
use crate::lookup::{EmployeeLookup, LookupError};
use crate::replies;
use crate::state::ConversationStore;

const ROUTER_ACTOR: &str = "intent-router";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(OutboundMessage),
    /// Redelivered event; nothing was changed or sent.
    Ignored,
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("conversation store failure: {0}")]
    Store(#[from] RepositoryError),
}

#[derive(Clone, Debug)]
pub struct RouterSettings {
    pub bot_name: String,
    pub flow: FlowContext,
    pub unknown_sender_policy: UnknownSenderPolicy,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            bot_name: "Echelon Bot".to_owned(),
            flow: FlowContext::default(),
            unknown_sender_policy: UnknownSenderPolicy::default(),
        }
    }
}

impl RouterSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            bot_name: config.flow.bot_name.clone(),
            flow: FlowContext { step_policy: config.flow.step_policy },
            unknown_sender_policy: config.flow.unknown_sender_policy,
        }
    }
}

pub struct IntentRouter {
    store: ConversationStore,
    lookup: EmployeeLookup,
    applications: Arc<dyn LeaveApplicationRepository>,
    engine: FlowEngine<LeaveApplicationFlow>,
    audit: Arc<dyn AuditSink>,
    settings: RouterSettings,
}

impl IntentRouter {
    pub fn new(
        store: ConversationStore,
        lookup: EmployeeLookup,
        applications: Arc<dyn LeaveApplicationRepository>,
        settings: RouterSettings,
    ) -> Self {
        Self {
            store,
            lookup,
            applications,
            engine: FlowEngine::default(),
            audit: Arc::new(TracingAuditSink),
            settings,
        }
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Handles one inbound event end to end while holding the sender's lock.
    pub async fn handle(
        &self,
        event: &InboundEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, RouteError> {
        let guard = self.store.lock(&event.sender_id).await;
        self.handle_locked(event, ctx, &guard).await
    }

    /// Same as [`IntentRouter::handle`] with the sender's lock already taken, so callers can
    /// queue a sender's events in arrival order before handing them off.
    pub async fn handle_locked(
        &self,
        event: &InboundEvent,
        ctx: &EventContext,
        guard: &SenderGuard,
    ) -> Result<HandlerResult, RouteError> {
        debug_assert_eq!(guard.sender_id(), &event.sender_id);
        let sender = &event.sender_id;
        let audit =
            AuditContext::new(Some(sender.clone()), ctx.correlation_id.clone(), ROUTER_ACTOR);

        let employee = match self.lookup.resolve(sender).await {
            Ok(employee) => Some(employee),
            Err(LookupError::NotFound { key }) => {
                self.audit.emit(
                    AuditEvent::from_context(
                        &audit,
                        "lookup.employee_not_found",
                        AuditCategory::Lookup,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("key", key),
                );
                if self.settings.unknown_sender_policy == UnknownSenderPolicy::Reject {
                    return Ok(HandlerResult::Responded(replies::unknown_sender(
                        sender,
                        &self.settings.bot_name,
                    )));
                }
                None
            }
            Err(LookupError::Store(error)) => return Err(error.into()),
        };

        let state = self.store.get_or_create(sender).await?;
        if state.is_duplicate(event.message_id.as_deref()) {
            info!(
                event_name = "ingress.duplicate_ignored",
                sender_id = %sender,
                correlation_id = %ctx.correlation_id,
                "dropping redelivered message"
            );
            self.audit.emit(AuditEvent::from_context(
                &audit,
                "ingress.duplicate_ignored",
                AuditCategory::Ingress,
                AuditOutcome::Rejected,
            ));
            return Ok(HandlerResult::Ignored);
        }

        let intent = classify(event);
        debug!(
            event_name = "router.intent_classified",
            sender_id = %sender,
            correlation_id = %ctx.correlation_id,
            intent = intent.label(),
            step = state.step.as_str(),
            "classified inbound event"
        );

        let outcome = match self.engine.apply_with_audit(
            &state.step,
            &intent,
            &self.settings.flow,
            self.audit.as_ref(),
            &audit,
        ) {
            Ok(outcome) => outcome,
            Err(FlowTransitionError::OutOfSequence { field, .. }) => {
                self.retain_step(&state, event).await?;
                return Ok(HandlerResult::Responded(replies::out_of_sequence(sender, field)));
            }
        };

        let reply =
            self.perform(&state, outcome.action, event, employee.as_ref(), &audit).await?;

        if outcome.from != outcome.to {
            info!(
                event_name = "flow.step_changed",
                sender_id = %sender,
                correlation_id = %ctx.correlation_id,
                from = outcome.from.as_str(),
                to = outcome.to.as_str(),
                intent = outcome.intent,
                "conversation advanced"
            );
        }

        Ok(HandlerResult::Responded(reply))
    }

    async fn perform(
        &self,
        state: &ConversationState,
        action: FlowAction,
        event: &InboundEvent,
        employee: Option<&EmployeeRecord>,
        audit: &AuditContext,
    ) -> Result<OutboundMessage, RouteError> {
        let sender = &state.sender_id;
        let message_id = event.message_id.as_deref();

        let reply = match action {
            FlowAction::ShowMenu => {
                self.store
                    .set_step(
                        sender,
                        StepUpdate::to(ConversationStep::Idle).with_message_id(message_id),
                    )
                    .await?;
                replies::greeting(sender, &self.settings.bot_name, employee)
            }
            FlowAction::PromptStartDate => {
                self.store
                    .set_step(
                        sender,
                        StepUpdate::to(ConversationStep::AwaitingStart).with_message_id(message_id),
                    )
                    .await?;
                replies::start_date_prompt(sender)
            }
            FlowAction::StorePendingStart(start) => {
                self.store
                    .set_step(
                        sender,
                        StepUpdate::to(ConversationStep::AwaitingEnd)
                            .with_pending_start(Some(start))
                            .with_message_id(message_id),
                    )
                    .await?;
                replies::end_date_prompt(sender)
            }
            FlowAction::RejectDate { field, error } => {
                self.retain_step(state, event).await?;
                replies::date_format_error(sender, field, &error)
            }
            FlowAction::SubmitApplication { end_date } => {
                let application = LeaveApplication::submit(
                    sender.clone(),
                    employee.map(|employee| employee.id.clone()),
                    state.pending_start_date,
                    end_date,
                );
                if let Err(error) = self.store.complete(&application, message_id).await {
                    self.audit.emit(
                        AuditEvent::from_context(
                            audit,
                            "leave.application_failed",
                            AuditCategory::Persistence,
                            AuditOutcome::Failed,
                        )
                        .with_metadata("error", error.to_string()),
                    );
                    return Err(error.into());
                }
                self.audit.emit(
                    AuditEvent::from_context(
                        audit,
                        "leave.application_submitted",
                        AuditCategory::Persistence,
                        AuditOutcome::Success,
                    )
                    .with_metadata("application_id", application.id.0.clone()),
                );
                replies::application_submitted(sender, &application, employee)
            }
            FlowAction::ReportApplicationStatus => {
                let latest = self.applications.latest_for_sender(sender).await?;
                self.retain_step(state, event).await?;
                replies::application_status(sender, latest.as_ref())
            }
            FlowAction::ReportLeaveBalance => {
                self.retain_step(state, event).await?;
                replies::leave_balance(sender, employee)
            }
            FlowAction::Fallback => {
                self.retain_step(state, event).await?;
                replies::fallback(sender, &self.settings.bot_name)
            }
        };

        Ok(reply)
    }

    /// Keeps step and pending date, recording the message id for duplicate detection.
    async fn retain_step(
        &self,
        state: &ConversationState,
        event: &InboundEvent,
    ) -> Result<(), RouteError> {
        let Some(message_id) = event.message_id.as_deref() else {
            return Ok(());
        };
        self.store
            .set_step(
                &state.sender_id,
                StepUpdate::to(state.step)
                    .with_pending_start(state.pending_start_date)
                    .with_message_id(Some(message_id)),
            )
            .await?;
        Ok(())
    }
}

impl From<RouteError> for ApplicationError {
    fn from(error: RouteError) -> Self {
        match error {
            RouteError::Store(error) => Self::Persistence(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use echelon_core::audit::InMemoryAuditSink;
    use echelon_core::config::UnknownSenderPolicy;
    use echelon_core::domain::conversation::{ConversationState, SenderId, StepUpdate};
    use echelon_core::domain::employee::{EmployeeId, EmployeeRecord};
    use echelon_core::domain::leave::LeaveApplication;
    use echelon_core::domain::message::{InboundEvent, OutboundMessage};
    use echelon_core::flows::{ConversationStep, FlowContext, StepPolicy};
    use echelon_db::repositories::{
        ConversationRepository, InMemoryConversationRepository, InMemoryEmployeeRepository,
        RepositoryError,
    };

    use super::{HandlerResult, IntentRouter, RouteError, RouterSettings};
    use crate::events::EventContext;
    use crate::lookup::EmployeeLookup;
    use crate::state::ConversationStore;

    const SENDER: &str = "263771234567";

    struct Harness {
        router: Arc<IntentRouter>,
        conversations: Arc<InMemoryConversationRepository>,
        audit: InMemoryAuditSink,
    }

    fn employee() -> EmployeeRecord {
        EmployeeRecord {
            id: EmployeeId("E-001".to_owned()),
            first_name: "Tariro".to_owned(),
            surname: "Moyo".to_owned(),
            whatsapp_suffix: "771234567".to_owned(),
            leave_approver_name: "Rudo Chikore".to_owned(),
            leave_days_balance: Some(Decimal::new(10, 0)),
        }
    }

    fn harness(settings: RouterSettings) -> Harness {
        let conversations = Arc::new(InMemoryConversationRepository::default());
        let employees = Arc::new(InMemoryEmployeeRepository::with_employees([employee()]));
        let audit = InMemoryAuditSink::default();
        let router = IntentRouter::new(
            ConversationStore::new(conversations.clone()),
            EmployeeLookup::new(employees),
            conversations.clone(),
            settings,
        )
        .with_audit_sink(Arc::new(audit.clone()));
        Harness { router: Arc::new(router), conversations, audit }
    }

    fn ctx() -> EventContext {
        EventContext::new("test-correlation")
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("fixture date")
    }

    async fn reply(router: &IntentRouter, event: InboundEvent) -> OutboundMessage {
        match router.handle(&event, &ctx()).await.expect("route event") {
            HandlerResult::Responded(message) => message,
            HandlerResult::Ignored => panic!("expected a reply for {event:?}"),
        }
    }

    async fn say(router: &IntentRouter, body: &str) -> OutboundMessage {
        reply(router, InboundEvent::text(SENDER, body)).await
    }

    async fn step(harness: &Harness) -> ConversationStep {
        harness
            .conversations
            .get_or_create(&SenderId::new(SENDER))
            .await
            .expect("load state")
            .step
    }

    #[tokio::test]
    async fn greeting_replies_with_menu_and_stays_idle() {
        let harness = harness(RouterSettings::default());

        let message = say(&harness.router, "Hello").await;

        assert_eq!(message.recipient, SenderId::new(SENDER));
        assert!(message.text.contains("How can I assist you?"));
        assert_eq!(message.button_ids(), vec!["Apply", "Track", "Check"]);
        assert_eq!(step(&harness).await, ConversationStep::Idle);
    }

    #[tokio::test]
    async fn apply_button_prompts_for_start_date() {
        let harness = harness(RouterSettings::default());

        let message = reply(&harness.router, InboundEvent::button(SENDER, "Apply")).await;

        assert!(message.text.contains("`start 24 january 2025`"));
        assert_eq!(step(&harness).await, ConversationStep::AwaitingStart);
    }

    #[tokio::test]
    async fn valid_start_date_is_stored_and_end_date_requested() {
        let harness = harness(RouterSettings::default());
        reply(&harness.router, InboundEvent::button(SENDER, "Apply")).await;

        let message = say(&harness.router, "start 24 January 2025").await;

        assert!(message.text.contains("`end 24 january 2025`"));
        let state = harness
            .conversations
            .get_or_create(&SenderId::new(SENDER))
            .await
            .expect("state");
        assert_eq!(state.step, ConversationStep::AwaitingEnd);
        assert_eq!(state.pending_start_date, Some(date(2025, 1, 24)));
    }

    #[tokio::test]
    async fn misspelled_month_is_rejected_without_state_change() {
        let harness = harness(RouterSettings::default());
        reply(&harness.router, InboundEvent::button(SENDER, "Apply")).await;

        let message = say(&harness.router, "start 24 Januar 2025").await;

        assert!(message.text.starts_with("❌ No, incorrect message format"));
        assert!(message.text.contains("`start 24 january 2025`"));
        assert_eq!(step(&harness).await, ConversationStep::AwaitingStart);
    }

    #[tokio::test]
    async fn impossible_calendar_day_is_rejected() {
        let harness = harness(RouterSettings::default());
        reply(&harness.router, InboundEvent::button(SENDER, "Apply")).await;
        say(&harness.router, "start 24 January 2025").await;

        let message = say(&harness.router, "end 31 February 2025").await;

        assert!(message.text.contains("`end 24 january 2025`"));
        assert_eq!(step(&harness).await, ConversationStep::AwaitingEnd);
        assert!(harness.conversations.applications().await.is_empty());
    }

    #[tokio::test]
    async fn unrecognized_text_gets_the_fallback() {
        let harness = harness(RouterSettings::default());

        let message = say(&harness.router, "what is my leave balance").await;

        assert_eq!(message.text, "Echelon Bot Here 😎. Say 'hello' to start!");
        assert_eq!(step(&harness).await, ConversationStep::Idle);
    }

    #[tokio::test]
    async fn full_application_is_recorded_and_trackable() {
        let harness = harness(RouterSettings::default());
        say(&harness.router, "hello").await;
        reply(&harness.router, InboundEvent::button(SENDER, "Apply")).await;
        say(&harness.router, "start 24 January 2025").await;

        let confirmation = say(&harness.router, "end 30 January 2025").await;

        assert!(confirmation.text.starts_with("✅ Leave Application Successful!"));
        assert!(confirmation.text.contains("Sent to Rudo Chikore for approval."));
        assert_eq!(step(&harness).await, ConversationStep::Complete);

        let applications = harness.conversations.applications().await;
        assert_eq!(applications.len(), 1);
        assert_eq!(applications[0].start_date, Some(date(2025, 1, 24)));
        assert_eq!(applications[0].end_date, date(2025, 1, 30));
        assert_eq!(applications[0].employee_id, Some(EmployeeId("E-001".to_owned())));

        let status = reply(&harness.router, InboundEvent::button(SENDER, "Track")).await;
        assert!(status.text.contains(&applications[0].id.0));
        assert!(status.text.contains("Pending approval"));
        assert_eq!(step(&harness).await, ConversationStep::Complete);

        let event_types = harness.audit.event_types();
        assert!(event_types.contains(&"leave.application_submitted".to_owned()));
    }

    #[tokio::test]
    async fn check_button_reports_the_balance() {
        let harness = harness(RouterSettings::default());

        let message = reply(&harness.router, InboundEvent::button(SENDER, "Check")).await;

        assert_eq!(message.text, "Your leave balance is 10 days.");
    }

    #[tokio::test]
    async fn redelivered_message_is_ignored() {
        let harness = harness(RouterSettings::default());
        let apply = InboundEvent::button(SENDER, "Apply").with_message_id("wamid.1");

        reply(&harness.router, apply.clone()).await;
        reply(
            &harness.router,
            InboundEvent::text(SENDER, "start 24 January 2025").with_message_id("wamid.2"),
        )
        .await;

        let repeat_start = harness
            .router
            .handle(
                &InboundEvent::text(SENDER, "start 24 January 2025").with_message_id("wamid.2"),
                &ctx(),
            )
            .await
            .expect("route duplicate");
        assert_eq!(repeat_start, HandlerResult::Ignored);
        assert_eq!(step(&harness).await, ConversationStep::AwaitingEnd);

        // only the most recent id is remembered
        let again = harness.router.handle(&apply, &ctx()).await.expect("route older id");
        assert!(matches!(again, HandlerResult::Responded(_)));
        assert!(harness.audit.event_types().contains(&"ingress.duplicate_ignored".to_owned()));
    }

    #[tokio::test]
    async fn unknown_sender_proceeds_anonymously_by_default() {
        let harness = harness(RouterSettings::default());
        let stranger = "15550001111";

        let greeting = match harness
            .router
            .handle(&InboundEvent::text(stranger, "hello"), &ctx())
            .await
            .expect("route")
        {
            HandlerResult::Responded(message) => message,
            HandlerResult::Ignored => panic!("expected greeting"),
        };

        assert!(greeting.text.starts_with("Hello! Echelon Bot"));
        assert!(harness.audit.event_types().contains(&"lookup.employee_not_found".to_owned()));
    }

    #[tokio::test]
    async fn unknown_sender_is_rejected_when_configured() {
        let harness = harness(RouterSettings {
            unknown_sender_policy: UnknownSenderPolicy::Reject,
            ..RouterSettings::default()
        });
        let stranger = SenderId::new("15550001111");

        let message = match harness
            .router
            .handle(&InboundEvent::button(stranger.as_str(), "Apply"), &ctx())
            .await
            .expect("route")
        {
            HandlerResult::Responded(message) => message,
            HandlerResult::Ignored => panic!("expected rejection"),
        };

        assert!(message.text.contains("not registered"));
        assert!(harness.conversations.find(&stranger).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn strict_policy_hints_out_of_sequence_dates() {
        let harness = harness(RouterSettings {
            flow: FlowContext { step_policy: StepPolicy::Strict },
            ..RouterSettings::default()
        });

        let message = say(&harness.router, "end 30 January 2025").await;

        assert!(message.text.contains("came too early"));
        assert_eq!(step(&harness).await, ConversationStep::Idle);
        assert!(harness.conversations.applications().await.is_empty());
    }

    #[tokio::test]
    async fn lenient_policy_accepts_an_end_date_without_a_start() {
        let harness = harness(RouterSettings::default());

        let message = say(&harness.router, "end 30 January 2025").await;

        assert!(message.text.contains("Leave ending: 30 January 2025"));
        assert_eq!(harness.conversations.applications().await[0].start_date, None);
    }

    struct FailingConversationRepository {
        inner: InMemoryConversationRepository,
        fail_writes: AtomicBool,
    }

    #[async_trait]
    impl ConversationRepository for FailingConversationRepository {
        async fn find(
            &self,
            sender_id: &SenderId,
        ) -> Result<Option<ConversationState>, RepositoryError> {
            self.inner.find(sender_id).await
        }

        async fn get_or_create(
            &self,
            sender_id: &SenderId,
        ) -> Result<ConversationState, RepositoryError> {
            self.inner.get_or_create(sender_id).await
        }

        async fn set_step(
            &self,
            sender_id: &SenderId,
            update: StepUpdate,
        ) -> Result<ConversationState, RepositoryError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(RepositoryError::Decode("database is locked".to_owned()));
            }
            self.inner.set_step(sender_id, update).await
        }

        async fn complete(
            &self,
            application: &LeaveApplication,
            message_id: Option<&str>,
        ) -> Result<ConversationState, RepositoryError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(RepositoryError::Decode("database is locked".to_owned()));
            }
            self.inner.complete(application, message_id).await
        }
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_route_error_without_mutation() {
        let conversations = Arc::new(FailingConversationRepository {
            inner: InMemoryConversationRepository::default(),
            fail_writes: AtomicBool::new(false),
        });
        let applications = Arc::new(InMemoryConversationRepository::default());
        let audit = InMemoryAuditSink::default();
        let router = IntentRouter::new(
            ConversationStore::new(conversations.clone()),
            EmployeeLookup::new(Arc::new(InMemoryEmployeeRepository::with_employees([
                employee(),
            ]))),
            applications,
            RouterSettings::default(),
        )
        .with_audit_sink(Arc::new(audit.clone()));

        reply(&router, InboundEvent::button(SENDER, "Apply")).await;
        reply(&router, InboundEvent::text(SENDER, "start 24 January 2025")).await;
        conversations.fail_writes.store(true, Ordering::SeqCst);

        let error = router
            .handle(&InboundEvent::text(SENDER, "end 30 January 2025"), &ctx())
            .await
            .expect_err("store failure");

        assert!(matches!(error, RouteError::Store(_)));
        let state = conversations.find(&SenderId::new(SENDER)).await.expect("find").expect("state");
        assert_eq!(state.step, ConversationStep::AwaitingEnd);
        assert!(conversations.inner.applications().await.is_empty());
        assert!(audit.event_types().contains(&"leave.application_failed".to_owned()));
    }

    struct SlowConversationRepository {
        inner: InMemoryConversationRepository,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl ConversationRepository for SlowConversationRepository {
        async fn find(
            &self,
            sender_id: &SenderId,
        ) -> Result<Option<ConversationState>, RepositoryError> {
            self.inner.find(sender_id).await
        }

        async fn get_or_create(
            &self,
            sender_id: &SenderId,
        ) -> Result<ConversationState, RepositoryError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            let state = self.inner.get_or_create(sender_id).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            state
        }

        async fn set_step(
            &self,
            sender_id: &SenderId,
            update: StepUpdate,
        ) -> Result<ConversationState, RepositoryError> {
            self.inner.set_step(sender_id, update).await
        }

        async fn complete(
            &self,
            application: &LeaveApplication,
            message_id: Option<&str>,
        ) -> Result<ConversationState, RepositoryError> {
            self.inner.complete(application, message_id).await
        }
    }

    fn slow_router() -> (Arc<IntentRouter>, Arc<SlowConversationRepository>) {
        let conversations = Arc::new(SlowConversationRepository {
            inner: InMemoryConversationRepository::default(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        });
        let router = IntentRouter::new(
            ConversationStore::new(conversations.clone()),
            EmployeeLookup::new(Arc::new(InMemoryEmployeeRepository::default())),
            Arc::new(InMemoryConversationRepository::default()),
            RouterSettings::default(),
        );
        (Arc::new(router), conversations)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn same_sender_events_are_serialized() {
        let (router, conversations) = slow_router();

        let mut tasks = tokio::task::JoinSet::new();
        for index in 0..6 {
            let router = Arc::clone(&router);
            tasks.spawn(async move {
                let event =
                    InboundEvent::text(SENDER, "hello").with_message_id(format!("wamid.{index}"));
                router.handle(&event, &EventContext::new(format!("corr-{index}"))).await
            });
        }
        while let Some(result) = tasks.join_next().await {
            let handled = result.expect("task joined").expect("route event");
            assert!(matches!(handled, HandlerResult::Responded(_)));
        }

        assert_eq!(conversations.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn different_senders_run_concurrently() {
        let (router, conversations) = slow_router();

        let mut tasks = tokio::task::JoinSet::new();
        for index in 0..6 {
            let router = Arc::clone(&router);
            tasks.spawn(async move {
                let event = InboundEvent::text(format!("26377000000{index}"), "hello");
                router.handle(&event, &EventContext::new(format!("corr-{index}"))).await
            });
        }
        while let Some(result) = tasks.join_next().await {
            result.expect("task joined").expect("route event");
        }

        assert!(conversations.max_in_flight.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn handled_senders_leave_no_lock_entries() {
        let harness = harness(RouterSettings::default());
        for index in 0..200 {
            let event = InboundEvent::text(format!("2637700{index:05}"), "hello");
            harness.router.handle(&event, &ctx()).await.expect("route event");
        }

        assert_eq!(harness.router.store().locks().tracked(), 0);
    }
}
