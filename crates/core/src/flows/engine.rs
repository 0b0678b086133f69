use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::flows::states::{
    ConversationStep, DateField, FlowAction, FlowContext, Intent, StepPolicy, TransitionOutcome,
};

pub trait FlowDefinition {
    fn name(&self) -> &'static str;
    fn initial_step(&self) -> ConversationStep;
    fn transition(
        &self,
        current: &ConversationStep,
        intent: &Intent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

#[derive(Clone, Debug, Default)]
pub struct LeaveApplicationFlow;

impl FlowDefinition for LeaveApplicationFlow {
    fn name(&self) -> &'static str {
        "leave_application"
    }

    fn initial_step(&self) -> ConversationStep {
        ConversationStep::Idle
    }

    fn transition(
        &self,
        current: &ConversationStep,
        intent: &Intent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_leave(current, intent, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn flow_name(&self) -> &'static str {
        self.flow.name()
    }

    pub fn initial_step(&self) -> ConversationStep {
        self.flow.initial_step()
    }

    pub fn apply(
        &self,
        current: &ConversationStep,
        intent: &Intent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, intent, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &ConversationStep,
        intent: &Intent,
        context: &FlowContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, intent, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit.sender_id.clone(),
                        audit.correlation_id.clone(),
                        "flow.transition_applied",
                        AuditCategory::Flow,
                        audit.actor.clone(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("flow", self.flow_name())
                    .with_metadata("from", outcome.from.as_str())
                    .with_metadata("to", outcome.to.as_str())
                    .with_metadata("intent", outcome.intent),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit.sender_id.clone(),
                        audit.correlation_id.clone(),
                        "flow.transition_rejected",
                        AuditCategory::Flow,
                        audit.actor.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("flow", self.flow_name())
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<LeaveApplicationFlow> {
    fn default() -> Self {
        Self::new(LeaveApplicationFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("{field:?} date entered out of sequence while {step:?}")]
    OutOfSequence { step: ConversationStep, field: DateField },
}

fn transition_leave(
    current: &ConversationStep,
    intent: &Intent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use ConversationStep::{AwaitingEnd, AwaitingStart, Complete, Idle};
    use FlowAction::{
        Fallback, PromptStartDate, RejectDate, ReportApplicationStatus, ReportLeaveBalance,
        ShowMenu, StorePendingStart, SubmitApplication,
    };

    let strict = context.step_policy == StepPolicy::Strict;
    let out_of_sequence =
        |field| Err(FlowTransitionError::OutOfSequence { step: *current, field });

    let (to, action) = match (current, intent) {
        (_, Intent::ApplyLeave) => (AwaitingStart, PromptStartDate),
        (_, Intent::Greeting) => (Idle, ShowMenu),
        (step, Intent::StartDate(_)) if strict && *step != AwaitingStart => {
            return out_of_sequence(DateField::Start);
        }
        (_, Intent::StartDate(Ok(date))) => (AwaitingEnd, StorePendingStart(*date)),
        (step, Intent::StartDate(Err(error))) => {
            (*step, RejectDate { field: DateField::Start, error: error.clone() })
        }
        (step, Intent::EndDate(_)) if strict && *step != AwaitingEnd => {
            return out_of_sequence(DateField::End);
        }
        (_, Intent::EndDate(Ok(date))) => (Complete, SubmitApplication { end_date: *date }),
        (step, Intent::EndDate(Err(error))) => {
            (*step, RejectDate { field: DateField::End, error: error.clone() })
        }
        (step, Intent::TrackApplication) => (*step, ReportApplicationStatus),
        (step, Intent::CheckBalance) => (*step, ReportLeaveBalance),
        (step, Intent::Unrecognized) => (*step, Fallback),
    };

    Ok(TransitionOutcome { from: *current, to, intent: intent.label(), action })
}
