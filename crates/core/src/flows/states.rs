use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::dates::DateFormatError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConversationStep {
    Idle,
    AwaitingStart,
    AwaitingEnd,
    Complete,
}

impl ConversationStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingStart => "awaiting_start",
            Self::AwaitingEnd => "awaiting_end",
            Self::Complete => "complete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "idle" => Some(Self::Idle),
            "awaiting_start" => Some(Self::AwaitingStart),
            "awaiting_end" => Some(Self::AwaitingEnd),
            "complete" => Some(Self::Complete),
            _ => None,
        }
    }
}

/// Whether date entries are accepted at any step or only at the step that asked for them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPolicy {
    #[default]
    Lenient,
    Strict,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateField {
    Start,
    End,
}

impl DateField {
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Intent {
    Greeting,
    ApplyLeave,
    TrackApplication,
    CheckBalance,
    StartDate(Result<NaiveDate, DateFormatError>),
    EndDate(Result<NaiveDate, DateFormatError>),
    Unrecognized,
}

impl Intent {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::ApplyLeave => "apply_leave",
            Self::TrackApplication => "track_application",
            Self::CheckBalance => "check_balance",
            Self::StartDate(_) => "start_date",
            Self::EndDate(_) => "end_date",
            Self::Unrecognized => "unrecognized",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct FlowContext {
    pub step_policy: StepPolicy,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlowAction {
    ShowMenu,
    PromptStartDate,
    StorePendingStart(NaiveDate),
    RejectDate { field: DateField, error: DateFormatError },
    SubmitApplication { end_date: NaiveDate },
    ReportApplicationStatus,
    ReportLeaveBalance,
    Fallback,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub from: ConversationStep,
    pub to: ConversationStep,
    pub intent: &'static str,
    pub action: FlowAction,
}

impl TransitionOutcome {
    pub fn changes_step(&self) -> bool {
        self.from != self.to
    }
}
