pub mod engine;
pub mod states;

pub use engine::{FlowDefinition, FlowEngine, FlowTransitionError, LeaveApplicationFlow};
pub use states::{
    ConversationStep, DateField, FlowAction, FlowContext, Intent, StepPolicy, TransitionOutcome,
};
