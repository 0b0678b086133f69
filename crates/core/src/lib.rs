pub mod audit;
pub mod config;
pub mod dates;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod intent;

pub use audit::{AuditContext, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use config::{AppConfig, UnknownSenderPolicy};
pub use dates::{format_leave_date, parse_leave_date, DateFormatError, DateFormatReason};
pub use domain::conversation::{ConversationState, SenderId, StepUpdate};
pub use domain::employee::{EmployeeId, EmployeeRecord};
pub use domain::leave::{LeaveApplication, LeaveApplicationId, LeaveApplicationStatus};
pub use domain::message::{InboundEvent, InboundEventKind, OutboundMessage, ReplyButton};
pub use errors::{ApplicationError, InterfaceError};
pub use flows::{ConversationStep, FlowEngine, Intent, LeaveApplicationFlow, StepPolicy};
pub use intent::{classify, MenuOption};
