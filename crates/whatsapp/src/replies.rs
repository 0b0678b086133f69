use serde_json::{json, Value};

use echelon_core::dates::{format_leave_date, DateFormatError};
use echelon_core::domain::conversation::SenderId;
use echelon_core::domain::employee::EmployeeRecord;
use echelon_core::domain::leave::{LeaveApplication, LeaveApplicationStatus};
use echelon_core::domain::message::{OutboundMessage, ReplyButton};
use echelon_core::flows::DateField;
use echelon_core::intent::MenuOption;

/// WhatsApp interactive messages accept at most three reply buttons.
pub const MAX_REPLY_BUTTONS: usize = 3;

pub struct ReplyBuilder {
    recipient: SenderId,
    lines: Vec<String>,
    buttons: Vec<ReplyButton>,
}

impl ReplyBuilder {
    pub fn new(recipient: &SenderId) -> Self {
        Self { recipient: recipient.clone(), lines: Vec::new(), buttons: Vec::new() }
    }

    pub fn line(mut self, text: impl Into<String>) -> Self {
        self.lines.push(text.into());
        self
    }

    pub fn buttons<F>(mut self, build: F) -> Self
    where
        F: FnOnce(&mut ButtonsBuilder),
    {
        let mut builder = ButtonsBuilder::default();
        build(&mut builder);
        self.buttons.extend(builder.build());
        self
    }

    pub fn build(self) -> OutboundMessage {
        let mut buttons = self.buttons;
        buttons.truncate(MAX_REPLY_BUTTONS);
        OutboundMessage {
            recipient: self.recipient,
            text: self.lines.join("\n"),
            buttons: (!buttons.is_empty()).then_some(buttons),
        }
    }
}

#[derive(Default)]
pub struct ButtonsBuilder {
    buttons: Vec<ReplyButton>,
}

impl ButtonsBuilder {
    pub fn button(&mut self, id: impl Into<String>, label: impl Into<String>) -> &mut Self {
        self.buttons.push(ReplyButton { id: id.into(), label: label.into() });
        self
    }

    pub fn option(&mut self, option: MenuOption) -> &mut Self {
        self.button(option.id(), option.label())
    }

    fn build(self) -> Vec<ReplyButton> {
        self.buttons
    }
}

pub fn greeting(
    recipient: &SenderId,
    bot_name: &str,
    employee: Option<&EmployeeRecord>,
) -> OutboundMessage {
    let salutation = match employee.map(|employee| employee.first_name.trim()) {
        Some(first_name) if !first_name.is_empty() => format!("Hello {first_name}!"),
        _ => "Hello!".to_owned(),
    };
    ReplyBuilder::new(recipient)
        .line(format!("{salutation} {bot_name} Here 😎. How can I assist you?"))
        .buttons(|buttons| {
            for option in MenuOption::ALL {
                buttons.option(option);
            }
        })
        .build()
}

pub fn start_date_prompt(recipient: &SenderId) -> OutboundMessage {
    ReplyBuilder::new(recipient)
        .line("Ok. When would you like your leave to start?")
        .line("")
        .line("Please enter your response using the format: 👇🏻")
        .line(format!("`{}`", example(DateField::Start)))
        .build()
}

pub fn end_date_prompt(recipient: &SenderId) -> OutboundMessage {
    ReplyBuilder::new(recipient)
        .line("✅ Yes! Valid start date format.")
        .line("")
        .line("Now enter the last day that you will be on leave. Use the format: 👇🏻")
        .line(format!("`{}`", example(DateField::End)))
        .build()
}

pub fn date_format_error(
    recipient: &SenderId,
    field: DateField,
    error: &DateFormatError,
) -> OutboundMessage {
    ReplyBuilder::new(recipient)
        .line(format!("❌ No, incorrect message format ({}). Please use:", error.reason))
        .line(format!("`{}`", example(field)))
        .line(format!("Example: `{} 15 march 2024`", field.keyword()))
        .build()
}

pub fn out_of_sequence(recipient: &SenderId, field: DateField) -> OutboundMessage {
    let hint = match field {
        DateField::Start => "Tap Apply Leave first, then send your start date.",
        DateField::End => "Send your start date first, e.g. `start 24 january 2025`.",
    };
    ReplyBuilder::new(recipient)
        .line(format!("That {} date came too early.", field.keyword()))
        .line(hint)
        .build()
}

pub fn application_submitted(
    recipient: &SenderId,
    application: &LeaveApplication,
    employee: Option<&EmployeeRecord>,
) -> OutboundMessage {
    let mut reply = ReplyBuilder::new(recipient)
        .line("✅ Leave Application Successful!")
        .line("")
        .line(format!("Reference: {}", application.id.0))
        .line(period_line(application));
    if let Some(approver) = employee.and_then(EmployeeRecord::approver) {
        reply = reply.line(format!("Sent to {approver} for approval."));
    }
    reply
        .line("")
        .line("To check the status of your leave application, type Hello.")
        .build()
}

pub fn application_status(
    recipient: &SenderId,
    application: Option<&LeaveApplication>,
) -> OutboundMessage {
    let Some(application) = application else {
        return ReplyBuilder::new(recipient)
            .line("You have no leave applications on record.")
            .line("Tap Apply Leave to start one.")
            .buttons(|buttons| {
                buttons.option(MenuOption::Apply);
            })
            .build();
    };

    ReplyBuilder::new(recipient)
        .line(format!("Leave application {}", application.id.0))
        .line(period_line(application))
        .line(format!("Status: {}", status_label(application.status)))
        .line(format!("Submitted: {}", application.submitted_at.format("%-d %B %Y %H:%M UTC")))
        .build()
}

pub fn leave_balance(recipient: &SenderId, employee: Option<&EmployeeRecord>) -> OutboundMessage {
    let text = match employee.and_then(|employee| employee.leave_days_balance) {
        Some(balance) => format!("Your leave balance is {} days.", balance.normalize()),
        None => "Your leave balance is not on record. Please contact HR.".to_owned(),
    };
    ReplyBuilder::new(recipient).line(text).build()
}

pub fn fallback(recipient: &SenderId, bot_name: &str) -> OutboundMessage {
    ReplyBuilder::new(recipient)
        .line(format!("{bot_name} Here 😎. Say 'hello' to start!"))
        .build()
}

pub fn unknown_sender(recipient: &SenderId, bot_name: &str) -> OutboundMessage {
    ReplyBuilder::new(recipient)
        .line(format!("{bot_name} Here 😎. This number is not registered to an employee."))
        .line("Please ask HR to add your WhatsApp number.")
        .build()
}

/// Request body for the WhatsApp Cloud API `/messages` endpoint.
pub fn cloud_api_payload(message: &OutboundMessage) -> Value {
    match &message.buttons {
        Some(buttons) => json!({
            "messaging_product": "whatsapp",
            "to": message.recipient.as_str(),
            "type": "interactive",
            "interactive": {
                "type": "button",
                "body": { "text": message.text },
                "action": {
                    "buttons": buttons
                        .iter()
                        .map(|button| json!({
                            "type": "reply",
                            "reply": { "id": button.id, "title": button.label },
                        }))
                        .collect::<Vec<_>>(),
                },
            },
        }),
        None => json!({
            "messaging_product": "whatsapp",
            "to": message.recipient.as_str(),
            "type": "text",
            "text": { "body": message.text },
        }),
    }
}

fn example(field: DateField) -> String {
    format!("{} 24 january 2025", field.keyword())
}

fn period_line(application: &LeaveApplication) -> String {
    let end = format_leave_date(application.end_date);
    match application.start_date {
        Some(start) => format!("Leave: {} to {end}", format_leave_date(start)),
        None => format!("Leave ending: {end}"),
    }
}

fn status_label(status: LeaveApplicationStatus) -> &'static str {
    match status {
        LeaveApplicationStatus::Pending => "Pending approval",
        LeaveApplicationStatus::Approved => "Approved",
        LeaveApplicationStatus::Rejected => "Rejected",
    }
}
