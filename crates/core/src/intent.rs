//! Maps an inbound event to the single [`Intent`] the flow engine acts on.
//!
//! Precedence is fixed: a button reply wins over any text, then the greeting
//! keyword, then the apply phrase, then the `start`/`end` date prefixes.

use crate::dates::parse_leave_date;
use crate::domain::message::InboundEvent;
use crate::flows::states::{DateField, Intent};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MenuOption {
    Apply,
    Track,
    Check,
}

impl MenuOption {
    pub const ALL: [MenuOption; 3] = [MenuOption::Apply, MenuOption::Track, MenuOption::Check];

    pub fn id(&self) -> &'static str {
        match self {
            Self::Apply => "Apply",
            Self::Track => "Track",
            Self::Check => "Check",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Apply => "Apply Leave",
            Self::Track => "Track Application",
            Self::Check => "Check Balance",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|option| option.id() == id)
    }

    fn intent(&self) -> Intent {
        match self {
            Self::Apply => Intent::ApplyLeave,
            Self::Track => Intent::TrackApplication,
            Self::Check => Intent::CheckBalance,
        }
    }
}

const GREETING_KEYWORD: &str = "hello";
const APPLY_PHRASE: &str = "apply leave";

pub fn classify(event: &InboundEvent) -> Intent {
    if let Some(button_id) = event.button_id.as_deref() {
        return MenuOption::from_id(button_id)
            .map(|option| option.intent())
            .unwrap_or(Intent::Unrecognized);
    }

    match event.text_body.as_deref() {
        Some(body) => classify_text(body),
        None => Intent::Unrecognized,
    }
}

pub fn classify_text(body: &str) -> Intent {
    let lowered = body.to_lowercase();
    if lowered.contains(GREETING_KEYWORD) {
        return Intent::Greeting;
    }
    if lowered.contains(APPLY_PHRASE) {
        return Intent::ApplyLeave;
    }

    let trimmed = body.trim();
    if let Some(rest) = strip_keyword(trimmed, DateField::Start.keyword()) {
        return Intent::StartDate(parse_leave_date(rest));
    }
    if let Some(rest) = strip_keyword(trimmed, DateField::End.keyword()) {
        return Intent::EndDate(parse_leave_date(rest));
    }

    Intent::Unrecognized
}

/// Case-insensitive `keyword` prefix that must be followed by whitespace or end of input.
fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let head = text.get(..keyword.len())?;
    if !head.eq_ignore_ascii_case(keyword) {
        return None;
    }
    let rest = &text[keyword.len()..];
    match rest.chars().next() {
        None => Some(rest),
        Some(next) if next.is_whitespace() => Some(rest.trim()),
        Some(_) => None,
    }
}
