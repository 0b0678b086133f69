//! Free-text leave date parsing.
//!
//! Dates are typed by employees as `<day> <full month name> <year>`, e.g. `24 January 2025`.
//! The month name is matched case-insensitively; abbreviations are not accepted.

use chrono::NaiveDate;
use thiserror::Error;

pub const MIN_YEAR: i32 = 1900;
pub const MAX_YEAR: i32 = 2100;

const MONTH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DateFormatReason {
    #[error("expected 3 tokens `<day> <month> <year>`, found {0}")]
    TokenCount(usize),
    #[error("unknown month `{0}`")]
    UnknownMonth(String),
    #[error("day `{0}` is not a number")]
    NonNumericDay(String),
    #[error("year `{0}` is not a number")]
    NonNumericYear(String),
    #[error("year {0} is outside 1900..=2100")]
    YearOutOfRange(i32),
    #[error("day {day} does not exist in {month} {year}")]
    DayOutOfRange { day: u32, month: String, year: i32 },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("`{fragment}` is not a valid leave date: {reason}")]
pub struct DateFormatError {
    pub fragment: String,
    pub reason: DateFormatReason,
}

impl DateFormatError {
    fn new(fragment: &str, reason: DateFormatReason) -> Self {
        Self { fragment: fragment.to_owned(), reason }
    }
}

pub fn parse_leave_date(fragment: &str) -> Result<NaiveDate, DateFormatError> {
    let tokens = fragment.split_whitespace().collect::<Vec<_>>();
    let [day, month, year] = tokens.as_slice() else {
        return Err(DateFormatError::new(fragment, DateFormatReason::TokenCount(tokens.len())));
    };

    let day = parse_digits::<u32>(day).ok_or_else(|| {
        DateFormatError::new(fragment, DateFormatReason::NonNumericDay((*day).to_owned()))
    })?;
    let month_number = month_number(month).ok_or_else(|| {
        DateFormatError::new(fragment, DateFormatReason::UnknownMonth((*month).to_owned()))
    })?;
    let year = parse_digits::<i32>(year).ok_or_else(|| {
        DateFormatError::new(fragment, DateFormatReason::NonNumericYear((*year).to_owned()))
    })?;

    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(DateFormatError::new(fragment, DateFormatReason::YearOutOfRange(year)));
    }

    NaiveDate::from_ymd_opt(year, month_number, day).ok_or_else(|| {
        DateFormatError::new(
            fragment,
            DateFormatReason::DayOutOfRange { day, month: month.to_ascii_lowercase(), year },
        )
    })
}

/// Renders a date back in the format employees type it, e.g. `24 January 2025`.
pub fn format_leave_date(date: NaiveDate) -> String {
    date.format("%-d %B %Y").to_string()
}

fn month_number(token: &str) -> Option<u32> {
    MONTH_NAMES
        .iter()
        .position(|name| name.eq_ignore_ascii_case(token))
        .and_then(|index| u32::try_from(index + 1).ok())
}

fn parse_digits<T: std::str::FromStr>(token: &str) -> Option<T> {
    if token.is_empty() || !token.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}
