//! Scalar recognizers shared by inference, payload formatting, and
//! reconciliation.
//!
//! Every function here works on a single textual value. Column-level
//! decisions live in [`crate::infer`].

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;

const BOOLEAN_TOKENS: &[&str] = &["true", "false", "1", "0", "yes", "no"];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%m-%d-%Y",
    "%d-%m-%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

static CLOCK_TIME: OnceLock<Regex> = OnceLock::new();

fn clock_time_pattern() -> &'static Regex {
    CLOCK_TIME.get_or_init(|| {
        Regex::new(r"^([0-1]?[0-9]|2[0-3]):([0-5]?[0-9]):([0-5]?[0-9])$")
            .expect("clock time pattern is valid")
    })
}

/// Case-insensitive match against the boolean vocabulary. Whitespace is
/// significant.
pub fn is_boolean_token(value: &str) -> bool {
    let lowered = value.to_lowercase();
    BOOLEAN_TOKENS.contains(&lowered.as_str())
}

/// Maps a boolean-vocabulary token onto its truth value.
pub fn parse_boolean(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Parses a base-10 number written with digits, an optional sign, a decimal
/// point, and an optional exponent. Surrounding whitespace is ignored.
pub fn parse_number(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
    {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

pub fn is_integer_valued(number: f64) -> bool {
    number.fract() == 0.0
}

/// Renders a number the way spreadsheet tools display it: integral values
/// without a trailing `.0`.
pub fn format_number(number: f64) -> String {
    if is_integer_valued(number) && number.abs() < 1e15 {
        (number as i64).to_string()
    } else {
        number.to_string()
    }
}

pub fn parse_calendar_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(parsed);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(parsed.date());
        }
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.date_naive());
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(parsed.date_naive());
    }
    // Year-month only, e.g. `2024-05`.
    if trimmed.len() == 7 {
        return NaiveDate::parse_from_str(&format!("{trimmed}-01"), "%Y-%m-%d").ok();
    }
    None
}

/// Matches a 24-hour `H:M:S` clock reading with optional leading zeros.
pub fn is_clock_time(value: &str) -> bool {
    clock_time_pattern().is_match(value)
}

/// Formats a spreadsheet date cell: midnight values collapse to a plain date.
pub fn format_datetime(value: NaiveDateTime) -> String {
    if value.time() == chrono::NaiveTime::MIN {
        value.format("%Y-%m-%d").to_string()
    } else {
        value.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}
