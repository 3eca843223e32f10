//! Best-effort conversion of raw cell text. Nothing here fails: bad input is "no value".

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Serials at or below this are treated as ordinary numbers, not dates.
pub const MIN_DATE_SERIAL: i64 = 1000;

/// Exclusive bounds on an accepted year.
pub const MIN_YEAR: i32 = 1900;
pub const MAX_YEAR: i32 = 2030;

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%Y/%m/%d",
    "%m-%d-%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%m/%d/%y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Male => "male",
            Sex::Female => "female",
        }
    }
}

pub fn coerce_sex(raw: &str) -> Option<Sex> {
    match raw.trim().to_lowercase().as_str() {
        "male" | "m" => Some(Sex::Male),
        "female" | "f" => Some(Sex::Female),
        _ => None,
    }
}

/// Parses a spreadsheet date serial or a date string into a calendar date.
pub fn coerce_date(raw: &str) -> Option<NaiveDate> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    let parsed = match date_serial(value) {
        Some(serial) => from_serial(serial),
        None => parse_date_text(value),
    }?;

    within_year_bounds(parsed).then_some(parsed)
}

fn within_year_bounds(date: NaiveDate) -> bool {
    date.year() > MIN_YEAR && date.year() < MAX_YEAR
}

/// Integer part of a numeric cell, if it is large enough to be a date serial.
fn date_serial(value: &str) -> Option<i64> {
    let (whole, fraction) = value.split_once('.').unwrap_or((value, ""));
    if whole.is_empty()
        || !whole.chars().all(|c| c.is_ascii_digit())
        || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }
    let serial: i64 = whole.parse().ok()?;
    (serial > MIN_DATE_SERIAL).then_some(serial)
}

/// Day count from the 1899-12-30 epoch spreadsheets use for their serials.
fn from_serial(serial: i64) -> Option<NaiveDate> {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::try_days(serial)?)
}

fn parse_date_text(value: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        .or_else(|| parse_free_form(value))
}

fn parse_free_form(value: &str) -> Option<NaiveDate> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.date_naive());
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(value) {
        return Some(parsed.date_naive());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|parsed| parsed.date())
}
