//! Conversions between wire DTOs and domain types.
//!
//! Incoming strings are parsed here; a malformed value becomes a
//! validation error naming the request field it came from.

pub mod schedule_mapper;
pub mod template_mapper;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};

use crate::domain::error::{ScheduleError, ScheduleResult};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub fn parse_date(field: &str, value: &str) -> ScheduleResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| {
        ScheduleError::validation(field, format!("'{}' is not a date (YYYY-MM-DD)", value))
    })
}

pub fn parse_time(field: &str, value: &str) -> ScheduleResult<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| ScheduleError::validation(field, format!("'{}' is not a time (HH:MM)", value)))
}

pub fn parse_datetime(field: &str, value: &str) -> ScheduleResult<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M"))
        .map_err(|_| {
            ScheduleError::validation(
                field,
                format!("'{}' is not a timestamp (YYYY-MM-DDTHH:MM:SS)", value),
            )
        })
}

pub fn parse_optional_date(field: &str, value: Option<&str>) -> ScheduleResult<Option<NaiveDate>> {
    value.map(|value| parse_date(field, value)).transpose()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn format_time(time: NaiveTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

pub fn format_datetime(datetime: NaiveDateTime) -> String {
    datetime.format(DATETIME_FORMAT).to_string()
}

pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Trimmed value, or None when blank
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
