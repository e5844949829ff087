//! Repeat configuration for ad-hoc visit batches.
use chrono::{NaiveDate, NaiveTime};
use std::collections::BTreeSet;

use crate::domain::error::{ScheduleError, ScheduleResult};
use crate::domain::models::template::TemplateEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frequency {
    /// Weekdays are 0 = Sunday ... 6 = Saturday
    Weekly { days_of_week: BTreeSet<u8> },
    /// Same calendar day of month as the initial date
    Monthly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndCondition {
    ByDate(NaiveDate),
    ByCount(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatConfig {
    pub interval: u32,
    pub frequency: Frequency,
    pub end: EndCondition,
}

impl RepeatConfig {
    pub fn new(interval: u32, frequency: Frequency, end: EndCondition) -> ScheduleResult<Self> {
        if interval < 1 {
            return Err(ScheduleError::validation("repeat.interval", "must be at least 1"));
        }

        if let Frequency::Weekly { days_of_week } = &frequency {
            if days_of_week.is_empty() {
                return Err(ScheduleError::validation(
                    "repeat.days_of_week",
                    "at least one weekday is required for weekly repeats",
                ));
            }
            if let Some(day) = days_of_week
                .iter()
                .find(|day| !TemplateEvent::is_valid_day_of_week(**day))
            {
                return Err(ScheduleError::validation(
                    "repeat.days_of_week",
                    format!("{} is not a weekday (0-6, Sunday-Saturday)", day),
                ));
            }
        }

        if let EndCondition::ByCount(0) = end {
            return Err(ScheduleError::validation("repeat.occurrences", "must be at least 1"));
        }

        Ok(Self {
            interval,
            frequency,
            end,
        })
    }

    pub fn weekly(
        interval: u32,
        days_of_week: impl IntoIterator<Item = u8>,
        end: EndCondition,
    ) -> ScheduleResult<Self> {
        Self::new(
            interval,
            Frequency::Weekly {
                days_of_week: days_of_week.into_iter().collect(),
            },
            end,
        )
    }

    pub fn monthly(interval: u32, end: EndCondition) -> ScheduleResult<Self> {
        Self::new(interval, Frequency::Monthly, end)
    }
}

/// A single visit as composed by the office, before expansion
#[derive(Debug, Clone, PartialEq)]
pub struct OccurrenceDefinition {
    pub patient_id: String,
    pub event_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub staff_id: Option<String>,
    pub authorization_id: Option<String>,
    pub event_code: Option<String>,
    pub planned_units: u32,
    pub comment: Option<String>,
}
