//! Domain model for concrete, dated visits.
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Length of one billing unit
pub const UNIT_MINUTES: i64 = 15;

/// Number of whole units needed to cover `minutes`, rounded up
pub fn units_for_minutes(minutes: i64) -> u32 {
    if minutes <= 0 {
        return 0;
    }
    ((minutes + UNIT_MINUTES - 1) / UNIT_MINUTES) as u32
}

pub fn units_between(start: NaiveTime, end: NaiveTime) -> u32 {
    units_for_minutes((end - start).num_minutes())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleEventStatus {
    Planned,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

impl ScheduleEventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleEventStatus::Planned => "PLANNED",
            ScheduleEventStatus::Confirmed => "CONFIRMED",
            ScheduleEventStatus::InProgress => "IN_PROGRESS",
            ScheduleEventStatus::Completed => "COMPLETED",
            ScheduleEventStatus::Cancelled => "CANCELLED",
        }
    }

    /// PLANNED -> CONFIRMED -> IN_PROGRESS -> COMPLETED, with CANCELLED
    /// reachable from every state except COMPLETED.
    pub fn can_transition_to(&self, next: ScheduleEventStatus) -> bool {
        use ScheduleEventStatus::*;
        match (self, next) {
            (Completed, _) | (Cancelled, _) => false,
            (_, Cancelled) => true,
            (Planned, Confirmed) => true,
            (Planned, InProgress) | (Confirmed, InProgress) => true,
            (InProgress, Completed) => true,
            _ => false,
        }
    }

    /// Completed and cancelled visits can no longer be edited
    pub fn is_final(&self) -> bool {
        matches!(self, ScheduleEventStatus::Completed | ScheduleEventStatus::Cancelled)
    }
}

impl fmt::Display for ScheduleEventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleEventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "PLANNED" => Ok(ScheduleEventStatus::Planned),
            "CONFIRMED" => Ok(ScheduleEventStatus::Confirmed),
            "IN_PROGRESS" => Ok(ScheduleEventStatus::InProgress),
            "COMPLETED" => Ok(ScheduleEventStatus::Completed),
            "CANCELLED" => Ok(ScheduleEventStatus::Cancelled),
            other => Err(format!("Unknown schedule event status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEvent {
    pub id: String,
    pub patient_id: String,
    pub template_id: Option<String>,
    pub event_date: NaiveDate,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    pub status: ScheduleEventStatus,
    pub staff_id: Option<String>,
    pub authorization_id: Option<String>,
    pub event_code: Option<String>,
    pub planned_units: u32,
    pub actual_units: Option<u32>,
    pub comment: Option<String>,
    pub check_in_at: Option<NaiveDateTime>,
    pub check_out_at: Option<NaiveDateTime>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduleEvent {
    pub fn generate_id() -> String {
        format!("visit::{}", Uuid::new_v4().simple())
    }

    /// Build a fresh PLANNED visit from a candidate
    pub fn planned(candidate: &VisitCandidate, template_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Self::generate_id(),
            patient_id: candidate.patient_id.clone(),
            template_id,
            event_date: candidate.event_date,
            start_at: candidate.start_at(),
            end_at: candidate.end_at(),
            status: ScheduleEventStatus::Planned,
            staff_id: candidate.staff_id.clone(),
            authorization_id: candidate.authorization_id.clone(),
            event_code: candidate.event_code.clone(),
            planned_units: candidate.planned_units,
            actual_units: None,
            comment: candidate.comment.clone(),
            check_in_at: None,
            check_out_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A visit that has been computed but not persisted
#[derive(Debug, Clone, PartialEq)]
pub struct VisitCandidate {
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

impl VisitCandidate {
    pub fn start_at(&self) -> NaiveDateTime {
        self.event_date.and_time(self.start_time)
    }

    pub fn end_at(&self) -> NaiveDateTime {
        self.event_date.and_time(self.end_time)
    }
}

impl From<&ScheduleEvent> for VisitCandidate {
    fn from(event: &ScheduleEvent) -> Self {
        Self {
            patient_id: event.patient_id.clone(),
            event_date: event.event_date,
            start_time: event.start_at.time(),
            end_time: event.end_at.time(),
            staff_id: event.staff_id.clone(),
            authorization_id: event.authorization_id.clone(),
            event_code: event.event_code.clone(),
            planned_units: event.planned_units,
            comment: event.comment.clone(),
        }
    }
}

/// Listing criteria; every set field narrows the result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleEventFilter {
    pub patient_id: Option<String>,
    pub staff_id: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub statuses: Vec<ScheduleEventStatus>,
    /// Case-insensitive substring over event code and comment
    pub search: Option<String>,
}

/// Position after which a listing page starts, in (start_at, id) order
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEventCursor {
    pub start_at: NaiveDateTime,
    pub id: String,
}
