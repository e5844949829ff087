use chrono::{NaiveDate, NaiveTime};

use crate::domain::models::conflict::ScheduleConflict;
use crate::domain::models::recurrence::{OccurrenceDefinition, RepeatConfig};
use crate::domain::models::schedule_event::{
    ScheduleEvent, ScheduleEventFilter, ScheduleEventStatus, VisitCandidate,
};

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulePreviewCommand {
    pub definition: OccurrenceDefinition,
    pub repeat: Option<RepeatConfig>,
}

/// One expanded visit with the overlaps it would cause
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewedVisit {
    pub candidate: VisitCandidate,
    pub conflicts: Vec<ScheduleConflict>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulePreview {
    pub candidates: Vec<PreviewedVisit>,
    pub conflicts: Vec<ScheduleConflict>,
    /// True only when every reported conflict is resolved
    pub can_save: bool,
}

/// A visit the operator confirmed, together with the conflicts they were
/// shown. Only entries flagged `resolved` count as accepted overlaps.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitCandidate {
    pub candidate: VisitCandidate,
    pub conflicts: Vec<ScheduleConflict>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleEventListQuery {
    pub filter: ScheduleEventFilter,
    pub limit: Option<u32>,
    /// Id of the last visit of the previous page
    pub after: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEventPage {
    pub events: Vec<ScheduleEvent>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

/// Partial update of a visit. `staff_id: Some(None)` unassigns the visit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateScheduleEventCommand {
    pub event_id: String,
    pub status: Option<ScheduleEventStatus>,
    pub event_date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub staff_id: Option<Option<String>>,
    pub authorization_id: Option<String>,
    pub planned_units: Option<u32>,
    pub comment: Option<String>,
    pub resolved_conflicts: Vec<ScheduleConflict>,
}
