use serde::{Deserialize, Serialize};
use std::fmt;

// Wire types for the visit scheduling API.
//
// Dates travel as "YYYY-MM-DD", times of day as "HH:MM" and visit timestamps
// as "YYYY-MM-DDTHH:MM:SS" (agency-local). The backend parses and validates
// every string field and reports the offending field on failure.

/// Lifecycle of a recurring template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemplateStatus {
    Draft,
    Active,
    Archived,
}

/// A patient's recurring weekly visit pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub patient_id: String,
    pub office_id: Option<String>,
    pub name: String,
    pub status: TemplateStatus,
    /// First day covered by week 0 of the cycle
    pub anchor_date: String,
    /// Last date through which visits have been generated (None until the first run)
    pub generated_through: Option<String>,
    /// Incremented every time the watermark advances
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// A single weekday/time entry inside a template week
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateEvent {
    pub id: String,
    pub template_id: String,
    pub week_index: u32,
    /// 0 = Sunday ... 6 = Saturday
    pub day_of_week: u8,
    pub start_time: String,
    pub end_time: String,
    pub authorization_id: Option<String>,
    pub staff_id: Option<String>,
    pub event_code: Option<String>,
    pub planned_units: u32,
    pub comment: Option<String>,
}

/// One week of a template with its events ordered by weekday and start time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateWeek {
    pub week_index: u32,
    pub events: Vec<TemplateEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDetail {
    pub template: Template,
    pub weeks: Vec<TemplateWeek>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTemplateRequest {
    pub patient_id: String,
    pub name: String,
    pub office_id: Option<String>,
    /// Defaults to today when omitted
    pub anchor_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateTemplateStatusRequest {
    pub status: TemplateStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddWeekRequest {
    pub week_index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertTemplateEventRequest {
    /// One event is created per weekday (0 = Sunday ... 6 = Saturday)
    pub weekdays: Vec<u8>,
    pub start_time: String,
    pub end_time: String,
    pub authorization_id: Option<String>,
    pub staff_id: Option<String>,
    pub event_code: Option<String>,
    /// Derived from the visit duration (15-minute units) when omitted
    pub planned_units: Option<u32>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateEventsResponse {
    pub events: Vec<TemplateEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateFromTemplateRequest {
    pub end_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateFromTemplateResponse {
    pub created_count: usize,
    pub generated_through: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepeatFrequency {
    Week,
    Month,
}

/// Repeat settings as entered by the office
///
/// Exactly one of `end_date` and `occurrences` must be set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepeatConfig {
    pub interval: u32,
    pub frequency: RepeatFrequency,
    /// Required for weekly repeats, ignored for monthly ones
    #[serde(default)]
    pub days_of_week: Vec<u8>,
    pub end_date: Option<String>,
    pub occurrences: Option<u32>,
}

/// A single visit as composed by the office before expansion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccurrenceDefinition {
    pub patient_id: String,
    pub event_date: String,
    pub start_time: String,
    pub end_time: String,
    pub staff_id: Option<String>,
    pub authorization_id: Option<String>,
    pub event_code: Option<String>,
    pub planned_units: Option<u32>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulePreviewRequest {
    pub occurrence: OccurrenceDefinition,
    pub repeat: Option<RepeatConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictType {
    PatientConflict,
    StaffConflict,
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictType::PatientConflict => write!(f, "PATIENT_CONFLICT"),
            ConflictType::StaffConflict => write!(f, "STAFF_CONFLICT"),
        }
    }
}

/// An overlap between a candidate and an already committed visit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConflict {
    pub conflict_type: ConflictType,
    pub conflicting_event_id: String,
    pub event_date: String,
    /// Start of the conflicting visit
    pub start_at: String,
    /// End of the conflicting visit
    pub end_at: String,
    pub message: String,
    /// Set by the operator to accept the double booking
    #[serde(default)]
    pub resolved: bool,
}

/// A concrete visit produced by a preview and sent back for commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleCandidate {
    pub patient_id: String,
    pub event_date: String,
    pub start_time: String,
    pub end_time: String,
    pub staff_id: Option<String>,
    pub authorization_id: Option<String>,
    pub event_code: Option<String>,
    pub planned_units: u32,
    pub comment: Option<String>,
    #[serde(default)]
    pub conflicts: Vec<ScheduleConflict>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulePreviewResponse {
    pub candidates: Vec<ScheduleCandidate>,
    pub conflicts: Vec<ScheduleConflict>,
    /// True only when no candidate carries an unresolved conflict
    pub can_save: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateScheduleEventsRequest {
    pub candidates: Vec<ScheduleCandidate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleEventStatus {
    Planned,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

/// A concrete, dated visit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEvent {
    pub id: String,
    pub patient_id: String,
    /// Set when the visit was projected from a template
    pub template_id: Option<String>,
    pub event_date: String,
    pub start_at: String,
    pub end_at: String,
    pub status: ScheduleEventStatus,
    pub staff_id: Option<String>,
    pub authorization_id: Option<String>,
    pub event_code: Option<String>,
    pub planned_units: u32,
    pub actual_units: Option<u32>,
    pub comment: Option<String>,
    pub check_in_at: Option<String>,
    pub check_out_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEventsResponse {
    pub events: Vec<ScheduleEvent>,
}

/// Query parameters for listing visits
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEventListRequest {
    pub patient_id: Option<String>,
    pub staff_id: Option<String>,
    /// Inclusive lower bound on the visit date
    pub date_from: Option<String>,
    /// Inclusive upper bound on the visit date
    pub date_to: Option<String>,
    /// Comma separated statuses, e.g. "PLANNED,CONFIRMED"
    pub status: Option<String>,
    /// Case-insensitive match against event code and comment
    pub search: Option<String>,
    /// Maximum number of visits to return
    pub limit: Option<u32>,
    /// Cursor for pagination - visit ID to start after
    pub after: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEventListResponse {
    pub events: Vec<ScheduleEvent>,
    pub pagination: PaginationInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationInfo {
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

/// Partial update of a visit; absent fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateScheduleEventRequest {
    /// Only CONFIRMED and CANCELLED may be set directly
    pub status: Option<ScheduleEventStatus>,
    pub event_date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub staff_id: Option<String>,
    /// Unassigns the staff member; takes precedence over `staff_id`
    #[serde(default)]
    pub clear_staff: bool,
    pub authorization_id: Option<String>,
    pub planned_units: Option<u32>,
    pub comment: Option<String>,
    /// Conflicts the operator accepts for the rescheduled visit
    #[serde(default)]
    pub resolved_conflicts: Vec<ScheduleConflict>,
}

/// Check-in or check-out reported by the visit verification system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitClockRequest {
    pub at: String,
}

/// Body returned for every failed request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// VALIDATION, NOT_FOUND, CONFLICT, CONCURRENCY or INTERNAL
    pub error: String,
    pub message: String,
    pub field: Option<String>,
    #[serde(default)]
    pub conflicts: Vec<ScheduleConflict>,
    /// True when repeating the same request may succeed
    pub retryable: bool,
}
