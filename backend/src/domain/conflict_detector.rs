//! Double-booking detection.
//!
//! Pure functions only: callers load the committed visits (inside their own
//! transaction when the result gates a write) and pass them in.

use chrono::{NaiveDate, NaiveDateTime};

use crate::domain::models::conflict::{ConflictType, ScheduleConflict};
use crate::domain::models::schedule_event::{ScheduleEvent, ScheduleEventStatus, VisitCandidate};

/// Anything occupying a patient (and optionally a staff member) for a time range
pub trait VisitSlot {
    fn patient_id(&self) -> &str;
    fn staff_id(&self) -> Option<&str>;
    fn event_date(&self) -> NaiveDate;
    fn start_at(&self) -> NaiveDateTime;
    fn end_at(&self) -> NaiveDateTime;
}

impl VisitSlot for VisitCandidate {
    fn patient_id(&self) -> &str {
        &self.patient_id
    }

    fn staff_id(&self) -> Option<&str> {
        self.staff_id.as_deref()
    }

    fn event_date(&self) -> NaiveDate {
        self.event_date
    }

    fn start_at(&self) -> NaiveDateTime {
        VisitCandidate::start_at(self)
    }

    fn end_at(&self) -> NaiveDateTime {
        VisitCandidate::end_at(self)
    }
}

impl VisitSlot for ScheduleEvent {
    fn patient_id(&self) -> &str {
        &self.patient_id
    }

    fn staff_id(&self) -> Option<&str> {
        self.staff_id.as_deref()
    }

    fn event_date(&self) -> NaiveDate {
        self.event_date
    }

    fn start_at(&self) -> NaiveDateTime {
        self.start_at
    }

    fn end_at(&self) -> NaiveDateTime {
        self.end_at
    }
}

pub struct ConflictDetector;

impl ConflictDetector {
    /// Half-open interval test: touching endpoints do not overlap
    pub fn overlaps(
        a_start: NaiveDateTime,
        a_end: NaiveDateTime,
        b_start: NaiveDateTime,
        b_end: NaiveDateTime,
    ) -> bool {
        a_start < b_end && a_end > b_start
    }

    /// Conflicts between one candidate and the committed visits.
    ///
    /// Cancelled visits never conflict. A committed visit sharing both the
    /// patient and the staff member yields one conflict of each type.
    pub fn detect<S: VisitSlot>(candidate: &S, committed: &[ScheduleEvent]) -> Vec<ScheduleConflict> {
        let mut conflicts = Vec::new();

        for other in committed {
            if other.status == ScheduleEventStatus::Cancelled
                || other.event_date != candidate.event_date()
                || !Self::overlaps(candidate.start_at(), candidate.end_at(), other.start_at, other.end_at)
            {
                continue;
            }

            if other.patient_id == candidate.patient_id() {
                conflicts.push(Self::conflict(ConflictType::PatientConflict, other));
            }

            if let (Some(staff), Some(other_staff)) = (candidate.staff_id(), other.staff_id.as_deref()) {
                if staff == other_staff {
                    conflicts.push(Self::conflict(ConflictType::StaffConflict, other));
                }
            }
        }

        conflicts
    }

    /// Conflicts for each candidate, in candidate order
    pub fn detect_all<S: VisitSlot>(
        candidates: &[S],
        committed: &[ScheduleEvent],
    ) -> Vec<Vec<ScheduleConflict>> {
        candidates
            .iter()
            .map(|candidate| Self::detect(candidate, committed))
            .collect()
    }

    /// Human-readable description of an overlap with `other`, naming the
    /// patient or staff member as `display_name`
    pub fn describe(conflict_type: ConflictType, display_name: &str, other: &ScheduleEvent) -> String {
        let who = match conflict_type {
            ConflictType::PatientConflict => "Patient",
            ConflictType::StaffConflict => "Staff",
        };
        format!(
            "{} {} already has a visit on {} from {} to {}",
            who,
            display_name,
            other.event_date,
            other.start_at.format("%H:%M"),
            other.end_at.format("%H:%M")
        )
    }

    fn conflict(conflict_type: ConflictType, other: &ScheduleEvent) -> ScheduleConflict {
        let party_id = match conflict_type {
            ConflictType::PatientConflict => other.patient_id.as_str(),
            ConflictType::StaffConflict => other.staff_id.as_deref().unwrap_or_default(),
        };

        ScheduleConflict {
            conflict_type,
            conflicting_event_id: other.id.clone(),
            event_date: other.event_date,
            start_at: other.start_at,
            end_at: other.end_at,
            message: Self::describe(conflict_type, party_id, other),
            resolved: false,
        }
    }
}
