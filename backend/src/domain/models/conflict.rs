//! Double-booking results produced by the conflict detector.
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConflictType {
    PatientConflict,
    StaffConflict,
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictType::PatientConflict => f.write_str("PATIENT_CONFLICT"),
            ConflictType::StaffConflict => f.write_str("STAFF_CONFLICT"),
        }
    }
}

/// Transient overlap report; never persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConflict {
    pub conflict_type: ConflictType,
    pub conflicting_event_id: String,
    pub event_date: NaiveDate,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    pub message: String,
    pub resolved: bool,
}

impl ScheduleConflict {
    pub fn key(&self) -> ResolvedConflict {
        ResolvedConflict {
            conflicting_event_id: self.conflicting_event_id.clone(),
            conflict_type: self.conflict_type,
        }
    }
}

/// An overlap the operator has explicitly accepted
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedConflict {
    pub conflicting_event_id: String,
    pub conflict_type: ConflictType,
}
