//! Error taxonomy for the scheduling domain.
//!
//! Every service operation returns [`ScheduleResult`]. The REST layer maps
//! each variant to a distinct HTTP status so clients can tell a malformed
//! request from a double booking they may override or a race they may retry.

use crate::domain::models::conflict::ScheduleConflict;

pub type ScheduleResult<T> = std::result::Result<T, ScheduleError>;

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{message}")]
    Conflict {
        message: String,
        conflicts: Vec<ScheduleConflict>,
    },

    #[error("Concurrent update detected: {0}")]
    Concurrency(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ScheduleError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Conflict that is not tied to overlapping visits (e.g. duplicate active template)
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            conflicts: Vec::new(),
        }
    }

    pub fn overlapping(message: impl Into<String>, conflicts: Vec<ScheduleConflict>) -> Self {
        Self::Conflict {
            message: message.into(),
            conflicts,
        }
    }

    /// True when repeating the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScheduleError::Concurrency(_))
    }
}
