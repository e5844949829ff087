//! HTTP translation of [`ScheduleError`].

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use shared::ErrorResponse;
use tracing::{error, warn};

use crate::domain::error::ScheduleError;
use crate::io::rest::mappers::schedule_mapper::ScheduleMapper;

impl ScheduleError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ScheduleError::Validation { .. } => StatusCode::BAD_REQUEST,
            ScheduleError::NotFound { .. } => StatusCode::NOT_FOUND,
            ScheduleError::Conflict { .. } | ScheduleError::Concurrency(_) => StatusCode::CONFLICT,
            ScheduleError::Storage(_) | ScheduleError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ScheduleError::Validation { .. } => "VALIDATION",
            ScheduleError::NotFound { .. } => "NOT_FOUND",
            ScheduleError::Conflict { .. } => "CONFLICT",
            ScheduleError::Concurrency(_) => "CONCURRENCY",
            ScheduleError::Storage(_) | ScheduleError::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for ScheduleError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected: {}", self);
        }

        let retryable = self.is_retryable();
        let error = self.error_code().to_string();
        let body = match self {
            ScheduleError::Validation { field, message } => ErrorResponse {
                error,
                message: format!("Invalid {}: {}", field, message),
                field: Some(field),
                conflicts: Vec::new(),
                retryable,
            },
            ScheduleError::Conflict { message, conflicts } => ErrorResponse {
                error,
                message,
                field: None,
                conflicts: ScheduleMapper::to_conflict_dto_list(conflicts),
                retryable,
            },
            // Storage details stay in the log
            ScheduleError::Storage(_) | ScheduleError::Internal(_) => ErrorResponse {
                error,
                message: "Internal server error".to_string(),
                field: None,
                conflicts: Vec::new(),
                retryable,
            },
            other => ErrorResponse {
                error,
                message: other.to_string(),
                field: None,
                conflicts: Vec::new(),
                retryable,
            },
        };

        (status, Json(body)).into_response()
    }
}
