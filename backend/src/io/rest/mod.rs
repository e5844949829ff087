//! # REST API Interface Layer
//!
//! HTTP endpoints for visit templates and scheduled visits.
//!
//! - JSON request/response handling through the DTOs in `shared`
//! - Parsing of wire strings into domain types (see [`mappers`])
//! - Translation of [`ScheduleError`](crate::domain::ScheduleError) into
//!   status codes and JSON error bodies (see [`error`])
//!
//! Handlers hold no business logic; each one maps the request, calls a
//! single service operation and maps the result back.

pub mod error;
pub mod mappers;
pub mod schedule_apis;
pub mod template_apis;
