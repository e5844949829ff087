//! # Domain Layer
//!
//! Business logic for visit scheduling. Services take command structs from
//! [`commands`], work on the types in [`models`] and report failures as
//! [`ScheduleError`].

pub mod commands;
pub mod conflict_detector;
pub mod directory;
pub mod error;
pub mod models;
pub mod projector;
pub mod recurrence;
pub mod schedule_service;
pub mod template_service;

pub use conflict_detector::ConflictDetector;
pub use directory::{AuthorizationInfo, AuthorizationLookup, InMemoryDirectory, PartyDirectory};
pub use error::{ScheduleError, ScheduleResult};
pub use projector::TemplateProjector;
pub use recurrence::RecurrenceExpander;
pub use schedule_service::ScheduleService;
pub use template_service::TemplateService;
