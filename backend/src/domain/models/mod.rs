pub mod conflict;
pub mod recurrence;
pub mod schedule_event;
pub mod template;
