//! # Storage Layer
//!
//! SQLite persistence through sqlx. The domain layer opens connections and
//! write transactions from [`DbConnection`] and hands them to the
//! repositories, so a whole service operation can run in one transaction.

pub mod connection;
pub mod schedule_event_repository;
pub mod template_repository;

pub use connection::{DbConnection, WriteTx};
pub use schedule_event_repository::ScheduleEventRepository;
pub use template_repository::TemplateRepository;
