//! Inputs and outputs of the domain services, independent of the wire DTOs.

pub mod schedule;
pub mod template;
