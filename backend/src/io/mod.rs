//! # IO Layer
//!
//! Entry points from the outside world into the domain services.

pub mod rest;
