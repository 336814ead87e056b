//! Cadence Core
//!
//! Core domain types, port traits, and error handling for the Cadence
//! build-cause scheduling engine. This crate has minimal dependencies and
//! defines the shared vocabulary used by the scheduler and its collaborators.

pub mod build_cause;
pub mod error;
pub mod ids;
pub mod material;
pub mod pipeline;
pub mod ports;
pub mod revision;

pub use error::{ConfigError, ConfigErrorKind, Error, Result};
pub use ids::*;
