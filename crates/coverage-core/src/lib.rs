//! Shared types for the coverage pipeline.
//!
//! Holds the error type, the table and column model, timestamp
//! normalization, the study stream configuration and CLI settings used by
//! the data, runtime and binary crates.

pub mod error;
pub mod models;
pub mod settings;
pub mod streams;
pub mod time_utils;

pub use error::{CoverageError, Result};
