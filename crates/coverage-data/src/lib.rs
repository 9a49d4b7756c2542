//! Data ingestion and per-stream daily summaries.
//!
//! Responsible for discovering and reading a user's raw stream files,
//! stacking them into time-ordered tables, and reducing those tables (or the
//! file listing itself) to one row per calendar day.

pub mod aggregator;
pub mod file_metrics;
pub mod reader;
pub mod segments;

pub use coverage_core as core;
