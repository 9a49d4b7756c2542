//! Study-level orchestration for Beiwe coverage summaries.
//!
//! Combines the per-stream summaries of each user, runs users concurrently,
//! writes the summary CSV files, and defines the seam through which raw
//! data is downloaded.

pub mod study_runner;
pub mod summary_builder;
pub mod sync;
pub mod writer;

pub use coverage_core as core;
pub use coverage_data as data;
