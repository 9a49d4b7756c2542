//! Per-user study summaries.
//!
//! [`UserStudySummaryBuilder`] runs every configured stream through its
//! summarizer and outer-joins the results into one table per user. A stream
//! that fails is reported and contributes zero-filled columns; the remaining
//! streams of the same user are still summarized.

use std::path::{Path, PathBuf};

use coverage_core::error::{CoverageError, Result};
use coverage_core::models::{DailyTable, SummaryTable};
use coverage_core::streams::{StreamConfig, StreamKind, StudyConfig};
use coverage_core::time_utils::TimestampNormalizer;
use coverage_data::aggregator::DailyCountSummarizer;
use coverage_data::file_metrics::file_metrics_per_day;
use coverage_data::reader::read_and_aggregate;
use coverage_data::segments::GapSegmentedDurationSummarizer;
use tracing::{debug, error, info};

// ── Public types ──────────────────────────────────────────────────────────────

/// A stream that could not be summarized for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFailure {
    pub stream: String,
    pub error: String,
}

/// Outcome of summarizing one user.
#[derive(Debug, Clone, PartialEq)]
pub struct UserSummary {
    pub user_id: String,
    pub table: SummaryTable,
    pub failures: Vec<StreamFailure>,
}

impl UserSummary {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Immediate sub-directories of `download_folder`, sorted by name.
///
/// Each one is treated as a user identifier; plain files are ignored.
pub fn list_users(download_folder: &Path) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(download_folder).map_err(|source| CoverageError::FileRead {
        path: download_folder.to_path_buf(),
        source,
    })?;

    let mut users = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            users.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    users.sort();
    Ok(users)
}

// ── UserStudySummaryBuilder ───────────────────────────────────────────────────

/// Builds the combined daily summary for each user of a study.
#[derive(Debug, Clone)]
pub struct UserStudySummaryBuilder {
    download_folder: PathBuf,
    config: StudyConfig,
    normalizer: TimestampNormalizer,
}

impl UserStudySummaryBuilder {
    pub fn new(
        download_folder: impl Into<PathBuf>,
        config: StudyConfig,
        normalizer: TimestampNormalizer,
    ) -> Self {
        Self {
            download_folder: download_folder.into(),
            config,
            normalizer,
        }
    }

    pub fn download_folder(&self) -> &Path {
        &self.download_folder
    }

    pub fn config(&self) -> &StudyConfig {
        &self.config
    }

    /// Users found in the download folder.
    pub fn users(&self) -> Result<Vec<String>> {
        list_users(&self.download_folder)
    }

    /// Per-day table for one stream, dispatched on its classification.
    pub fn summarize_stream(&self, user_id: &str, stream: &StreamConfig) -> Result<DailyTable> {
        let root = self.download_folder.as_path();
        match stream.kind {
            StreamKind::FileCount => {
                file_metrics_per_day(root, user_id, &stream.name, &self.normalizer)
            }
            StreamKind::LineCount => {
                let table = read_and_aggregate(root, user_id, &stream.name, &self.normalizer)?;
                Ok(DailyCountSummarizer::summarize(&table, &stream.name))
            }
            StreamKind::Duration { gap_threshold_secs } => {
                let table = read_and_aggregate(root, user_id, &stream.name, &self.normalizer)?;
                let summarizer = GapSegmentedDurationSummarizer::new(gap_threshold_secs);
                Ok(summarizer.summarize(&table, &stream.name))
            }
        }
    }

    /// Summarize every configured stream for `user_id` and join on date.
    ///
    /// Column order follows the configuration. A user without any data gets
    /// a table with all columns and no rows.
    pub fn summarize_user(&self, user_id: &str) -> UserSummary {
        info!("Summarizing user {}", user_id);
        let mut tables = Vec::with_capacity(self.config.streams().len());
        let mut failures = Vec::new();

        for stream in self.config.streams() {
            match self.summarize_stream(user_id, stream) {
                Ok(table) => {
                    debug!(user = user_id, stream = %stream.name, days = table.len(), "summarized stream");
                    tables.push(table);
                }
                Err(e) => {
                    error!(user = user_id, stream = %stream.name, "stream summary failed: {}", e);
                    failures.push(StreamFailure {
                        stream: stream.name.clone(),
                        error: e.to_string(),
                    });
                    tables.push(DailyTable::empty(stream.metric_columns()));
                }
            }
        }

        UserSummary {
            user_id: user_id.to_string(),
            table: SummaryTable::outer_join(user_id, &tables),
            failures,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
