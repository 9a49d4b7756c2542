//! Async study runner.
//!
//! Summarizes every user of a study on the tokio blocking pool, at most
//! `jobs` users at a time, then writes the study-wide table. Per-user results
//! are put back in user order before concatenation, so the output does not
//! depend on the degree of parallelism.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use coverage_core::error::{CoverageError, Result};
use coverage_core::models::SummaryTable;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::summary_builder::{StreamFailure, UserStudySummaryBuilder, UserSummary};
use crate::writer::{
    study_summary_path, user_summary_path, write_summary_table, STUDY_SUMMARY_FILE,
};

// ── Public types ──────────────────────────────────────────────────────────────

/// A stream failure, tagged with the user it happened for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserStreamFailure {
    pub user_id: String,
    pub failure: StreamFailure,
}

/// A user whose `<user>.csv` could not be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserOutputFailure {
    pub user_id: String,
    pub error: String,
}

/// What a study run produced.
#[derive(Debug, Clone, Default)]
pub struct StudyReport {
    /// Users summarized, in output order.
    pub users: Vec<String>,
    /// Rows in the study-wide table.
    pub study_rows: usize,
    /// Path of the study-wide file; `None` when there were no users.
    pub study_file: Option<PathBuf>,
    pub failures: Vec<UserStreamFailure>,
    pub output_failures: Vec<UserOutputFailure>,
}

impl StudyReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty() || !self.output_failures.is_empty()
    }
}

/// One finished user task.
struct UserOutcome {
    summary: UserSummary,
    write_error: Option<String>,
}

// ── StudyRunner ───────────────────────────────────────────────────────────────

pub struct StudyRunner {
    builder: Arc<UserStudySummaryBuilder>,
    output_folder: PathBuf,
    jobs: usize,
}

impl StudyRunner {
    /// `jobs` is clamped to at least one.
    pub fn new(
        builder: UserStudySummaryBuilder,
        output_folder: impl Into<PathBuf>,
        jobs: usize,
    ) -> Self {
        Self {
            builder: Arc::new(builder),
            output_folder: output_folder.into(),
            jobs: jobs.max(1),
        }
    }

    pub fn output_folder(&self) -> &Path {
        &self.output_folder
    }

    /// Summarize all users, writing `<user>.csv` for each and
    /// `aggregated_summaries.csv` for the study.
    ///
    /// Stream failures and per-user write failures are collected in the
    /// report. A user folder whose file name would collide with the study
    /// file is rejected before anything is written. Failing to create the
    /// output folder or to write the study file aborts the run.
    pub async fn run(&self) -> Result<StudyReport> {
        let users = self.builder.users()?;
        if let Some(user) = users.iter().find(|u| self.collides_with_study_file(u)) {
            return Err(CoverageError::Config(format!(
                "user folder \"{}\" would be overwritten by {}",
                user, STUDY_SUMMARY_FILE
            )));
        }

        tokio::fs::create_dir_all(&self.output_folder).await?;

        if users.is_empty() {
            warn!(
                "No user folders found in {}",
                self.builder.download_folder().display()
            );
            return Ok(StudyReport::default());
        }
        info!(users = users.len(), jobs = self.jobs, "starting study summary");

        let outcomes = self.summarize_all(&users).await?;

        let mut report = StudyReport {
            users,
            ..StudyReport::default()
        };
        let mut tables = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            let summary = outcome.summary;
            report.failures.extend(summary.failures.iter().map(|failure| UserStreamFailure {
                user_id: summary.user_id.clone(),
                failure: failure.clone(),
            }));
            if let Some(error) = outcome.write_error {
                report.output_failures.push(UserOutputFailure {
                    user_id: summary.user_id.clone(),
                    error,
                });
            }
            tables.push(summary.table);
        }

        let output = self.output_folder.clone();
        let (path, rows) = tokio::task::spawn_blocking(move || -> Result<(PathBuf, usize)> {
            let study = SummaryTable::concat(tables);
            let path = study_summary_path(&output);
            write_summary_table(&path, &study)?;
            Ok((path, study.len()))
        })
        .await
        .map_err(join_error)??;
        info!(rows, "wrote {}", path.display());

        report.study_rows = rows;
        report.study_file = Some(path);
        Ok(report)
    }

    // ── Private implementation ────────────────────────────────────────────

    fn collides_with_study_file(&self, user_id: &str) -> bool {
        let study_file = study_summary_path(&self.output_folder);
        user_summary_path(&self.output_folder, user_id) == study_file
    }

    /// Process every user on the blocking pool and return outcomes in the
    /// order of `users`.
    async fn summarize_all(&self, users: &[String]) -> Result<Vec<UserOutcome>> {
        let semaphore = Arc::new(Semaphore::new(self.jobs));
        let mut tasks = JoinSet::new();

        for (idx, user) in users.iter().cloned().enumerate() {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| CoverageError::Other(anyhow::anyhow!("worker pool closed: {e}")))?;
            let builder = Arc::clone(&self.builder);
            let output = self.output_folder.clone();
            tasks.spawn_blocking(move || {
                let _permit = permit;
                let summary = builder.summarize_user(&user);
                let write_error = match write_user_summary(&output, &summary) {
                    Ok(_) => None,
                    Err(e) => {
                        error!(user = %user, "could not write user summary: {}", e);
                        Some(e.to_string())
                    }
                };
                (idx, UserOutcome { summary, write_error })
            });
        }

        let mut results: Vec<(usize, UserOutcome)> = Vec::with_capacity(users.len());
        while let Some(joined) = tasks.join_next().await {
            let (idx, outcome) = joined.map_err(join_error)?;
            debug!(user = %outcome.summary.user_id, "user finished");
            results.push((idx, outcome));
        }

        results.sort_by_key(|(idx, _)| *idx);
        Ok(results.into_iter().map(|(_, outcome)| outcome).collect())
    }
}

/// Write `<output>/<user>.csv`.
fn write_user_summary(output_folder: &Path, summary: &UserSummary) -> Result<PathBuf> {
    let path = user_summary_path(output_folder, &summary.user_id);
    write_summary_table(&path, &summary.table)?;
    info!(
        user = %summary.user_id,
        days = summary.table.len(),
        failed_streams = summary.failures.len(),
        "wrote {}",
        path.display()
    );
    Ok(path)
}

fn join_error(err: JoinError) -> CoverageError {
    CoverageError::Other(anyhow::anyhow!("background task failed: {err}"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
