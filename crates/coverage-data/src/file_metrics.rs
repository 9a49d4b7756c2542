//! Per-day file counts and sizes from file names on disk.
//!
//! Used for streams whose content is opaque (audio recordings and the like):
//! each file's name encodes when it was recorded, so its content is never
//! opened.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use coverage_core::error::{CoverageError, Result};
use coverage_core::models::{DailyTable, FileRecord, MetricColumn, MetricKind, MetricValue};
use coverage_core::time_utils::TimestampNormalizer;
use tracing::{debug, info};

use crate::reader::{stream_dir, walk_files};

/// Files and bytes seen on one day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct DayTally {
    files: u64,
    bytes: u64,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// List every stream file for `user_id`, sorted by path.
///
/// The timestamp token is the file name up to its first `.`; files whose
/// token is empty (such as `.DS_Store`) are skipped. An entry that cannot be
/// read is an error.
pub fn collect_file_records(root: &Path, user_id: &str, stream: &str) -> Result<Vec<FileRecord>> {
    let dir = stream_dir(root, user_id, stream);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    for entry in walk_files(&dir)? {
        let name = entry.file_name().to_string_lossy();
        let stem = name.split('.').next().unwrap_or_default().to_string();
        if stem.is_empty() {
            continue;
        }

        let size_bytes = entry
            .metadata()
            .map_err(|e| CoverageError::FileRead {
                path: entry.path().to_path_buf(),
                source: e.into(),
            })?
            .len();

        records.push(FileRecord {
            path: entry.path().to_path_buf(),
            stem,
            size_bytes,
        });
    }

    records.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(records)
}

/// Number of files per local calendar date.
///
/// Output columns: `<stream>_file_count`. Only dates with files appear.
pub fn count_files_per_day(
    root: &Path,
    user_id: &str,
    stream: &str,
    normalizer: &TimestampNormalizer,
) -> Result<DailyTable> {
    file_table(root, user_id, stream, normalizer, &[MetricKind::FileCount])
}

/// Total byte size of files per local calendar date.
///
/// Output columns: `<stream>_file_size`. Only dates with files appear.
pub fn total_file_size_per_day(
    root: &Path,
    user_id: &str,
    stream: &str,
    normalizer: &TimestampNormalizer,
) -> Result<DailyTable> {
    file_table(root, user_id, stream, normalizer, &[MetricKind::FileSize])
}

/// File count and byte size per day from a single directory walk.
///
/// Output columns: `<stream>_file_count`, `<stream>_file_size`.
pub fn file_metrics_per_day(
    root: &Path,
    user_id: &str,
    stream: &str,
    normalizer: &TimestampNormalizer,
) -> Result<DailyTable> {
    file_table(
        root,
        user_id,
        stream,
        normalizer,
        &[MetricKind::FileCount, MetricKind::FileSize],
    )
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn file_table(
    root: &Path,
    user_id: &str,
    stream: &str,
    normalizer: &TimestampNormalizer,
    kinds: &[MetricKind],
) -> Result<DailyTable> {
    let columns: Vec<MetricColumn> = kinds
        .iter()
        .map(|&kind| MetricColumn::new(stream, kind))
        .collect();

    let files = collect_file_records(root, user_id, stream)?;
    if files.is_empty() {
        info!("No {} files for user {}", stream, user_id);
        return Ok(DailyTable::empty(columns));
    }

    let tallies = tally_by_date(&files, normalizer)?;
    debug!(
        user = user_id,
        stream,
        files = files.len(),
        days = tallies.len(),
        "counted stream files"
    );

    let mut table = DailyTable::empty(columns);
    for (date, tally) in tallies {
        let values = kinds
            .iter()
            .map(|kind| match kind {
                MetricKind::FileSize => MetricValue::Count(tally.bytes),
                _ => MetricValue::Count(tally.files),
            })
            .collect();
        table.push_row(date, values);
    }
    Ok(table)
}

/// Group files by the local date their name encodes.
fn tally_by_date(
    files: &[FileRecord],
    normalizer: &TimestampNormalizer,
) -> Result<BTreeMap<NaiveDate, DayTally>> {
    let mut tallies: BTreeMap<NaiveDate, DayTally> = BTreeMap::new();
    for file in files {
        let instant = normalizer.normalize_file_stem(&file.stem).map_err(|_| {
            CoverageError::TimestampParse(format!(
                "file name \"{}\" at {}",
                file.stem,
                file.path.display()
            ))
        })?;
        let tally = tallies.entry(instant.date).or_default();
        tally.files += 1;
        tally.bytes += file.size_bytes;
    }
    Ok(tallies)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
