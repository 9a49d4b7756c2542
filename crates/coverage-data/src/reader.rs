//! CSV stream discovery and loading.
//!
//! Reads every content file a user has for one stream from
//! `<root>/<user>/<stream>/**/*.csv` and stacks the rows into a single
//! [`AggregatedTable`] ordered by local time.

use std::path::{Path, PathBuf};

use coverage_core::error::{CoverageError, Result};
use coverage_core::models::{AggregatedRecord, AggregatedTable, UTC_TIME_COLUMN};
use coverage_core::time_utils::TimestampNormalizer;
use tracing::{debug, info};

// ── Public API ────────────────────────────────────────────────────────────────

/// Directory holding one user's data for one stream.
pub fn stream_dir(root: &Path, user_id: &str, stream: &str) -> PathBuf {
    root.join(user_id).join(stream)
}

/// Every regular file under `dir`, following symlinks.
///
/// An entry that cannot be read (an unreadable sub-directory, a dangling
/// link) is an error rather than a silent gap in the data.
pub(crate) fn walk_files(dir: &Path) -> Result<Vec<walkdir::DirEntry>> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(dir).follow_links(true) {
        let entry = entry.map_err(|e| walk_error(dir, e))?;
        if entry.file_type().is_file() {
            files.push(entry);
        }
    }
    Ok(files)
}

fn walk_error(dir: &Path, err: walkdir::Error) -> CoverageError {
    let path = err
        .path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| dir.to_path_buf());
    CoverageError::FileRead {
        path,
        source: err.into(),
    }
}

/// Find all `.csv` files recursively under `dir`, sorted by path.
///
/// A missing directory yields no files.
pub fn find_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        debug!("Stream directory does not exist: {}", dir.display());
        return Ok(Vec::new());
    }

    let mut files: Vec<PathBuf> = walk_files(dir)?
        .into_iter()
        .filter(|entry| {
            entry
                .path()
                .extension()
                .map(|ext| ext == "csv")
                .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    Ok(files)
}

/// Read and stack all CSV data for `user_id` and `stream`.
///
/// Files are read in path order. Each row's `UTC time` cell is normalized
/// into UTC and local instants; all other cells are kept as opaque payload.
/// Files with differing headers are unioned, and cells a file does not have
/// are left empty.
///
/// When the user has no CSV files for the stream, an empty table is returned
/// and a notice is logged. An unreadable or malformed file, or a malformed
/// timestamp, is an error.
pub fn read_and_aggregate(
    root: &Path,
    user_id: &str,
    stream: &str,
    normalizer: &TimestampNormalizer,
) -> Result<AggregatedTable> {
    let csv_files = find_csv_files(&stream_dir(root, user_id, stream))?;
    if csv_files.is_empty() {
        info!("No {} csv data for user {}", stream, user_id);
        return Ok(AggregatedTable::empty(user_id, stream));
    }

    let mut payload_columns: Vec<String> = Vec::new();
    let mut records: Vec<AggregatedRecord> = Vec::new();

    for file_path in &csv_files {
        let read = read_csv_file(file_path, normalizer, &mut payload_columns, &mut records)?;
        debug!("File {}: {} rows", file_path.display(), read);
    }

    // Rows from files read before a new column appeared are padded.
    for record in &mut records {
        record.payload.resize(payload_columns.len(), String::new());
    }

    debug!(
        user = user_id,
        stream,
        rows = records.len(),
        files = csv_files.len(),
        "aggregated stream"
    );

    Ok(AggregatedTable::new(user_id, stream, payload_columns, records))
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Append the rows of one CSV file to `records`, extending `columns` with any
/// payload header not seen before. Returns the number of rows read.
fn read_csv_file(
    file_path: &Path,
    normalizer: &TimestampNormalizer,
    columns: &mut Vec<String>,
    records: &mut Vec<AggregatedRecord>,
) -> Result<usize> {
    let csv_error = |source: csv::Error| CoverageError::Csv {
        path: file_path.to_path_buf(),
        source,
    };

    let file = std::fs::File::open(file_path).map_err(|source| CoverageError::FileRead {
        path: file_path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new().from_reader(file);

    let headers = reader.headers().map_err(csv_error)?.clone();
    if headers.is_empty() {
        debug!("Skipping empty file {}", file_path.display());
        return Ok(0);
    }

    let utc_idx = headers
        .iter()
        .position(|h| h.trim() == UTC_TIME_COLUMN)
        .ok_or_else(|| CoverageError::MissingColumn {
            path: file_path.to_path_buf(),
            column: UTC_TIME_COLUMN.to_string(),
        })?;

    // Position of each file column within the stacked payload.
    let slots: Vec<Option<usize>> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| {
            if i == utc_idx {
                return None;
            }
            let slot = columns.iter().position(|c| c == name).unwrap_or_else(|| {
                columns.push(name.to_string());
                columns.len() - 1
            });
            Some(slot)
        })
        .collect();

    let mut read = 0;
    for row in reader.records() {
        let row = row.map_err(csv_error)?;
        let token = row.get(utc_idx).unwrap_or_default();
        let instant = normalizer.normalize(token).map_err(|_| {
            CoverageError::TimestampParse(format!("\"{}\" in {}", token, file_path.display()))
        })?;

        let mut payload = vec![String::new(); columns.len()];
        for (cell, slot) in row.iter().zip(&slots) {
            if let Some(slot) = slot {
                payload[*slot] = cell.to_string();
            }
        }

        records.push(AggregatedRecord {
            utc_time: instant.utc,
            local_time: instant.local,
            date: instant.date,
            payload,
        });
        read += 1;
    }

    Ok(read)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone as _, Timelike, Utc};
    use tempfile::TempDir;

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn write_csv(root: &Path, rel: &str, lines: &[&str]) -> PathBuf {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, lines.join("\n")).unwrap();
        path
    }

    // ── find_csv_files ────────────────────────────────────────────────────────

    #[test]
    fn test_find_csv_files_recursive_and_sorted() {
        let dir = TempDir::new().unwrap();
        write_csv(dir.path(), "b.csv", &["x"]);
        write_csv(dir.path(), "a.csv", &["x"]);
        write_csv(dir.path(), "sub/c.csv", &["x"]);
        write_csv(dir.path(), "notes.txt", &["x"]);

        let files = find_csv_files(dir.path()).unwrap();
        let rel: Vec<String> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().display().to_string())
            .collect();
        assert_eq!(rel, vec!["a.csv", "b.csv", "sub/c.csv"]);
    }

    #[test]
    fn test_find_csv_files_nonexistent_path() {
        let files = find_csv_files(Path::new("/tmp/does-not-exist-coverage-test-xyz")).unwrap();
        assert!(files.is_empty());
    }

    // ── read_and_aggregate ────────────────────────────────────────────────────

    #[test]
    fn test_missing_stream_gives_empty_table() {
        let root = TempDir::new().unwrap();
        let table =
            read_and_aggregate(root.path(), "u1", "calls", &TimestampNormalizer::utc()).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.user_id(), "u1");
        assert_eq!(table.columns(), vec!["beiwe_id", "date", "utc_time", "local_time"]);
    }

    #[test]
    fn test_stacks_files_and_sorts_by_time() {
        let root = TempDir::new().unwrap();
        write_csv(
            root.path(),
            "u1/calls/2021-01-02 00_00_00.csv",
            &["timestamp,UTC time,type", "2,2021-01-02T08:00:00.000,out"],
        );
        write_csv(
            root.path(),
            "u1/calls/2021-01-01 00_00_00.csv",
            &[
                "timestamp,UTC time,type",
                "1,2021-01-01T09:00:00.000,in",
                "0,2021-01-01T07:00:00.000,missed",
            ],
        );

        let table =
            read_and_aggregate(root.path(), "u1", "calls", &TimestampNormalizer::utc()).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.payload_columns(), &["timestamp".to_string(), "type".to_string()]);

        let hours: Vec<u32> = table.records().iter().map(|r| r.utc_time.hour()).collect();
        assert_eq!(hours, vec![7, 9, 8]);
        assert_eq!(table.records()[2].payload, vec!["2", "out"]);
        assert_eq!(
            table.date_range(),
            Some((
                NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2021, 1, 2).unwrap()
            ))
        );
    }

    #[test]
    fn test_local_time_and_date_follow_timezone() {
        let root = TempDir::new().unwrap();
        write_csv(
            root.path(),
            "u1/texts/a.csv",
            &["UTC time,length", "2021-01-02T03:00:00,12"],
        );
        let normalizer = TimestampNormalizer::new("America/New_York").unwrap();
        let table = read_and_aggregate(root.path(), "u1", "texts", &normalizer).unwrap();

        let record = &table.records()[0];
        assert_eq!(record.utc_time, Utc.with_ymd_and_hms(2021, 1, 2, 3, 0, 0).unwrap());
        assert_eq!(record.local_time.hour(), 22);
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2021, 1, 1).unwrap());
    }

    #[test]
    fn test_differing_headers_are_unioned() {
        let root = TempDir::new().unwrap();
        write_csv(root.path(), "u1/wifi/a.csv", &["UTC time,ssid", "2021-01-01T00:00:00,home"]);
        write_csv(
            root.path(),
            "u1/wifi/b.csv",
            &["UTC time,ssid,rssi", "2021-01-01T01:00:00,work,-40"],
        );

        let table =
            read_and_aggregate(root.path(), "u1", "wifi", &TimestampNormalizer::utc()).unwrap();
        assert_eq!(table.payload_columns(), &["ssid".to_string(), "rssi".to_string()]);
        assert_eq!(table.records()[0].payload, vec!["home", ""]);
        assert_eq!(table.records()[1].payload, vec!["work", "-40"]);
    }

    #[test]
    fn test_missing_utc_column_is_error() {
        let root = TempDir::new().unwrap();
        write_csv(root.path(), "u1/calls/a.csv", &["timestamp,type", "1,in"]);
        let err = read_and_aggregate(root.path(), "u1", "calls", &TimestampNormalizer::utc())
            .unwrap_err();
        assert!(matches!(err, CoverageError::MissingColumn { .. }));
    }

    #[test]
    fn test_malformed_timestamp_is_error() {
        let root = TempDir::new().unwrap();
        write_csv(root.path(), "u1/calls/a.csv", &["UTC time,type", "yesterday,in"]);
        let err = read_and_aggregate(root.path(), "u1", "calls", &TimestampNormalizer::utc())
            .unwrap_err();
        match err {
            CoverageError::TimestampParse(msg) => assert!(msg.contains("yesterday")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_file_contributes_nothing() {
        let root = TempDir::new().unwrap();
        write_csv(root.path(), "u1/calls/a.csv", &[]);
        write_csv(root.path(), "u1/calls/b.csv", &["UTC time,type", "2021-01-01T00:00:00,in"]);
        let table =
            read_and_aggregate(root.path(), "u1", "calls", &TimestampNormalizer::utc()).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_csv_link_is_error() {
        let root = TempDir::new().unwrap();
        write_csv(root.path(), "u1/calls/b.csv", &["UTC time,type", "2021-01-01T00:00:00,in"]);
        let link = root.path().join("u1/calls/a.csv");
        std::os::unix::fs::symlink(root.path().join("u1/calls/missing-target.csv"), &link)
            .unwrap();

        assert!(matches!(
            find_csv_files(&root.path().join("u1/calls")),
            Err(CoverageError::FileRead { .. })
        ));
        let err = read_and_aggregate(root.path(), "u1", "calls", &TimestampNormalizer::utc())
            .unwrap_err();
        match err {
            CoverageError::FileRead { path, .. } => assert_eq!(path, link),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_header_only_file_gives_empty_but_typed_table() {
        let root = TempDir::new().unwrap();
        write_csv(root.path(), "u1/calls/a.csv", &["UTC time,type"]);
        let table =
            read_and_aggregate(root.path(), "u1", "calls", &TimestampNormalizer::utc()).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.payload_columns(), &["type".to_string()]);
    }
}
