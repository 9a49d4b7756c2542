//! Summary-table CSV output.
//!
//! Files carry the index columns `beiwe_id,date` followed by one column per
//! metric. Dates are written as `YYYY-MM-DD`, counts as integers and hours
//! in the shortest form that parses back to the same value, so
//! [`read_summary_table`] reproduces a written table exactly.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use coverage_core::error::{CoverageError, Result};
use coverage_core::models::{
    MetricColumn, SummaryRow, SummaryTable, BEIWE_ID_COLUMN, DATE_COLUMN,
};

/// Name of the study-wide file inside the output folder.
pub const STUDY_SUMMARY_FILE: &str = "aggregated_summaries.csv";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// `<output>/<user>.csv`
pub fn user_summary_path(output_folder: &Path, user_id: &str) -> PathBuf {
    output_folder.join(format!("{}.csv", user_id))
}

/// `<output>/aggregated_summaries.csv`
pub fn study_summary_path(output_folder: &Path) -> PathBuf {
    output_folder.join(STUDY_SUMMARY_FILE)
}

/// Write `table` to `path`, replacing any existing file.
pub fn write_summary_table(path: &Path, table: &SummaryTable) -> Result<()> {
    let csv_error = |source: csv::Error| CoverageError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = csv::Writer::from_path(path).map_err(csv_error)?;
    writer.write_record(table.header()).map_err(csv_error)?;

    for row in table.rows() {
        let mut record = Vec::with_capacity(row.values.len() + 2);
        record.push(row.beiwe_id.clone());
        record.push(row.date.format(DATE_FORMAT).to_string());
        record.extend(row.values.iter().map(|v| v.to_string()));
        writer.write_record(&record).map_err(csv_error)?;
    }

    writer.flush()?;
    Ok(())
}

/// Read a file written by [`write_summary_table`].
pub fn read_summary_table(path: &Path) -> Result<SummaryTable> {
    let csv_error = |source: csv::Error| CoverageError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let malformed = |detail: String| {
        CoverageError::Config(format!("malformed summary file {}: {}", path.display(), detail))
    };

    let mut reader = csv::Reader::from_path(path).map_err(csv_error)?;
    let headers = reader.headers().map_err(csv_error)?.clone();

    let mut names = headers.iter();
    if names.next() != Some(BEIWE_ID_COLUMN) || names.next() != Some(DATE_COLUMN) {
        return Err(malformed(format!(
            "expected leading columns {},{}",
            BEIWE_ID_COLUMN, DATE_COLUMN
        )));
    }
    let columns = names
        .map(|name| {
            MetricColumn::parse(name).ok_or_else(|| malformed(format!("unknown column \"{}\"", name)))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        let beiwe_id = record.get(0).unwrap_or_default().to_string();
        let raw_date = record.get(1).unwrap_or_default();
        let date = NaiveDate::parse_from_str(raw_date, DATE_FORMAT)
            .map_err(|_| CoverageError::TimestampParse(raw_date.to_string()))?;

        let values = columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                let raw = record.get(i + 2).unwrap_or_default();
                column
                    .kind
                    .parse_value(raw)
                    .ok_or_else(|| malformed(format!("bad value \"{}\" for {}", raw, column)))
            })
            .collect::<Result<Vec<_>>>()?;

        rows.push(SummaryRow {
            beiwe_id,
            date,
            values,
        });
    }

    Ok(SummaryTable::from_rows(columns, rows))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
