use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Name of the user index column in every summary file.
pub const BEIWE_ID_COLUMN: &str = "beiwe_id";
/// Name of the calendar-date index column in every summary file.
pub const DATE_COLUMN: &str = "date";
/// Column of a content file that carries the UTC timestamp.
pub const UTC_TIME_COLUMN: &str = "UTC time";

// ── MetricKind ────────────────────────────────────────────────────────────────

/// The kind of per-day statistic a summary column holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Number of files whose name stamp falls on the day.
    FileCount,
    /// Total byte size of those files.
    FileSize,
    /// Number of records whose local date is the day.
    LineCount,
    /// Observed duration in hours.
    SumHours,
    /// `1` when the day has any data, otherwise `0`.
    AnyData,
}

impl MetricKind {
    /// Every kind, in suffix-matching order.
    pub const ALL: [MetricKind; 5] = [
        MetricKind::FileCount,
        MetricKind::FileSize,
        MetricKind::LineCount,
        MetricKind::SumHours,
        MetricKind::AnyData,
    ];

    /// Column-name suffix appended after the stream name.
    pub fn suffix(self) -> &'static str {
        match self {
            MetricKind::FileCount => "file_count",
            MetricKind::FileSize => "file_size",
            MetricKind::LineCount => "line_count",
            MetricKind::SumHours => "sum_hours",
            MetricKind::AnyData => "any_data",
        }
    }

    /// The fill value used for days a table has no row for.
    pub fn zero(self) -> MetricValue {
        match self {
            MetricKind::SumHours => MetricValue::Hours(0.0),
            _ => MetricValue::Count(0),
        }
    }

    /// Parse a textual cell into a value of this kind.
    pub fn parse_value(self, raw: &str) -> Option<MetricValue> {
        let raw = raw.trim();
        match self {
            MetricKind::SumHours => raw.parse::<f64>().ok().map(MetricValue::Hours),
            _ => raw.parse::<u64>().ok().map(MetricValue::Count),
        }
    }
}

// ── MetricColumn ──────────────────────────────────────────────────────────────

/// A `(stream, kind)` pair. All summary column names are derived here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricColumn {
    pub stream: String,
    pub kind: MetricKind,
}

impl MetricColumn {
    pub fn new(stream: impl Into<String>, kind: MetricKind) -> Self {
        Self {
            stream: stream.into(),
            kind,
        }
    }

    /// `"<stream>_<suffix>"`, e.g. `"gps_sum_hours"`.
    pub fn name(&self) -> String {
        format!("{}_{}", self.stream, self.kind.suffix())
    }

    /// Inverse of [`MetricColumn::name`]. Returns `None` when `name` carries
    /// no known suffix or the stream part is empty.
    pub fn parse(name: &str) -> Option<Self> {
        MetricKind::ALL.iter().find_map(|&kind| {
            name.strip_suffix(kind.suffix())
                .and_then(|rest| rest.strip_suffix('_'))
                .filter(|stream| !stream.is_empty())
                .map(|stream| Self::new(stream, kind))
        })
    }
}

impl fmt::Display for MetricColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.stream, self.kind.suffix())
    }
}

// ── MetricValue ───────────────────────────────────────────────────────────────

/// A single summary cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Count(u64),
    Hours(f64),
}

impl MetricValue {
    pub fn as_f64(self) -> f64 {
        match self {
            MetricValue::Count(n) => n as f64,
            MetricValue::Hours(h) => h,
        }
    }
}

impl fmt::Display for MetricValue {
    /// Counts print as integers; hours use the shortest representation that
    /// parses back to the same `f64`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Count(n) => write!(f, "{}", n),
            MetricValue::Hours(h) => write!(f, "{}", h),
        }
    }
}

// ── DailyTable ────────────────────────────────────────────────────────────────

/// One row of a per-stream daily summary.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyRow {
    pub date: NaiveDate,
    /// One value per column of the owning table, in column order.
    pub values: Vec<MetricValue>,
}

/// Per-day summary for one user and stream.
///
/// A table with zero rows still carries its full column list so that joins
/// produce the same schema whether or not the stream had data.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyTable {
    columns: Vec<MetricColumn>,
    rows: Vec<DailyRow>,
}

impl DailyTable {
    /// A well-typed table with no rows.
    pub fn empty(columns: Vec<MetricColumn>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row. `values` must line up with the table's columns.
    pub fn push_row(&mut self, date: NaiveDate, values: Vec<MetricValue>) {
        debug_assert_eq!(values.len(), self.columns.len());
        self.rows.push(DailyRow { date, values });
    }

    pub fn columns(&self) -> &[MetricColumn] {
        &self.columns
    }

    pub fn rows(&self) -> &[DailyRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Dates of all rows, in row order.
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.rows.iter().map(|r| r.date).collect()
    }

    /// Look up the value of `column` on `date`.
    pub fn value(&self, date: NaiveDate, column: &MetricColumn) -> Option<MetricValue> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.rows
            .iter()
            .find(|r| r.date == date)
            .map(|r| r.values[idx])
    }
}

// ── SummaryTable ──────────────────────────────────────────────────────────────

/// One `(beiwe_id, date)` row of a user or study summary.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub beiwe_id: String,
    pub date: NaiveDate,
    pub values: Vec<MetricValue>,
}

/// Daily tables joined on date and keyed by `(beiwe_id, date)`.
///
/// Used both for a single user's summary and for the study-wide stack of all
/// users.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryTable {
    columns: Vec<MetricColumn>,
    rows: Vec<SummaryRow>,
}

impl SummaryTable {
    pub fn empty(columns: Vec<MetricColumn>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from pre-assembled rows.
    pub fn from_rows(columns: Vec<MetricColumn>, rows: Vec<SummaryRow>) -> Self {
        Self { columns, rows }
    }

    /// Outer-join `tables` on date for one user.
    ///
    /// Columns appear in the order the tables are given. Every date present in
    /// any table yields one row, sorted ascending; cells a table has no row
    /// for are filled with the column kind's zero.
    pub fn outer_join(beiwe_id: &str, tables: &[DailyTable]) -> Self {
        let columns: Vec<MetricColumn> = tables
            .iter()
            .flat_map(|t| t.columns().iter().cloned())
            .collect();
        let zeros: Vec<MetricValue> = columns.iter().map(|c| c.kind.zero()).collect();

        let mut by_date: BTreeMap<NaiveDate, Vec<MetricValue>> = BTreeMap::new();
        let mut offset = 0;
        for table in tables {
            for row in table.rows() {
                let cells = by_date.entry(row.date).or_insert_with(|| zeros.clone());
                cells[offset..offset + row.values.len()].copy_from_slice(&row.values);
            }
            offset += table.columns().len();
        }

        let rows = by_date
            .into_iter()
            .map(|(date, values)| SummaryRow {
                beiwe_id: beiwe_id.to_string(),
                date,
                values,
            })
            .collect();

        Self { columns, rows }
    }

    /// Stack tables row-wise.
    ///
    /// The result's columns are the union of all inputs in first-seen order;
    /// a table lacking a column contributes that column's zero.
    pub fn concat<I>(tables: I) -> Self
    where
        I: IntoIterator<Item = SummaryTable>,
    {
        let tables: Vec<SummaryTable> = tables.into_iter().collect();

        let mut columns: Vec<MetricColumn> = Vec::new();
        for table in &tables {
            for column in &table.columns {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }

        let mut rows = Vec::new();
        for table in tables {
            let mapping: Vec<Option<usize>> = columns
                .iter()
                .map(|c| table.columns.iter().position(|own| own == c))
                .collect();
            for row in table.rows {
                let values = mapping
                    .iter()
                    .zip(&columns)
                    .map(|(src, column)| match src {
                        Some(i) => row.values[*i],
                        None => column.kind.zero(),
                    })
                    .collect();
                rows.push(SummaryRow {
                    beiwe_id: row.beiwe_id,
                    date: row.date,
                    values,
                });
            }
        }

        Self { columns, rows }
    }

    pub fn columns(&self) -> &[MetricColumn] {
        &self.columns
    }

    pub fn rows(&self) -> &[SummaryRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Header line: index columns followed by metric columns.
    pub fn header(&self) -> Vec<String> {
        let mut header = vec![BEIWE_ID_COLUMN.to_string(), DATE_COLUMN.to_string()];
        header.extend(self.columns.iter().map(MetricColumn::name));
        header
    }

    /// Look up a single cell.
    pub fn value(
        &self,
        beiwe_id: &str,
        date: NaiveDate,
        column: &MetricColumn,
    ) -> Option<MetricValue> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.rows
            .iter()
            .find(|r| r.beiwe_id == beiwe_id && r.date == date)
            .map(|r| r.values[idx])
    }
}

// ── AggregatedTable ───────────────────────────────────────────────────────────

/// One content-file row, annotated with its normalized timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedRecord {
    pub utc_time: DateTime<Utc>,
    pub local_time: DateTime<Tz>,
    /// Calendar date of `local_time`.
    pub date: NaiveDate,
    /// Remaining fields, aligned with [`AggregatedTable::payload_columns`].
    pub payload: Vec<String>,
}

/// Every record of one user's stream, sorted ascending by local time.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedTable {
    user_id: String,
    stream: String,
    payload_columns: Vec<String>,
    records: Vec<AggregatedRecord>,
}

impl AggregatedTable {
    /// Columns every aggregated table exposes, even when empty.
    pub const BASE_COLUMNS: [&'static str; 4] = [BEIWE_ID_COLUMN, DATE_COLUMN, "utc_time", "local_time"];

    /// A well-typed table with no records.
    pub fn empty(user_id: impl Into<String>, stream: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            stream: stream.into(),
            payload_columns: Vec::new(),
            records: Vec::new(),
        }
    }

    /// Build a table, stably sorting `records` by local time.
    pub fn new(
        user_id: impl Into<String>,
        stream: impl Into<String>,
        payload_columns: Vec<String>,
        mut records: Vec<AggregatedRecord>,
    ) -> Self {
        records.sort_by_key(|r| r.local_time);
        Self {
            user_id: user_id.into(),
            stream: stream.into(),
            payload_columns,
            records,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn payload_columns(&self) -> &[String] {
        &self.payload_columns
    }

    /// Base columns followed by payload columns.
    pub fn columns(&self) -> Vec<String> {
        Self::BASE_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(self.payload_columns.iter().cloned())
            .collect()
    }

    pub fn records(&self) -> &[AggregatedRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Smallest and largest local date, or `None` for an empty table.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let min = self.records.iter().map(|r| r.date).min()?;
        let max = self.records.iter().map(|r| r.date).max()?;
        Some((min, max))
    }
}

// ── FileRecord ────────────────────────────────────────────────────────────────

/// A stream file whose name encodes its timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: PathBuf,
    /// File name up to the first `.`.
    pub stem: String,
    pub size_bytes: u64,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
