//! Dense per-day record counts over an aggregated stream.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use coverage_core::models::{AggregatedTable, DailyTable, MetricColumn, MetricKind, MetricValue};

/// Every calendar day from `start` to `end`, inclusive.
pub fn day_range(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |day| *day <= end)
}

// ── DailyCountSummarizer ──────────────────────────────────────────────────────

/// Stateless helper that counts records per local calendar day.
pub struct DailyCountSummarizer;

impl DailyCountSummarizer {
    /// `<prefix>_line_count`, `<prefix>_any_data`.
    pub fn columns(prefix: &str) -> Vec<MetricColumn> {
        vec![
            MetricColumn::new(prefix, MetricKind::LineCount),
            MetricColumn::new(prefix, MetricKind::AnyData),
        ]
    }

    /// One row per local date from the table's first to last day, including
    /// days without records, with the record count and an any-data flag.
    ///
    /// An empty table yields an empty result with the same columns.
    pub fn summarize(table: &AggregatedTable, prefix: &str) -> DailyTable {
        let mut summary = DailyTable::empty(Self::columns(prefix));
        let Some((first, last)) = table.date_range() else {
            return summary;
        };

        let mut counts: BTreeMap<NaiveDate, u64> = BTreeMap::new();
        for record in table.records() {
            *counts.entry(record.date).or_default() += 1;
        }

        for day in day_range(first, last) {
            let count = counts.get(&day).copied().unwrap_or(0);
            summary.push_row(
                day,
                vec![MetricValue::Count(count), MetricValue::Count(u64::from(count > 0))],
            );
        }
        summary
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone as _, Utc};
    use chrono_tz::Tz;
    use coverage_core::models::AggregatedRecord;
    use coverage_core::time_utils::TimestampNormalizer;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn table(normalizer: &TimestampNormalizer, stamps: &[(u32, u32, u32)]) -> AggregatedTable {
        let records = stamps
            .iter()
            .map(|&(month, day, hour)| {
                let inst = normalizer.localize(Utc.with_ymd_and_hms(2021, month, day, hour, 0, 0).unwrap());
                AggregatedRecord {
                    utc_time: inst.utc,
                    local_time: inst.local,
                    date: inst.date,
                    payload: Vec::new(),
                }
            })
            .collect();
        AggregatedTable::new("u1", "calls", Vec::new(), records)
    }

    // ── day_range ─────────────────────────────────────────────────────────────

    #[test]
    fn test_day_range_inclusive() {
        let days: Vec<NaiveDate> = day_range(d(2021, 2, 27), d(2021, 3, 2)).collect();
        assert_eq!(days, vec![d(2021, 2, 27), d(2021, 2, 28), d(2021, 3, 1), d(2021, 3, 2)]);
    }

    #[test]
    fn test_day_range_single_day() {
        assert_eq!(day_range(d(2021, 1, 1), d(2021, 1, 1)).count(), 1);
    }

    // ── summarize ─────────────────────────────────────────────────────────────

    #[test]
    fn test_empty_table_gives_typed_empty_summary() {
        let summary = DailyCountSummarizer::summarize(&AggregatedTable::empty("u1", "calls"), "calls");
        assert!(summary.is_empty());
        assert_eq!(summary.columns(), DailyCountSummarizer::columns("calls").as_slice());
    }

    #[test]
    fn test_counts_are_dense_over_range() {
        let n = TimestampNormalizer::utc();
        let t = table(&n, &[(1, 1, 8), (1, 1, 9), (1, 4, 12)]);
        let summary = DailyCountSummarizer::summarize(&t, "calls");

        assert_eq!(summary.dates(), vec![d(2021, 1, 1), d(2021, 1, 2), d(2021, 1, 3), d(2021, 1, 4)]);
        let values: Vec<Vec<MetricValue>> = summary.rows().iter().map(|r| r.values.clone()).collect();
        assert_eq!(
            values,
            vec![
                vec![MetricValue::Count(2), MetricValue::Count(1)],
                vec![MetricValue::Count(0), MetricValue::Count(0)],
                vec![MetricValue::Count(0), MetricValue::Count(0)],
                vec![MetricValue::Count(1), MetricValue::Count(1)],
            ]
        );
    }

    #[test]
    fn test_counts_follow_local_date() {
        let n = TimestampNormalizer::new("America/New_York").unwrap();
        // 03:00 UTC on Jan 2 is the evening of Jan 1 in New York.
        let t = table(&n, &[(1, 2, 3), (1, 2, 4)]);
        let summary = DailyCountSummarizer::summarize(&t, "calls");
        assert_eq!(summary.dates(), vec![d(2021, 1, 1)]);
        assert_eq!(summary.rows()[0].values[0], MetricValue::Count(2));
        assert_eq!(t.records()[0].local_time.timezone(), Tz::America__New_York);
    }

    #[test]
    fn test_summarize_is_idempotent() {
        let n = TimestampNormalizer::utc();
        let t = table(&n, &[(1, 1, 8), (1, 3, 9)]);
        let first = DailyCountSummarizer::summarize(&t, "calls");
        let second = DailyCountSummarizer::summarize(&t, "calls");
        assert_eq!(first, second);
    }

    #[test]
    fn test_column_names() {
        let names: Vec<String> = DailyCountSummarizer::columns("texts").iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["texts_line_count", "texts_any_data"]);
    }
}
