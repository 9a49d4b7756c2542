//! Observed-duration estimate from irregularly sampled timestamps.
//!
//! Records are split into segments wherever consecutive samples are further
//! apart than the stream's gap threshold. A day's observed time is the sum of
//! each segment's first-to-last span, so two samples eight hours apart count
//! for nothing while continuous sampling counts for its full length.
//!
//! Two details are kept exactly as the summaries have always computed them:
//!
//! * Rows are emitted for each *local* date from the table's first to last
//!   day, but the records belonging to a row are selected by their *UTC*
//!   date. In zones far from UTC this shifts samples near midnight onto the
//!   neighbouring row.
//! * A gap is compared using only the seconds component of the difference,
//!   i.e. whole seconds modulo one day. A gap of one day and ten seconds
//!   does not start a new segment under a thirty-second threshold.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use coverage_core::models::{
    AggregatedRecord, AggregatedTable, DailyTable, MetricColumn, MetricKind, MetricValue,
};
use tracing::debug;

use crate::aggregator::day_range;

const SECONDS_PER_DAY: i64 = 86_400;

// ── GapSegmentedDurationSummarizer ────────────────────────────────────────────

/// Per-day observed hours for one stream.
#[derive(Debug, Clone, Copy)]
pub struct GapSegmentedDurationSummarizer {
    /// Largest gap, in seconds, that does not break a segment.
    gap_threshold_secs: u64,
}

impl GapSegmentedDurationSummarizer {
    pub fn new(gap_threshold_secs: u64) -> Self {
        Self { gap_threshold_secs }
    }

    pub fn gap_threshold_secs(&self) -> u64 {
        self.gap_threshold_secs
    }

    /// `<prefix>_sum_hours`, `<prefix>_any_data`.
    pub fn columns(prefix: &str) -> Vec<MetricColumn> {
        vec![
            MetricColumn::new(prefix, MetricKind::SumHours),
            MetricColumn::new(prefix, MetricKind::AnyData),
        ]
    }

    /// One row per local date from the table's first to last day.
    ///
    /// Days with no selected records get `0` hours and `any_data = 0`; a
    /// single record gives `0` hours and `any_data = 1`. The input table is
    /// not modified.
    pub fn summarize(&self, table: &AggregatedTable, prefix: &str) -> DailyTable {
        let mut summary = DailyTable::empty(Self::columns(prefix));
        let Some((first, last)) = table.date_range() else {
            return summary;
        };

        let records = table.records();
        let markers = self.segment_markers(records);

        let mut by_utc_date: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
        for (i, record) in records.iter().enumerate() {
            by_utc_date
                .entry(record.utc_time.date_naive())
                .or_default()
                .push(i);
        }

        for day in day_range(first, last) {
            let selected = by_utc_date.get(&day).map(Vec::as_slice).unwrap_or(&[]);
            let (hours, any_data) = match selected.len() {
                0 => (0.0, 0),
                1 => (0.0, 1),
                _ => (observed_hours(records, &markers, selected), 1),
            };
            summary.push_row(day, vec![MetricValue::Hours(hours), MetricValue::Count(any_data)]);
        }

        debug!(
            user = table.user_id(),
            stream = prefix,
            days = summary.len(),
            threshold = self.gap_threshold_secs,
            "summarized observed duration"
        );
        summary
    }

    /// For each record, whether it starts a new segment.
    ///
    /// Computed over the whole table in local-time order; the first record
    /// is never a marker.
    pub fn segment_markers(&self, records: &[AggregatedRecord]) -> Vec<bool> {
        let threshold = i64::try_from(self.gap_threshold_secs).unwrap_or(i64::MAX);
        let mut markers = Vec::with_capacity(records.len());
        markers.extend(records.first().map(|_| false));
        markers.extend(
            records
                .windows(2)
                .map(|pair| seconds_component(pair[1].local_time - pair[0].local_time) > threshold),
        );
        markers
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Whole seconds of `delta` modulo one day.
pub fn seconds_component(delta: TimeDelta) -> i64 {
    delta.num_seconds().rem_euclid(SECONDS_PER_DAY)
}

/// Sum of segment spans among the `selected` record indices (ascending).
fn observed_hours(records: &[AggregatedRecord], markers: &[bool], selected: &[usize]) -> f64 {
    let mut total = 0.0;
    let mut start = records[selected[0]].utc_time;
    let mut end = start;
    for &i in &selected[1..] {
        if markers[i] {
            total += hours_between(start, end);
            start = records[i].utc_time;
        }
        end = records[i].utc_time;
    }
    total + hours_between(start, end)
}

fn hours_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let delta = end - start;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 3_600_000_000.0,
        None => delta.num_seconds() as f64 / 3_600.0,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;
    use coverage_core::time_utils::TimestampNormalizer;

    const EPS: f64 = 1e-9;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn table_from(normalizer: &TimestampNormalizer, stamps: &[DateTime<Utc>]) -> AggregatedTable {
        let records = stamps
            .iter()
            .map(|&utc| {
                let inst = normalizer.localize(utc);
                AggregatedRecord {
                    utc_time: inst.utc,
                    local_time: inst.local,
                    date: inst.date,
                    payload: Vec::new(),
                }
            })
            .collect();
        AggregatedTable::new("u1", "gps", Vec::new(), records)
    }

    fn at(day: u32, h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 1, day, h, m, s).unwrap()
    }

    fn hours(summary: &DailyTable, day: NaiveDate) -> f64 {
        summary
            .value(day, &MetricColumn::new("gps", MetricKind::SumHours))
            .map(MetricValue::as_f64)
            .unwrap()
    }

    fn any_data(summary: &DailyTable, day: NaiveDate) -> MetricValue {
        summary
            .value(day, &MetricColumn::new("gps", MetricKind::AnyData))
            .unwrap()
    }

    // ── summarize ─────────────────────────────────────────────────────────────

    #[test]
    fn test_empty_table_gives_typed_empty_summary() {
        let s = GapSegmentedDurationSummarizer::new(30);
        let summary = s.summarize(&AggregatedTable::empty("u1", "gps"), "gps");
        assert!(summary.is_empty());
        assert_eq!(summary.columns(), GapSegmentedDurationSummarizer::columns("gps").as_slice());
    }

    #[test]
    fn test_two_records_within_threshold() {
        let t = table_from(&TimestampNormalizer::utc(), &[at(1, 12, 0, 0), at(1, 12, 0, 10)]);
        let summary = GapSegmentedDurationSummarizer::new(30).summarize(&t, "gps");
        assert!((hours(&summary, d(2021, 1, 1)) - 10.0 / 3600.0).abs() < EPS);
        assert_eq!(any_data(&summary, d(2021, 1, 1)), MetricValue::Count(1));
    }

    #[test]
    fn test_two_records_beyond_threshold_are_zero_width_segments() {
        let t = table_from(&TimestampNormalizer::utc(), &[at(1, 12, 0, 0), at(1, 13, 0, 0)]);
        let summary = GapSegmentedDurationSummarizer::new(30).summarize(&t, "gps");
        assert_eq!(hours(&summary, d(2021, 1, 1)), 0.0);
        assert_eq!(any_data(&summary, d(2021, 1, 1)), MetricValue::Count(1));
    }

    #[test]
    fn test_single_record_and_empty_day() {
        let t = table_from(&TimestampNormalizer::utc(), &[at(1, 12, 0, 0), at(3, 8, 0, 0), at(3, 8, 0, 20)]);
        let summary = GapSegmentedDurationSummarizer::new(30).summarize(&t, "gps");

        assert_eq!(summary.dates(), vec![d(2021, 1, 1), d(2021, 1, 2), d(2021, 1, 3)]);
        assert_eq!(hours(&summary, d(2021, 1, 1)), 0.0);
        assert_eq!(any_data(&summary, d(2021, 1, 1)), MetricValue::Count(1));
        assert_eq!(hours(&summary, d(2021, 1, 2)), 0.0);
        assert_eq!(any_data(&summary, d(2021, 1, 2)), MetricValue::Count(0));
        assert!((hours(&summary, d(2021, 1, 3)) - 20.0 / 3600.0).abs() < EPS);
    }

    #[test]
    fn test_multiple_segments_are_summed() {
        // Segment one spans 60s (samples every 20s), segment two spans 40s.
        let stamps = [
            at(1, 10, 0, 0),
            at(1, 10, 0, 20),
            at(1, 10, 0, 40),
            at(1, 10, 1, 0),
            at(1, 15, 0, 0),
            at(1, 15, 0, 20),
            at(1, 15, 0, 40),
        ];
        let t = table_from(&TimestampNormalizer::utc(), &stamps);
        let summary = GapSegmentedDurationSummarizer::new(30).summarize(&t, "gps");
        assert!((hours(&summary, d(2021, 1, 1)) - 100.0 / 3600.0).abs() < EPS);
    }

    #[test]
    fn test_gap_equal_to_threshold_does_not_split() {
        let t = table_from(&TimestampNormalizer::utc(), &[at(1, 0, 0, 0), at(1, 0, 0, 30), at(1, 0, 1, 0)]);
        let summary = GapSegmentedDurationSummarizer::new(30).summarize(&t, "gps");
        assert!((hours(&summary, d(2021, 1, 1)) - 60.0 / 3600.0).abs() < EPS);
    }

    #[test]
    fn test_segment_spanning_midnight_is_cut_at_day_boundary() {
        // One continuous run from 23:59:40 to 00:00:20; each day only
        // measures its own samples.
        let stamps = [at(1, 23, 59, 40), at(1, 23, 59, 50), at(2, 0, 0, 10), at(2, 0, 0, 20)];
        let t = table_from(&TimestampNormalizer::utc(), &stamps);
        let summary = GapSegmentedDurationSummarizer::new(30).summarize(&t, "gps");
        assert!((hours(&summary, d(2021, 1, 1)) - 10.0 / 3600.0).abs() < EPS);
        assert!((hours(&summary, d(2021, 1, 2)) - 10.0 / 3600.0).abs() < EPS);
    }

    #[test]
    fn test_summarize_does_not_mutate_input_and_is_idempotent() {
        let t = table_from(&TimestampNormalizer::utc(), &[at(1, 12, 0, 0), at(1, 12, 0, 10)]);
        let before = t.clone();
        let s = GapSegmentedDurationSummarizer::new(30);
        let first = s.summarize(&t, "gps");
        let second = s.summarize(&t, "gps");
        assert_eq!(t, before);
        assert_eq!(first, second);
    }

    // ── day boundary uses the UTC date ────────────────────────────────────────

    #[test]
    fn test_day_rows_select_records_by_utc_date() {
        // Both samples fall on the evening of Jan 1 in New York but on
        // Jan 2 in UTC. Rows span local dates (only Jan 1), while selection
        // uses UTC dates, so the Jan 1 row sees no records.
        let n = TimestampNormalizer::new("America/New_York").unwrap();
        let t = table_from(&n, &[at(2, 1, 0, 0), at(2, 1, 0, 10)]);
        let summary = GapSegmentedDurationSummarizer::new(30).summarize(&t, "gps");

        assert_eq!(summary.dates(), vec![d(2021, 1, 1)]);
        assert_eq!(hours(&summary, d(2021, 1, 1)), 0.0);
        assert_eq!(any_data(&summary, d(2021, 1, 1)), MetricValue::Count(0));
    }

    #[test]
    fn test_utc_selection_within_local_range() {
        // Local range Jan 1..Jan 2 in New York; the Jan 2 UTC samples land on
        // the Jan 2 row even though they are Jan 1 locally.
        let n = TimestampNormalizer::new("America/New_York").unwrap();
        let stamps = [at(1, 15, 0, 0), at(2, 1, 0, 0), at(2, 1, 0, 10), at(2, 15, 0, 0)];
        let t = table_from(&n, &stamps);
        let summary = GapSegmentedDurationSummarizer::new(30).summarize(&t, "gps");

        assert_eq!(summary.dates(), vec![d(2021, 1, 1), d(2021, 1, 2)]);
        assert_eq!(any_data(&summary, d(2021, 1, 1)), MetricValue::Count(1));
        assert!((hours(&summary, d(2021, 1, 2)) - 10.0 / 3600.0).abs() < EPS);
    }

    // ── seconds-component gap comparison ──────────────────────────────────────

    #[test]
    fn test_seconds_component() {
        assert_eq!(seconds_component(TimeDelta::seconds(10)), 10);
        assert_eq!(seconds_component(TimeDelta::seconds(86_400 + 10)), 10);
        assert_eq!(seconds_component(TimeDelta::milliseconds(10_900)), 10);
        assert_eq!(seconds_component(TimeDelta::hours(3)), 10_800);
    }

    #[test]
    fn test_gap_of_one_day_and_ten_seconds_is_not_a_marker() {
        let t = table_from(&TimestampNormalizer::utc(), &[at(1, 0, 0, 0), at(2, 0, 0, 10), at(2, 1, 0, 0)]);
        let markers = GapSegmentedDurationSummarizer::new(30).segment_markers(t.records());
        assert_eq!(markers, vec![false, false, true]);
    }

    #[test]
    fn test_markers_empty_table() {
        let markers = GapSegmentedDurationSummarizer::new(30).segment_markers(&[]);
        assert!(markers.is_empty());
    }
}
