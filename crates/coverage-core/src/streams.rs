//! Stream classification for a study.
//!
//! Every stream is summarized in exactly one way: by counting files, by
//! counting records, or by measuring gap-segmented observed duration.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoverageError, Result};
use crate::models::{MetricColumn, MetricKind};

// ── StreamKind ────────────────────────────────────────────────────────────────

/// How a stream is summarized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Opaque files: per-day file count and byte size from names on disk.
    FileCount,
    /// CSV content: per-day record count.
    LineCount,
    /// CSV content: per-day observed hours; records further apart than
    /// `gap_threshold_secs` start a new segment.
    Duration { gap_threshold_secs: u64 },
}

impl StreamKind {
    /// Metric kinds this classification produces, in column order.
    pub fn metric_kinds(self) -> &'static [MetricKind] {
        match self {
            StreamKind::FileCount => &[MetricKind::FileCount, MetricKind::FileSize],
            StreamKind::LineCount => &[MetricKind::LineCount, MetricKind::AnyData],
            StreamKind::Duration { .. } => &[MetricKind::SumHours, MetricKind::AnyData],
        }
    }
}

/// A named stream and its classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    pub name: String,
    pub kind: StreamKind,
}

impl StreamConfig {
    /// Summary columns this stream contributes.
    pub fn metric_columns(&self) -> Vec<MetricColumn> {
        self.kind
            .metric_kinds()
            .iter()
            .map(|&kind| MetricColumn::new(self.name.clone(), kind))
            .collect()
    }
}

// ── On-disk representation ────────────────────────────────────────────────────

/// A duration-counted stream as written in a configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationStream {
    pub name: String,
    pub gap_threshold_secs: u64,
}

/// JSON layout of a stream configuration file.
///
/// ```json
/// {
///   "file_count": ["audio_recordings"],
///   "line_count": ["calls", "texts"],
///   "duration": [{ "name": "gps", "gap_threshold_secs": 900 }]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyConfigFile {
    #[serde(default)]
    pub file_count: Vec<String>,
    #[serde(default)]
    pub line_count: Vec<String>,
    #[serde(default)]
    pub duration: Vec<DurationStream>,
}

// ── StudyConfig ───────────────────────────────────────────────────────────────

const DEFAULT_FILE_COUNT_STREAMS: &[&str] = &["audio_recordings", "ambient_audio"];

const DEFAULT_LINE_COUNT_STREAMS: &[&str] = &[
    "app_log",
    "calls",
    "image_survey",
    "ios_log",
    "power_state",
    "proximity",
    "reachability",
    "survey_answers",
    "survey_timings",
    "texts",
];

const DEFAULT_DURATION_STREAMS: &[(&str, u64)] = &[
    ("accelerometer", 30),
    ("bluetooth", 660),
    ("devicemotion", 660),
    ("gps", 900),
    ("gyro", 30),
    ("magnetometer", 660),
];

/// Validated, ordered set of streams to summarize for every user.
///
/// Order is file-counted streams, then record-counted, then
/// duration-counted; output columns follow the same order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyConfig {
    streams: Vec<StreamConfig>,
}

impl StudyConfig {
    /// Build a configuration, rejecting empty or path-like stream names,
    /// duplicates, and zero gap thresholds.
    pub fn new(
        file_count: Vec<String>,
        line_count: Vec<String>,
        duration: Vec<DurationStream>,
    ) -> Result<Self> {
        let streams: Vec<StreamConfig> = file_count
            .into_iter()
            .map(|name| StreamConfig {
                name,
                kind: StreamKind::FileCount,
            })
            .chain(line_count.into_iter().map(|name| StreamConfig {
                name,
                kind: StreamKind::LineCount,
            }))
            .chain(duration.into_iter().map(|d| StreamConfig {
                name: d.name,
                kind: StreamKind::Duration {
                    gap_threshold_secs: d.gap_threshold_secs,
                },
            }))
            .collect();

        let mut seen = HashSet::new();
        for stream in &streams {
            validate_stream_name(&stream.name)?;
            if !seen.insert(stream.name.as_str()) {
                return Err(CoverageError::Config(format!(
                    "stream \"{}\" is configured more than once",
                    stream.name
                )));
            }
            if let StreamKind::Duration {
                gap_threshold_secs: 0,
            } = stream.kind
            {
                return Err(CoverageError::Config(format!(
                    "stream \"{}\" needs a positive gap threshold",
                    stream.name
                )));
            }
        }

        Ok(Self { streams })
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: StudyConfigFile = serde_json::from_str(json)?;
        Self::try_from(file)
    }

    /// Load and validate a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| CoverageError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&content)?;
        tracing::debug!(
            path = %path.display(),
            streams = config.streams.len(),
            "loaded stream configuration"
        );
        Ok(config)
    }

    pub fn streams(&self) -> &[StreamConfig] {
        &self.streams
    }

    /// Gap threshold of a duration-counted stream.
    pub fn gap_threshold(&self, stream: &str) -> Option<u64> {
        self.streams.iter().find_map(|s| match s.kind {
            StreamKind::Duration { gap_threshold_secs } if s.name == stream => {
                Some(gap_threshold_secs)
            }
            _ => None,
        })
    }

    /// Every summary column a user table will carry, in output order.
    pub fn metric_columns(&self) -> Vec<MetricColumn> {
        self.streams
            .iter()
            .flat_map(StreamConfig::metric_columns)
            .collect()
    }

    /// Back to the on-disk layout.
    pub fn to_file(&self) -> StudyConfigFile {
        let mut file = StudyConfigFile::default();
        for stream in &self.streams {
            match stream.kind {
                StreamKind::FileCount => file.file_count.push(stream.name.clone()),
                StreamKind::LineCount => file.line_count.push(stream.name.clone()),
                StreamKind::Duration { gap_threshold_secs } => file.duration.push(DurationStream {
                    name: stream.name.clone(),
                    gap_threshold_secs,
                }),
            }
        }
        file
    }
}

impl TryFrom<StudyConfigFile> for StudyConfig {
    type Error = CoverageError;

    fn try_from(file: StudyConfigFile) -> Result<Self> {
        Self::new(file.file_count, file.line_count, file.duration)
    }
}

impl Default for StudyConfig {
    /// The standard Beiwe stream set.
    fn default() -> Self {
        let stream = |name: &str, kind| StreamConfig {
            name: name.to_string(),
            kind,
        };
        let streams = DEFAULT_FILE_COUNT_STREAMS
            .iter()
            .map(|n| stream(*n, StreamKind::FileCount))
            .chain(
                DEFAULT_LINE_COUNT_STREAMS
                    .iter()
                    .map(|n| stream(*n, StreamKind::LineCount)),
            )
            .chain(DEFAULT_DURATION_STREAMS.iter().map(|(n, secs)| {
                stream(
                    *n,
                    StreamKind::Duration {
                        gap_threshold_secs: *secs,
                    },
                )
            }))
            .collect();
        Self { streams }
    }
}

/// Stream names become directory names, so they must be single path
/// components.
fn validate_stream_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(CoverageError::Config(format!(
            "invalid stream name \"{}\"",
            name
        )));
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
