use clap::Parser;
use std::path::PathBuf;

use crate::error::{CoverageError, Result};
use crate::streams::StudyConfig;
use crate::time_utils::{resolve_timezone_name, TimestampNormalizer};

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Daily data-coverage summaries for downloaded Beiwe study data
#[derive(Parser, Debug, Clone)]
#[command(
    name = "beiwe-coverage",
    about = "Daily data-coverage summaries for downloaded Beiwe study data",
    version
)]
pub struct Settings {
    /// Folder holding one sub-folder of raw data per user
    pub download_folder: PathBuf,

    /// Folder in which to write the summary files
    #[arg(long, short = 'o', default_value = "summaries")]
    pub output_folder: PathBuf,

    /// IANA time zone used to define days ("auto" uses the system zone)
    #[arg(long, default_value = "UTC")]
    pub timezone: String,

    /// JSON file classifying the streams to summarize (defaults to the
    /// standard Beiwe streams)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Number of users summarized concurrently (1-64)
    #[arg(long, default_value = "1", value_parser = clap::value_parser!(u32).range(1..=64))]
    pub jobs: u32,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

impl Settings {
    /// Parse process arguments and resolve `"auto"` values.
    pub fn load() -> Self {
        Self::parse().resolve()
    }

    /// Same as [`Settings::load`] but with an explicit argument list.
    pub fn load_from_args<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::parse_from(args).resolve()
    }

    /// Resolve the `"auto"` timezone and apply the `--debug` flag.
    fn resolve(mut self) -> Self {
        self.timezone = resolve_timezone_name(&self.timezone);
        if self.debug {
            self.log_level = "DEBUG".to_string();
        }
        self
    }

    /// Normalizer for the configured time zone.
    pub fn normalizer(&self) -> Result<TimestampNormalizer> {
        TimestampNormalizer::new(&self.timezone)
    }

    /// The stream configuration from `--config`, or the default Beiwe set.
    pub fn study_config(&self) -> Result<StudyConfig> {
        match &self.config {
            Some(path) => StudyConfig::load(path),
            None => Ok(StudyConfig::default()),
        }
    }

    /// Reject settings that cannot lead to a useful run.
    pub fn validate(&self) -> Result<()> {
        if !self.download_folder.is_dir() {
            return Err(CoverageError::Config(format!(
                "download folder {} is not a directory",
                self.download_folder.display()
            )));
        }
        self.normalizer().map(|_| ())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
