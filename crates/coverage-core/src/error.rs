use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the coverage pipeline.
#[derive(Error, Debug)]
pub enum CoverageError {
    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A CSV document could not be read or written.
    #[error("Malformed CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A timestamp token did not match any recognised format.
    #[error("Invalid timestamp format: {0}")]
    TimestampParse(String),

    /// A content file has no column holding the UTC timestamp.
    #[error("Missing column \"{column}\" in {path}")]
    MissingColumn { path: PathBuf, column: String },

    /// A time-zone name is not a recognised IANA identifier.
    #[error("Unknown time zone: {0}")]
    UnknownTimezone(String),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Downloading a user's archive failed.
    #[error("Network error while fetching {user}: {message}")]
    Network { user: String, message: String },

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience alias used throughout the coverage crates.
pub type Result<T> = std::result::Result<T, CoverageError>;
