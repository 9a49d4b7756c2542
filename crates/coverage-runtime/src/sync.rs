//! Raw-data download seam.
//!
//! [`ArchiveSource`] abstracts the server a study's raw data comes from.
//! [`sync_users`] pulls each user's archive into the download folder; a
//! network failure for one user is logged and that user is treated as having
//! no data, so the rest of the study is still fetched.

use std::path::Path;

use coverage_core::error::{CoverageError, Result};
use tracing::{debug, info, warn};

/// A source of per-user raw-data archives.
pub trait ArchiveSource: Send + Sync {
    /// All user identifiers known to the source.
    fn users(&self) -> Result<Vec<String>>;

    /// Unpack `user_id`'s data under `download_folder/<user_id>/`.
    ///
    /// Returns `Ok(false)` when the source has no data for the user.
    /// Transport problems are reported as [`CoverageError::Network`].
    fn fetch(&self, user_id: &str, download_folder: &Path) -> Result<bool>;
}

/// Per-user outcome of a sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub fetched: Vec<String>,
    /// Users for whom the source had nothing.
    pub empty: Vec<String>,
    /// Users whose fetch failed, with the error text.
    pub failed: Vec<(String, String)>,
}

/// Fetch `users` (or every user the source knows when `users` is empty) into
/// `download_folder`, creating it if needed.
///
/// Only [`CoverageError::Network`] is absorbed; any other error stops the sync.
pub fn sync_users(
    source: &dyn ArchiveSource,
    users: &[String],
    download_folder: &Path,
) -> Result<SyncReport> {
    std::fs::create_dir_all(download_folder)?;

    let users = if users.is_empty() {
        source.users()?
    } else {
        users.to_vec()
    };

    let mut report = SyncReport::default();
    for user in users {
        debug!("Fetching data for user {}", user);
        match source.fetch(&user, download_folder) {
            Ok(true) => {
                info!("Fetched data for user {}", user);
                report.fetched.push(user);
            }
            Ok(false) => {
                info!("No data for user {}; nothing written", user);
                report.empty.push(user);
            }
            Err(e @ CoverageError::Network { .. }) => {
                warn!("{}; continuing without data for {}", e, user);
                report.failed.push((user, e.to_string()));
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        fetched = report.fetched.len(),
        empty = report.empty.len(),
        failed = report.failed.len(),
        "sync complete"
    );
    Ok(report)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
