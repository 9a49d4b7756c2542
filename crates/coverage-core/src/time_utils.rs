use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone as _, Utc};
use chrono_tz::Tz;

use crate::error::{CoverageError, Result};

// ── System timezone detection ─────────────────────────────────────────────────

/// Detect the IANA timezone name of the running system.
///
/// Falls back to `"UTC"` if detection fails.
pub fn get_system_timezone() -> String {
    iana_time_zone::get_timezone().unwrap_or_else(|e| {
        tracing::warn!("could not detect the system timezone ({}); using UTC", e);
        "UTC".to_string()
    })
}

/// Resolve the `"auto"` sentinel to the system timezone; any other value is
/// returned unchanged.
pub fn resolve_timezone_name(name: &str) -> String {
    if name.eq_ignore_ascii_case("auto") {
        get_system_timezone()
    } else {
        name.to_string()
    }
}

// ── NormalizedInstant ─────────────────────────────────────────────────────────

/// One timestamp expressed as a UTC instant, the same instant in the study's
/// local zone, and the local calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedInstant {
    pub utc: DateTime<Utc>,
    pub local: DateTime<Tz>,
    pub date: NaiveDate,
}

// ── TimestampNormalizer ───────────────────────────────────────────────────────

/// Offset-carrying patterns tried after RFC 3339.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%:z",
];

/// Zone-naive patterns. Anything matching one of these is taken as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Parses raw timestamp tokens and projects them into a study time zone.
#[derive(Debug, Clone, Copy)]
pub struct TimestampNormalizer {
    tz: Tz,
}

impl TimestampNormalizer {
    /// Create a normalizer for the given IANA zone name.
    pub fn new(tz_name: &str) -> Result<Self> {
        let tz = tz_name
            .parse::<Tz>()
            .map_err(|_| CoverageError::UnknownTimezone(tz_name.to_string()))?;
        Ok(Self { tz })
    }

    /// Normalizer whose local zone is UTC.
    pub fn utc() -> Self {
        Self { tz: Tz::UTC }
    }

    /// The configured local zone.
    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Validate that `tz_name` is a recognised IANA timezone identifier.
    pub fn validate_timezone(tz_name: &str) -> bool {
        tz_name.parse::<Tz>().is_ok()
    }

    /// Parse a timestamp token into a UTC instant.
    ///
    /// Accepts RFC 3339 (with `Z` or a numeric offset, `T` or space
    /// separator), the same layouts without an offset, and bare dates.
    /// Tokens without a zone are interpreted as UTC.
    pub fn parse_utc(&self, token: &str) -> Result<DateTime<Utc>> {
        let s = token.trim();
        if s.is_empty() {
            return Err(CoverageError::TimestampParse(token.to_string()));
        }

        let normalised = match s.strip_suffix('Z').or_else(|| s.strip_suffix('z')) {
            Some(stripped) => format!("{}+00:00", stripped),
            None => s.to_string(),
        };

        if let Ok(dt) = DateTime::parse_from_rfc3339(&normalised) {
            return Ok(dt.with_timezone(&Utc));
        }
        for fmt in OFFSET_FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(&normalised, fmt) {
                return Ok(dt.with_timezone(&Utc));
            }
        }
        for fmt in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
                return Ok(Utc.from_utc_datetime(&naive));
            }
        }
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            if let Some(naive) = date.and_hms_opt(0, 0, 0) {
                return Ok(Utc.from_utc_datetime(&naive));
            }
        }

        Err(CoverageError::TimestampParse(token.to_string()))
    }

    /// Parse a data-column token and project it into the local zone.
    pub fn normalize(&self, token: &str) -> Result<NormalizedInstant> {
        self.parse_utc(token).map(|utc| self.localize(utc))
    }

    /// Parse a file-name stem such as `2021-01-01T00_00_00`, where colons
    /// were replaced with underscores to keep the name portable.
    pub fn normalize_file_stem(&self, stem: &str) -> Result<NormalizedInstant> {
        self.normalize(&stem.replace('_', ":"))
    }

    /// Project a UTC instant into the local zone.
    pub fn localize(&self, utc: DateTime<Utc>) -> NormalizedInstant {
        let local = utc.with_timezone(&self.tz);
        NormalizedInstant {
            utc,
            local,
            date: local.date_naive(),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
