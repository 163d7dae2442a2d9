//! Temporal selection parsing for the EDR `datetime` parameter.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Marker for an open interval bound.
const OPEN_BOUND: &str = "..";

/// Errors that can occur when parsing a datetime parameter.
#[derive(Debug, Error, PartialEq)]
pub enum DateTimeParseError {
    /// The parameter was present but blank.
    #[error("Empty datetime parameter")]
    Empty,

    /// Text is not an RFC 3339 instant.
    #[error("Invalid datetime '{0}'. Expected RFC 3339 format (e.g., 2024-12-29T12:00:00Z)")]
    InvalidInstant(String),

    /// Instant without `Z` or a numeric UTC offset.
    #[error("Datetime '{0}' has no UTC offset; append 'Z' or '+hh:mm'")]
    MissingOffset(String),

    /// Interval with the wrong number of sides, an empty side or two open sides.
    #[error("Invalid datetime interval '{0}'")]
    InvalidInterval(String),

    /// Interval whose end precedes its start.
    #[error("Datetime interval '{0}' ends before it starts")]
    ReversedInterval(String),

    /// Syntax that is valid EDR but not served here.
    #[error("Unsupported datetime form '{0}'")]
    Unsupported(String),
}

/// Which time steps a query selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemporalSelection {
    /// The single time step nearest to an instant.
    Instant(DateTime<Utc>),

    /// Every time step within `[start, end]`.
    Interval {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// Every time step.
    All,
}

impl TemporalSelection {
    /// Parse a datetime parameter.
    ///
    /// Accepts formats:
    /// - Absent: all time steps
    /// - Instant: `2024-12-29T12:00:00Z`
    /// - Interval: `2024-12-29T00:00:00Z/2024-12-29T23:59:59Z`
    /// - Open start: `../2024-12-29T23:59:59Z`
    /// - Open end: `2024-12-29T00:00:00Z/..`
    pub fn parse(datetime: Option<&str>) -> Result<Self, DateTimeParseError> {
        let Some(datetime) = datetime else {
            return Ok(TemporalSelection::All);
        };
        let datetime = datetime.trim();

        if datetime.is_empty() {
            return Err(DateTimeParseError::Empty);
        }

        if datetime.contains(',') {
            return Err(DateTimeParseError::Unsupported(format!(
                "{} (datetime lists are not supported)",
                datetime
            )));
        }

        if datetime.contains('/') {
            let parts: Vec<&str> = datetime.split('/').map(str::trim).collect();
            if parts.len() != 2 || parts.iter().any(|p| p.is_empty()) {
                return Err(DateTimeParseError::InvalidInterval(datetime.to_string()));
            }
            if parts[0] == OPEN_BOUND && parts[1] == OPEN_BOUND {
                return Err(DateTimeParseError::InvalidInterval(datetime.to_string()));
            }

            let start = match parts[0] {
                OPEN_BOUND => DateTime::<Utc>::MIN_UTC,
                s => parse_instant(s)?,
            };
            let end = match parts[1] {
                OPEN_BOUND => DateTime::<Utc>::MAX_UTC,
                s => parse_instant(s)?,
            };

            if end < start {
                return Err(DateTimeParseError::ReversedInterval(datetime.to_string()));
            }

            return Ok(TemporalSelection::Interval { start, end });
        }

        if datetime == OPEN_BOUND {
            return Err(DateTimeParseError::InvalidInterval(datetime.to_string()));
        }

        Ok(TemporalSelection::Instant(parse_instant(datetime)?))
    }
}

/// Parse a single RFC 3339 instant into UTC.
pub fn parse_instant(s: &str) -> Result<DateTime<Utc>, DateTimeParseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Offset-less forms are ambiguous; name the problem precisely.
    if NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").is_ok()
        || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
    {
        return Err(DateTimeParseError::MissingOffset(s.to_string()));
    }

    Err(DateTimeParseError::InvalidInstant(s.to_string()))
}

/// Format an instant as RFC 3339 with a `Z` suffix.
pub fn format_instant(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
