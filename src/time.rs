//! Timestamp normalisation.
//!
//! Every timestamp that enters the crate, whether it comes from a GPX file or
//! from the `--since` flag, goes through [`parse_timestamp`] and ends up as a
//! `DateTime<Utc>`. A trailing `Z` designator, a numeric offset and a missing
//! offset all land on the same comparable representation.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::{Result, TrackError};

/// Naive layouts accepted when no offset is present. Interpreted as UTC.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// Parse an ISO-8601 style timestamp into UTC.
///
/// Accepted forms:
/// - RFC 3339 with `Z` or a numeric offset, fractional seconds optional
/// - `YYYY-MM-DDTHH:MM:SS[.f]` or `YYYY-MM-DD HH:MM:SS[.f]` without offset (UTC)
/// - `YYYY-MM-DD` (midnight UTC)
///
/// # Example
/// ```
/// use track_overlay::time::parse_timestamp;
///
/// let zulu = parse_timestamp("2023-05-01T10:00:00.000Z").unwrap();
/// let offset = parse_timestamp("2023-05-01T12:00:00+02:00").unwrap();
/// assert_eq!(zulu, offset);
/// ```
pub fn parse_timestamp(input: &str) -> Result<DateTime<Utc>> {
    let trimmed = input.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }

    Err(TrackError::InvalidTimestamp {
        input: input.to_string(),
    })
}
