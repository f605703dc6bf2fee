//! Timestamp normalization for the joined `time` column
//!
//! Every lookup string becomes a UTC point in time or `None`. Parsing never
//! fails loudly: rows with an unreadable timestamp stay in the table with a
//! missing marker and downstream steps tolerate it.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Naive layouts, interpreted as UTC
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
];

/// Layouts carrying an explicit offset
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f %z",
];

/// Parse a timestamp string into UTC, or `None` when it cannot be read
///
/// Accepts RFC 3339, ISO 8601 with or without an offset, space-separated
/// date/time pairs and bare dates (UTC midnight).
///
/// # Example
/// ```
/// use flowlens::timestamp::parse_or_missing;
///
/// assert!(parse_or_missing("2023-10-09T00:10:00Z").is_some());
/// assert!(parse_or_missing("not a time").is_none());
/// ```
pub fn parse_or_missing(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    for format in OFFSET_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(raw, format) {
            return Some(ts.with_timezone(&Utc));
        }
    }

    // Trailing "Z" on a space-separated value is not RFC 3339
    let naive_input = raw.strip_suffix('Z').unwrap_or(raw);
    for format in NAIVE_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(naive_input, format) {
            return Some(ts.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc())
}

/// Render a timestamp the way the anomaly export writes it
///
/// Whole seconds print bare (`2023-10-09 00:10:00+00:00`); otherwise the
/// fraction has six digits, or nine when sub-microsecond.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    let layout = match ts.timestamp_subsec_nanos() {
        0 => "%Y-%m-%d %H:%M:%S%:z",
        nanos if nanos % 1_000 == 0 => "%Y-%m-%d %H:%M:%S%.6f%:z",
        _ => "%Y-%m-%d %H:%M:%S%.9f%:z",
    };
    ts.format(layout).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_parse_rfc3339_zulu() {
        assert_eq!(
            parse_or_missing("2023-10-09T00:10:00Z"),
            Some(utc(2023, 10, 9, 0, 10, 0))
        );
    }

    #[test]
    fn test_parse_rfc3339_fraction() {
        let ts = parse_or_missing("2023-10-09T00:10:00.000Z").unwrap();
        assert_eq!(ts, utc(2023, 10, 9, 0, 10, 0));
    }

    #[test]
    fn test_parse_converts_offset_to_utc() {
        assert_eq!(
            parse_or_missing("2023-10-09T02:10:00+02:00"),
            Some(utc(2023, 10, 9, 0, 10, 0))
        );
        assert_eq!(
            parse_or_missing("2023-10-09 02:10:00+0200"),
            Some(utc(2023, 10, 9, 0, 10, 0))
        );
    }

    #[test]
    fn test_parse_space_separated_naive_is_utc() {
        assert_eq!(
            parse_or_missing("2023-10-09 00:10:00"),
            Some(utc(2023, 10, 9, 0, 10, 0))
        );
        assert_eq!(
            parse_or_missing("2023-10-09 00:10:00Z"),
            Some(utc(2023, 10, 9, 0, 10, 0))
        );
    }

    #[test]
    fn test_parse_date_only_is_midnight() {
        assert_eq!(
            parse_or_missing("2023-10-09"),
            Some(utc(2023, 10, 9, 0, 0, 0))
        );
    }

    #[test]
    fn test_parse_trims_whitespace() {
        assert!(parse_or_missing("  2023-10-09T00:10:00Z \n").is_some());
    }

    #[test]
    fn test_unparseable_values_become_missing() {
        for raw in ["", "   ", "garbage", "2023-13-40", "10/09/2023 25:00", "NaT"] {
            assert_eq!(parse_or_missing(raw), None, "input {:?}", raw);
        }
    }

    #[test]
    fn test_format_timestamp_whole_seconds() {
        assert_eq!(
            format_timestamp(&utc(2023, 10, 9, 0, 10, 0)),
            "2023-10-09 00:10:00+00:00"
        );
    }

    #[test]
    fn test_format_timestamp_keeps_fraction() {
        let ts = parse_or_missing("2023-10-09T00:10:00.5Z").unwrap();
        assert_eq!(format_timestamp(&ts), "2023-10-09 00:10:00.500000+00:00");
    }

    #[test]
    fn test_format_timestamp_nanosecond_fraction() {
        let ts = parse_or_missing("2023-10-09T00:10:00.000000250Z").unwrap();
        assert_eq!(format_timestamp(&ts), "2023-10-09 00:10:00.000000250+00:00");
    }
}
