//! UTC timestamp helpers for version markers and file names.
//!
//! Version timestamps appear in file and directory names, where colons are
//! not portable, so they are rendered as `YYYY-MM-DDTHHMMSS+0000`.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

/// `strftime` pattern of the colon-free UTC rendering.
pub const NO_COLON_FORMAT: &str = "%Y-%m-%dT%H%M%S%z";

/// Render `ts` as `2024-01-31T120000+0000`.
pub fn utc_iso_no_colon(ts: &DateTime<Utc>) -> String {
    ts.format(NO_COLON_FORMAT).to_string()
}

/// Parse the colon-free rendering back into a UTC timestamp.
///
/// Returns `None` for anything that does not match the pattern exactly.
pub fn parse_utc_iso_no_colon(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(s, NO_COLON_FORMAT)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a user-supplied timestamp: RFC 3339 or the colon-free form.
pub fn parse_utc(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| parse_utc_iso_no_colon(s))
}

/// Render `ts` as RFC 3339 with second precision and a `Z` suffix.
pub fn utc_rfc3339(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Version timestamps are kept at second precision.
pub fn truncate_to_seconds(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn no_colon_round_trip() {
        let ts = Utc.with_ymd_and_hms(2023, 1, 1, 12, 0, 5).single();
        let Some(ts) = ts else {
            panic!("valid timestamp");
        };
        let s = utc_iso_no_colon(&ts);
        assert_eq!(s, "2023-01-01T120005+0000");
        assert_eq!(parse_utc_iso_no_colon(&s), Some(ts));
        assert_eq!(parse_utc(&s), Some(ts));
        assert_eq!(parse_utc("2023-01-01T12:00:05Z"), Some(ts));
        assert_eq!(parse_utc("2023-01-01T13:00:05+01:00"), Some(ts));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_utc_iso_no_colon("latest"), None);
        assert_eq!(parse_utc_iso_no_colon("2023-01-01T12:00:00+00:00"), None);
        assert_eq!(parse_utc("yesterday"), None);
    }

    #[test]
    fn truncation_drops_subseconds() {
        let ts = Utc.timestamp_opt(1_700_000_000, 123_456_789).single();
        let Some(ts) = ts else {
            panic!("valid timestamp");
        };
        assert_eq!(truncate_to_seconds(ts).timestamp_subsec_nanos(), 0);
        assert_eq!(truncate_to_seconds(ts).timestamp(), 1_700_000_000);
    }
}
