//! Lenient timestamp parsing.
//!
//! Accepts Unix-epoch milliseconds (number or digit string), RFC 3339 /
//! ISO-8601 with or without offset, the `YYYY-MM-DD HH:MM:SS+00` form a
//! relational store renders, and bare dates. Instants carrying an offset
//! are converted to UTC before the offset is dropped, so every encoding of
//! the same instant yields the same value.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

/// Offset-carrying layouts tried after RFC 3339.
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"];

/// Offset-free layouts.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse a loosely-typed date value. Returns `None` for null, empty or
/// unparsable input; never fails.
pub fn parse_date(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Number(n) => {
            let millis = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            from_epoch_millis(millis)
        }
        Value::String(s) => parse_date_str(s),
        _ => None,
    }
}

/// Parse a date from its textual form.
pub fn parse_date_str(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if is_epoch_literal(s) {
        return s.parse::<i64>().ok().and_then(from_epoch_millis);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }

    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.naive_utc());
        }
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn is_epoch_literal(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    // Eight digits would be ambiguous with compact dates; epoch millis are longer.
    digits.len() > 8 && digits.bytes().all(|b| b.is_ascii_digit())
}

fn from_epoch_millis(millis: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(millis).map(|dt| dt.naive_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ymd_hms(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn epoch_millis_and_iso_agree() {
        let from_number = parse_date(&json!(1_700_000_000_000_i64));
        let from_iso = parse_date(&json!("2023-11-14T22:13:20Z"));
        let from_offset = parse_date(&json!("2023-11-15T00:13:20+02:00"));
        assert_eq!(from_number, Some(ymd_hms(2023, 11, 14, 22, 13, 20)));
        assert_eq!(from_number, from_iso);
        assert_eq!(from_number, from_offset);
    }

    #[test]
    fn epoch_millis_as_string() {
        assert_eq!(
            parse_date(&json!("1700000000000")),
            Some(ymd_hms(2023, 11, 14, 22, 13, 20))
        );
    }

    #[test]
    fn float_epoch_truncates() {
        assert_eq!(
            parse_date(&json!(1_700_000_000_000.0_f64)),
            Some(ymd_hms(2023, 11, 14, 22, 13, 20))
        );
    }

    #[test]
    fn store_rendering_with_short_offset() {
        assert_eq!(
            parse_date_str("2022-05-01 09:30:00.123+00"),
            NaiveDate::from_ymd_opt(2022, 5, 1)
                .unwrap()
                .and_hms_milli_opt(9, 30, 0, 123)
        );
    }

    #[test]
    fn naive_and_date_only_forms() {
        assert_eq!(
            parse_date_str("2021-01-02T03:04:05"),
            Some(ymd_hms(2021, 1, 2, 3, 4, 5))
        );
        assert_eq!(parse_date_str("2021-01-02"), Some(ymd_hms(2021, 1, 2, 0, 0, 0)));
    }

    #[test]
    fn garbage_and_null_yield_none() {
        assert_eq!(parse_date(&Value::Null), None);
        assert_eq!(parse_date(&json!("")), None);
        assert_eq!(parse_date(&json!("not a date")), None);
        assert_eq!(parse_date(&json!("2021-13-45")), None);
        assert_eq!(parse_date(&json!(true)), None);
        assert_eq!(parse_date(&json!({"date": "2021-01-01"})), None);
    }
}
