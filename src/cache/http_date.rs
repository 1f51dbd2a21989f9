//! HTTP-date parsing and formatting.

use chrono::{DateTime, NaiveDateTime};

/// Parse an HTTP date into epoch seconds.
///
/// Accepts IMF-fixdate (`Sun, 06 Nov 1994 08:49:37 GMT`), RFC 850
/// (`Sunday, 06-Nov-94 08:49:37 GMT`) and asctime (`Sun Nov  6 08:49:37 1994`).
pub fn parse_http_date(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc2822(value) {
        return Some(parsed.timestamp());
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(value, "%A, %d-%b-%y %H:%M:%S GMT") {
        return Some(parsed.and_utc().timestamp());
    }
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDateTime::parse_from_str(&collapsed, "%a %b %d %H:%M:%S %Y")
        .ok()
        .map(|parsed| parsed.and_utc().timestamp())
}

/// Format epoch seconds as IMF-fixdate.
pub fn format_http_date(epoch_secs: i64) -> Option<String> {
    DateTime::from_timestamp(epoch_secs, 0).map(|at| at.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
}
