use chrono::{DateTime, NaiveDate, NaiveDateTime};

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parse an ISO-style date or timestamp and keep only the calendar day.
///
/// Accepts `YYYY-MM-DD`, RFC 3339 timestamps and naive `YYYY-MM-DD HH:MM:SS`
/// timestamps (with either a space or a `T` separator).
pub fn parse_calendar_date(raw: &str) -> Result<NaiveDate, chrono::ParseError> {
    let trimmed = raw.trim();

    let err = match NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        Ok(date) => return Ok(date),
        Err(e) => e,
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.date_naive());
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(dt.date());
        }
    }

    Err(err)
}
