//! Date helpers for form input and generated data

use chrono::{Datelike, Duration, NaiveDate, TimeZone, Utc};
use rand::Rng;

use crate::error::{Error, Result};

/// Two-digit month number for a month name (`"March"` -> `"03"`)
///
/// Abbreviations (`"Mar"`) and any letter case are accepted.
pub fn month_name_to_number(month: &str) -> Result<String> {
    let probe = format!("{} 1 2000", month.trim());
    let date = NaiveDate::parse_from_str(&probe, "%B %d %Y")
        .map_err(|_| Error::InvalidDate(format!("not a month name: {}", month)))?;
    Ok(format!("{:02}", date.month()))
}

/// Birth date between 1970 and 2005 inclusive, as `YYYY-MM-DD`
pub fn random_birth_date<R: Rng>(rng: &mut R) -> String {
    let start = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    let end = NaiveDate::from_ymd_opt(2005, 12, 31).unwrap_or_default();
    let span = (end - start).num_days();
    let date = start + Duration::days(rng.gen_range(0..=span));
    date.format("%Y-%m-%d").to_string()
}

/// RFC 3339 UTC timestamp within the last three years, second precision
pub fn random_timestamp<R: Rng>(rng: &mut R) -> String {
    let now = Utc::now().timestamp();
    let secs = rng.gen_range(0..=3 * 365 * 24 * 3600);
    Utc.timestamp_opt(now - secs, 0)
        .single()
        .unwrap_or_else(Utc::now)
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}
