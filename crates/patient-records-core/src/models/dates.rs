//! Calendar helpers shared by the entity and the validators.

use chrono::{DateTime, Datelike, Local, NaiveDate};

/// Parse a calendar date as entered in forms.
///
/// Accepts `YYYY-MM-DD` and full RFC 3339 timestamps (the date part is kept).
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.date_naive())
        })
}

/// Today's date in the practice's local time zone.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Whole years elapsed between `birth` and `on`, counting a year only once the
/// birthday has been reached. Birth dates after `on` yield 0.
pub fn age_on(birth: NaiveDate, on: NaiveDate) -> u32 {
    if birth > on {
        return 0;
    }

    let mut years = on.year() - birth.year();
    if (on.month(), on.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    years.max(0) as u32
}

/// Current RFC 3339 timestamp used for `created_at`/`updated_at`.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
