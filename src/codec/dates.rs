//! Canonical dates (`YYYY-MM-DD`) and the injectable clock.

use chrono::{Datelike, Days, Months, NaiveDate, Utc, Weekday};

/// Source of "today" for fetchers and reports
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;

    /// Milliseconds since the epoch, used as a cache buster
    fn now_millis(&self) -> i64;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }

    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Clock pinned to one day (tests, replays)
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }

    fn now_millis(&self) -> i64 {
        self.0
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis())
            .unwrap_or_default()
    }
}

/// Validate a canonical `YYYY-MM-DD` date.
///
/// Year must lie in [1970, 2200]; February always accepts day 29.
pub fn is_date(text: &str) -> bool {
    let bytes = text.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return false;
    }
    let (Ok(year), Ok(month), Ok(day)) = (
        text[0..4].parse::<u32>(),
        text[5..7].parse::<u32>(),
        text[8..10].parse::<u32>(),
    ) else {
        return false;
    };
    if !(1970..=2200).contains(&year) || !(1..=12).contains(&month) || day == 0 {
        return false;
    }
    let max_day = match month {
        2 => 29,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    };
    day <= max_day
}

/// Parse `YYYY-MM-DD`
pub fn parse_iso(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").ok()
}

/// Parse `DD/MM/YYYY` (FII reports)
pub fn parse_br(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%d/%m/%Y").ok()
}

/// `DD/MM/YYYY` to canonical `YYYY-MM-DD`
pub fn br_to_iso(text: &str) -> Option<String> {
    parse_br(text).map(|d| d.format("%Y-%m-%d").to_string())
}

/// `YYYYMMDD` (B3 fixed-width) to a date
pub fn parse_compact(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%Y%m%d").ok()
}

/// Unix seconds at midnight UTC of a canonical date
pub fn to_unix(text: &str) -> Option<i64> {
    parse_iso(text).and_then(unix_of)
}

pub fn unix_of(date: NaiveDate) -> Option<i64> {
    date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp())
}

/// Leading four-digit year of a canonical date
pub fn year_of(text: &str) -> Option<i32> {
    let head = text.get(0..4)?;
    if !head.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    head.parse().ok()
}

/// The last `n` months, newest first, as `YYYY-MM`
pub fn months_from_today(clock: &dyn Clock, n: usize) -> Vec<String> {
    let today = clock.today();
    let Some(first) = today.with_day(1) else {
        return Vec::new();
    };
    (0..n)
        .filter_map(|i| first.checked_sub_months(Months::new(i as u32)))
        .map(|d| d.format("%Y-%m").to_string())
        .collect()
}

/// First weekday after `date`
pub fn next_weekday(date: NaiveDate) -> NaiveDate {
    let mut next = date + Days::new(1);
    while matches!(next.weekday(), Weekday::Sat | Weekday::Sun) {
        next = next + Days::new(1);
    }
    next
}
