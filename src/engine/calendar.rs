//! Calendar days and the injectable clock.
//!
//! Every time-series record is keyed by a [`DateKey`]: a UTC calendar date
//! rendered as `YYYY-MM-DD`. Engine code never reads the wall clock itself;
//! it asks a [`Clock`] so tests can pin "today".

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A UTC calendar day. Ordering is chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateKey(NaiveDate);

impl DateKey {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Build from year/month/day, `None` for impossible dates.
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    /// The UTC day a timestamp falls on.
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.date_naive())
    }

    /// Parse a date key or an RFC 3339 timestamp. Anything else is "no date".
    pub fn parse_lenient(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return None;
        }
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, DATE_FORMAT) {
            return Some(Self(date));
        }
        parse_timestamp(trimmed).map(Self::from_datetime)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Midnight UTC at the start of this day.
    pub fn start_of_day(&self) -> DateTime<Utc> {
        self.0.and_time(chrono::NaiveTime::MIN).and_utc()
    }

    /// Shift by a signed number of days (saturates at the calendar bounds).
    pub fn offset(&self, days: i64) -> Self {
        self.0
            .checked_add_signed(Duration::days(days))
            .map(Self)
            .unwrap_or(*self)
    }

    pub fn pred(&self) -> Self {
        self.offset(-1)
    }

    /// Whole days from `self` until `later` (negative when `later` is earlier).
    pub fn days_until(&self, later: DateKey) -> i64 {
        later.0.signed_duration_since(self.0).num_days()
    }

    /// `days` consecutive keys ending at `end`, oldest first.
    pub fn range_ending(end: DateKey, days: usize) -> Vec<DateKey> {
        (0..days)
            .map(|index| end.offset(index as i64 - (days as i64 - 1)))
            .collect()
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DATE_FORMAT))
    }
}

impl FromStr for DateKey {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).map(Self)
    }
}

impl Serialize for DateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DateKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateKey::parse_lenient(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid date key: {raw}")))
    }
}

/// Parse an RFC 3339 timestamp, or a bare date key as midnight UTC.
pub fn parse_timestamp(input: &str) -> Option<DateTime<Utc>> {
    let trimmed = input.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
        .ok()
        .map(|date| DateKey(date).start_of_day())
}

/// Days the account has existed, counting both ends. Never below 1.
pub fn account_age_days(first_use_at: DateTime<Utc>, end: DateTime<Utc>) -> u32 {
    let start = DateKey::from_datetime(first_use_at);
    let end = DateKey::from_datetime(end);
    let diff = start.days_until(end) + 1;
    diff.clamp(1, i64::from(u32::MAX)) as u32
}

/// Source of "now" for the engine.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> DateKey {
        DateKey::from_datetime(self.now())
    }
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Noon UTC on the given day.
    pub fn at_date(date: DateKey) -> Self {
        Self::new(date.start_of_day() + Duration::hours(12))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance_days(&self, days: i64) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += Duration::days(days);
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> DateKey {
        s.parse().expect("date key")
    }

    #[test]
    fn parses_keys_and_timestamps() {
        assert_eq!(DateKey::parse_lenient("2024-01-03"), Some(key("2024-01-03")));
        assert_eq!(
            DateKey::parse_lenient("2024-01-03T23:59:00.000Z"),
            Some(key("2024-01-03"))
        );
        assert_eq!(DateKey::parse_lenient("not a date"), None);
        assert_eq!(DateKey::parse_lenient(""), None);
    }

    #[test]
    fn range_is_ascending_and_inclusive() {
        let keys = DateKey::range_ending(key("2024-03-01"), 3);
        let rendered: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        assert_eq!(rendered, vec!["2024-02-28", "2024-02-29", "2024-03-01"]);
        assert!(DateKey::range_ending(key("2024-03-01"), 0).is_empty());
    }

    #[test]
    fn account_age_counts_both_ends() {
        let start = key("2024-01-01").start_of_day();
        let end = key("2024-01-10").start_of_day() + Duration::hours(20);
        assert_eq!(account_age_days(start, end), 10);
        assert_eq!(account_age_days(end, start), 1);
    }

    #[test]
    fn fixed_clock_advances() {
        let clock = FixedClock::at_date(key("2024-01-01"));
        clock.advance_days(2);
        assert_eq!(clock.today(), key("2024-01-03"));
    }
}
