//! Canonical calendar dates. Every date entering the engine is normalized to
//! UTC midnight; the resulting [`CanonicalDate`] is the only key ever used to
//! decide "same day", look up a completion, or anchor a recurrence.

use std::fmt;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{EngineError, EngineResult};

/// A calendar day pinned to UTC midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CanonicalDate(NaiveDate);

impl CanonicalDate {
    /// Normalizes an arbitrary date input: a bare `YYYY-MM-DD` string, any
    /// ISO-8601 datetime (offsets are converted to UTC first), or a naive
    /// datetime. Malformed input is a validation error; callers must not
    /// fall back to "now".
    pub fn parse(input: &str) -> EngineResult<Self> {
        let trimmed = input.trim();
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            return Ok(Self(date));
        }
        if let Ok(datetime) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(Self(datetime.with_timezone(&Utc).date_naive()));
        }
        if let Ok(datetime) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
            return Ok(Self(datetime.date()));
        }
        Err(EngineError::Validation(format!(
            "unrecognized date input `{trimmed}`"
        )))
    }

    pub fn from_datetime(instant: DateTime<Utc>) -> Self {
        Self(instant.date_naive())
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> EngineResult<Self> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Self)
            .ok_or_else(|| {
                EngineError::Validation(format!("invalid calendar day {year}-{month}-{day}"))
            })
    }

    /// The UTC-midnight instant this day denotes.
    pub fn to_utc(self) -> DateTime<Utc> {
        self.0.and_hms_opt(0, 0, 0).expect("midnight is valid").and_utc()
    }

    /// `YYYY-MM-DD`, the form kept in exception and additional-date sets.
    pub fn date_string(self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }

    /// The persisted wire form: `YYYY-MM-DDT00:00:00.000Z`.
    pub fn to_iso_string(self) -> String {
        format!("{}T00:00:00.000Z", self.date_string())
    }

    pub fn pred(self) -> Self {
        Self(self.0 - Duration::days(1))
    }

    pub fn succ(self) -> Self {
        Self(self.0 + Duration::days(1))
    }

    /// Weekday number with Sunday as 0, matching the persisted weekly sets.
    pub fn weekday_number(self) -> u8 {
        self.0.weekday().num_days_from_sunday() as u8
    }

    pub fn day_of_month(self) -> u32 {
        self.0.day()
    }

    pub fn month(self) -> u32 {
        self.0.month()
    }

    pub fn year(self) -> i32 {
        self.0.year()
    }

    /// Which occurrence of its own weekday this day is within its month
    /// (1-based): the 2nd Tuesday of March yields 2.
    pub fn weekday_ordinal(self) -> u32 {
        (self.0.day() - 1) / 7 + 1
    }

    /// Whole days from `self` to `other`; negative when `other` is earlier.
    pub fn days_until(self, other: Self) -> i64 {
        (other.0 - self.0).num_days()
    }

    /// Whole calendar months from `self` to `other`, ignoring the day of
    /// month on either side.
    pub fn months_until(self, other: Self) -> i32 {
        (other.0.year() - self.0.year()) * 12 + other.0.month() as i32 - self.0.month() as i32
    }

    /// Inclusive day-by-day walk, the shape every range view consumes.
    pub fn iter_through(self, end: Self) -> impl Iterator<Item = CanonicalDate> {
        let mut current = self;
        std::iter::from_fn(move || {
            if current > end {
                return None;
            }
            let out = current;
            current = current.succ();
            Some(out)
        })
    }
}

impl From<NaiveDate> for CanonicalDate {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl fmt::Display for CanonicalDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.date_string())
    }
}

impl Serialize for CanonicalDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_iso_string())
    }
}

impl<'de> Deserialize<'de> for CanonicalDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        CanonicalDate::parse(&raw).map_err(de::Error::custom)
    }
}

/// Source of "today". The engine never reaches for the system clock
/// directly; tests pin a [`FixedClock`] to make backlog-toggle semantics
/// deterministic.
pub trait Clock: Send + Sync {
    fn today(&self) -> CanonicalDate;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> CanonicalDate {
        CanonicalDate::from_datetime(Utc::now())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub CanonicalDate);

impl Clock for FixedClock {
    fn today(&self) -> CanonicalDate {
        self.0
    }
}
