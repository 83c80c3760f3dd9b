//! Calendar-day types.
//!
//! This module provides [`CanonicalDate`], the single calendar day a source
//! record normalizes to, and [`DateRange`] for inclusive sync windows.

use std::fmt;
use std::str::FromStr;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, DataError};

/// A calendar day in the destination timezone, without time of day.
///
/// Serializes as `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalDate(NaiveDate);

impl CanonicalDate {
    /// Wraps a date.
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Creates a date from year, month and day.
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    /// Parses a strict `YYYY-MM-DD` string.
    pub fn parse(value: &str) -> Result<Self, DataError> {
        NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
            .map(Self)
            .map_err(|e| DataError::invalid_date(value, format!("expected YYYY-MM-DD: {e}")))
    }

    /// Returns the underlying date.
    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Shifts the date by a signed number of whole days.
    pub fn shift_days(&self, days: i64) -> Option<Self> {
        let magnitude = Days::new(days.unsigned_abs());
        let shifted = if days >= 0 {
            self.0.checked_add_days(magnitude)
        } else {
            self.0.checked_sub_days(magnitude)
        };
        shifted.map(Self)
    }

    /// Returns the following day.
    pub fn succ(&self) -> Option<Self> {
        self.0.succ_opt().map(Self)
    }
}

impl From<NaiveDate> for CanonicalDate {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl FromStr for CanonicalDate {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CanonicalDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

/// An inclusive range of calendar days `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// First day of the range (inclusive).
    pub start: CanonicalDate,
    /// Last day of the range (inclusive).
    pub end: CanonicalDate,
}

impl DateRange {
    /// Creates a new range, rejecting `start > end`.
    pub fn new(start: CanonicalDate, end: CanonicalDate) -> Result<Self, ConfigError> {
        if start > end {
            return Err(ConfigError::invalid(format!(
                "date range start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Creates a range covering one day.
    pub fn single(day: CanonicalDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    /// Returns the number of days in the range.
    pub fn days(&self) -> i64 {
        (self.end.date() - self.start.date()).num_days() + 1
    }

    /// Checks if a day falls within the range, both ends inclusive.
    pub fn contains(&self, day: CanonicalDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// Widens the range by the given number of days on both ends.
    ///
    /// Used when fetching from sources whose own date differs from the
    /// canonical one (e.g. a wake-up date one day after the night of).
    pub fn widen(&self, days: u64) -> Self {
        let start = self.start.shift_days(-(days as i64)).unwrap_or(self.start);
        let end = self.end.shift_days(days as i64).unwrap_or(self.end);
        Self { start, end }
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}
