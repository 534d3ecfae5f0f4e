//! Calendar/clock values with no timezone attached.

use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};
use serde::Serialize;

use crate::error::{EngineError, Result};

/// A validated civil datetime: year, month, day, hour, minute, second and
/// nanosecond, with no timezone semantics.
///
/// Two values compare as calendar values only; ordering them says nothing
/// about which instant comes first once a zone is involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct CivilDateTime(NaiveDateTime);

impl CivilDateTime {
    /// Build a civil datetime, rejecting any out-of-range field.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidCivilDateTime`] for an invalid month,
    /// a day past the end of the month (including February 29 in common
    /// years), hour > 23, minute > 59, second > 59 or a subsecond of one
    /// second or more. Nothing is clamped.
    ///
    /// # Examples
    ///
    /// ```
    /// use zone_engine::CivilDateTime;
    ///
    /// assert!(CivilDateTime::new(2024, 2, 29, 0, 0, 0, 0).is_ok());
    /// assert!(CivilDateTime::new(2023, 2, 29, 0, 0, 0, 0).is_err());
    /// assert!(CivilDateTime::new(2024, 4, 31, 0, 0, 0, 0).is_err());
    /// ```
    pub fn new(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
        nanosecond: u32,
    ) -> Result<Self> {
        let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
            EngineError::InvalidCivilDateTime(format!(
                "no such date {year:04}-{month:02}-{day:02}"
            ))
        })?;
        // chrono encodes leap seconds as nanosecond >= 1e9; those are rejected here.
        if second > 59 || nanosecond >= 1_000_000_000 {
            return Err(EngineError::InvalidCivilDateTime(format!(
                "no such time {hour:02}:{minute:02}:{second:02}.{nanosecond:09}"
            )));
        }
        let time = NaiveTime::from_hms_nano_opt(hour, minute, second, nanosecond).ok_or_else(
            || {
                EngineError::InvalidCivilDateTime(format!(
                    "no such time {hour:02}:{minute:02}:{second:02}.{nanosecond:09}"
                ))
            },
        )?;
        Ok(CivilDateTime(NaiveDateTime::new(date, time)))
    }

    /// Midnight at the start of the given date.
    pub fn date(year: i32, month: u32, day: u32) -> Result<Self> {
        Self::new(year, month, day, 0, 0, 0, 0)
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn day(&self) -> u32 {
        self.0.day()
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn minute(&self) -> u32 {
        self.0.minute()
    }

    pub fn second(&self) -> u32 {
        self.0.second()
    }

    pub fn nanosecond(&self) -> u32 {
        self.0.nanosecond()
    }

    pub fn weekday(&self) -> Weekday {
        self.0.weekday()
    }

    pub(crate) fn from_naive(naive: NaiveDateTime) -> Self {
        CivilDateTime(naive)
    }

    pub(crate) fn naive(&self) -> NaiveDateTime {
        self.0
    }

    pub(crate) fn naive_date(&self) -> NaiveDate {
        self.0.date()
    }
}

impl fmt::Display for CivilDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%dT%H:%M:%S%.f"))
    }
}

/// Whether `year` is a Gregorian leap year.
pub fn is_leap_year(year: i32) -> bool {
    NaiveDate::from_ymd_opt(year, 2, 29).is_some()
}

/// Number of days in the given month, or `None` for an invalid month.
pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year.checked_add(1)?, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    u32::try_from(next.signed_duration_since(first).num_days()).ok()
}

// ── Field replacement ───────────────────────────────────────────────────────

/// A partial set of civil fields used by `Calendar::replace`.
///
/// Unset fields keep the original value. The combined result is validated
/// as a whole, so setting `day: Some(31)` on an April value is an error
/// rather than a clamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CivilFields {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
    pub hour: Option<u32>,
    pub minute: Option<u32>,
    pub second: Option<u32>,
    pub nanosecond: Option<u32>,
}

impl CivilFields {
    /// Overlay these fields onto `base`.
    pub fn apply(&self, base: &CivilDateTime) -> Result<CivilDateTime> {
        CivilDateTime::new(
            self.year.unwrap_or(base.year()),
            self.month.unwrap_or(base.month()),
            self.day.unwrap_or(base.day()),
            self.hour.unwrap_or(base.hour()),
            self.minute.unwrap_or(base.minute()),
            self.second.unwrap_or(base.second()),
            self.nanosecond.unwrap_or(base.nanosecond()),
        )
    }
}
