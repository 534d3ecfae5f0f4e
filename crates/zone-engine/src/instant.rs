//! Absolute instants and UTC offsets.
//!
//! An [`Instant`] is a count of nanoseconds since 1970-01-01T00:00:00Z and
//! carries no timezone. A [`UtcOffset`] is the signed amount a local clock
//! runs ahead of UTC. Both are plain `Copy` values.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

use crate::error::{EngineError, Result};

pub(crate) const NANOS_PER_SECOND: i64 = 1_000_000_000;
pub(crate) const SECONDS_PER_DAY: i32 = 86_400;

// ── Instant ─────────────────────────────────────────────────────────────────

/// An absolute point in time with nanosecond resolution.
///
/// The representable range is that of an `i64` nanosecond count, roughly
/// the years 1677 through 2262.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Instant(i64);

impl Instant {
    /// The earliest representable instant.
    pub const MIN: Instant = Instant(i64::MIN);
    /// The latest representable instant. Also used as the end of an
    /// open-ended timezone rule.
    pub const MAX: Instant = Instant(i64::MAX);
    /// 1970-01-01T00:00:00Z.
    pub const UNIX_EPOCH: Instant = Instant(0);

    pub const fn from_nanos(nanos: i64) -> Self {
        Instant(nanos)
    }

    pub fn from_unix_seconds(seconds: i64) -> Result<Self> {
        seconds
            .checked_mul(NANOS_PER_SECOND)
            .map(Instant)
            .ok_or_else(|| overflow(format!("{seconds} unix seconds")))
    }

    pub fn from_unix_millis(millis: i64) -> Result<Self> {
        millis
            .checked_mul(1_000_000)
            .map(Instant)
            .ok_or_else(|| overflow(format!("{millis} unix milliseconds")))
    }

    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    /// Whole seconds since the epoch, rounded toward negative infinity.
    pub const fn as_unix_seconds(self) -> i64 {
        self.0.div_euclid(NANOS_PER_SECOND)
    }

    /// Whole milliseconds since the epoch, rounded toward negative infinity.
    pub const fn as_unix_millis(self) -> i64 {
        self.0.div_euclid(1_000_000)
    }

    pub fn checked_add_nanos(self, nanos: i64) -> Result<Self> {
        self.0
            .checked_add(nanos)
            .map(Instant)
            .ok_or_else(|| overflow(format!("{self} + {nanos}ns")))
    }

    pub fn checked_sub_nanos(self, nanos: i64) -> Result<Self> {
        self.0
            .checked_sub(nanos)
            .map(Instant)
            .ok_or_else(|| overflow(format!("{self} - {nanos}ns")))
    }

    /// Interpret a civil value as if it were UTC ("local nanoseconds").
    pub(crate) fn from_naive_utc(naive: &NaiveDateTime) -> Result<Self> {
        naive
            .and_utc()
            .timestamp_nanos_opt()
            .map(Instant)
            .ok_or_else(|| overflow(format!("{naive} is outside the instant range")))
    }

    /// The UTC calendar value of this instant.
    pub(crate) fn to_naive_utc(self) -> Result<NaiveDateTime> {
        self.to_utc().map(|dt| dt.naive_utc())
    }

    pub(crate) fn to_utc(self) -> Result<DateTime<Utc>> {
        let secs = self.0.div_euclid(NANOS_PER_SECOND);
        let nanos = self.0.rem_euclid(NANOS_PER_SECOND) as u32;
        DateTime::from_timestamp(secs, nanos)
            .ok_or_else(|| overflow(format!("{} ns is outside the calendar range", self.0)))
    }

    /// Shift by a whole number of offset seconds.
    pub(crate) fn checked_add_offset(self, offset: UtcOffset) -> Result<Self> {
        self.checked_add_nanos(i64::from(offset.seconds()) * NANOS_PER_SECOND)
    }

    pub(crate) fn checked_sub_offset(self, offset: UtcOffset) -> Result<Self> {
        self.checked_sub_nanos(i64::from(offset.seconds()) * NANOS_PER_SECOND)
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_utc() {
            Ok(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.fZ")),
            Err(_) => write!(f, "{}ns", self.0),
        }
    }
}

fn overflow(what: String) -> EngineError {
    EngineError::RangeOverflow(what)
}

// ── UtcOffset ───────────────────────────────────────────────────────────────

/// A signed offset from UTC in seconds, strictly between -24h and +24h.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct UtcOffset(i32);

impl UtcOffset {
    pub const UTC: UtcOffset = UtcOffset(0);

    pub fn from_seconds(seconds: i32) -> Result<Self> {
        if seconds.unsigned_abs() >= SECONDS_PER_DAY as u32 {
            return Err(overflow(format!(
                "offset of {seconds}s is not strictly within ±24h"
            )));
        }
        Ok(UtcOffset(seconds))
    }

    pub fn from_hours(hours: i32) -> Result<Self> {
        hours
            .checked_mul(3600)
            .ok_or_else(|| overflow(format!("offset of {hours}h")))
            .and_then(Self::from_seconds)
    }

    pub const fn seconds(self) -> i32 {
        self.0
    }
}

/// Formats as `±HH:MM`, appending `:SS` only for sub-minute offsets.
impl fmt::Display for UtcOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 >= 0 { "+" } else { "-" };
        let abs = self.0.unsigned_abs();
        let hours = abs / 3600;
        let minutes = (abs % 3600) / 60;
        let seconds = abs % 60;
        if seconds == 0 {
            write!(f, "{sign}{hours:02}:{minutes:02}")
        } else {
            write!(f, "{sign}{hours:02}:{minutes:02}:{seconds:02}")
        }
    }
}
