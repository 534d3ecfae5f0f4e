//! Calendar-aware arithmetic on [`ZonedDateTime`] values.
//!
//! Units split in two families:
//!
//! - **Fixed-duration** units (nanosecond through hour) are added to the
//!   instant; civil fields and offset are re-derived afterwards. Crossing a
//!   transition therefore changes the wall-clock result, as real clocks do:
//!   01:30 + 2h on a spring-forward morning reads 04:30.
//! - **Calendar** units (day, week, month, quarter, year) are added to the
//!   civil fields and the result is re-resolved in the zone, so "+1 day"
//!   keeps the wall-clock time even across a 23- or 25-hour day. Month and
//!   year shifts clamp the day of month to the end of the target month.
//!
//! `floor`/`ceil`/`span` follow the same split and are exact: `ceil` is the
//! last nanosecond before the next window starts, so adjacent spans neither
//! overlap nor leave a gap.

use std::fmt;
use std::str::FromStr;

use chrono::{Months, NaiveDate, NaiveTime, TimeDelta, Weekday};
use serde::Serialize;

use crate::civil::{CivilDateTime, CivilFields};
use crate::error::{EngineError, Result};
use crate::instant::{Instant, UtcOffset};
use crate::resolver::{DstResolver, FoldPolicy};
use crate::tzdb::TimezoneDatabase;
use crate::zoned::{Resolution, ZonedDateTime};

// ── Units ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Nanosecond,
    Microsecond,
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl Unit {
    /// Length in nanoseconds for fixed-duration units, `None` for calendar
    /// units.
    pub fn fixed_nanos(self) -> Option<i64> {
        match self {
            Unit::Nanosecond => Some(1),
            Unit::Microsecond => Some(1_000),
            Unit::Millisecond => Some(1_000_000),
            Unit::Second => Some(1_000_000_000),
            Unit::Minute => Some(60_000_000_000),
            Unit::Hour => Some(3_600_000_000_000),
            Unit::Day | Unit::Week | Unit::Month | Unit::Quarter | Unit::Year => None,
        }
    }

    pub fn is_calendar(self) -> bool {
        self.fixed_nanos().is_none()
    }

    pub fn name(self) -> &'static str {
        match self {
            Unit::Nanosecond => "nanosecond",
            Unit::Microsecond => "microsecond",
            Unit::Millisecond => "millisecond",
            Unit::Second => "second",
            Unit::Minute => "minute",
            Unit::Hour => "hour",
            Unit::Day => "day",
            Unit::Week => "week",
            Unit::Month => "month",
            Unit::Quarter => "quarter",
            Unit::Year => "year",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parses singular or plural unit names, case-insensitively
/// (`"day"`, `"Days"`, `"quarters"`).
impl FromStr for Unit {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase();
        let singular = normalized.strip_suffix('s').unwrap_or(&normalized);
        let unit = match singular {
            "nanosecond" => Unit::Nanosecond,
            "microsecond" => Unit::Microsecond,
            "millisecond" => Unit::Millisecond,
            "second" => Unit::Second,
            "minute" => Unit::Minute,
            "hour" => Unit::Hour,
            "day" => Unit::Day,
            "week" => Unit::Week,
            "month" => Unit::Month,
            "quarter" => Unit::Quarter,
            "year" => Unit::Year,
            _ => return Err(EngineError::InvalidUnit(format!("'{}'", s.trim()))),
        };
        Ok(unit)
    }
}

// ── Options ─────────────────────────────────────────────────────────────────

/// Which day begins a week for week floors, ceilings and spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum WeekStartDay {
    /// ISO 8601 standard.
    #[default]
    Monday,
    /// US/Canada convention.
    Sunday,
    Saturday,
}

/// How many days `weekday` is from the week-start day.
fn days_from_week_start(weekday: Weekday, week_start: WeekStartDay) -> i64 {
    match week_start {
        WeekStartDay::Monday => i64::from(weekday.num_days_from_monday()),
        WeekStartDay::Sunday => i64::from(weekday.num_days_from_sunday()),
        WeekStartDay::Saturday => i64::from((weekday.num_days_from_sunday() + 1) % 7),
    }
}

/// Options for a [`Calendar`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineOptions {
    /// Which day starts the week for week granularity.
    pub week_start: WeekStartDay,
    /// Which instant calendar shifts and `replace` pick when the result
    /// falls in a fold.
    pub fold: FoldPolicy,
}

// ── Calendar ────────────────────────────────────────────────────────────────

/// Calendar arithmetic over an injected timezone database.
#[derive(Clone, Copy)]
pub struct Calendar<'db> {
    resolver: DstResolver<'db>,
    options: EngineOptions,
}

impl<'db> Calendar<'db> {
    pub fn new(db: &'db dyn TimezoneDatabase) -> Self {
        Self::with_options(db, EngineOptions::default())
    }

    pub fn with_options(db: &'db dyn TimezoneDatabase, options: EngineOptions) -> Self {
        Calendar {
            resolver: DstResolver::new(db),
            options,
        }
    }

    pub fn resolver(&self) -> &DstResolver<'db> {
        &self.resolver
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    pub fn from_instant(&self, instant: Instant, zone_id: &str) -> Result<ZonedDateTime> {
        self.resolver.from_instant(instant, zone_id)
    }

    /// Resolve `civil` in `zone_id` using this calendar's fold policy.
    pub fn from_civil(&self, civil: &CivilDateTime, zone_id: &str) -> Result<ZonedDateTime> {
        self.resolver.to_instant_with(civil, zone_id, self.options.fold)
    }

    /// The same instant in another zone.
    pub fn to_zone(&self, zdt: &ZonedDateTime, zone_id: &str) -> Result<ZonedDateTime> {
        self.resolver.convert(zdt, zone_id)
    }

    // ── shift ───────────────────────────────────────────────────────────────

    /// Move `zdt` by `amount` units.
    ///
    /// A zero amount returns `zdt` unchanged. Calendar shifts that land in
    /// a fold use the configured fold policy, except that a value which was
    /// itself resolved out of a fold keeps the side it holds.
    ///
    /// # Errors
    ///
    /// [`EngineError::RangeOverflow`] if the result leaves the representable
    /// range; database errors from re-resolution.
    ///
    /// # Examples
    ///
    /// ```
    /// use zone_engine::{BundledDatabase, Calendar, CivilDateTime, Unit};
    ///
    /// let db = BundledDatabase::new();
    /// let cal = Calendar::new(&db);
    /// let jan31 = cal
    ///     .from_civil(&CivilDateTime::date(2024, 1, 31).unwrap(), "Europe/Paris")
    ///     .unwrap();
    /// let feb = cal.shift(&jan31, 1, Unit::Month).unwrap();
    /// assert_eq!((feb.month(), feb.day()), (2, 29));
    /// ```
    pub fn shift(&self, zdt: &ZonedDateTime, amount: i64, unit: Unit) -> Result<ZonedDateTime> {
        // Re-resolving would move a value off the later side of a fold.
        if amount == 0 {
            return Ok(zdt.clone());
        }
        match unit.fixed_nanos() {
            Some(nanos) => self.shift_instant(zdt, amount, unit, nanos),
            None => {
                let civil = shift_civil(&zdt.civil(), amount, unit)?;
                match zdt.resolution() {
                    // Stay on the same side when landing in another fold.
                    Resolution::Ambiguous { chose_later, .. } => {
                        let side = if chose_later {
                            FoldPolicy::Later
                        } else {
                            FoldPolicy::Earlier
                        };
                        self.resolver.to_instant_with(&civil, zdt.zone_id(), side)
                    }
                    _ => self.from_civil(&civil, zdt.zone_id()),
                }
            }
        }
    }

    /// Like [`Calendar::shift`] but only for fixed-duration units.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidUnit`] for day, week, month, quarter or year.
    pub fn shift_exact(
        &self,
        zdt: &ZonedDateTime,
        amount: i64,
        unit: Unit,
    ) -> Result<ZonedDateTime> {
        let nanos = unit.fixed_nanos().ok_or_else(|| {
            EngineError::InvalidUnit(format!("'{unit}' is not a fixed-duration unit"))
        })?;
        self.shift_instant(zdt, amount, unit, nanos)
    }

    fn shift_instant(
        &self,
        zdt: &ZonedDateTime,
        amount: i64,
        unit: Unit,
        unit_nanos: i64,
    ) -> Result<ZonedDateTime> {
        let delta = amount
            .checked_mul(unit_nanos)
            .ok_or_else(|| EngineError::RangeOverflow(format!("{amount} {unit}s")))?;
        let instant = zdt.instant().checked_add_nanos(delta)?;
        self.resolver.from_instant(instant, zdt.zone_id())
    }

    // ── floor / ceil / span ─────────────────────────────────────────────────

    /// Start of the `granularity` window containing `zdt`.
    ///
    /// Granularity must be second or coarser; finer units fail with
    /// [`EngineError::InvalidUnit`]. If the window's civil start was skipped
    /// by a transition, the first instant after the gap is returned.
    pub fn floor(&self, zdt: &ZonedDateTime, granularity: Unit) -> Result<ZonedDateTime> {
        let civil = self.floor_civil(&zdt.civil(), granularity)?;
        let preferred = (!granularity.is_calendar()).then(|| zdt.offset());
        self.window_start(&civil, zdt.zone_id(), preferred)
    }

    /// Last nanosecond of the `granularity` window containing `zdt`.
    pub fn ceil(&self, zdt: &ZonedDateTime, granularity: Unit) -> Result<ZonedDateTime> {
        self.span(zdt, granularity).map(|(_, end)| end)
    }

    /// `(floor, ceil)` of the window containing `zdt`.
    pub fn span(
        &self,
        zdt: &ZonedDateTime,
        granularity: Unit,
    ) -> Result<(ZonedDateTime, ZonedDateTime)> {
        let start = self.floor(zdt, granularity)?;

        let next = if granularity.is_calendar() {
            // Step from the unadjusted civil start so a gap at the start of
            // this window does not leak into the next one.
            let civil = self.floor_civil(&zdt.civil(), granularity)?;
            let next_civil = shift_civil(&civil, 1, granularity)?;
            self.window_start(&next_civil, zdt.zone_id(), None)?
        } else {
            // A fold shorter than the unit can floor the first step back
            // onto `start`.
            let mut step = 1;
            loop {
                let bumped = self.shift(&start, step, granularity)?;
                let next = self.floor(&bumped, granularity)?;
                if next.instant() > start.instant() {
                    break next;
                }
                step += 1;
            }
        };

        let end_instant = next.instant().checked_sub_nanos(1)?;
        let end = self.resolver.from_instant(end_instant, zdt.zone_id())?;
        Ok((start, end))
    }

    fn floor_civil(&self, civil: &CivilDateTime, granularity: Unit) -> Result<CivilDateTime> {
        let date = civil.naive_date();
        let midnight = hms(0, 0, 0)?;
        let (date, time) = match granularity {
            Unit::Year => (first_of_month(civil.year(), 1)?, midnight),
            Unit::Quarter => {
                let month = (civil.month() - 1) / 3 * 3 + 1;
                (first_of_month(civil.year(), month)?, midnight)
            }
            Unit::Month => (first_of_month(civil.year(), civil.month())?, midnight),
            Unit::Week => {
                let back = days_from_week_start(civil.weekday(), self.options.week_start);
                let start = date
                    .checked_sub_signed(TimeDelta::days(back))
                    .ok_or_else(|| EngineError::RangeOverflow(format!("week of {civil}")))?;
                (start, midnight)
            }
            Unit::Day => (date, midnight),
            Unit::Hour => (date, hms(civil.hour(), 0, 0)?),
            Unit::Minute => (date, hms(civil.hour(), civil.minute(), 0)?),
            Unit::Second => (date, hms(civil.hour(), civil.minute(), civil.second())?),
            Unit::Nanosecond | Unit::Microsecond | Unit::Millisecond => {
                return Err(EngineError::InvalidUnit(format!(
                    "'{granularity}' is finer than the supported floor granularities"
                )));
            }
        };
        Ok(CivilDateTime::from_naive(date.and_time(time)))
    }

    /// First instant of the window whose civil start is `civil`.
    ///
    /// Calendar windows (`preferred == None`) start at their earliest
    /// instant; clock windows keep the offset the floored value was observed
    /// under, so an hour inside a fold floors to the matching occurrence. A
    /// skipped start snaps to the instant the gap ends, which is the window's
    /// first existing instant even when the gap began before `civil`.
    fn window_start(
        &self,
        civil: &CivilDateTime,
        zone_id: &str,
        preferred: Option<UtcOffset>,
    ) -> Result<ZonedDateTime> {
        let zdt = match preferred {
            Some(offset) => self.resolver.to_instant_preferring(civil, zone_id, offset)?,
            None => self
                .resolver
                .to_instant_with(civil, zone_id, FoldPolicy::Earlier)?,
        };
        if !zdt.is_adjusted() {
            return Ok(zdt);
        }
        let rule = self.resolver.database().rule_at(zone_id, zdt.instant())?;
        if rule.valid_from >= zdt.instant() {
            return Ok(zdt);
        }
        ZonedDateTime::new(rule.valid_from, zone_id, rule, zdt.resolution())
    }

    // ── civil helpers ───────────────────────────────────────────────────────

    /// ISO weekday: Monday = 0 through Sunday = 6.
    pub fn weekday(&self, zdt: &ZonedDateTime) -> u8 {
        zdt.civil().weekday().num_days_from_monday() as u8
    }

    /// Overwrite some civil fields and re-resolve in the same zone, with the
    /// same fold and gap policy as [`Calendar::from_civil`].
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidCivilDateTime`] if the combined fields are not
    /// a valid date and time; nothing is clamped.
    pub fn replace(&self, zdt: &ZonedDateTime, fields: &CivilFields) -> Result<ZonedDateTime> {
        let civil = fields.apply(&zdt.civil())?;
        self.from_civil(&civil, zdt.zone_id())
    }

    /// Monday through Friday.
    pub fn is_business_day(&self, zdt: &ZonedDateTime) -> bool {
        self.weekday(zdt) < 5
    }

    /// The next Monday–Friday date after `zdt`, at the same wall-clock time.
    pub fn next_business_day(&self, zdt: &ZonedDateTime) -> Result<ZonedDateTime> {
        let mut next = self.shift(zdt, 1, Unit::Day)?;
        while !self.is_business_day(&next) {
            next = self.shift(&next, 1, Unit::Day)?;
        }
        Ok(next)
    }

    /// Signed number of calendar days from `a`'s date to `b`'s date, both
    /// read in `a`'s zone.
    pub fn days_between(&self, a: &ZonedDateTime, b: &ZonedDateTime) -> Result<i64> {
        let b = self.resolver.convert(b, a.zone_id())?;
        Ok(b
            .civil()
            .naive_date()
            .signed_duration_since(a.civil().naive_date())
            .num_days())
    }
}

// ── Civil arithmetic ────────────────────────────────────────────────────────

/// Add calendar units to civil fields. Month-based units clamp the day of
/// month to the last day of the resulting month.
pub(crate) fn shift_civil(civil: &CivilDateTime, amount: i64, unit: Unit) -> Result<CivilDateTime> {
    let overflow = || EngineError::RangeOverflow(format!("{civil} + {amount} {unit}s"));
    let naive = civil.naive();
    let shifted = match unit {
        Unit::Day | Unit::Week => {
            let days = if unit == Unit::Week {
                amount.checked_mul(7).ok_or_else(overflow)?
            } else {
                amount
            };
            let delta = TimeDelta::try_days(days).ok_or_else(overflow)?;
            naive.checked_add_signed(delta)
        }
        Unit::Month | Unit::Quarter | Unit::Year => {
            let per = match unit {
                Unit::Month => 1,
                Unit::Quarter => 3,
                _ => 12,
            };
            let months = amount.checked_mul(per).ok_or_else(overflow)?;
            let magnitude = u32::try_from(months.unsigned_abs()).map_err(|_| overflow())?;
            if months >= 0 {
                naive.checked_add_months(Months::new(magnitude))
            } else {
                naive.checked_sub_months(Months::new(magnitude))
            }
        }
        _ => {
            return Err(EngineError::InvalidUnit(format!(
                "'{unit}' is not a calendar unit"
            )));
        }
    };
    shifted.map(CivilDateTime::from_naive).ok_or_else(overflow)
}

fn first_of_month(year: i32, month: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
        EngineError::InvalidCivilDateTime(format!("no such month {year:04}-{month:02}"))
    })
}

fn hms(hour: u32, minute: u32, second: u32) -> Result<NaiveTime> {
    NaiveTime::from_hms_opt(hour, minute, second).ok_or_else(|| {
        EngineError::InvalidCivilDateTime(format!("no such time {hour:02}:{minute:02}:{second:02}"))
    })
}
