//! A [`TimezoneDatabase`] backed by the IANA data compiled into `chrono-tz`.
//!
//! `chrono-tz` answers "what is the offset at this instant" but does not
//! expose its transition list, so each zone's [`RuleTable`] is derived on
//! first use: the offset is sampled once per day across the coverage
//! window and every change is bisected down to the exact second.
//!
//! Because of the daily step, an offset change that is undone before the
//! next sample (two transitions less than a day apart) is not seen, and the
//! table keeps the surrounding offset for that stretch. Callers that need
//! such history exactly can supply their own [`RuleTable`]s through
//! [`crate::StaticDatabase`].
//!
//! Tables live in an arena with one `OnceLock` slot per zone, addressed
//! through a name → index map that never changes after construction.
//! Loading one zone therefore never blocks lookups in zones that are
//! already loaded.

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Offset, TimeDelta, TimeZone, Utc};
use chrono_tz::{OffsetComponents, Tz, TZ_VARIANTS};
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::instant::{Instant, UtcOffset, SECONDS_PER_DAY};
use crate::tzdb::{RuleTable, TimezoneDatabase, TimezoneRule};

/// Default first covered year.
pub const DEFAULT_START_YEAR: i32 = 1900;
/// Default last covered year (inclusive).
pub const DEFAULT_END_YEAR: i32 = 2100;

/// Offset components compared while scanning: total offset and DST part.
type Components = (i32, i64);

pub struct BundledDatabase {
    /// Coverage bounds in Unix seconds, `[lower, upper)`.
    lower: i64,
    upper: i64,
    keys: HashMap<&'static str, usize>,
    tables: Vec<OnceLock<Result<RuleTable>>>,
}

impl BundledDatabase {
    /// A database covering [`DEFAULT_START_YEAR`] through [`DEFAULT_END_YEAR`].
    pub fn new() -> Self {
        // The default window is well inside the instant range.
        Self::build(
            unix_seconds_at_new_year(DEFAULT_START_YEAR).unwrap_or(0),
            unix_seconds_at_new_year(DEFAULT_END_YEAR + 1).unwrap_or(0),
        )
    }

    /// A database covering January 1 of `start_year` (UTC) up to, but not
    /// including, January 1 of `end_year + 1`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidRange`] if `start_year > end_year`, or
    /// [`EngineError::RangeOverflow`] if the window leaves the instant range.
    pub fn with_coverage(start_year: i32, end_year: i32) -> Result<Self> {
        if start_year > end_year {
            return Err(EngineError::InvalidRange(format!(
                "coverage {start_year}..={end_year} is empty"
            )));
        }
        let lower = unix_seconds_at_new_year(start_year)?;
        let upper = unix_seconds_at_new_year(
            end_year
                .checked_add(1)
                .ok_or_else(|| EngineError::RangeOverflow(format!("year {end_year}")))?,
        )?;
        Ok(Self::build(lower, upper))
    }

    fn build(lower: i64, upper: i64) -> Self {
        let keys = TZ_VARIANTS
            .iter()
            .enumerate()
            .map(|(idx, tz)| (tz.name(), idx))
            .collect();
        let tables = TZ_VARIANTS.iter().map(|_| OnceLock::new()).collect();
        BundledDatabase {
            lower,
            upper,
            keys,
            tables,
        }
    }

    /// Every zone identifier this database can answer for.
    pub fn zone_ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        TZ_VARIANTS.iter().map(|tz| tz.name())
    }

    fn table(&self, zone_id: &str) -> Result<&RuleTable> {
        let idx = *self
            .keys
            .get(zone_id)
            .ok_or_else(|| EngineError::UnknownZone(format!("'{zone_id}'")))?;
        self.tables[idx]
            .get_or_init(|| self.load(TZ_VARIANTS[idx]))
            .as_ref()
            .map_err(Clone::clone)
    }

    fn load(&self, tz: Tz) -> Result<RuleTable> {
        let mut rules = Vec::new();
        let mut from = self.lower;
        let mut current = components_at(tz, from)?;
        let mut t = from;

        while t < self.upper {
            let next = (t + i64::from(SECONDS_PER_DAY)).min(self.upper);
            if components_at(tz, next)? == current {
                t = next;
                continue;
            }
            // The change lies in (lo, hi]; narrow it to the first second.
            let (mut lo, mut hi) = (t, next);
            while hi - lo > 1 {
                let mid = lo + (hi - lo) / 2;
                if components_at(tz, mid)? == current {
                    lo = mid;
                } else {
                    hi = mid;
                }
            }
            rules.push(make_rule(tz, from, hi, current)?);
            from = hi;
            current = components_at(tz, hi)?;
            t = hi;
        }
        rules.push(make_rule(tz, from, self.upper, current)?);

        debug!(zone = tz.name(), rules = rules.len(), "loaded zone rule table");
        RuleTable::new(tz.name(), rules)
    }
}

impl Default for BundledDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl TimezoneDatabase for BundledDatabase {
    fn rule_at(&self, zone_id: &str, instant: Instant) -> Result<&TimezoneRule> {
        self.table(zone_id)?.rule_at(instant)
    }

    fn transitions_in(&self, zone_id: &str, year: i32) -> Result<Vec<Instant>> {
        Ok(self.table(zone_id)?.transitions_in(year))
    }

    fn contains(&self, zone_id: &str) -> bool {
        self.keys.contains_key(zone_id)
    }
}

fn unix_seconds_at_new_year(year: i32) -> Result<i64> {
    let secs = NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().timestamp())
        .ok_or_else(|| EngineError::RangeOverflow(format!("year {year}")))?;
    // Every covered second must also be a representable nanosecond instant.
    Instant::from_unix_seconds(secs)?;
    Ok(secs)
}

fn naive_at(secs: i64) -> Result<NaiveDateTime> {
    TimeDelta::try_seconds(secs)
        .and_then(|delta| DateTime::<Utc>::UNIX_EPOCH.checked_add_signed(delta))
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| EngineError::RangeOverflow(format!("{secs} unix seconds")))
}

fn components_at(tz: Tz, secs: i64) -> Result<Components> {
    let offset = tz.offset_from_utc_datetime(&naive_at(secs)?);
    Ok((
        offset.fix().local_minus_utc(),
        offset.dst_offset().num_seconds(),
    ))
}

fn make_rule(tz: Tz, from: i64, until: i64, (total, dst): Components) -> Result<TimezoneRule> {
    let abbreviation = tz
        .from_utc_datetime(&naive_at(from)?)
        .format("%Z")
        .to_string();
    Ok(TimezoneRule {
        valid_from: Instant::from_unix_seconds(from)?,
        valid_until: Instant::from_unix_seconds(until)?,
        offset: UtcOffset::from_seconds(total)?,
        is_dst: dst != 0,
        abbreviation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> &'static BundledDatabase {
        static DB: OnceLock<BundledDatabase> = OnceLock::new();
        DB.get_or_init(BundledDatabase::new)
    }

    fn at(secs: i64) -> Instant {
        Instant::from_unix_seconds(secs).unwrap()
    }

    #[test]
    fn test_new_york_2024_transitions_exact() {
        let transitions = db().transitions_in("America/New_York", 2024).unwrap();
        // 2024-03-10T07:00:00Z and 2024-11-03T06:00:00Z
        assert_eq!(transitions, vec![at(1_710_054_000), at(1_730_613_600)]);
    }

    #[test]
    fn test_new_york_rules_around_spring_forward() {
        let before = db().rule_at("America/New_York", at(1_710_054_000 - 1)).unwrap();
        assert_eq!(before.offset.to_string(), "-05:00");
        assert!(!before.is_dst);
        assert_eq!(before.abbreviation, "EST");
        assert_eq!(before.valid_until, at(1_710_054_000));

        let after = db().rule_at("America/New_York", at(1_710_054_000)).unwrap();
        assert_eq!(after.offset.to_string(), "-04:00");
        assert!(after.is_dst);
        assert_eq!(after.abbreviation, "EDT");
    }

    #[test]
    fn test_zone_without_dst() {
        assert!(db().transitions_in("Asia/Tokyo", 2024).unwrap().is_empty());
        let rule = db().rule_at("Asia/Tokyo", at(1_718_452_800)).unwrap();
        assert_eq!(rule.offset.to_string(), "+09:00");
    }

    #[test]
    fn test_unknown_zone_returns_error() {
        let err = db().rule_at("Invalid/Zone", Instant::UNIX_EPOCH).unwrap_err();
        assert!(err.to_string().contains("Unknown zone"), "got: {err}");
        assert!(!db().contains("Invalid/Zone"));
        assert!(db().contains("Europe/London"));
    }

    #[test]
    fn test_outside_coverage_returns_error() {
        let narrow = BundledDatabase::with_coverage(2020, 2030).unwrap();
        // 2031-06-01T00:00:00Z
        let err = narrow.rule_at("Europe/Paris", at(1_938_038_400)).unwrap_err();
        assert!(matches!(err, EngineError::NoRuleCoverage(_)), "got: {err}");
        assert!(narrow.rule_at("Europe/Paris", at(1_717_200_000)).is_ok());
    }

    #[test]
    fn test_with_coverage_validates_window() {
        assert!(matches!(
            BundledDatabase::with_coverage(2030, 2020),
            Err(EngineError::InvalidRange(_))
        ));
        assert!(matches!(
            BundledDatabase::with_coverage(1500, 2000),
            Err(EngineError::RangeOverflow(_))
        ));
    }
}
