//! DST-correct mapping between civil-time-in-a-zone and instants.
//!
//! Going from an instant to civil time is always well defined: every
//! instant has exactly one offset in a zone. The other direction is not.
//! A civil time may occur twice when clocks fall back (a *fold*) or not at
//! all when they spring forward (a *gap*). [`DstResolver::resolve`] reports
//! which case applies as a [`LocalResolution`], and the `to_instant*`
//! methods apply the policy:
//!
//! - **Fold**: the earlier instant by default (the pre-transition offset),
//!   or the later one on request. Both are recorded in
//!   [`Resolution::Ambiguous`].
//! - **Gap**: the civil time is moved forward by the size of the gap and
//!   the result is flagged with [`Resolution::Gap`]. In `America/New_York`
//!   on 2024-03-10, 02:30 becomes 03:30 at -04:00.

use serde::Serialize;
use tracing::{debug, trace};

use crate::civil::CivilDateTime;
use crate::error::{EngineError, Result};
use crate::instant::{Instant, UtcOffset, NANOS_PER_SECOND, SECONDS_PER_DAY};
use crate::tzdb::{TimezoneDatabase, TimezoneRule};
use crate::zoned::{Resolution, ZonedDateTime};

/// Which instant to pick when a civil time occurs twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum FoldPolicy {
    /// The first occurrence, observed under the pre-transition offset.
    #[default]
    Earlier,
    /// The second occurrence, observed under the post-transition offset.
    Later,
}

/// Outcome of mapping a civil time onto a zone's timeline, before any
/// policy is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalResolution {
    /// Exactly one instant has this civil time.
    Unique { instant: Instant },
    /// Two instants have this civil time.
    Ambiguous { earlier: Instant, later: Instant },
    /// No instant has this civil time. `adjusted` is the instant reached by
    /// moving the civil time forward by `after - before`.
    Gap {
        before: UtcOffset,
        after: UtcOffset,
        adjusted: Instant,
    },
}

/// Converts between civil times and instants using an injected database.
#[derive(Clone, Copy)]
pub struct DstResolver<'db> {
    db: &'db dyn TimezoneDatabase,
}

impl<'db> DstResolver<'db> {
    pub fn new(db: &'db dyn TimezoneDatabase) -> Self {
        DstResolver { db }
    }

    pub fn database(&self) -> &'db dyn TimezoneDatabase {
        self.db
    }

    // ── instant → civil ─────────────────────────────────────────────────────

    /// The zoned value of `instant` in `zone_id`.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownZone`], [`EngineError::NoRuleCoverage`], or
    /// [`EngineError::RangeOverflow`] if the civil value would leave the
    /// representable range.
    pub fn from_instant(&self, instant: Instant, zone_id: &str) -> Result<ZonedDateTime> {
        self.build(instant, zone_id, Resolution::Exact)
    }

    /// Alias of [`DstResolver::from_instant`].
    pub fn to_civil(&self, instant: Instant, zone_id: &str) -> Result<ZonedDateTime> {
        self.from_instant(instant, zone_id)
    }

    /// The same instant viewed from another zone.
    pub fn convert(&self, zdt: &ZonedDateTime, zone_id: &str) -> Result<ZonedDateTime> {
        self.from_instant(zdt.instant(), zone_id)
    }

    // ── civil → instant ─────────────────────────────────────────────────────

    /// Resolve `civil` in `zone_id` with the default fold policy
    /// (earlier instant). Alias of [`DstResolver::to_instant`].
    pub fn from_civil(&self, civil: &CivilDateTime, zone_id: &str) -> Result<ZonedDateTime> {
        self.to_instant(civil, zone_id)
    }

    /// Resolve `civil` in `zone_id`, choosing the earlier instant in a fold
    /// and moving forward across a gap.
    ///
    /// # Examples
    ///
    /// ```
    /// use zone_engine::{BundledDatabase, CivilDateTime, DstResolver};
    ///
    /// let db = BundledDatabase::new();
    /// let resolver = DstResolver::new(&db);
    ///
    /// let skipped = CivilDateTime::new(2024, 3, 10, 2, 30, 0, 0).unwrap();
    /// let zdt = resolver.to_instant(&skipped, "America/New_York").unwrap();
    /// assert_eq!(zdt.hour(), 3);
    /// assert!(zdt.is_adjusted());
    /// ```
    pub fn to_instant(&self, civil: &CivilDateTime, zone_id: &str) -> Result<ZonedDateTime> {
        self.to_instant_with(civil, zone_id, FoldPolicy::Earlier)
    }

    /// Like [`DstResolver::to_instant`] but choosing the later instant in a
    /// fold.
    pub fn to_instant_later(
        &self,
        civil: &CivilDateTime,
        zone_id: &str,
    ) -> Result<ZonedDateTime> {
        self.to_instant_with(civil, zone_id, FoldPolicy::Later)
    }

    pub fn to_instant_with(
        &self,
        civil: &CivilDateTime,
        zone_id: &str,
        policy: FoldPolicy,
    ) -> Result<ZonedDateTime> {
        match self.resolve(civil, zone_id)? {
            LocalResolution::Unique { instant } => {
                let zdt = self.build(instant, zone_id, Resolution::Exact)?;
                self.verify(zdt, civil)
            }
            LocalResolution::Ambiguous { earlier, later } => {
                let chose_later = policy == FoldPolicy::Later;
                let chosen = if chose_later { later } else { earlier };
                debug!(zone = zone_id, %civil, ?policy, "resolved ambiguous local time");
                let resolution = Resolution::Ambiguous {
                    earlier,
                    later,
                    chose_later,
                };
                let zdt = self.build(chosen, zone_id, resolution)?;
                self.verify(zdt, civil)
            }
            LocalResolution::Gap {
                before,
                after,
                adjusted,
            } => {
                let gap_seconds = after.seconds() - before.seconds();
                debug!(zone = zone_id, %civil, gap_seconds, "shifted non-existent local time forward");
                let resolution = Resolution::Gap {
                    requested: *civil,
                    gap_seconds,
                };
                let zdt = self.build(adjusted, zone_id, resolution)?;
                if zdt.offset() != after {
                    return Err(EngineError::DstResolution(format!(
                        "'{zone_id}': {civil} moved across the gap lands at offset {}, expected {after}",
                        zdt.offset()
                    )));
                }
                Ok(zdt)
            }
        }
    }

    /// Resolve `civil`, and in a fold pick whichever candidate has
    /// `preferred` as its offset. Falls back to the earlier candidate when
    /// neither does.
    pub fn to_instant_preferring(
        &self,
        civil: &CivilDateTime,
        zone_id: &str,
        preferred: UtcOffset,
    ) -> Result<ZonedDateTime> {
        let earlier = self.to_instant_with(civil, zone_id, FoldPolicy::Earlier)?;
        if earlier.resolution().is_ambiguous() && earlier.offset() != preferred {
            let later = self.to_instant_with(civil, zone_id, FoldPolicy::Later)?;
            if later.offset() == preferred {
                return Ok(later);
            }
        }
        Ok(earlier)
    }

    /// For a value resolved out of a fold, the other candidate.
    pub fn alternative(&self, zdt: &ZonedDateTime) -> Result<Option<ZonedDateTime>> {
        match zdt.resolution() {
            Resolution::Ambiguous {
                earlier,
                later,
                chose_later,
            } => {
                let other = if chose_later { earlier } else { later };
                let resolution = Resolution::Ambiguous {
                    earlier,
                    later,
                    chose_later: !chose_later,
                };
                self.build(other, zdt.zone_id(), resolution).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Map `civil` onto the zone's timeline without applying a policy.
    ///
    /// Treats `civil` as UTC to get a first guess at the offset, then
    /// refines: at most three rule lookups decide between a unique match,
    /// a fold and a gap.
    ///
    /// # Errors
    ///
    /// [`EngineError::DstResolution`] if the offset search does not settle,
    /// which a well-formed rule table never causes.
    pub fn resolve(&self, civil: &CivilDateTime, zone_id: &str) -> Result<LocalResolution> {
        let local = Instant::from_naive_utc(&civil.naive())?;

        let first = self.first_guess(zone_id, local)?;
        let candidate = local.checked_sub_offset(first)?;
        let rule = self.db.rule_at(zone_id, candidate)?;
        trace!(zone = zone_id, %civil, guess = %first, refined = %rule.offset, "resolver pass 1");
        if rule.offset == first {
            return self.check_fold(zone_id, local, candidate, rule);
        }

        let second = rule.offset;
        let candidate = local.checked_sub_offset(second)?;
        let rule = self.db.rule_at(zone_id, candidate)?;
        trace!(zone = zone_id, %civil, guess = %second, refined = %rule.offset, "resolver pass 2");
        if rule.offset == second {
            return self.check_fold(zone_id, local, candidate, rule);
        }

        // The two offsets point at each other: the civil time is skipped.
        if rule.offset == first {
            let before = first.min(second);
            let after = first.max(second);
            let adjusted = local.checked_sub_offset(before)?;
            return Ok(LocalResolution::Gap {
                before,
                after,
                adjusted,
            });
        }

        Err(EngineError::DstResolution(format!(
            "'{zone_id}': offsets {first}, {second}, {} do not settle for {civil}",
            rule.offset
        )))
    }

    /// The offset in effect at `local` read as UTC. Near the edge of a
    /// table's coverage that reading can fall outside it while the real
    /// instant, at most a day away, is inside; the rule a day further in
    /// supplies the guess instead.
    fn first_guess(&self, zone_id: &str, local: Instant) -> Result<UtcOffset> {
        let err = match self.db.rule_at(zone_id, local) {
            Ok(rule) => return Ok(rule.offset),
            Err(e @ EngineError::NoRuleCoverage(_)) => e,
            Err(e) => return Err(e),
        };
        let day = i64::from(SECONDS_PER_DAY) * NANOS_PER_SECOND;
        for nearby in [local.checked_sub_nanos(day), local.checked_add_nanos(day)] {
            let Ok(nearby) = nearby else { continue };
            if let Some(rule) = self.neighbour(zone_id, nearby)? {
                trace!(zone = zone_id, %local, offset = %rule.offset, "first guess from coverage edge");
                return Ok(rule.offset);
            }
        }
        Err(err)
    }

    /// `candidate` is a valid instant for `local`; look at the neighbouring
    /// rules for a second one.
    fn check_fold(
        &self,
        zone_id: &str,
        local: Instant,
        candidate: Instant,
        rule: &TimezoneRule,
    ) -> Result<LocalResolution> {
        let mut earlier = candidate;
        let mut later = candidate;

        if rule.valid_from != Instant::MIN {
            let edge = rule.valid_from.checked_sub_nanos(1)?;
            if let Some(prev) = self.neighbour(zone_id, edge)? {
                if let Ok(alt) = local.checked_sub_offset(prev.offset) {
                    if prev.contains(alt) {
                        earlier = alt;
                    }
                }
            }
        }
        if !rule.is_open_ended() {
            if let Some(next) = self.neighbour(zone_id, rule.valid_until)? {
                if let Ok(alt) = local.checked_sub_offset(next.offset) {
                    if next.contains(alt) {
                        later = alt;
                    }
                }
            }
        }

        if earlier == later {
            Ok(LocalResolution::Unique { instant: candidate })
        } else {
            Ok(LocalResolution::Ambiguous { earlier, later })
        }
    }

    /// The rule at `instant`, or `None` past the edge of the zone's table.
    fn neighbour(&self, zone_id: &str, instant: Instant) -> Result<Option<&'db TimezoneRule>> {
        match self.db.rule_at(zone_id, instant) {
            Ok(rule) => Ok(Some(rule)),
            Err(EngineError::NoRuleCoverage(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn build(
        &self,
        instant: Instant,
        zone_id: &str,
        resolution: Resolution,
    ) -> Result<ZonedDateTime> {
        let rule = self.db.rule_at(zone_id, instant)?;
        ZonedDateTime::new(instant, zone_id, rule, resolution)
    }

    fn verify(&self, zdt: ZonedDateTime, requested: &CivilDateTime) -> Result<ZonedDateTime> {
        if zdt.civil() != *requested {
            return Err(EngineError::DstResolution(format!(
                "'{}': {requested} resolved to {}",
                zdt.zone_id(),
                zdt.civil()
            )));
        }
        Ok(zdt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tzdb::testing::{self, ZONE};
    use crate::tzdb::StaticDatabase;

    fn civil(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> CivilDateTime {
        CivilDateTime::new(y, mo, d, h, mi, 0, 0).unwrap()
    }

    fn at(secs: i64) -> Instant {
        Instant::from_unix_seconds(secs).unwrap()
    }

    fn db() -> StaticDatabase {
        testing::database()
    }

    #[test]
    fn test_unique_local_time() {
        let db = db();
        let resolver = DstResolver::new(&db);
        let zdt = resolver.to_instant(&civil(2024, 1, 15, 9, 30), ZONE).unwrap();
        // 09:30 EST = 14:30Z
        assert_eq!(zdt.instant(), at(1_705_329_000));
        assert_eq!(zdt.resolution(), Resolution::Exact);
        assert_eq!(zdt.abbreviation(), "EST");
    }

    #[test]
    fn test_resolve_reports_gap() {
        let db = db();
        let resolver = DstResolver::new(&db);
        let res = resolver.resolve(&civil(2024, 3, 10, 2, 30), ZONE).unwrap();
        assert_eq!(
            res,
            LocalResolution::Gap {
                before: UtcOffset::from_hours(-5).unwrap(),
                after: UtcOffset::from_hours(-4).unwrap(),
                adjusted: at(testing::SPRING + 1800),
            }
        );
    }

    #[test]
    fn test_gap_moves_forward_by_gap_size() {
        let db = db();
        let resolver = DstResolver::new(&db);
        let requested = civil(2024, 3, 10, 2, 30);
        let zdt = resolver.to_instant(&requested, ZONE).unwrap();
        assert_eq!(zdt.civil(), civil(2024, 3, 10, 3, 30));
        assert_eq!(zdt.offset().to_string(), "-04:00");
        assert_eq!(
            zdt.resolution(),
            Resolution::Gap {
                requested,
                gap_seconds: 3600
            }
        );
        // Later policy has no effect in a gap.
        let later = resolver.to_instant_later(&requested, ZONE).unwrap();
        assert_eq!(later, zdt);
    }

    #[test]
    fn test_fold_defaults_to_earlier() {
        let db = db();
        let resolver = DstResolver::new(&db);
        let zdt = resolver.to_instant(&civil(2024, 11, 3, 1, 30), ZONE).unwrap();
        assert_eq!(zdt.offset().to_string(), "-04:00");
        assert_eq!(zdt.instant(), at(testing::FALL - 1800));
        assert!(zdt.is_dst());
        match zdt.resolution() {
            Resolution::Ambiguous {
                earlier,
                later,
                chose_later,
            } => {
                assert_eq!(earlier, at(testing::FALL - 1800));
                assert_eq!(later, at(testing::FALL + 1800));
                assert!(!chose_later);
            }
            other => panic!("expected ambiguous, got {other:?}"),
        }
    }

    #[test]
    fn test_fold_later_and_alternative() {
        let db = db();
        let resolver = DstResolver::new(&db);
        let c = civil(2024, 11, 3, 1, 30);
        let later = resolver.to_instant_later(&c, ZONE).unwrap();
        assert_eq!(later.offset().to_string(), "-05:00");
        assert_eq!(later.civil(), c);

        let earlier = resolver.to_instant(&c, ZONE).unwrap();
        let alt = resolver.alternative(&earlier).unwrap().unwrap();
        assert_eq!(alt, later);
        assert_eq!(resolver.alternative(&alt).unwrap().unwrap(), earlier);
    }

    #[test]
    fn test_alternative_is_none_when_unambiguous() {
        let db = db();
        let resolver = DstResolver::new(&db);
        let zdt = resolver.to_instant(&civil(2024, 6, 1, 12, 0), ZONE).unwrap();
        assert!(resolver.alternative(&zdt).unwrap().is_none());
    }

    #[test]
    fn test_preferring_offset_in_fold() {
        let db = db();
        let resolver = DstResolver::new(&db);
        let c = civil(2024, 11, 3, 1, 0);
        let est = UtcOffset::from_hours(-5).unwrap();
        let zdt = resolver.to_instant_preferring(&c, ZONE, est).unwrap();
        assert_eq!(zdt.offset(), est);
        // Preference is ignored outside a fold.
        let plain = resolver
            .to_instant_preferring(&civil(2024, 6, 1, 1, 0), ZONE, est)
            .unwrap();
        assert_eq!(plain.offset().to_string(), "-04:00");
    }

    #[test]
    fn test_from_instant_and_convert() {
        let db = db();
        let resolver = DstResolver::new(&db);
        let zdt = resolver.from_instant(at(testing::FALL), ZONE).unwrap();
        assert_eq!(zdt.civil(), civil(2024, 11, 3, 1, 0));
        assert_eq!(zdt.abbreviation(), "EST");

        let tokyo = resolver.convert(&zdt, "Test/Tokyo").unwrap();
        assert_eq!(tokyo.instant(), zdt.instant());
        assert_eq!(tokyo.civil(), civil(2024, 11, 3, 15, 0));
    }

    #[test]
    fn test_errors_propagate() {
        let db = db();
        let resolver = DstResolver::new(&db);
        let err = resolver
            .to_instant(&civil(2024, 1, 1, 0, 0), "Nowhere/Land")
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownZone(_)));
        let err = resolver
            .to_instant(&civil(2019, 6, 1, 0, 0), ZONE)
            .unwrap_err();
        assert!(matches!(err, EngineError::NoRuleCoverage(_)));
    }

    #[test]
    fn test_civil_just_outside_coverage_resolves_to_covered_instant() {
        use crate::tzdb::RuleTable;

        let start = testing::START;
        let end = start + 10 * 86_400;
        let bounded = |zone: &str, hours: i32, until: Instant| {
            RuleTable::new(
                zone,
                vec![TimezoneRule {
                    valid_from: at(start),
                    valid_until: until,
                    offset: UtcOffset::from_hours(hours).unwrap(),
                    is_dst: false,
                    abbreviation: format!("{hours:+}"),
                }],
            )
            .unwrap()
        };
        let db = StaticDatabase::builder()
            .zone(bounded("Test/East", 9, at(end)))
            .zone(bounded("Test/West", -5, Instant::MAX))
            .build()
            .unwrap();
        let resolver = DstResolver::new(&db);

        // 05:00 on the day after the table ends is still 20:00Z the day before.
        let east = resolver
            .to_instant(&civil(2020, 1, 11, 5, 0), "Test/East")
            .unwrap();
        assert_eq!(east.instant(), at(end - 4 * 3600));

        // 22:00 on the eve of the first rule is already 03:00Z inside it.
        let west = resolver
            .to_instant(&civil(2019, 12, 31, 22, 0), "Test/West")
            .unwrap();
        assert_eq!(west.instant(), at(start + 3 * 3600));

        let err = resolver
            .to_instant(&civil(2020, 1, 11, 9, 0), "Test/East")
            .unwrap_err();
        assert!(matches!(err, EngineError::NoRuleCoverage(_)), "got: {err}");
    }

    /// A table whose offsets keep jumping makes the search fail cleanly.
    #[test]
    fn test_non_convergent_search_is_an_error() {
        use crate::tzdb::RuleTable;

        let hours = |h: i32| UtcOffset::from_hours(h).unwrap();
        let rule = |from: i64, until: Instant, h: i32| TimezoneRule {
            valid_from: at(from),
            valid_until: until,
            offset: hours(h),
            is_dst: false,
            abbreviation: format!("{h}"),
        };
        // Local noon on 1970-01-02 guesses +10, refines into the -10 rule,
        // whose candidate lands in the +5 rule.
        let table = RuleTable::new(
            "Test/Chaos",
            vec![
                rule(0, at(100_000), -10),
                rule(100_000, at(150_000), 10),
                rule(150_000, Instant::MAX, 5),
            ],
        )
        .unwrap();
        let db = StaticDatabase::builder().zone(table).build().unwrap();
        let resolver = DstResolver::new(&db);
        let err = resolver
            .resolve(&civil(1970, 1, 2, 12, 0), "Test/Chaos")
            .unwrap_err();
        assert!(matches!(err, EngineError::DstResolution(_)), "got: {err}");
    }
}
