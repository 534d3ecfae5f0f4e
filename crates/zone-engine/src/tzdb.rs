//! The timezone database contract and an in-memory rule-table provider.
//!
//! A zone is described by a [`RuleTable`]: an ordered, contiguous list of
//! [`TimezoneRule`]s, each saying which UTC offset applies between two
//! instants. Everything in the engine that needs offsets goes through the
//! [`TimezoneDatabase`] trait, which is injected rather than global.
//!
//! [`StaticDatabase`] holds pre-built tables in an arena indexed by an
//! interned [`ZoneKey`]. It is read-only once built, which makes it the
//! natural choice for synthetic zones in tests. Real IANA zones come from
//! [`crate::bundled::BundledDatabase`].

use std::collections::HashMap;

use serde::Serialize;

use crate::civil::CivilDateTime;
use crate::error::{EngineError, Result};
use crate::instant::{Instant, UtcOffset};

/// One row of a zone's transition table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimezoneRule {
    /// First instant this rule applies to (inclusive).
    pub valid_from: Instant,
    /// First instant this rule no longer applies to (exclusive).
    /// [`Instant::MAX`] marks an open-ended rule.
    pub valid_until: Instant,
    pub offset: UtcOffset,
    pub is_dst: bool,
    pub abbreviation: String,
}

impl TimezoneRule {
    pub fn contains(&self, instant: Instant) -> bool {
        self.valid_from <= instant && (instant < self.valid_until || self.is_open_ended())
    }

    pub fn is_open_ended(&self) -> bool {
        self.valid_until == Instant::MAX
    }
}

/// Read-only queries the engine needs from a timezone data source.
///
/// Rules are borrowed from the provider; the engine never keeps them past
/// a single lookup.
pub trait TimezoneDatabase: Send + Sync {
    /// The rule in effect for `zone_id` at `instant`.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownZone`] if the zone is not known and
    /// [`EngineError::NoRuleCoverage`] if `instant` is outside the zone's
    /// table.
    fn rule_at(&self, zone_id: &str, instant: Instant) -> Result<&TimezoneRule>;

    /// UTC instants at which the zone's offset changes during the local
    /// calendar year `year`. Empty for zones without transitions.
    fn transitions_in(&self, zone_id: &str, year: i32) -> Result<Vec<Instant>>;

    /// Whether `zone_id` names a zone this database knows.
    fn contains(&self, zone_id: &str) -> bool;
}

// ── RuleTable ───────────────────────────────────────────────────────────────

/// An immutable, validated transition table for one zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTable {
    zone_id: String,
    rules: Vec<TimezoneRule>,
}

impl RuleTable {
    /// Build a table, checking that rules are non-empty, ordered,
    /// non-overlapping and contiguous.
    pub fn new(zone_id: impl Into<String>, rules: Vec<TimezoneRule>) -> Result<Self> {
        let zone_id = zone_id.into();
        if rules.is_empty() {
            return Err(EngineError::InvalidRuleTable(format!("'{zone_id}' has no rules")));
        }
        for rule in &rules {
            if rule.valid_from >= rule.valid_until {
                return Err(EngineError::InvalidRuleTable(format!(
                    "'{zone_id}': rule starting {} is empty",
                    rule.valid_from
                )));
            }
        }
        for pair in rules.windows(2) {
            if pair[0].valid_until != pair[1].valid_from {
                return Err(EngineError::InvalidRuleTable(format!(
                    "'{zone_id}': rule ending {} is not followed by a rule starting there",
                    pair[0].valid_until
                )));
            }
        }
        Ok(RuleTable { zone_id, rules })
    }

    /// A single open-ended rule covering every representable instant.
    pub fn fixed(
        zone_id: impl Into<String>,
        offset: UtcOffset,
        abbreviation: impl Into<String>,
    ) -> Self {
        RuleTable {
            zone_id: zone_id.into(),
            rules: vec![TimezoneRule {
                valid_from: Instant::MIN,
                valid_until: Instant::MAX,
                offset,
                is_dst: false,
                abbreviation: abbreviation.into(),
            }],
        }
    }

    pub fn zone_id(&self) -> &str {
        &self.zone_id
    }

    pub fn rules(&self) -> &[TimezoneRule] {
        &self.rules
    }

    pub fn rule_at(&self, instant: Instant) -> Result<&TimezoneRule> {
        // Index of the first rule starting after `instant`.
        let idx = self.rules.partition_point(|r| r.valid_from <= instant);
        let rule = idx
            .checked_sub(1)
            .and_then(|i| self.rules.get(i))
            .filter(|r| r.contains(instant))
            .ok_or_else(|| {
                EngineError::NoRuleCoverage(format!("'{}' has no rule at {}", self.zone_id, instant))
            })?;
        Ok(rule)
    }

    /// Transition instants whose local date, under the offset in force just
    /// before the change, falls in `year`.
    pub fn transitions_in(&self, year: i32) -> Vec<Instant> {
        self.rules
            .windows(2)
            .filter(|pair| local_year(pair[1].valid_from, pair[0].offset) == Some(year))
            .map(|pair| pair[1].valid_from)
            .collect()
    }
}

fn local_year(instant: Instant, offset: UtcOffset) -> Option<i32> {
    let local = instant.checked_add_offset(offset).ok()?;
    let naive = local.to_naive_utc().ok()?;
    Some(CivilDateTime::from_naive(naive).year())
}

// ── StaticDatabase ──────────────────────────────────────────────────────────

/// Interned handle to a zone's slot in a [`StaticDatabase`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ZoneKey(u32);

/// A read-only database over pre-built rule tables.
#[derive(Debug, Clone, Default)]
pub struct StaticDatabase {
    tables: Vec<RuleTable>,
    keys: HashMap<String, ZoneKey>,
}

impl StaticDatabase {
    pub fn builder() -> StaticDatabaseBuilder {
        StaticDatabaseBuilder::default()
    }

    pub fn key(&self, zone_id: &str) -> Option<ZoneKey> {
        self.keys.get(zone_id).copied()
    }

    /// The table behind `key`, or `None` for a key issued by another
    /// database.
    pub fn table(&self, key: ZoneKey) -> Option<&RuleTable> {
        self.tables.get(key.0 as usize)
    }

    fn lookup(&self, zone_id: &str) -> Result<&RuleTable> {
        self.key(zone_id)
            .and_then(|key| self.table(key))
            .ok_or_else(|| EngineError::UnknownZone(format!("'{zone_id}'")))
    }
}

impl TimezoneDatabase for StaticDatabase {
    fn rule_at(&self, zone_id: &str, instant: Instant) -> Result<&TimezoneRule> {
        self.lookup(zone_id)?.rule_at(instant)
    }

    fn transitions_in(&self, zone_id: &str, year: i32) -> Result<Vec<Instant>> {
        Ok(self.lookup(zone_id)?.transitions_in(year))
    }

    fn contains(&self, zone_id: &str) -> bool {
        self.keys.contains_key(zone_id)
    }
}

/// Collects tables for a [`StaticDatabase`]. A later table with the same
/// zone id replaces the earlier one.
#[derive(Debug, Default)]
pub struct StaticDatabaseBuilder {
    tables: Vec<RuleTable>,
}

impl StaticDatabaseBuilder {
    pub fn zone(mut self, table: RuleTable) -> Self {
        self.tables.push(table);
        self
    }

    pub fn build(self) -> Result<StaticDatabase> {
        let mut db = StaticDatabase::default();
        for table in self.tables {
            if let Some(key) = db.keys.get(table.zone_id()) {
                db.tables[key.0 as usize] = table;
                continue;
            }
            let key = u32::try_from(db.tables.len())
                .map(ZoneKey)
                .map_err(|_| EngineError::InvalidRuleTable("too many zones".to_string()))?;
            db.keys.insert(table.zone_id().to_string(), key);
            db.tables.push(table);
        }
        Ok(db)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! A synthetic zone shaped like US Eastern time in 2024, for tests that
    //! must not depend on the bundled IANA data.

    use super::*;

    pub(crate) const ZONE: &str = "Test/Eastern";

    /// 2024-03-10T07:00:00Z, local 02:00 EST → 03:00 EDT.
    pub(crate) const SPRING: i64 = 1_710_054_000;
    /// 2024-11-03T06:00:00Z, local 02:00 EDT → 01:00 EST.
    pub(crate) const FALL: i64 = 1_730_613_600;
    /// 2020-01-01T00:00:00Z, the table's lower bound.
    pub(crate) const START: i64 = 1_577_836_800;

    fn rule(from: Instant, until: Instant, hours: i32, is_dst: bool, abbr: &str) -> TimezoneRule {
        TimezoneRule {
            valid_from: from,
            valid_until: until,
            offset: UtcOffset::from_hours(hours).unwrap(),
            is_dst,
            abbreviation: abbr.to_string(),
        }
    }

    pub(crate) fn eastern_2024() -> RuleTable {
        let start = Instant::from_unix_seconds(START).unwrap();
        let spring = Instant::from_unix_seconds(SPRING).unwrap();
        let fall = Instant::from_unix_seconds(FALL).unwrap();
        RuleTable::new(
            ZONE,
            vec![
                rule(start, spring, -5, false, "EST"),
                rule(spring, fall, -4, true, "EDT"),
                rule(fall, Instant::MAX, -5, false, "EST"),
            ],
        )
        .unwrap()
    }

    pub(crate) fn database() -> StaticDatabase {
        StaticDatabase::builder()
            .zone(eastern_2024())
            .zone(RuleTable::fixed("Test/Tokyo", UtcOffset::from_hours(9).unwrap(), "JST"))
            .build()
            .unwrap()
    }
}
