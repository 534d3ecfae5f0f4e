//! The engine's central value: an instant bound to a zone.

use std::fmt;

use serde::Serialize;

use crate::civil::CivilDateTime;
use crate::error::Result;
use crate::instant::{Instant, UtcOffset};
use crate::tzdb::TimezoneRule;

/// How a [`ZonedDateTime`] came out of civil → instant resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    /// Built from an instant, or from a civil time with exactly one match.
    Exact,
    /// The civil time occurred twice (fall-back). Both instants are kept;
    /// `chose_later` says which one this value holds.
    Ambiguous {
        earlier: Instant,
        later: Instant,
        chose_later: bool,
    },
    /// The civil time was skipped (spring-forward). The value was moved
    /// forward by `gap_seconds`, so its civil fields are later than
    /// `requested`.
    Gap {
        requested: CivilDateTime,
        gap_seconds: i32,
    },
}

impl Resolution {
    /// True when the civil fields differ from what was asked for.
    pub fn is_adjusted(&self) -> bool {
        matches!(self, Resolution::Gap { .. })
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Resolution::Ambiguous { .. })
    }
}

/// An instant paired with a zone, its offset there and the resulting
/// civil fields.
///
/// `civil` is always `instant + offset`, and `offset` is always what the
/// database reports for `zone_id` at `instant`. Values are only produced by
/// [`crate::DstResolver`] (directly or through [`crate::Calendar`]), and
/// every operation returns a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZonedDateTime {
    instant: Instant,
    zone_id: String,
    offset: UtcOffset,
    civil: CivilDateTime,
    is_dst: bool,
    abbreviation: String,
    resolution: Resolution,
}

impl ZonedDateTime {
    pub(crate) fn new(
        instant: Instant,
        zone_id: &str,
        rule: &TimezoneRule,
        resolution: Resolution,
    ) -> Result<Self> {
        let civil = instant.checked_add_offset(rule.offset)?.to_naive_utc()?;
        Ok(ZonedDateTime {
            instant,
            zone_id: zone_id.to_string(),
            offset: rule.offset,
            civil: CivilDateTime::from_naive(civil),
            is_dst: rule.is_dst,
            abbreviation: rule.abbreviation.clone(),
            resolution,
        })
    }

    pub fn instant(&self) -> Instant {
        self.instant
    }

    pub fn zone_id(&self) -> &str {
        &self.zone_id
    }

    pub fn offset(&self) -> UtcOffset {
        self.offset
    }

    pub fn civil(&self) -> CivilDateTime {
        self.civil
    }

    pub fn year(&self) -> i32 {
        self.civil.year()
    }

    pub fn month(&self) -> u32 {
        self.civil.month()
    }

    pub fn day(&self) -> u32 {
        self.civil.day()
    }

    pub fn hour(&self) -> u32 {
        self.civil.hour()
    }

    pub fn minute(&self) -> u32 {
        self.civil.minute()
    }

    pub fn second(&self) -> u32 {
        self.civil.second()
    }

    pub fn nanosecond(&self) -> u32 {
        self.civil.nanosecond()
    }

    /// Whether daylight saving time is in effect at this instant.
    pub fn is_dst(&self) -> bool {
        self.is_dst
    }

    /// Zone abbreviation in effect, e.g. "EST".
    pub fn abbreviation(&self) -> &str {
        &self.abbreviation
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Shorthand for `self.resolution().is_adjusted()`.
    pub fn is_adjusted(&self) -> bool {
        self.resolution.is_adjusted()
    }

    /// The second occurrence of this civil time, when this value was
    /// resolved from a fold and holds the first one.
    pub fn later_alternative(&self) -> Option<Instant> {
        match self.resolution {
            Resolution::Ambiguous {
                later,
                chose_later: false,
                ..
            } => Some(later),
            _ => None,
        }
    }
}

/// `2024-03-10T03:30:00-04:00[America/New_York]`
impl fmt::Display for ZonedDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}[{}]", self.civil, self.offset, self.zone_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(hours: i32, is_dst: bool, abbr: &str) -> TimezoneRule {
        TimezoneRule {
            valid_from: Instant::MIN,
            valid_until: Instant::MAX,
            offset: UtcOffset::from_hours(hours).unwrap(),
            is_dst,
            abbreviation: abbr.to_string(),
        }
    }

    #[test]
    fn test_civil_is_instant_plus_offset() {
        // 2024-03-10T07:30:00Z at -04:00
        let instant = Instant::from_unix_seconds(1_710_055_800).unwrap();
        let zdt =
            ZonedDateTime::new(instant, "Fixed/EDT", &rule(-4, true, "EDT"), Resolution::Exact)
                .unwrap();
        assert_eq!(zdt.civil().to_string(), "2024-03-10T03:30:00");
        assert_eq!(zdt.offset().to_string(), "-04:00");
        assert!(zdt.is_dst());
        assert_eq!(zdt.abbreviation(), "EDT");
        assert_eq!(zdt.to_string(), "2024-03-10T03:30:00-04:00[Fixed/EDT]");
    }

    #[test]
    fn test_resolution_flags() {
        let requested = CivilDateTime::new(2024, 3, 10, 2, 30, 0, 0).unwrap();
        let gap = Resolution::Gap {
            requested,
            gap_seconds: 3600,
        };
        assert!(gap.is_adjusted());
        assert!(!gap.is_ambiguous());
        assert!(!Resolution::Exact.is_adjusted());
    }

    #[test]
    fn test_later_alternative_only_for_first_occurrence() {
        let earlier = Instant::from_unix_seconds(100).unwrap();
        let later = Instant::from_unix_seconds(3700).unwrap();
        let make = |chose_later| {
            ZonedDateTime::new(
                if chose_later { later } else { earlier },
                "Fixed/EDT",
                &rule(-4, true, "EDT"),
                Resolution::Ambiguous {
                    earlier,
                    later,
                    chose_later,
                },
            )
            .unwrap()
        };
        assert_eq!(make(false).later_alternative(), Some(later));
        assert_eq!(make(true).later_alternative(), None);
    }

    #[test]
    fn test_serializes_to_json() {
        let zdt = ZonedDateTime::new(
            Instant::UNIX_EPOCH,
            "Fixed/JST",
            &rule(9, false, "JST"),
            Resolution::Exact,
        )
        .unwrap();
        let json = serde_json::to_value(&zdt).unwrap();
        assert_eq!(json["zone_id"], "Fixed/JST");
        assert_eq!(json["offset"], 32_400);
        assert_eq!(json["instant"], 0);
        assert_eq!(json["resolution"]["kind"], "exact");
    }
}
