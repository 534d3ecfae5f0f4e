//! Lazy sequences of zoned values at a fixed calendar step.

use crate::calendar::{Calendar, Unit};
use crate::error::{EngineError, Result};
use crate::instant::Instant;
use crate::zoned::ZonedDateTime;

impl<'db> Calendar<'db> {
    /// `start, start + 1 unit, start + 2 units, …` up to and including
    /// `end`.
    ///
    /// Each term is computed from `start` rather than from the previous
    /// term, so month steps from January 31 give February 29, March 31,
    /// April 30 and so on. The iterator holds no shared state; cloning it
    /// or calling `range` again with the same arguments yields the same
    /// sequence.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidRange`] if `start` is after `end`.
    ///
    /// # Examples
    ///
    /// ```
    /// use zone_engine::{BundledDatabase, Calendar, CivilDateTime, Unit};
    ///
    /// let db = BundledDatabase::new();
    /// let cal = Calendar::new(&db);
    /// let zone = "America/New_York";
    /// let start = cal.from_civil(&CivilDateTime::date(2024, 3, 9).unwrap(), zone).unwrap();
    /// let end = cal.from_civil(&CivilDateTime::date(2024, 3, 12).unwrap(), zone).unwrap();
    ///
    /// let days: Vec<_> = cal.range(Unit::Day, &start, &end).unwrap()
    ///     .collect::<Result<_, _>>()
    ///     .unwrap();
    /// assert_eq!(days.len(), 4);
    /// assert!(days.iter().all(|d| d.hour() == 0));
    /// ```
    pub fn range(
        &self,
        unit: Unit,
        start: &ZonedDateTime,
        end: &ZonedDateTime,
    ) -> Result<ZonedRange<'db>> {
        if start.instant() > end.instant() {
            return Err(EngineError::InvalidRange(format!("{start} is after {end}")));
        }
        Ok(ZonedRange {
            calendar: *self,
            unit,
            start: start.clone(),
            end: end.instant(),
            index: 0,
            done: false,
        })
    }

    /// The spans of every `unit` window from the one containing `start` to
    /// the one containing `end`.
    pub fn span_range(
        &self,
        unit: Unit,
        start: &ZonedDateTime,
        end: &ZonedDateTime,
    ) -> Result<SpanRange<'db>> {
        let first = self.floor(start, unit)?;
        let terms = self.range(unit, &first, end)?;
        Ok(SpanRange { terms })
    }
}

/// Iterator returned by [`Calendar::range`].
///
/// Yields `Err` at most once, then stops.
#[derive(Clone)]
pub struct ZonedRange<'db> {
    calendar: Calendar<'db>,
    unit: Unit,
    start: ZonedDateTime,
    end: Instant,
    index: i64,
    done: bool,
}

impl Iterator for ZonedRange<'_> {
    type Item = Result<ZonedDateTime>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let term = match self.calendar.shift(&self.start, self.index, self.unit) {
            Ok(term) => term,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };
        if term.instant() > self.end {
            self.done = true;
            return None;
        }
        match self.index.checked_add(1) {
            Some(next) => self.index = next,
            None => self.done = true,
        }
        Some(Ok(term))
    }
}

/// Iterator returned by [`Calendar::span_range`].
#[derive(Clone)]
pub struct SpanRange<'db> {
    terms: ZonedRange<'db>,
}

impl Iterator for SpanRange<'_> {
    type Item = Result<(ZonedDateTime, ZonedDateTime)>;

    fn next(&mut self) -> Option<Self::Item> {
        let term = match self.terms.next()? {
            Ok(term) => term,
            Err(e) => return Some(Err(e)),
        };
        let span = self.terms.calendar.span(&term, self.terms.unit);
        if span.is_err() {
            self.terms.done = true;
        }
        Some(span)
    }
}
