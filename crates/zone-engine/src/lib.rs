//! # zone-engine
//!
//! Timezone-aware temporal arithmetic.
//!
//! The engine represents instants, binds them to IANA zones, and performs
//! calendar arithmetic that stays correct across daylight saving time
//! transitions, variable month lengths and leap years. Civil times that a
//! transition skips or repeats are resolved by an explicit, inspectable
//! policy instead of failing or silently guessing.
//!
//! ## Modules
//!
//! - [`instant`] — `Instant` (nanoseconds since the Unix epoch) and `UtcOffset`
//! - [`civil`] — `CivilDateTime`, validated calendar/clock fields with no zone
//! - [`tzdb`] — The `TimezoneDatabase` contract, rule tables and a static provider
//! - [`bundled`] — `BundledDatabase`, rule tables derived from chrono-tz's IANA data
//! - [`zoned`] — `ZonedDateTime`, an instant with its zone, offset and civil fields
//! - [`resolver`] — `DstResolver`, civil ⇄ instant with fold and gap handling
//! - [`calendar`] — `Calendar`: shift, floor, ceil, span, replace, business days
//! - [`range`] — Lazy ranges of zoned values and of spans
//! - [`error`] — Error types
//!
//! The database is always passed in; nothing here reads a global zone
//! registry or the system clock.

pub mod bundled;
pub mod calendar;
pub mod civil;
pub mod error;
pub mod instant;
pub mod range;
pub mod resolver;
pub mod tzdb;
pub mod zoned;

pub use bundled::BundledDatabase;
pub use calendar::{Calendar, EngineOptions, Unit, WeekStartDay};
pub use civil::{days_in_month, is_leap_year, CivilDateTime, CivilFields};
pub use error::{EngineError, Result};
pub use instant::{Instant, UtcOffset};
pub use range::{SpanRange, ZonedRange};
pub use resolver::{DstResolver, FoldPolicy, LocalResolution};
pub use tzdb::{RuleTable, StaticDatabase, TimezoneDatabase, TimezoneRule, ZoneKey};
pub use zoned::{Resolution, ZonedDateTime};
