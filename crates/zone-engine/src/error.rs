//! Error types for zone-engine operations.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Unknown zone: {0}")]
    UnknownZone(String),

    #[error("No rule coverage: {0}")]
    NoRuleCoverage(String),

    #[error("DST resolution error: {0}")]
    DstResolution(String),

    #[error("Invalid unit: {0}")]
    InvalidUnit(String),

    #[error("Range overflow: {0}")]
    RangeOverflow(String),

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Invalid civil datetime: {0}")]
    InvalidCivilDateTime(String),

    #[error("Invalid rule table: {0}")]
    InvalidRuleTable(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
