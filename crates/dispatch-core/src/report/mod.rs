//! Report numbers and their generator.
//!
//! A report number is the public identity of an incident, formatted as
//! `ER-<14-digit-UTC-timestamp>-<4-char-base36-suffix>`, for example
//! `ER-20241201143000-A1B2`. The timestamp prefix makes identifiers sort
//! by intake time; the suffix disambiguates reports received within the
//! same second.
//!
//! [`ReportIdGenerator`] guarantees that the suffix never repeats for the
//! same timestamp second within one process. Across processes the
//! collision-avoidance bound is 1 − 36⁻⁴ (≈ 99.998%) per second; callers
//! that need cross-process uniqueness must back this with a storage-layer
//! uniqueness constraint.

mod generator;

#[cfg(test)]
mod tests;

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use generator::{GenerationError, ReportIdGenerator};

/// Pattern every report number must match.
static REPORT_NUMBER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ER-\d{14}-[A-Z0-9]{4}$").expect("report number regex is valid"));

/// Format of the embedded UTC timestamp.
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// A validated incident report number.
///
/// Construction always goes through validation ([`FromStr`] or
/// [`ReportIdGenerator::next`]), so holding a `ReportNumber` implies the
/// string is well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReportNumber(String);

impl ReportNumber {
    /// Returns the report number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the intake second encoded in the identifier.
    #[must_use]
    pub fn issued_at(&self) -> DateTime<Utc> {
        // The constructor guarantees 14 digits in the timestamp field.
        let digits = &self.0[3..17];
        NaiveDateTime::parse_from_str(digits, TIMESTAMP_FORMAT)
            .map(|naive| naive.and_utc())
            .unwrap_or_default()
    }

    /// Builds a report number from pre-validated parts.
    ///
    /// Only the generator calls this; the parts are formatted to match
    /// [`REPORT_NUMBER_PATTERN`] by construction.
    pub(crate) fn from_parts(timestamp: &str, suffix: &str) -> Self {
        Self(format!("ER-{timestamp}-{suffix}"))
    }
}

impl fmt::Display for ReportNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ReportNumber {
    type Err = ReportNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if REPORT_NUMBER_PATTERN.is_match(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(ReportNumberError::InvalidFormat {
                value: s.to_string(),
            })
        }
    }
}

impl TryFrom<String> for ReportNumber {
    type Error = ReportNumberError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReportNumber> for String {
    fn from(value: ReportNumber) -> Self {
        value.0
    }
}

/// Errors produced when parsing a report number.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReportNumberError {
    /// The string does not match `ER-\d{14}-[A-Z0-9]{4}`.
    #[error("invalid report number format: '{value}'")]
    InvalidFormat {
        /// The rejected input.
        value: String,
    },
}
