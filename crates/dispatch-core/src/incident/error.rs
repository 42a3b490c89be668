//! Incident lifecycle and intake error types.

use thiserror::Error;

use super::state::IncidentStatus;

/// Semantically invalid operations on an otherwise valid incident.
///
/// Both variants carry the current and requested status so callers can
/// decide between retry and abort without reloading the incident.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IncidentError {
    /// The requested transition is absent from the transition table.
    #[error("cannot change status from {current} to {requested}: illegal transition")]
    IllegalTransition {
        /// Status the incident is currently in.
        current: IncidentStatus,
        /// Status the caller asked for.
        requested: IncidentStatus,
    },

    /// The incident is in a terminal state and accepts no further changes.
    #[error("cannot change status from {current} to {requested}: incident is closed")]
    IncidentClosed {
        /// The terminal status the incident is in.
        current: IncidentStatus,
        /// Status the caller asked for.
        requested: IncidentStatus,
    },
}

/// Malformed intake fields, rejected before any state is created.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    /// A required field was empty or missing.
    #[error("{field} is required")]
    MissingField {
        /// Name of the offending field.
        field: &'static str,
    },

    /// The caller phone number does not match `^\+?[1-9]\d{1,14}$`.
    #[error("invalid phone number format: '{value}'")]
    InvalidPhone {
        /// The rejected input.
        value: String,
    },

    /// A latitude/longitude pair outside the valid coordinate range.
    #[error("coordinates out of range: ({latitude}, {longitude})")]
    CoordinatesOutOfRange {
        /// Rejected latitude.
        latitude: f64,
        /// Rejected longitude.
        longitude: f64,
    },
}
