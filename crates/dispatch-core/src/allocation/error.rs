//! Allocation error types.

use thiserror::Error;

use crate::incident::EmergencyType;
use crate::report::ReportNumber;

use super::unit::UnitId;

/// Why an allocation attempt produced no committed decision.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AllocationError {
    /// No qualifying unit exists right now.
    ///
    /// An operational/capacity condition, not a logic violation: the
    /// coordinator escalates (queue, widen search, alert) rather than
    /// rejecting the incident.
    #[error("no unit available for {emergency_type} ({considered} candidates considered)")]
    NoUnitAvailable {
        /// Emergency type that could not be served.
        emergency_type: EmergencyType,
        /// How many candidate units were examined before filtering.
        considered: usize,
    },

    /// The only qualifying unit is en route to another incident, and the
    /// caller has not confirmed displacing it.
    ///
    /// Pre-emption is never silent; the caller must acknowledge that the
    /// displaced incident needs re-dispatch before this unit is taken.
    #[error("unit {unit_id} can only be allocated by pre-empting {displaced_report}; confirmation required")]
    PreemptionRequiresConfirmation {
        /// The unit that would be pulled off its current incident.
        unit_id: UnitId,
        /// The incident that would lose its unit.
        displaced_report: ReportNumber,
    },
}
