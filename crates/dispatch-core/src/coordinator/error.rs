//! Coordinator error taxonomy.
//!
//! Every failure the coordinator can surface, each machine-
//! distinguishable so transport layers can map kinds to their own status
//! codes without parsing messages.

use thiserror::Error;

use crate::allocation::AllocationError;
use crate::incident::{IncidentError, ValidationError};
use crate::report::{GenerationError, ReportNumber};

use super::collaborators::{FleetError, StoreError};

/// Failures surfaced by [`DispatchCoordinator`](super::DispatchCoordinator).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DispatchError {
    /// Malformed intake fields; rejected before any state was created.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The operation referenced an unknown incident.
    #[error("incident not found: {report_number}")]
    NotFound {
        /// The unresolved report number.
        report_number: ReportNumber,
    },

    /// Semantically invalid operation: illegal transition or a mutation of
    /// a closed incident.
    #[error(transparent)]
    Business(#[from] IncidentError),

    /// Allocation policy outcome that blocks dispatch: no qualifying unit,
    /// or an unconfirmed pre-emption.
    #[error(transparent)]
    Allocation(#[from] AllocationError),

    /// The identifier generator failed.
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// A transition race was lost and the single retry did not resolve it.
    #[error("concurrent update on {report_number}; transition lost the race")]
    ConcurrencyConflict {
        /// The contended incident.
        report_number: ReportNumber,
    },

    /// The persistence collaborator failed for a non-conflict reason.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The fleet-state collaborator failed.
    #[error(transparent)]
    Fleet(#[from] FleetError),

    /// The caller's cancellation signal fired before the operation
    /// committed; no state was changed.
    #[error("operation cancelled before commit")]
    Cancelled,
}
