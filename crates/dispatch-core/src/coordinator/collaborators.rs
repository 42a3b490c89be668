//! Contracts for the external collaborators the coordinator drives.
//!
//! The core depends on exactly these seams and no storage or messaging
//! technology: a persistence collaborator with optimistic concurrency, a
//! fleet-state collaborator whose view is only trusted for a single
//! allocation attempt, and an event sink that receives exactly one event
//! per accepted transition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::allocation::{Unit, UnitId};
use crate::incident::{EmergencyType, Incident, IncidentStatus, PriorityLevel};
use crate::report::ReportNumber;

/// Persistence collaborator failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Optimistic-concurrency mismatch: someone else saved the incident
    /// since it was loaded. Equivalent to a lost transition race.
    #[error("version conflict on {report_number}: expected {expected}, stored {stored}")]
    Conflict {
        /// The contended incident.
        report_number: ReportNumber,
        /// Version the caller saved from.
        expected: u64,
        /// Version actually in the store.
        stored: u64,
    },

    /// The storage backend could not serve the request.
    #[error("incident store unavailable: {message}")]
    Unavailable {
        /// Backend-provided detail.
        message: String,
    },
}

/// Load/store interface over incident persistence.
///
/// `save` must compare the incident's version against the stored version
/// and fail with [`StoreError::Conflict`] on mismatch; on success the
/// stored version is incremented. The core assumes no caching policy.
#[async_trait]
pub trait IncidentStore: Send + Sync {
    /// Loads an incident by report number, `None` when unknown.
    async fn load(&self, report_number: &ReportNumber) -> Result<Option<Incident>, StoreError>;

    /// Persists an incident, enforcing optimistic concurrency.
    async fn save(&self, incident: &Incident) -> Result<(), StoreError>;
}

/// Fleet-state collaborator failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FleetError {
    /// The referenced unit is not in the fleet.
    #[error("unknown unit: {unit_id}")]
    UnknownUnit {
        /// The unresolved unit id.
        unit_id: UnitId,
    },

    /// The unit was reserved by another incident first.
    #[error("unit {unit_id} already reserved")]
    AlreadyReserved {
        /// The contended unit.
        unit_id: UnitId,
        /// The incident holding it, when the backend knows.
        held_by: Option<ReportNumber>,
    },

    /// The fleet backend could not serve the request.
    #[error("fleet state unavailable: {message}")]
    Unavailable {
        /// Backend-provided detail.
        message: String,
    },
}

/// View of current unit availability, plus atomic assignment changes.
///
/// `reserve` and `reassign` are the read-modify-write points shared
/// across incidents: two incidents must never both hold the same unit, so
/// implementations make each of them atomic per unit (a lock or a
/// transactional update).
#[async_trait]
pub trait FleetState: Send + Sync {
    /// Snapshot of units that might serve `emergency_type`.
    ///
    /// Implementations may over-report (the allocator re-filters); they
    /// must include current location, availability and assignment state.
    async fn candidates(&self, emergency_type: EmergencyType) -> Result<Vec<Unit>, FleetError>;

    /// Atomically marks an available unit as committed to an incident.
    async fn reserve(
        &self,
        unit_id: &UnitId,
        report_number: &ReportNumber,
        priority: PriorityLevel,
    ) -> Result<(), FleetError>;

    /// Atomically moves a unit from the incident `from` to the incident
    /// `to` in one step, so no third incident can take the unit in
    /// between.
    ///
    /// Fails with [`FleetError::AlreadyReserved`] when `from` does not
    /// currently hold the unit (the caller's view was stale).
    async fn reassign(
        &self,
        unit_id: &UnitId,
        from: &ReportNumber,
        to: &ReportNumber,
        priority: PriorityLevel,
    ) -> Result<(), FleetError>;

    /// Returns a unit to the available pool, provided `report_number`
    /// still holds it.
    ///
    /// A release from a superseded holder (one whose unit was reassigned
    /// away) is a no-op, never a displacement of the current holder.
    async fn release(
        &self,
        unit_id: &UnitId,
        report_number: &ReportNumber,
    ) -> Result<(), FleetError>;
}

/// One accepted status transition, for downstream consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionEvent {
    /// The incident that moved.
    pub report_number: ReportNumber,
    /// Status before.
    pub from: IncidentStatus,
    /// Status after.
    pub to: IncidentStatus,
    /// When the transition was accepted.
    pub at: DateTime<Utc>,
}

/// Receives exactly one event per accepted transition, none for rejected
/// ones. Delivery guarantees are the implementation's concern.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Delivers one transition event.
    async fn emit(&self, event: TransitionEvent);
}
