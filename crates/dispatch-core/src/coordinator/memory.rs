//! In-memory collaborator implementations.
//!
//! Reference implementations of the collaborator contracts for tests and
//! single-node embeddings: a versioned incident map, a unit pool with
//! atomic reservation, and a recording event sink.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::allocation::{Unit, UnitAssignment, UnitId};
use crate::incident::{EmergencyType, Incident, PriorityLevel};
use crate::report::ReportNumber;

use super::collaborators::{
    EventSink, FleetError, FleetState, IncidentStore, StoreError, TransitionEvent,
};

/// Incident store backed by a versioned in-memory map.
#[derive(Debug, Default)]
pub struct InMemoryIncidentStore {
    incidents: RwLock<HashMap<ReportNumber, Incident>>,
}

impl InMemoryIncidentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored incidents.
    pub async fn len(&self) -> usize {
        self.incidents.read().await.len()
    }

    /// Returns `true` when no incident is stored.
    pub async fn is_empty(&self) -> bool {
        self.incidents.read().await.is_empty()
    }
}

#[async_trait]
impl IncidentStore for InMemoryIncidentStore {
    async fn load(&self, report_number: &ReportNumber) -> Result<Option<Incident>, StoreError> {
        Ok(self.incidents.read().await.get(report_number).cloned())
    }

    async fn save(&self, incident: &Incident) -> Result<(), StoreError> {
        let mut incidents = self.incidents.write().await;
        let report_number = incident.report_number().clone();

        if let Some(stored) = incidents.get(&report_number) {
            if stored.version() != incident.version() {
                return Err(StoreError::Conflict {
                    report_number,
                    expected: incident.version(),
                    stored: stored.version(),
                });
            }
        }

        let mut accepted = incident.clone();
        accepted.set_version(incident.version() + 1);
        incidents.insert(report_number, accepted);
        Ok(())
    }
}

/// Fleet state backed by an in-memory unit pool.
///
/// Reservation is read-modify-write under one write lock, so two
/// incidents can never both take the same unit.
#[derive(Debug, Default)]
pub struct InMemoryFleet {
    units: RwLock<HashMap<UnitId, Unit>>,
}

impl InMemoryFleet {
    /// Creates an empty fleet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a unit.
    pub async fn upsert_unit(&self, unit: Unit) {
        self.units.write().await.insert(unit.id.clone(), unit);
    }

    /// Snapshot of one unit, `None` when unknown.
    pub async fn unit(&self, unit_id: &UnitId) -> Option<Unit> {
        self.units.read().await.get(unit_id).cloned()
    }
}

#[async_trait]
impl FleetState for InMemoryFleet {
    async fn candidates(&self, _emergency_type: EmergencyType) -> Result<Vec<Unit>, FleetError> {
        // Over-report: the allocator applies the capability filter.
        Ok(self.units.read().await.values().cloned().collect())
    }

    async fn reserve(
        &self,
        unit_id: &UnitId,
        report_number: &ReportNumber,
        priority: PriorityLevel,
    ) -> Result<(), FleetError> {
        let mut units = self.units.write().await;
        let Some(unit) = units.get_mut(unit_id) else {
            return Err(FleetError::UnknownUnit {
                unit_id: unit_id.clone(),
            });
        };

        if !unit.available {
            return Err(FleetError::AlreadyReserved {
                unit_id: unit_id.clone(),
                held_by: unit.assignment.as_ref().map(|a| a.report_number.clone()),
            });
        }

        unit.available = false;
        unit.assignment = Some(UnitAssignment {
            report_number: report_number.clone(),
            priority,
            en_route: true,
        });
        Ok(())
    }

    async fn reassign(
        &self,
        unit_id: &UnitId,
        from: &ReportNumber,
        to: &ReportNumber,
        priority: PriorityLevel,
    ) -> Result<(), FleetError> {
        let mut units = self.units.write().await;
        let Some(unit) = units.get_mut(unit_id) else {
            return Err(FleetError::UnknownUnit {
                unit_id: unit_id.clone(),
            });
        };

        let holder = unit.assignment.as_ref().map(|a| a.report_number.clone());
        if holder.as_ref() != Some(from) {
            return Err(FleetError::AlreadyReserved {
                unit_id: unit_id.clone(),
                held_by: holder,
            });
        }

        unit.available = false;
        unit.assignment = Some(UnitAssignment {
            report_number: to.clone(),
            priority,
            en_route: true,
        });
        Ok(())
    }

    async fn release(
        &self,
        unit_id: &UnitId,
        report_number: &ReportNumber,
    ) -> Result<(), FleetError> {
        let mut units = self.units.write().await;
        let Some(unit) = units.get_mut(unit_id) else {
            return Err(FleetError::UnknownUnit {
                unit_id: unit_id.clone(),
            });
        };

        // A superseded holder must not free the unit from under the
        // incident it now serves.
        let held = unit
            .assignment
            .as_ref()
            .is_some_and(|a| &a.report_number == report_number);
        if held {
            unit.available = true;
            unit.assignment = None;
        }
        Ok(())
    }
}

/// Event sink that records everything it receives.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: RwLock<Vec<TransitionEvent>>,
}

impl RecordingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All events received so far, in delivery order.
    pub async fn events(&self) -> Vec<TransitionEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn emit(&self, event: TransitionEvent) {
        self.events.write().await.push(event);
    }
}
