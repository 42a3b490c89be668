//! Read-only views of responding units.
//!
//! Units are owned by the fleet-state collaborator; this core only reads
//! snapshots of them while making an allocation decision and never assumes
//! a snapshot stays accurate beyond that single attempt.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;
use crate::incident::{EmergencyType, PriorityLevel};
use crate::report::ReportNumber;

/// Identifier of a responding unit. Ordering is the allocator tie-break.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(pub String);

impl UnitId {
    /// Creates a unit id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Travel-speed assumptions for a unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedProfile {
    /// Average door-to-door speed in km/h.
    pub average_speed_kmh: f64,
}

impl Default for SpeedProfile {
    fn default() -> Self {
        Self {
            average_speed_kmh: 60.0,
        }
    }
}

/// The incident a busy unit is currently committed to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitAssignment {
    /// Report number of the incident holding the unit.
    pub report_number: ReportNumber,
    /// Priority of that incident.
    pub priority: PriorityLevel,
    /// Whether the unit is still travelling (pre-emption is only
    /// considered for en-route units, never once on scene).
    pub en_route: bool,
}

/// Snapshot of one responding unit as reported by the fleet collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    /// Unit identifier.
    pub id: UnitId,
    /// Emergency types this unit is equipped for.
    pub capabilities: BTreeSet<EmergencyType>,
    /// A general-purpose unit can serve any emergency type, ranking below
    /// an exact capability match.
    pub general_purpose: bool,
    /// Current unit position.
    pub location: GeoPoint,
    /// Whether the unit is free to take a new assignment.
    pub available: bool,
    /// Travel-speed assumptions.
    pub speed: SpeedProfile,
    /// Present when the unit is committed to an incident.
    pub assignment: Option<UnitAssignment>,
}

impl Unit {
    /// Returns `true` if the unit is equipped for `emergency_type`.
    #[must_use]
    pub fn can_serve(&self, emergency_type: EmergencyType) -> bool {
        self.general_purpose || self.capabilities.contains(&emergency_type)
    }

    /// Capability match rank: 0 for an exact capability, 1 for
    /// general-purpose coverage. Lower ranks first.
    #[must_use]
    pub fn specificity(&self, emergency_type: EmergencyType) -> u8 {
        u8::from(!self.capabilities.contains(&emergency_type))
    }
}
