//! The incident aggregate and its enumerations.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::IncidentError;
use super::intake::IncidentDraft;
use super::machine::{self, Effect};
use crate::geo::GeoPoint;
use crate::report::ReportNumber;

/// Kind of emergency being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmergencyType {
    /// Structure or wildland fire.
    Fire,
    /// Medical emergency.
    Medical,
    /// Traffic accident.
    TrafficAccident,
    /// Technical rescue (collapse, water, height).
    Rescue,
    /// Hazardous materials release.
    Hazmat,
    /// Anything that fits no other category.
    Other,
}

impl EmergencyType {
    /// Wire/storage name of the variant.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fire => "FIRE",
            Self::Medical => "MEDICAL",
            Self::TrafficAccident => "TRAFFIC_ACCIDENT",
            Self::Rescue => "RESCUE",
            Self::Hazmat => "HAZMAT",
            Self::Other => "OTHER",
        }
    }
}

impl fmt::Display for EmergencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Urgency of an incident. Ordering is by severity, `Low < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriorityLevel {
    /// Non-urgent.
    Low,
    /// Standard response.
    Medium,
    /// Elevated response.
    High,
    /// Life-threatening, highest urgency.
    Critical,
}

impl PriorityLevel {
    /// Wire/storage name of the variant.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for PriorityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentStatus {
    /// Intake accepted, no unit assigned yet.
    Received,
    /// A unit has been committed to the incident.
    Dispatched,
    /// The assigned unit is moving to the scene.
    EnRoute,
    /// The assigned unit has arrived on scene.
    OnScene,
    /// Work finished. Terminal.
    Completed,
    /// Called off from any non-terminal state. Terminal.
    Cancelled,
}

impl IncidentStatus {
    /// Returns `true` for [`Completed`](Self::Completed) and
    /// [`Cancelled`](Self::Cancelled).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Wire/storage name of the variant.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Received => "RECEIVED",
            Self::Dispatched => "DISPATCHED",
            Self::EnRoute => "EN_ROUTE",
            Self::OnScene => "ON_SCENE",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the emergency is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Street address as reported by the caller.
    pub address: String,
    /// GPS coordinates, when known.
    pub position: Option<GeoPoint>,
}

/// Who reported the emergency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    /// Caller name.
    pub name: String,
    /// Caller phone in E.164-ish form, validated at intake.
    pub phone: String,
}

/// A transition the state machine accepted.
///
/// Returned from [`Incident::apply_transition`] so the caller can emit
/// exactly one event per accepted transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptedTransition {
    /// Status before the transition.
    pub from: IncidentStatus,
    /// Status after the transition.
    pub to: IncidentStatus,
    /// Wall-clock instant the transition was accepted.
    pub at: DateTime<Utc>,
}

/// One emergency report tracked through its lifecycle.
///
/// The aggregate is mutated only through [`Incident::apply_transition`];
/// every other field is fixed at intake. Timestamps for stages not yet
/// reached are `None`, never defaulted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    report_number: ReportNumber,
    caller: Caller,
    emergency_type: EmergencyType,
    location: Location,
    description: Option<String>,
    priority: PriorityLevel,
    status: IncidentStatus,
    received_at: DateTime<Utc>,
    dispatched_at: Option<DateTime<Utc>>,
    arrived_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    estimated_duration_minutes: Option<i64>,
    actual_duration_minutes: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

impl Incident {
    /// Opens a new incident in `RECEIVED` from a validated draft.
    #[must_use]
    pub fn open(report_number: ReportNumber, draft: IncidentDraft, now: DateTime<Utc>) -> Self {
        Self {
            report_number,
            caller: Caller {
                name: draft.caller_name,
                phone: draft.caller_phone,
            },
            emergency_type: draft.emergency_type,
            location: draft.location,
            description: draft.description,
            priority: draft.priority,
            status: IncidentStatus::Received,
            received_at: now,
            dispatched_at: None,
            arrived_at: None,
            completed_at: None,
            estimated_duration_minutes: None,
            actual_duration_minutes: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Requests a status transition at instant `now`.
    ///
    /// Consults the transition table, applies the table's side effect
    /// (stage timestamp, duration computation) and returns the accepted
    /// transition. On error the incident is untouched.
    ///
    /// # Errors
    ///
    /// [`IncidentError::IncidentClosed`] when the incident is terminal,
    /// [`IncidentError::IllegalTransition`] when the table has no entry for
    /// (current, requested).
    pub fn apply_transition(
        &mut self,
        requested: IncidentStatus,
        now: DateTime<Utc>,
    ) -> Result<AcceptedTransition, IncidentError> {
        let current = self.status;
        if current.is_terminal() {
            return Err(IncidentError::IncidentClosed { current, requested });
        }
        let Some(effect) = machine::effect_for(current, requested) else {
            return Err(IncidentError::IllegalTransition { current, requested });
        };

        match effect {
            Effect::None => {}
            Effect::MarkDispatched => self.dispatched_at = Some(now),
            Effect::MarkArrived => self.arrived_at = Some(now),
            Effect::MarkCompleted => {
                self.completed_at = Some(now);
                self.actual_duration_minutes = self
                    .dispatched_at
                    .map(|dispatched| (now - dispatched).num_minutes());
            }
        }

        self.status = requested;
        self.updated_at = now;

        Ok(AcceptedTransition {
            from: current,
            to: requested,
            at: now,
        })
    }

    /// Records the expected time-to-complete, in minutes, at dispatch.
    pub(crate) fn set_estimated_duration(&mut self, minutes: i64) {
        self.estimated_duration_minutes = Some(minutes);
    }

    /// Overwrites the optimistic-concurrency version. Store use only.
    pub(crate) fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    /// Public identity of the incident.
    #[must_use]
    pub const fn report_number(&self) -> &ReportNumber {
        &self.report_number
    }

    /// Who reported the emergency.
    #[must_use]
    pub const fn caller(&self) -> &Caller {
        &self.caller
    }

    /// Kind of emergency.
    #[must_use]
    pub const fn emergency_type(&self) -> EmergencyType {
        self.emergency_type
    }

    /// Where the emergency is.
    #[must_use]
    pub const fn location(&self) -> &Location {
        &self.location
    }

    /// Free-text detail from the caller, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Urgency of the incident.
    #[must_use]
    pub const fn priority(&self) -> PriorityLevel {
        self.priority
    }

    /// Current lifecycle status.
    #[must_use]
    pub const fn status(&self) -> IncidentStatus {
        self.status
    }

    /// When intake accepted the report.
    #[must_use]
    pub const fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// When a unit was committed, if the incident got that far.
    #[must_use]
    pub const fn dispatched_at(&self) -> Option<DateTime<Utc>> {
        self.dispatched_at
    }

    /// When the unit arrived on scene, if it did.
    #[must_use]
    pub const fn arrived_at(&self) -> Option<DateTime<Utc>> {
        self.arrived_at
    }

    /// When the incident completed, if it did.
    #[must_use]
    pub const fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Expected time-to-complete recorded at dispatch.
    #[must_use]
    pub const fn estimated_duration_minutes(&self) -> Option<i64> {
        self.estimated_duration_minutes
    }

    /// Dispatch-to-completion time, present once completed.
    #[must_use]
    pub const fn actual_duration_minutes(&self) -> Option<i64> {
        self.actual_duration_minutes
    }

    /// Record creation instant.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last mutation instant.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Optimistic-concurrency version, incremented by the store on save.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }
}
