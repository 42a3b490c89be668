//! Unit selection policy.

use std::cmp::Ordering;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geo::{self, GeoPoint};
use crate::incident::{Incident, PriorityLevel};
use crate::report::ReportNumber;

use super::error::AllocationError;
use super::eta::EtaEstimator;
use super::unit::{Unit, UnitId};

/// Distance model used for ranking. Pluggable so deployments can swap the
/// straight-line default for road-network distance.
pub trait DistanceMetric: Send + Sync {
    /// Distance from `from` to `to` in kilometres.
    fn distance_km(&self, from: GeoPoint, to: GeoPoint) -> f64;
}

/// The default straight-line metric.
#[derive(Debug, Clone, Copy, Default)]
pub struct StraightLineMetric;

impl DistanceMetric for StraightLineMetric {
    fn distance_km(&self, from: GeoPoint, to: GeoPoint) -> f64 {
        geo::distance_km(from, to)
    }
}

/// Divisor applied to raw distance, so higher priorities tolerate a wider
/// effective radius without changing ordering determinism.
const fn priority_weight(priority: PriorityLevel) -> f64 {
    match priority {
        PriorityLevel::Low => 1.0,
        PriorityLevel::Medium => 1.2,
        PriorityLevel::High => 1.5,
        PriorityLevel::Critical => 2.0,
    }
}

/// Audit record of why a unit was displaced from its incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreemptionNotice {
    /// The incident that lost its unit and needs re-dispatch.
    pub displaced_report: ReportNumber,
    /// Priority of the displaced incident.
    pub displaced_priority: PriorityLevel,
}

/// Audit trail attached to every allocation decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationRationale {
    /// Candidate units examined before filtering.
    pub considered: usize,
    /// Units that survived the capability/availability filter.
    pub qualifying: usize,
    /// Priority-weighted distance of the chosen unit, when the incident
    /// position was known.
    pub effective_distance_km: Option<f64>,
    /// Capability match rank of the chosen unit (0 exact, 1 general).
    pub specificity: u8,
    /// Present when the decision displaced an en-route unit.
    pub preempted: Option<PreemptionNotice>,
}

/// A committed dispatch decision. Immutable once created; a re-dispatch
/// creates a new record rather than mutating this one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    /// The incident the unit was assigned to.
    pub report_number: ReportNumber,
    /// The chosen unit.
    pub unit_id: UnitId,
    /// When the decision was made.
    pub decided_at: DateTime<Utc>,
    /// Expected time-to-scene.
    pub eta: Duration,
    /// `decided_at + eta`.
    pub estimated_arrival: DateTime<Utc>,
    /// Why this unit.
    pub rationale: AllocationRationale,
}

/// A filtered candidate with its ranking key precomputed.
struct Ranked<'a> {
    unit: &'a Unit,
    effective_km: f64,
    specificity: u8,
}

impl Ranked<'_> {
    /// Ranking: weighted distance, then capability specificity, then unit
    /// id for determinism.
    fn cmp_key(&self, other: &Self) -> Ordering {
        self.effective_km
            .total_cmp(&other.effective_km)
            .then_with(|| self.specificity.cmp(&other.specificity))
            .then_with(|| self.unit.id.cmp(&other.unit.id))
    }
}

/// Selects the best responding unit for an incident.
pub struct UnitAllocator {
    metric: Box<dyn DistanceMetric>,
    eta: EtaEstimator,
    preemption_enabled: bool,
}

impl UnitAllocator {
    /// Creates an allocator with the straight-line metric and pre-emption
    /// disabled.
    #[must_use]
    pub fn new(eta: EtaEstimator) -> Self {
        Self {
            metric: Box::new(StraightLineMetric),
            eta,
            preemption_enabled: false,
        }
    }

    /// Replaces the distance metric.
    #[must_use]
    pub fn with_metric(mut self, metric: Box<dyn DistanceMetric>) -> Self {
        self.metric = metric;
        self
    }

    /// Enables the CRITICAL-priority pre-emption path.
    #[must_use]
    pub fn with_preemption(mut self, enabled: bool) -> Self {
        self.preemption_enabled = enabled;
        self
    }

    /// The ETA estimator this allocator prices candidates with.
    #[must_use]
    pub const fn eta_estimator(&self) -> &EtaEstimator {
        &self.eta
    }

    /// Picks the best unit for `incident` out of `candidates`.
    ///
    /// Filters to available units equipped for the emergency type, ranks
    /// by priority-weighted distance, capability specificity, then unit id.
    /// For CRITICAL incidents with no idle match, an en-route unit serving
    /// a lower-priority incident may be pre-empted, but only when the
    /// policy allows it and the caller passed `confirm_preemption`.
    ///
    /// # Errors
    ///
    /// [`AllocationError::NoUnitAvailable`] when nothing qualifies;
    /// [`AllocationError::PreemptionRequiresConfirmation`] when the only
    /// path is an unconfirmed pre-emption.
    pub fn allocate(
        &self,
        incident: &Incident,
        candidates: &[Unit],
        now: DateTime<Utc>,
        confirm_preemption: bool,
    ) -> Result<Allocation, AllocationError> {
        let emergency_type = incident.emergency_type();
        let position = incident.location().position;

        let idle: Vec<Ranked<'_>> = candidates
            .iter()
            .filter(|unit| unit.available && unit.can_serve(emergency_type))
            .map(|unit| self.rank(unit, incident, position))
            .collect();
        let qualifying = idle.len();

        if let Some(best) = idle.into_iter().min_by(Ranked::cmp_key) {
            debug!(
                unit = %best.unit.id,
                effective_km = best.effective_km,
                qualifying,
                "allocated idle unit"
            );
            return Ok(self.decision(incident, &best, candidates.len(), qualifying, None, now));
        }

        // Pre-emption: only for CRITICAL incidents, only when no idle unit
        // qualifies, and never silently.
        if incident.priority() == PriorityLevel::Critical && self.preemption_enabled {
            let preemptable: Vec<Ranked<'_>> = candidates
                .iter()
                .filter(|unit| {
                    !unit.available
                        && unit.can_serve(emergency_type)
                        && unit.assignment.as_ref().is_some_and(|assignment| {
                            assignment.en_route && assignment.priority < PriorityLevel::Critical
                        })
                })
                .map(|unit| self.rank(unit, incident, position))
                .collect();

            if let Some(best) = preemptable.into_iter().min_by(Ranked::cmp_key) {
                // The filter above guarantees an assignment is present.
                let Some(assignment) = best.unit.assignment.clone() else {
                    unreachable!("pre-emptable unit has an assignment");
                };
                if !confirm_preemption {
                    return Err(AllocationError::PreemptionRequiresConfirmation {
                        unit_id: best.unit.id.clone(),
                        displaced_report: assignment.report_number,
                    });
                }
                debug!(
                    unit = %best.unit.id,
                    displaced = %assignment.report_number,
                    "allocated by confirmed pre-emption"
                );
                let notice = PreemptionNotice {
                    displaced_report: assignment.report_number,
                    displaced_priority: assignment.priority,
                };
                return Ok(self.decision(
                    incident,
                    &best,
                    candidates.len(),
                    qualifying,
                    Some(notice),
                    now,
                ));
            }
        }

        Err(AllocationError::NoUnitAvailable {
            emergency_type,
            considered: candidates.len(),
        })
    }

    /// Computes the ranking entry for one unit.
    fn rank<'a>(
        &self,
        unit: &'a Unit,
        incident: &Incident,
        position: Option<GeoPoint>,
    ) -> Ranked<'a> {
        // Without incident coordinates every unit is equidistant and the
        // ranking falls through to specificity and id.
        let effective_km = position.map_or(0.0, |pos| {
            self.metric.distance_km(unit.location, pos) / priority_weight(incident.priority())
        });
        Ranked {
            unit,
            effective_km,
            specificity: unit.specificity(incident.emergency_type()),
        }
    }

    /// Assembles the immutable decision record for a chosen unit.
    fn decision(
        &self,
        incident: &Incident,
        chosen: &Ranked<'_>,
        considered: usize,
        qualifying: usize,
        preempted: Option<PreemptionNotice>,
        now: DateTime<Utc>,
    ) -> Allocation {
        let position = incident.location().position;
        let eta = position.map_or_else(
            || self.eta.estimate_without_position(),
            |pos| self.eta.estimate(chosen.unit.location, pos, chosen.unit.speed),
        );
        let estimated_arrival = now
            + chrono::Duration::from_std(eta).unwrap_or_else(|_| chrono::Duration::seconds(0));

        Allocation {
            report_number: incident.report_number().clone(),
            unit_id: chosen.unit.id.clone(),
            decided_at: now,
            eta,
            estimated_arrival,
            rationale: AllocationRationale {
                considered,
                qualifying,
                effective_distance_km: position.map(|_| chosen.effective_km),
                specificity: chosen.specificity,
                preempted,
            },
        }
    }
}
