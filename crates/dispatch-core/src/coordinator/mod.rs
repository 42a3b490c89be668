//! Dispatch orchestration.
//!
//! [`DispatchCoordinator`] ties the core together: intake validation,
//! identifier generation, allocation, and every lifecycle transition.
//!
//! # Concurrency model
//!
//! - One logical task per inbound event; transitions on the *same*
//!   incident serialize through a per-incident async mutex, reaped when
//!   the incident closes.
//! - The allocation decision is computed *outside* the per-incident lock;
//!   unit reservation is atomic inside the fleet collaborator, so two
//!   incidents can never take the same unit.
//! - Store conflicts (optimistic concurrency) are retried once by
//!   reloading and re-validating, then surfaced as
//!   [`DispatchError::ConcurrencyConflict`].
//! - Every operation takes a [`CancellationToken`]; a cancellation
//!   observed before the save point aborts with no state change and any
//!   unit reservation rolled back. Transitions are all-or-nothing.

mod collaborators;
mod error;
mod locks;
mod memory;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::allocation::{Allocation, AllocationError, EtaEstimator, UnitAllocator};
use crate::clock::{SharedClock, SystemClock};
use crate::config::DispatchConfig;
use crate::incident::{Incident, IncidentDraft, IncidentStatus};
use crate::report::{ReportIdGenerator, ReportNumber};

pub use collaborators::{
    EventSink, FleetError, FleetState, IncidentStore, StoreError, TransitionEvent,
};
pub use error::DispatchError;
pub use memory::{InMemoryFleet, InMemoryIncidentStore, RecordingEventSink};

/// Per-request intake options.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubmitOptions {
    /// Acknowledges that a CRITICAL intake may displace an en-route unit
    /// and that the displaced incident will be re-dispatched by the
    /// caller. Without this, a pre-emption candidate is an error, never a
    /// silent reassignment.
    pub confirm_preemption: bool,
}

/// What happened to an accepted intake.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitDisposition {
    /// A unit was committed; the incident is DISPATCHED.
    Dispatched(Allocation),
    /// No unit qualified; the incident stays RECEIVED and the caller
    /// decides the escalation (queue, widen search, alert).
    AwaitingUnit {
        /// The allocator's capacity condition.
        reason: AllocationError,
    },
}

/// Result of [`DispatchCoordinator::submit_incident`].
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    /// Identity assigned to the new incident.
    pub report_number: ReportNumber,
    /// Whether dispatch happened.
    pub disposition: SubmitDisposition,
}

/// Orchestrates intake, allocation and lifecycle transitions.
pub struct DispatchCoordinator<S, F, E> {
    store: Arc<S>,
    fleet: Arc<F>,
    events: Arc<E>,
    clock: SharedClock,
    generator: ReportIdGenerator,
    allocator: UnitAllocator,
    locks: locks::IncidentLocks,
    allocations: RwLock<Vec<Allocation>>,
}

impl<S, F, E> DispatchCoordinator<S, F, E>
where
    S: IncidentStore,
    F: FleetState,
    E: EventSink,
{
    /// Creates a coordinator on the system clock.
    #[must_use]
    pub fn new(store: Arc<S>, fleet: Arc<F>, events: Arc<E>, config: &DispatchConfig) -> Self {
        Self::with_clock(store, fleet, events, config, Arc::new(SystemClock))
    }

    /// Creates a coordinator on an injected clock (tests pin time).
    #[must_use]
    pub fn with_clock(
        store: Arc<S>,
        fleet: Arc<F>,
        events: Arc<E>,
        config: &DispatchConfig,
        clock: SharedClock,
    ) -> Self {
        let estimator = EtaEstimator::new(Duration::from_secs(config.eta.mobilization_floor_secs))
            .with_default_speed(config.eta.default_speed_kmh);
        Self {
            store,
            fleet,
            events,
            clock: Arc::clone(&clock),
            generator: ReportIdGenerator::with_clock(clock),
            allocator: UnitAllocator::new(estimator)
                .with_preemption(config.allocation.allow_preemption),
            locks: locks::IncidentLocks::new(),
            allocations: RwLock::new(Vec::new()),
        }
    }

    /// Accepts an emergency report: validates, assigns an identity,
    /// persists the incident in RECEIVED, then attempts allocation and,
    /// on success, commits RECEIVED→DISPATCHED together with the
    /// allocation record.
    ///
    /// On a capacity shortfall the incident is left in RECEIVED and the
    /// escalation condition is returned in the disposition, not as an
    /// error: intake itself succeeded.
    ///
    /// # Errors
    ///
    /// Validation, generation, collaborator and cancellation failures; a
    /// pre-emption candidate without confirmation surfaces as
    /// [`DispatchError::Allocation`].
    pub async fn submit_incident(
        &self,
        draft: IncidentDraft,
        options: SubmitOptions,
        cancel: &CancellationToken,
    ) -> Result<SubmitOutcome, DispatchError> {
        draft.validate()?;
        if cancel.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }

        let report_number = self.generator.next()?;
        let incident = Incident::open(report_number.clone(), draft, self.clock.now());
        self.store.save(&incident).await.map_err(|error| {
            // A conflict on create means the storage uniqueness constraint
            // caught a cross-process identifier collision.
            match error {
                StoreError::Conflict { .. } => DispatchError::ConcurrencyConflict {
                    report_number: report_number.clone(),
                },
                other => other.into(),
            }
        })?;
        info!(report = %report_number, "incident received");

        let allocation = match self
            .allocate_and_reserve(&incident, options.confirm_preemption)
            .await?
        {
            Ok(allocation) => allocation,
            Err(reason @ AllocationError::NoUnitAvailable { .. }) => {
                warn!(report = %report_number, %reason, "no unit allocated; escalation required");
                return Ok(SubmitOutcome {
                    report_number,
                    disposition: SubmitDisposition::AwaitingUnit { reason },
                });
            }
            // An unconfirmed pre-emption is a hard rejection; the incident
            // stays RECEIVED and the caller may resubmit the dispatch
            // attempt with confirmation.
            Err(reason) => return Err(DispatchError::Allocation(reason)),
        };

        if cancel.is_cancelled() {
            self.release_unit_best_effort(&allocation).await;
            return Err(DispatchError::Cancelled);
        }

        // Commit the dispatch; on any failure the reservation rolls back
        // and the incident stays RECEIVED.
        let estimated_minutes = estimated_minutes(allocation.eta);
        if let Err(error) = self
            .commit_transition(
                &report_number,
                IncidentStatus::Dispatched,
                Some(estimated_minutes),
                cancel,
            )
            .await
        {
            self.release_unit_best_effort(&allocation).await;
            return Err(error);
        }

        info!(
            report = %report_number,
            unit = %allocation.unit_id,
            eta_secs = allocation.eta.as_secs(),
            "incident dispatched"
        );
        self.allocations.write().await.push(allocation.clone());

        Ok(SubmitOutcome {
            report_number,
            disposition: SubmitDisposition::Dispatched(allocation),
        })
    }

    /// Applies a field-reported transition (en-route, on-scene, completed,
    /// cancelled) to an incident.
    ///
    /// # Errors
    ///
    /// [`DispatchError::NotFound`] for unknown report numbers,
    /// [`DispatchError::Business`] for illegal transitions or closed
    /// incidents, [`DispatchError::ConcurrencyConflict`] when a lost race
    /// could not be resolved by one retry.
    pub async fn report_transition(
        &self,
        report_number: &ReportNumber,
        target: IncidentStatus,
        cancel: &CancellationToken,
    ) -> Result<TransitionEvent, DispatchError> {
        if cancel.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }
        self.commit_transition(report_number, target, None, cancel)
            .await
    }

    /// Loads an incident by report number.
    ///
    /// # Errors
    ///
    /// [`DispatchError::NotFound`] when the report number is unknown.
    pub async fn get_incident(
        &self,
        report_number: &ReportNumber,
    ) -> Result<Incident, DispatchError> {
        self.store
            .load(report_number)
            .await?
            .ok_or_else(|| DispatchError::NotFound {
                report_number: report_number.clone(),
            })
    }

    /// Audit trail: every allocation committed for one incident, oldest
    /// first. A re-dispatch appends; records are never mutated.
    pub async fn allocations_for(&self, report_number: &ReportNumber) -> Vec<Allocation> {
        self.allocations
            .read()
            .await
            .iter()
            .filter(|allocation| &allocation.report_number == report_number)
            .cloned()
            .collect()
    }

    /// Computes an allocation and atomically reserves the chosen unit.
    ///
    /// The fleet view is only trusted for one attempt: when the
    /// reservation loses to a concurrent incident, the candidates are
    /// re-fetched and allocation retried once before reporting a capacity
    /// shortfall. Runs outside the per-incident lock.
    async fn allocate_and_reserve(
        &self,
        incident: &Incident,
        confirm_preemption: bool,
    ) -> Result<Result<Allocation, AllocationError>, DispatchError> {
        let mut last_considered = 0;
        for attempt in 0..2 {
            let candidates = self.fleet.candidates(incident.emergency_type()).await?;
            last_considered = candidates.len();

            let allocation = match self.allocator.allocate(
                incident,
                &candidates,
                self.clock.now(),
                confirm_preemption,
            ) {
                Ok(allocation) => allocation,
                Err(reason) => return Ok(Err(reason)),
            };

            // A confirmed pre-emption swaps the unit's assignment in one
            // atomic step; re-dispatching the displaced incident is the
            // caller's acknowledged responsibility.
            let reservation = if let Some(notice) = allocation.rationale.preempted.as_ref() {
                self.fleet
                    .reassign(
                        &allocation.unit_id,
                        &notice.displaced_report,
                        incident.report_number(),
                        incident.priority(),
                    )
                    .await
            } else {
                self.fleet
                    .reserve(
                        &allocation.unit_id,
                        incident.report_number(),
                        incident.priority(),
                    )
                    .await
            };

            match reservation {
                Ok(()) => return Ok(Ok(allocation)),
                Err(FleetError::AlreadyReserved { unit_id, .. }) if attempt == 0 => {
                    debug!(
                        report = %incident.report_number(),
                        unit = %unit_id,
                        "fleet view was stale; refreshing candidates"
                    );
                }
                Err(FleetError::AlreadyReserved { .. }) => break,
                Err(other) => return Err(other.into()),
            }
        }

        Ok(Err(AllocationError::NoUnitAvailable {
            emergency_type: incident.emergency_type(),
            considered: last_considered,
        }))
    }

    /// Loads, validates, applies and saves one transition under the
    /// per-incident lock, emitting exactly one event on success.
    async fn commit_transition(
        &self,
        report_number: &ReportNumber,
        target: IncidentStatus,
        estimated_minutes: Option<i64>,
        cancel: &CancellationToken,
    ) -> Result<TransitionEvent, DispatchError> {
        let _guard = self.locks.acquire(report_number).await;

        let mut retried = false;
        loop {
            let Some(mut incident) = self.store.load(report_number).await? else {
                return Err(DispatchError::NotFound {
                    report_number: report_number.clone(),
                });
            };

            let accepted = incident.apply_transition(target, self.clock.now())?;
            if let Some(minutes) = estimated_minutes {
                incident.set_estimated_duration(minutes);
            }

            if cancel.is_cancelled() {
                return Err(DispatchError::Cancelled);
            }

            match self.store.save(&incident).await {
                Ok(()) => {
                    let event = TransitionEvent {
                        report_number: report_number.clone(),
                        from: accepted.from,
                        to: accepted.to,
                        at: accepted.at,
                    };
                    self.events.emit(event.clone()).await;
                    info!(
                        report = %report_number,
                        from = %event.from,
                        to = %event.to,
                        "transition committed"
                    );
                    if target.is_terminal() {
                        self.locks.reap(report_number);
                        self.release_assigned_unit(report_number).await;
                    }
                    return Ok(event);
                }
                Err(StoreError::Conflict { .. }) if !retried => {
                    // Lost a race to an external writer: reload and
                    // re-validate once against the fresh status.
                    retried = true;
                }
                Err(StoreError::Conflict { .. }) => {
                    return Err(DispatchError::ConcurrencyConflict {
                        report_number: report_number.clone(),
                    });
                }
                Err(other) => return Err(other.into()),
            }
        }
    }

    /// Frees the unit held by a closed incident, if any.
    ///
    /// The release is scoped to the closing incident: if the unit was
    /// since pre-empted to another incident, the fleet leaves it with its
    /// current holder.
    async fn release_assigned_unit(&self, report_number: &ReportNumber) {
        let unit_id = self
            .allocations
            .read()
            .await
            .iter()
            .rev()
            .find(|allocation| &allocation.report_number == report_number)
            .map(|allocation| allocation.unit_id.clone());

        if let Some(unit_id) = unit_id {
            if let Err(error) = self.fleet.release(&unit_id, report_number).await {
                warn!(%unit_id, %error, "failed to release unit after incident closed");
            }
        }
    }

    /// Rolls back a reservation whose dispatch never committed.
    async fn release_unit_best_effort(&self, allocation: &Allocation) {
        if let Err(error) = self
            .fleet
            .release(&allocation.unit_id, &allocation.report_number)
            .await
        {
            warn!(
                unit_id = %allocation.unit_id,
                %error,
                "failed to roll back unit reservation"
            );
        }
    }
}

/// ETA rounded up to whole minutes, at least one.
fn estimated_minutes(eta: Duration) -> i64 {
    let minutes = eta.as_secs().div_ceil(60);
    i64::try_from(minutes).unwrap_or(i64::MAX).max(1)
}
