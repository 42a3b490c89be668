//! Coordinator-level scenario and concurrency tests.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{Duration, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use super::{
    DispatchCoordinator, DispatchError, FleetError, FleetState as _, InMemoryFleet,
    InMemoryIncidentStore, IncidentStore, RecordingEventSink, StoreError, SubmitDisposition,
    SubmitOptions,
};
use crate::allocation::{AllocationError, SpeedProfile, Unit, UnitId};
use crate::clock::{ManualClock, SharedClock};
use crate::config::DispatchConfig;
use crate::geo::GeoPoint;
use crate::incident::{
    EmergencyType, Incident, IncidentDraft, IncidentError, IncidentStatus, Location, PriorityLevel,
};
use crate::report::ReportNumber;

const SCENE: GeoPoint = GeoPoint::new(35.6812, 139.7671);

struct Harness {
    coordinator: DispatchCoordinator<InMemoryIncidentStore, InMemoryFleet, RecordingEventSink>,
    store: Arc<InMemoryIncidentStore>,
    fleet: Arc<InMemoryFleet>,
    events: Arc<RecordingEventSink>,
    clock: Arc<ManualClock>,
}

fn harness_with(config: &DispatchConfig) -> Harness {
    let store = Arc::new(InMemoryIncidentStore::new());
    let fleet = Arc::new(InMemoryFleet::new());
    let events = Arc::new(RecordingEventSink::new());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 12, 1, 14, 30, 0).unwrap(),
    ));
    let shared: SharedClock = clock.clone();
    let coordinator = DispatchCoordinator::with_clock(
        Arc::clone(&store),
        Arc::clone(&fleet),
        Arc::clone(&events),
        config,
        shared,
    );
    Harness {
        coordinator,
        store,
        fleet,
        events,
        clock,
    }
}

fn harness() -> Harness {
    harness_with(&DispatchConfig::default())
}

fn draft(emergency_type: EmergencyType, priority: PriorityLevel) -> IncidentDraft {
    IncidentDraft {
        caller_name: "Tanaka Hiro".to_string(),
        caller_phone: "+819012345678".to_string(),
        emergency_type,
        location: Location {
            address: "1-1 Chiyoda, Chiyoda-ku, Tokyo".to_string(),
            position: Some(SCENE),
        },
        description: Some("flames visible".to_string()),
        priority,
    }
}

/// A unit `km_north` kilometres due north of the scene.
fn fire_unit(id: &str, km_north: f64) -> Unit {
    Unit {
        id: UnitId::new(id),
        capabilities: BTreeSet::from([EmergencyType::Fire]),
        general_purpose: false,
        location: GeoPoint::new(SCENE.latitude + km_north / 111.19, SCENE.longitude),
        available: true,
        speed: SpeedProfile::default(),
        assignment: None,
    }
}

fn token() -> CancellationToken {
    CancellationToken::new()
}

// ---------------------------------------------------------------------
// Intake and dispatch
// ---------------------------------------------------------------------

#[tokio::test]
async fn critical_fire_with_idle_unit_is_dispatched() {
    let h = harness();
    h.fleet.upsert_unit(fire_unit("engine-1", 2.0)).await;

    let outcome = h
        .coordinator
        .submit_incident(
            draft(EmergencyType::Fire, PriorityLevel::Critical),
            SubmitOptions::default(),
            &token(),
        )
        .await
        .unwrap();

    let SubmitDisposition::Dispatched(allocation) = &outcome.disposition else {
        panic!("expected a dispatch, got {:?}", outcome.disposition);
    };
    assert_eq!(allocation.unit_id, UnitId::new("engine-1"));

    let incident = h.coordinator.get_incident(&outcome.report_number).await.unwrap();
    assert_eq!(incident.status(), IncidentStatus::Dispatched);
    assert!(incident.dispatched_at().is_some());
    assert!(incident.estimated_duration_minutes().is_some());

    // The unit is committed to this incident.
    let unit = h.fleet.unit(&UnitId::new("engine-1")).await.unwrap();
    assert!(!unit.available);
    assert_eq!(
        unit.assignment.unwrap().report_number,
        outcome.report_number
    );

    // Exactly one event, for the one accepted transition.
    let events = h.events.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].from, IncidentStatus::Received);
    assert_eq!(events[0].to, IncidentStatus::Dispatched);
}

#[tokio::test]
async fn no_qualifying_unit_leaves_incident_received() {
    let h = harness();
    // Only a medical unit in the pool for a fire call.
    let mut medic = fire_unit("medic-1", 0.5);
    medic.capabilities = BTreeSet::from([EmergencyType::Medical]);
    h.fleet.upsert_unit(medic).await;

    let outcome = h
        .coordinator
        .submit_incident(
            draft(EmergencyType::Fire, PriorityLevel::High),
            SubmitOptions::default(),
            &token(),
        )
        .await
        .unwrap();

    assert!(matches!(
        outcome.disposition,
        SubmitDisposition::AwaitingUnit {
            reason: AllocationError::NoUnitAvailable { .. }
        }
    ));

    let incident = h.coordinator.get_incident(&outcome.report_number).await.unwrap();
    assert_eq!(incident.status(), IncidentStatus::Received);
    assert_eq!(incident.dispatched_at(), None);
    assert!(h.events.events().await.is_empty());
}

#[tokio::test]
async fn invalid_draft_creates_nothing() {
    let h = harness();
    let mut bad = draft(EmergencyType::Fire, PriorityLevel::High);
    bad.caller_phone = "not-a-phone".to_string();

    let err = h
        .coordinator
        .submit_incident(bad, SubmitOptions::default(), &token())
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Validation(_)));
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn concurrent_submissions_cannot_share_one_unit() {
    let h = harness();
    h.fleet.upsert_unit(fire_unit("engine-1", 2.0)).await;

    let cancel = token();
    let first = h.coordinator.submit_incident(
        draft(EmergencyType::Fire, PriorityLevel::High),
        SubmitOptions::default(),
        &cancel,
    );
    let second = h.coordinator.submit_incident(
        draft(EmergencyType::Fire, PriorityLevel::High),
        SubmitOptions::default(),
        &cancel,
    );

    let (first, second) = tokio::join!(first, second);
    let outcomes = [first.unwrap(), second.unwrap()];

    let dispatched = outcomes
        .iter()
        .filter(|o| matches!(o.disposition, SubmitDisposition::Dispatched(_)))
        .count();
    let awaiting = outcomes
        .iter()
        .filter(|o| matches!(o.disposition, SubmitDisposition::AwaitingUnit { .. }))
        .count();
    assert_eq!((dispatched, awaiting), (1, 1));
}

// ---------------------------------------------------------------------
// Field-reported transitions
// ---------------------------------------------------------------------

#[tokio::test]
async fn full_lifecycle_releases_the_unit_and_reaps_the_lock() {
    let h = harness();
    h.fleet.upsert_unit(fire_unit("engine-1", 2.0)).await;

    let outcome = h
        .coordinator
        .submit_incident(
            draft(EmergencyType::Fire, PriorityLevel::High),
            SubmitOptions::default(),
            &token(),
        )
        .await
        .unwrap();
    let report = &outcome.report_number;

    for target in [
        IncidentStatus::EnRoute,
        IncidentStatus::OnScene,
        IncidentStatus::Completed,
    ] {
        h.clock.advance(Duration::minutes(10));
        h.coordinator
            .report_transition(report, target, &token())
            .await
            .unwrap();
    }

    let incident = h.coordinator.get_incident(report).await.unwrap();
    assert_eq!(incident.status(), IncidentStatus::Completed);
    assert_eq!(incident.actual_duration_minutes(), Some(30));

    // Unit back in the pool, lock registry reaped, four events total.
    let unit = h.fleet.unit(&UnitId::new("engine-1")).await.unwrap();
    assert!(unit.available);
    assert_eq!(h.coordinator.locks.len(), 0);
    assert_eq!(h.events.events().await.len(), 4);

    // The allocation record survives for audit.
    assert_eq!(h.coordinator.allocations_for(report).await.len(), 1);
}

#[tokio::test]
async fn skipping_to_on_scene_is_rejected_and_nothing_changes() {
    let h = harness();
    let outcome = h
        .coordinator
        .submit_incident(
            draft(EmergencyType::Fire, PriorityLevel::High),
            SubmitOptions::default(),
            &token(),
        )
        .await
        .unwrap();
    let report = &outcome.report_number;

    let err = h
        .coordinator
        .report_transition(report, IncidentStatus::OnScene, &token())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        DispatchError::Business(IncidentError::IllegalTransition {
            current: IncidentStatus::Received,
            requested: IncidentStatus::OnScene,
        })
    );

    let incident = h.coordinator.get_incident(report).await.unwrap();
    assert_eq!(incident.status(), IncidentStatus::Received);
    assert!(h.events.events().await.is_empty());
}

#[tokio::test]
async fn completed_incident_rejects_cancellation() {
    let h = harness();
    h.fleet.upsert_unit(fire_unit("engine-1", 2.0)).await;

    let outcome = h
        .coordinator
        .submit_incident(
            draft(EmergencyType::Fire, PriorityLevel::High),
            SubmitOptions::default(),
            &token(),
        )
        .await
        .unwrap();
    let report = &outcome.report_number;
    for target in [
        IncidentStatus::EnRoute,
        IncidentStatus::OnScene,
        IncidentStatus::Completed,
    ] {
        h.coordinator
            .report_transition(report, target, &token())
            .await
            .unwrap();
    }

    let before = h.coordinator.get_incident(report).await.unwrap();
    let err = h
        .coordinator
        .report_transition(report, IncidentStatus::Cancelled, &token())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        DispatchError::Business(IncidentError::IncidentClosed {
            current: IncidentStatus::Completed,
            requested: IncidentStatus::Cancelled,
        })
    );
    assert_eq!(h.coordinator.get_incident(report).await.unwrap(), before);
}

#[tokio::test]
async fn unknown_report_number_is_not_found() {
    let h = harness();
    let report = "ER-20241201143000-A1B2".parse().unwrap();

    let err = h.coordinator.get_incident(&report).await.unwrap_err();
    assert_eq!(
        err,
        DispatchError::NotFound {
            report_number: report
        }
    );

    let report = "ER-20241201143000-A1B2".parse().unwrap();
    let err = h
        .coordinator
        .report_transition(&report, IncidentStatus::EnRoute, &token())
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::NotFound { .. }));
}

#[tokio::test]
async fn racing_dispatch_requests_have_exactly_one_winner() {
    let h = harness();
    let outcome = h
        .coordinator
        .submit_incident(
            draft(EmergencyType::Fire, PriorityLevel::High),
            SubmitOptions::default(),
            &token(),
        )
        .await
        .unwrap();
    let report = outcome.report_number;

    let cancel = token();
    let first = h
        .coordinator
        .report_transition(&report, IncidentStatus::Dispatched, &cancel);
    let second = h
        .coordinator
        .report_transition(&report, IncidentStatus::Dispatched, &cancel);
    let (first, second) = tokio::join!(first, second);

    let wins = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1, "exactly one transition request may win");

    let loser = if first.is_err() { first } else { second };
    assert!(matches!(
        loser.unwrap_err(),
        DispatchError::Business(IncidentError::IllegalTransition { .. })
    ));

    // One accepted transition, one event.
    assert_eq!(h.events.events().await.len(), 1);
}

#[tokio::test]
async fn cancelled_token_aborts_before_any_mutation() {
    let h = harness();
    h.fleet.upsert_unit(fire_unit("engine-1", 2.0)).await;
    let outcome = h
        .coordinator
        .submit_incident(
            draft(EmergencyType::Fire, PriorityLevel::High),
            SubmitOptions::default(),
            &token(),
        )
        .await
        .unwrap();
    let report = &outcome.report_number;

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    let err = h
        .coordinator
        .report_transition(report, IncidentStatus::EnRoute, &cancelled)
        .await
        .unwrap_err();
    assert_eq!(err, DispatchError::Cancelled);

    let incident = h.coordinator.get_incident(report).await.unwrap();
    assert_eq!(incident.status(), IncidentStatus::Dispatched);
}

// ---------------------------------------------------------------------
// Pre-emption
// ---------------------------------------------------------------------

fn preemption_config() -> DispatchConfig {
    DispatchConfig::from_toml("[allocation]\nallow_preemption = true\n").unwrap()
}

#[tokio::test]
async fn critical_intake_preempts_only_with_confirmation() {
    let h = harness_with(&preemption_config());
    h.fleet.upsert_unit(fire_unit("engine-1", 2.0)).await;

    // Commit the only unit to a medium-priority fire.
    let first = h
        .coordinator
        .submit_incident(
            draft(EmergencyType::Fire, PriorityLevel::Medium),
            SubmitOptions::default(),
            &token(),
        )
        .await
        .unwrap();
    assert!(matches!(
        first.disposition,
        SubmitDisposition::Dispatched(_)
    ));

    // Unconfirmed critical intake is rejected loudly...
    let err = h
        .coordinator
        .submit_incident(
            draft(EmergencyType::Fire, PriorityLevel::Critical),
            SubmitOptions::default(),
            &token(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DispatchError::Allocation(AllocationError::PreemptionRequiresConfirmation { .. })
    ));

    // ...and a confirmed one takes the unit, reporting the displacement.
    let second = h
        .coordinator
        .submit_incident(
            draft(EmergencyType::Fire, PriorityLevel::Critical),
            SubmitOptions {
                confirm_preemption: true,
            },
            &token(),
        )
        .await
        .unwrap();
    let SubmitDisposition::Dispatched(allocation) = &second.disposition else {
        panic!("expected a dispatch");
    };
    let notice = allocation.rationale.preempted.as_ref().unwrap();
    assert_eq!(notice.displaced_report, first.report_number);

    let unit = h.fleet.unit(&UnitId::new("engine-1")).await.unwrap();
    assert_eq!(
        unit.assignment.unwrap().report_number,
        second.report_number
    );
}

#[tokio::test]
async fn closing_a_displaced_incident_leaves_the_preempting_unit_committed() {
    let h = harness_with(&preemption_config());
    h.fleet.upsert_unit(fire_unit("engine-1", 2.0)).await;

    let displaced = h
        .coordinator
        .submit_incident(
            draft(EmergencyType::Fire, PriorityLevel::Medium),
            SubmitOptions::default(),
            &token(),
        )
        .await
        .unwrap();
    let critical = h
        .coordinator
        .submit_incident(
            draft(EmergencyType::Fire, PriorityLevel::Critical),
            SubmitOptions {
                confirm_preemption: true,
            },
            &token(),
        )
        .await
        .unwrap();

    // The displaced incident is called off after losing its unit; its
    // stale allocation record must not free the unit from under the
    // critical incident.
    h.coordinator
        .report_transition(
            &displaced.report_number,
            IncidentStatus::Cancelled,
            &token(),
        )
        .await
        .unwrap();

    let unit = h.fleet.unit(&UnitId::new("engine-1")).await.unwrap();
    assert!(!unit.available);
    assert_eq!(
        unit.assignment.unwrap().report_number,
        critical.report_number
    );
}

#[tokio::test]
async fn reassignment_is_refused_when_the_holder_has_changed() {
    let fleet = InMemoryFleet::new();
    fleet.upsert_unit(fire_unit("engine-1", 2.0)).await;
    let engine = UnitId::new("engine-1");
    let holder: ReportNumber = "ER-20241201143000-AAAA".parse().unwrap();
    let stale: ReportNumber = "ER-20241201143000-BBBB".parse().unwrap();
    let critical: ReportNumber = "ER-20241201143000-CCCC".parse().unwrap();

    fleet
        .reserve(&engine, &holder, PriorityLevel::Medium)
        .await
        .unwrap();

    // A stale view of who holds the unit cannot displace anyone.
    let err = fleet
        .reassign(&engine, &stale, &critical, PriorityLevel::Critical)
        .await
        .unwrap_err();
    assert!(matches!(err, FleetError::AlreadyReserved { .. }));

    // The true holder is swapped out in one step.
    fleet
        .reassign(&engine, &holder, &critical, PriorityLevel::Critical)
        .await
        .unwrap();
    let unit = fleet.unit(&engine).await.unwrap();
    assert!(!unit.available);
    assert_eq!(unit.assignment.unwrap().report_number, critical);

    // The superseded holder's release is a no-op.
    fleet.release(&engine, &holder).await.unwrap();
    let unit = fleet.unit(&engine).await.unwrap();
    assert!(!unit.available);

    // The current holder's release frees the unit.
    fleet.release(&engine, &critical).await.unwrap();
    assert!(fleet.unit(&engine).await.unwrap().available);
}

// ---------------------------------------------------------------------
// Store optimistic concurrency
// ---------------------------------------------------------------------

/// Store wrapper that fabricates a version conflict on the next N saves,
/// standing in for an external writer racing the coordinator.
#[derive(Default)]
struct ConflictInjectingStore {
    inner: InMemoryIncidentStore,
    conflicts: AtomicU32,
}

impl ConflictInjectingStore {
    fn arm(&self, conflicts: u32) {
        self.conflicts.store(conflicts, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl IncidentStore for ConflictInjectingStore {
    async fn load(&self, report_number: &ReportNumber) -> Result<Option<Incident>, StoreError> {
        self.inner.load(report_number).await
    }

    async fn save(&self, incident: &Incident) -> Result<(), StoreError> {
        let armed = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if armed {
            return Err(StoreError::Conflict {
                report_number: incident.report_number().clone(),
                expected: incident.version(),
                stored: incident.version() + 1,
            });
        }
        self.inner.save(incident).await
    }
}

#[tokio::test]
async fn store_conflict_is_retried_once_then_surfaced() {
    let store = Arc::new(ConflictInjectingStore::default());
    let fleet = Arc::new(InMemoryFleet::new());
    let events = Arc::new(RecordingEventSink::new());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 12, 1, 14, 30, 0).unwrap(),
    ));
    let shared: SharedClock = clock.clone();
    let coordinator = DispatchCoordinator::with_clock(
        Arc::clone(&store),
        fleet,
        Arc::clone(&events),
        &DispatchConfig::default(),
        shared,
    );

    let outcome = coordinator
        .submit_incident(
            draft(EmergencyType::Fire, PriorityLevel::High),
            SubmitOptions::default(),
            &token(),
        )
        .await
        .unwrap();
    let report = outcome.report_number;

    // One injected conflict: the reload-and-retry path absorbs it.
    store.arm(1);
    coordinator
        .report_transition(&report, IncidentStatus::Dispatched, &token())
        .await
        .unwrap();
    let incident = coordinator.get_incident(&report).await.unwrap();
    assert_eq!(incident.status(), IncidentStatus::Dispatched);

    // Two conflicts in a row exhaust the single retry.
    store.arm(2);
    let err = coordinator
        .report_transition(&report, IncidentStatus::EnRoute, &token())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        DispatchError::ConcurrencyConflict {
            report_number: report.clone()
        }
    );
    let incident = coordinator.get_incident(&report).await.unwrap();
    assert_eq!(incident.status(), IncidentStatus::Dispatched);

    // Exactly one event, for the one committed transition.
    assert_eq!(events.events().await.len(), 1);
}

#[tokio::test]
async fn stale_saves_are_rejected_by_the_store() {
    let h = harness();
    let outcome = h
        .coordinator
        .submit_incident(
            draft(EmergencyType::Fire, PriorityLevel::High),
            SubmitOptions::default(),
            &token(),
        )
        .await
        .unwrap();

    // Two copies of version 1; the second save must observe the bump.
    let stale = h.store.load(&outcome.report_number).await.unwrap().unwrap();
    h.store.save(&stale).await.unwrap();
    let err = h.store.save(&stale).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict { .. }));
}
