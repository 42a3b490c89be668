//! Incident lifecycle and dispatch coordination core.
//!
//! This crate implements the behavioral core of an emergency-dispatch
//! platform: intake of incident reports, a strict lifecycle state machine,
//! collision-free sortable report identifiers, and a unit-allocation/ETA
//! engine, all orchestrated by [`DispatchCoordinator`].
//!
//! # Architecture
//!
//! ```text
//!  intake ──► ReportIdGenerator ──► Incident (RECEIVED)
//!                                       │
//!                 DispatchCoordinator ──┤
//!                   │                   │
//!                   ▼                   ▼
//!              UnitAllocator ──► Allocation ──► DISPATCHED
//!                   │
//!              EtaEstimator
//!
//!  field events (en-route / on-scene / completed / cancelled)
//!            └──► state machine transitions, one event each
//! ```
//!
//! Transport, persistence technology and fleet management are external
//! collaborators behind the traits in [`coordinator`]; the crate ships
//! in-memory reference implementations for tests and single-node use.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use dispatch_core::config::DispatchConfig;
//! use dispatch_core::coordinator::{
//!     DispatchCoordinator, InMemoryFleet, InMemoryIncidentStore, RecordingEventSink,
//!     SubmitOptions,
//! };
//! use dispatch_core::geo::GeoPoint;
//! use dispatch_core::incident::{EmergencyType, IncidentDraft, Location, PriorityLevel};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let coordinator = DispatchCoordinator::new(
//!     Arc::new(InMemoryIncidentStore::new()),
//!     Arc::new(InMemoryFleet::new()),
//!     Arc::new(RecordingEventSink::new()),
//!     &DispatchConfig::default(),
//! );
//!
//! let draft = IncidentDraft {
//!     caller_name: "Tanaka Hiro".to_string(),
//!     caller_phone: "+819012345678".to_string(),
//!     emergency_type: EmergencyType::Fire,
//!     location: Location {
//!         address: "1-1 Chiyoda, Chiyoda-ku, Tokyo".to_string(),
//!         position: Some(GeoPoint::new(35.6812, 139.7671)),
//!     },
//!     description: None,
//!     priority: PriorityLevel::High,
//! };
//!
//! let token = tokio_util::sync::CancellationToken::new();
//! let outcome = coordinator
//!     .submit_incident(draft, SubmitOptions::default(), &token)
//!     .await
//!     .unwrap();
//! println!("opened {}", outcome.report_number);
//! # }
//! ```

pub mod allocation;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod geo;
pub mod incident;
pub mod report;

pub use allocation::{Allocation, AllocationError, EtaEstimator, Unit, UnitAllocator, UnitId};
pub use coordinator::{
    DispatchCoordinator, DispatchError, SubmitDisposition, SubmitOptions, SubmitOutcome,
    TransitionEvent,
};
pub use incident::{
    EmergencyType, Incident, IncidentDraft, IncidentError, IncidentStatus, PriorityLevel,
    ValidationError,
};
pub use report::{GenerationError, ReportIdGenerator, ReportNumber};
