//! Incident aggregate and lifecycle state machine.
//!
//! An incident moves through a fixed lifecycle driven by field events:
//!
//! ```text
//!  RECEIVED ──► DISPATCHED ──► EN_ROUTE ──► ON_SCENE ──► COMPLETED
//!      │             │             │            │
//!      └─────────────┴─────────────┴────────────┴───────► CANCELLED
//! ```
//!
//! # Valid Transitions
//!
//! | From | To | Side effect |
//! |------|----|-------------|
//! | RECEIVED | DISPATCHED | `dispatched_at = now` |
//! | RECEIVED | CANCELLED | none |
//! | DISPATCHED | EN_ROUTE | none |
//! | DISPATCHED | CANCELLED | none |
//! | EN_ROUTE | ON_SCENE | `arrived_at = now` |
//! | EN_ROUTE | CANCELLED | none |
//! | ON_SCENE | COMPLETED | `completed_at = now`, actual duration computed |
//! | ON_SCENE | CANCELLED | none |
//!
//! Anything else fails with [`IncidentError::IllegalTransition`]; any
//! request against COMPLETED or CANCELLED fails with
//! [`IncidentError::IncidentClosed`]. The transition table is
//! plain data, so tests can enumerate it.

pub(crate) mod machine;

mod error;
mod intake;
mod state;


pub use error::{IncidentError, ValidationError};
pub use intake::IncidentDraft;
pub use machine::{is_legal_transition, legal_targets};
pub use state::{
    AcceptedTransition, Caller, EmergencyType, Incident, IncidentStatus, Location, PriorityLevel,
};
