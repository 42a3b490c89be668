//! Unit allocation and arrival estimation.
//!
//! Given an incident and a snapshot of candidate units from the fleet
//! collaborator, [`UnitAllocator`] filters to qualified available units,
//! ranks them by priority-weighted distance, capability specificity and
//! unit id, and produces an immutable [`Allocation`] decision record with
//! the [`EtaEstimator`]'s expected arrival time.
//!
//! Pre-emption of an en-route unit is an advanced policy path: it applies
//! only to CRITICAL incidents when no idle unit qualifies, must be enabled
//! by configuration, and always requires explicit caller confirmation.

mod allocator;
mod error;
mod eta;
mod unit;


pub use allocator::{
    Allocation, AllocationRationale, DistanceMetric, PreemptionNotice, StraightLineMetric,
    UnitAllocator,
};
pub use error::AllocationError;
pub use eta::EtaEstimator;
pub use unit::{SpeedProfile, Unit, UnitAssignment, UnitId};
