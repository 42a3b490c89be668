//! The incident transition table.
//!
//! The whole lifecycle is a lookup table of (current, requested) pairs so
//! exhaustiveness is checkable by iterating [`TRANSITION_TABLE`]; there is
//! deliberately no conditional status logic anywhere else in the crate.

use super::state::IncidentStatus;

/// Side effect the state machine applies when a transition is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Effect {
    /// No timestamp changes.
    None,
    /// Set `dispatched_at = now`.
    MarkDispatched,
    /// Set `arrived_at = now`.
    MarkArrived,
    /// Set `completed_at = now` and compute the actual duration.
    MarkCompleted,
}

/// Every legal transition, with its side effect.
pub(crate) const TRANSITION_TABLE: &[(IncidentStatus, IncidentStatus, Effect)] = &[
    (
        IncidentStatus::Received,
        IncidentStatus::Dispatched,
        Effect::MarkDispatched,
    ),
    (
        IncidentStatus::Received,
        IncidentStatus::Cancelled,
        Effect::None,
    ),
    (
        IncidentStatus::Dispatched,
        IncidentStatus::EnRoute,
        Effect::None,
    ),
    (
        IncidentStatus::Dispatched,
        IncidentStatus::Cancelled,
        Effect::None,
    ),
    (
        IncidentStatus::EnRoute,
        IncidentStatus::OnScene,
        Effect::MarkArrived,
    ),
    (
        IncidentStatus::EnRoute,
        IncidentStatus::Cancelled,
        Effect::None,
    ),
    (
        IncidentStatus::OnScene,
        IncidentStatus::Completed,
        Effect::MarkCompleted,
    ),
    (
        IncidentStatus::OnScene,
        IncidentStatus::Cancelled,
        Effect::None,
    ),
];

/// Looks up the side effect for (current, requested).
///
/// `None` means the transition is illegal.
pub(crate) fn effect_for(current: IncidentStatus, requested: IncidentStatus) -> Option<Effect> {
    TRANSITION_TABLE
        .iter()
        .find(|(from, to, _)| *from == current && *to == requested)
        .map(|(_, _, effect)| *effect)
}

/// Returns `true` when the transition table contains (current, requested).
#[must_use]
pub fn is_legal_transition(current: IncidentStatus, requested: IncidentStatus) -> bool {
    effect_for(current, requested).is_some()
}

/// All statuses reachable from `current` in one transition.
#[must_use]
pub fn legal_targets(current: IncidentStatus) -> Vec<IncidentStatus> {
    TRANSITION_TABLE
        .iter()
        .filter(|(from, _, _)| *from == current)
        .map(|(_, to, _)| *to)
        .collect()
}
