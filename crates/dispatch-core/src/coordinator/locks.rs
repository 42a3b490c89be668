//! Per-incident mutual exclusion.
//!
//! One async mutex per live incident, keyed by report number, so
//! transitions on the same incident serialize while different incidents
//! proceed in parallel. Entries are reaped when an incident reaches a
//! terminal state to bound memory.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::report::ReportNumber;

/// Registry of per-incident locks.
#[derive(Debug, Default)]
pub(crate) struct IncidentLocks {
    locks: Mutex<HashMap<ReportNumber, Arc<AsyncMutex<()>>>>,
}

impl IncidentLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for one incident, creating it on first use.
    ///
    /// The registry mutex is only held to look up the entry; the await on
    /// the per-incident mutex happens after it is released.
    pub(crate) async fn acquire(&self, report_number: &ReportNumber) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(
                locks
                    .entry(report_number.clone())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        lock.lock_owned().await
    }

    /// Drops the registry entry for a closed incident.
    ///
    /// In-flight waiters keep the mutex alive through their own `Arc`;
    /// they will fail their re-validation against the terminal status.
    pub(crate) fn reap(&self, report_number: &ReportNumber) {
        self.locks.lock().remove(report_number);
    }

    /// Number of live lock entries.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.lock().len()
    }
}
