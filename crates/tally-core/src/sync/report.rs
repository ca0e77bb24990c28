use std::fmt;

use serde::Serialize;

/// Counters from one reconciliation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub deletions_propagated: usize,
    pub deletion_failures: usize,
    pub tombstones_abandoned: usize,
    pub pushed: usize,
    pub push_failures: usize,
    /// Pushes whose entry was deleted locally while in flight.
    pub orphaned: usize,
    pub pulled: usize,
    /// Remote entries ignored because they are tombstoned locally.
    pub resurrections_blocked: usize,
    pub visible: usize,
}

impl SyncReport {
    pub const fn has_failures(&self) -> bool {
        self.deletion_failures > 0 || self.push_failures > 0
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pushed {} ({} failed), deleted {} ({} failed",
            self.pushed, self.push_failures, self.deletions_propagated, self.deletion_failures
        )?;
        if self.tombstones_abandoned > 0 {
            write!(f, ", {} abandoned", self.tombstones_abandoned)?;
        }
        write!(
            f,
            "), pulled {}, {} visible",
            self.pulled, self.visible
        )
    }
}
