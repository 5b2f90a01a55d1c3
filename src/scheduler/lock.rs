//! Per-team mutual exclusion
//!
//! Generation, recalculation, revalidation, leave approval and swap approval
//! for one team are serialized; different teams proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::models::TeamId;

/// Registry of one lock per team
#[derive(Debug, Default)]
pub struct TeamLocks {
    locks: Mutex<HashMap<TeamId, Arc<Mutex<()>>>>,
}

impl TeamLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, team_id: TeamId) -> Arc<Mutex<()>> {
        // entry().or_default() cannot leave the map half-updated
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(team_id).or_default().clone()
    }

    /// Run `f` while holding the team's lock
    ///
    /// Not re-entrant: `f` must not take the same team's lock again.
    pub fn with_team<T>(&self, team_id: TeamId, f: impl FnOnce() -> T) -> T {
        let lock = self.lock_for(team_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        tracing::trace!(team_id, "Team lock acquired");
        f()
    }
}
