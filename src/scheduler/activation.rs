//! Team activation gate and membership administration
//!
//! A team becomes active once its active headcount reaches the capacity
//! estimate and inactive when it drops below. Every membership change
//! re-evaluates the gate; the follow-up scheduling work it asks for
//! (first generation, or a recalculation window) is carried out by the
//! engine so the dependency stays visible in the call graph.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::capacity;
use super::error::SchedulerError;
use crate::error::Result;
use crate::models::{Membership, TeamId, UserId};
use crate::storage::ScheduleStore;

/// Kind of membership change that triggered a gate evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipEvent {
    Added,
    Reactivated,
    Removed,
    Deactivated,
}

impl MembershipEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Reactivated => "reactivated",
            Self::Removed => "removed",
            Self::Deactivated => "deactivated",
        }
    }

    /// The change lowered the active headcount
    pub fn is_loss(&self) -> bool {
        matches!(self, Self::Removed | Self::Deactivated)
    }
}

impl fmt::Display for MembershipEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the gate decided after a membership change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateDecision {
    /// Inactive team reached capacity; generate its first window
    Activated,
    /// Active team fell below capacity; existing slots are kept
    Deactivated,
    /// Team stays active; rebalance the upcoming window
    Recalculate,
    NoAction,
}

/// Pure gate decision
///
/// A reactivation that leaves an active team active is not rebalanced;
/// only brand-new members and losses trigger recalculation.
pub fn decide(
    was_active: bool,
    active_members: u32,
    required: u32,
    event: MembershipEvent,
) -> GateDecision {
    let now_active = active_members >= required;
    match (was_active, now_active) {
        (false, true) => GateDecision::Activated,
        (true, false) => GateDecision::Deactivated,
        (true, true) if event == MembershipEvent::Added || event.is_loss() => {
            GateDecision::Recalculate
        }
        _ => GateDecision::NoAction,
    }
}

/// Result of one gate evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateOutcome {
    pub team_id: TeamId,
    pub decision: GateDecision,
    pub active_members: u32,
    pub required: u32,
}

/// Recompute the team's headcount against capacity and persist a
/// transition of its active flag
pub fn evaluate_gate(
    store: &dyn ScheduleStore,
    team_id: TeamId,
    event: MembershipEvent,
) -> Result<GateOutcome> {
    let team = store
        .get_team(team_id)?
        .ok_or(SchedulerError::TeamNotFound { team_id })?;
    let active_members = store.active_members(team_id)?.len() as u32;
    let required = capacity::minimum_members(&team.policy);
    let decision = decide(team.is_active, active_members, required, event);

    match decision {
        GateDecision::Activated => {
            store.set_team_active(team_id, true)?;
            tracing::info!(team_id, active_members, required, "Team activated");
        }
        GateDecision::Deactivated => {
            store.set_team_active(team_id, false)?;
            tracing::warn!(
                team_id,
                active_members,
                required,
                "Team deactivated: below minimum headcount, existing slots kept"
            );
        }
        GateDecision::Recalculate | GateDecision::NoAction => {
            tracing::debug!(team_id, %event, ?decision, active_members, required, "Gate evaluated");
        }
    }

    Ok(GateOutcome {
        team_id,
        decision,
        active_members,
        required,
    })
}

// ============================================================================
// Membership administration
// ============================================================================

/// A membership mutation that has been persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipChange {
    pub user_id: UserId,
    pub team_id: TeamId,
    pub event: MembershipEvent,
}

pub struct MembershipService<'a> {
    store: &'a dyn ScheduleStore,
}

impl<'a> MembershipService<'a> {
    pub fn new(store: &'a dyn ScheduleStore) -> Self {
        Self { store }
    }

    /// Link a user to a team; a user belongs to at most one team
    pub fn add_member(
        &self,
        user_id: UserId,
        team_id: TeamId,
        now: NaiveDateTime,
    ) -> Result<(Membership, MembershipChange)> {
        if self.store.get_team(team_id)?.is_none() {
            return Err(SchedulerError::TeamNotFound { team_id }.into());
        }
        let existing = self.store.memberships_for_user(user_id)?;
        if let Some(other) = existing.iter().find(|m| m.team_id != team_id) {
            return Err(SchedulerError::AlreadyInAnotherTeam {
                user_id,
                team_id: other.team_id,
            }
            .into());
        }

        let membership = self.store.insert_membership(user_id, team_id, now)?;
        tracing::info!(user_id, team_id, "Member added");
        Ok((membership, self.change(user_id, team_id, MembershipEvent::Added)))
    }

    pub fn remove_member(&self, user_id: UserId, team_id: TeamId) -> Result<MembershipChange> {
        if !self.store.delete_membership(user_id, team_id)? {
            return Err(SchedulerError::MembershipNotFound { user_id, team_id }.into());
        }
        tracing::info!(user_id, team_id, "Member removed");
        Ok(self.change(user_id, team_id, MembershipEvent::Removed))
    }

    pub fn deactivate_member(&self, user_id: UserId, team_id: TeamId) -> Result<MembershipChange> {
        self.set_active(user_id, team_id, false)?;
        Ok(self.change(user_id, team_id, MembershipEvent::Deactivated))
    }

    pub fn reactivate_member(&self, user_id: UserId, team_id: TeamId) -> Result<MembershipChange> {
        self.set_active(user_id, team_id, true)?;
        Ok(self.change(user_id, team_id, MembershipEvent::Reactivated))
    }

    fn set_active(&self, user_id: UserId, team_id: TeamId, active: bool) -> Result<()> {
        if self.store.get_membership(user_id, team_id)?.is_none() {
            return Err(SchedulerError::MembershipNotFound { user_id, team_id }.into());
        }
        self.store.set_membership_active(user_id, team_id, active)?;
        tracing::info!(user_id, team_id, active, "Membership status changed");
        Ok(())
    }

    fn change(&self, user_id: UserId, team_id: TeamId, event: MembershipEvent) -> MembershipChange {
        MembershipChange {
            user_id,
            team_id,
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewTeam, TeamPolicy};
    use crate::storage::MemoryScheduleStore;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    /// 24h slots need two members
    fn small_team(store: &MemoryScheduleStore) -> TeamId {
        store
            .insert_team(
                &NewTeam::new("Platform", TeamPolicy::from_hours(24, 24.0, 168.0, 0.0)),
                now(),
            )
            .unwrap()
            .id
    }

    #[test]
    fn test_decide_table() {
        use GateDecision::*;
        use MembershipEvent::*;

        assert_eq!(decide(false, 5, 5, Added), Activated);
        assert_eq!(decide(false, 5, 5, Reactivated), Activated);
        assert_eq!(decide(true, 4, 5, Removed), GateDecision::Deactivated);
        assert_eq!(decide(true, 4, 5, MembershipEvent::Deactivated), GateDecision::Deactivated);
        assert_eq!(decide(true, 6, 5, Added), Recalculate);
        assert_eq!(decide(true, 5, 5, Removed), Recalculate);
        assert_eq!(decide(true, 6, 5, Reactivated), NoAction);
        assert_eq!(decide(false, 3, 5, Added), NoAction);
    }

    #[test]
    fn test_gate_transitions_persist_flag() {
        let store = MemoryScheduleStore::new();
        let team_id = small_team(&store);
        let members = MembershipService::new(&store);

        members.add_member(1, team_id, now()).unwrap();
        let outcome = evaluate_gate(&store, team_id, MembershipEvent::Added).unwrap();
        assert_eq!(outcome.decision, GateDecision::NoAction);
        assert_eq!(outcome.required, 2);

        members.add_member(2, team_id, now()).unwrap();
        let outcome = evaluate_gate(&store, team_id, MembershipEvent::Added).unwrap();
        assert_eq!(outcome.decision, GateDecision::Activated);
        assert!(store.get_team(team_id).unwrap().unwrap().is_active);

        let change = members.deactivate_member(2, team_id).unwrap();
        let outcome = evaluate_gate(&store, team_id, change.event).unwrap();
        assert_eq!(outcome.decision, GateDecision::Deactivated);
        assert!(!store.get_team(team_id).unwrap().unwrap().is_active);
    }

    #[test]
    fn test_one_team_per_user() {
        let store = MemoryScheduleStore::new();
        let first = small_team(&store);
        let second = store
            .insert_team(&NewTeam::new("Database", TeamPolicy::default()), now())
            .unwrap()
            .id;
        let members = MembershipService::new(&store);
        members.add_member(1, first, now()).unwrap();

        let err = members.add_member(1, second, now()).unwrap_err();
        assert_eq!(
            err.as_scheduler(),
            Some(&SchedulerError::AlreadyInAnotherTeam {
                user_id: 1,
                team_id: first
            })
        );
    }

    #[test]
    fn test_missing_team_and_membership() {
        let store = MemoryScheduleStore::new();
        let members = MembershipService::new(&store);
        assert!(members.add_member(1, 99, now()).is_err());

        let team_id = small_team(&store);
        let err = members.remove_member(1, team_id).unwrap_err();
        assert!(matches!(
            err.as_scheduler(),
            Some(SchedulerError::MembershipNotFound { .. })
        ));
        assert!(members.reactivate_member(1, team_id).is_err());
    }
}
