//! Fair assignment of members to open slots
//!
//! Slots are processed in start order. For each slot every active member of
//! the slot's team is checked against the hard constraints; among those that
//! pass, the lowest fairness score wins and ties go to the earlier member.
//! A slot nobody can take is reported as a violation and left open.

use chrono::{Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::constraints::{self, CheckMode};
use super::ledger::Ledger;
use crate::config::FairnessConfig;
use crate::error::Result;
use crate::metrics;
use crate::models::{Membership, Slot, SlotId, Team, TeamId, TeamPolicy, UserId};
use crate::storage::{ScheduleStore, SlotFilter};

pub const NO_SUITABLE_MEMBER: &str = "No suitable member found";
pub const CROSS_TEAM_REJECTED: &str = "Candidate is not an active member of the slot's team";

// ============================================================================
// Outcome
// ============================================================================

/// A slot that could not be filled, or an assignment that breaks a rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub slot_id: SlotId,
    pub member_id: Option<UserId>,
    pub reason: String,
}

impl Violation {
    pub fn new(slot_id: SlotId, member_id: Option<UserId>, reason: impl Into<String>) -> Self {
        Self {
            slot_id,
            member_id,
            reason: reason.into(),
        }
    }
}

/// Result of one assignment batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssignmentOutcome {
    pub assignments_made: usize,
    pub total_slots_considered: usize,
    pub violations: Vec<Violation>,
    /// Picks made in this batch, in slot start order
    #[serde(skip)]
    pub assigned: Vec<(SlotId, UserId)>,
}

impl AssignmentOutcome {
    /// Fold another outcome into this one
    pub fn merge(&mut self, other: AssignmentOutcome) {
        self.assignments_made += other.assignments_made;
        self.total_slots_considered += other.total_slots_considered;
        self.violations.extend(other.violations);
        self.assigned.extend(other.assigned);
    }
}

// ============================================================================
// Fair Assigner
// ============================================================================

/// Candidate search and batch assignment for one team
#[derive(Debug, Clone)]
pub struct FairAssigner {
    team_id: TeamId,
    policy: TeamPolicy,
    candidates: Vec<UserId>,
    weights: FairnessConfig,
}

impl FairAssigner {
    /// Build an assigner from the team's memberships
    ///
    /// Only active memberships of this team become candidates, in the order
    /// given.
    pub fn new(team: &Team, members: &[Membership], weights: FairnessConfig) -> Self {
        let candidates = members
            .iter()
            .filter(|m| m.team_id == team.id && m.is_active)
            .map(|m| m.user_id)
            .collect();
        Self {
            team_id: team.id,
            policy: team.policy,
            candidates,
            weights,
        }
    }

    pub fn candidates(&self) -> &[UserId] {
        &self.candidates
    }

    pub fn is_candidate(&self, user: UserId) -> bool {
        self.candidates.contains(&user)
    }

    /// Best eligible member for `slot`, skipping `exclude`
    pub fn best_candidate(
        &self,
        ledger: &Ledger,
        slot: &Slot,
        exclude: Option<UserId>,
    ) -> Option<UserId> {
        if slot.team_id != self.team_id {
            return None;
        }

        let mut best: Option<(UserId, f64)> = None;
        for &user in &self.candidates {
            if Some(user) == exclude {
                continue;
            }
            if let Err(rejection) =
                constraints::check(ledger, &self.policy, user, slot, CheckMode::Assignment)
            {
                tracing::trace!(slot_id = slot.id, user, reason = %rejection, "Candidate rejected");
                continue;
            }
            let score = constraints::fairness_score(ledger, &self.weights, user, slot);
            if best.map_or(true, |(_, best_score)| score < best_score) {
                best = Some((user, score));
            }
        }
        best.map(|(user, _)| user)
    }

    /// Assign open slots in start order, updating `ledger` as picks are made
    ///
    /// Nothing is persisted; the picks are returned in `assigned`.
    pub fn assign(&self, ledger: &mut Ledger, slots: &[Slot]) -> AssignmentOutcome {
        let mut ordered: Vec<&Slot> = slots.iter().collect();
        ordered.sort_by_key(|s| (s.start_time, s.id));

        let mut outcome = AssignmentOutcome {
            total_slots_considered: ordered.len(),
            ..AssignmentOutcome::default()
        };

        for slot in ordered {
            if slot.assigned_member.is_some() {
                continue;
            }
            match self.best_candidate(ledger, slot, None) {
                Some(user) if self.is_candidate(user) && slot.team_id == self.team_id => {
                    ledger.book(user, slot);
                    outcome.assigned.push((slot.id, user));
                    outcome.assignments_made += 1;
                }
                Some(user) => {
                    tracing::error!(
                        slot_id = slot.id,
                        user,
                        team_id = self.team_id,
                        "Cross-team assignment rejected"
                    );
                    outcome
                        .violations
                        .push(Violation::new(slot.id, Some(user), CROSS_TEAM_REJECTED));
                }
                None => {
                    outcome
                        .violations
                        .push(Violation::new(slot.id, None, NO_SUITABLE_MEMBER));
                }
            }
        }

        outcome
    }
}

// ============================================================================
// Store-backed entry point
// ============================================================================

/// Assign the team's open slots whose start date falls in `[from, to]`
///
/// Picks are written back in one atomic batch.
pub fn assign_open_slots(
    store: &dyn ScheduleStore,
    team: &Team,
    from: NaiveDate,
    to: NaiveDate,
    weights: FairnessConfig,
) -> Result<AssignmentOutcome> {
    let window_start = from.and_time(NaiveTime::MIN);
    let window_end = (to + Duration::days(1)).and_time(NaiveTime::MIN);
    let open = store.slots_between(Some(team.id), window_start, window_end, SlotFilter::Unassigned)?;
    if open.is_empty() {
        tracing::debug!(team_id = team.id, "No open slots to assign");
        return Ok(AssignmentOutcome::default());
    }

    let members = store.active_members(team.id)?;
    let assigner = FairAssigner::new(team, &members, weights);
    let mut ledger = Ledger::load(store, team.id, assigner.candidates(), from, to)?;

    let outcome = assigner.assign(&mut ledger, &open);
    let changes: Vec<(SlotId, Option<UserId>)> = outcome
        .assigned
        .iter()
        .map(|(slot, user)| (*slot, Some(*user)))
        .collect();
    store.apply_assignments(&changes)?;

    metrics::record_assignment(team.id, outcome.assignments_made, outcome.violations.len());
    tracing::info!(
        team_id = team.id,
        considered = outcome.total_slots_considered,
        assigned = outcome.assignments_made,
        violations = outcome.violations.len(),
        "Assignment batch complete"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDateTime, Utc};

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn team(policy: TeamPolicy) -> Team {
        Team {
            id: 1,
            name: "Platform".to_string(),
            policy,
            is_active: true,
            created_at: Utc::now().naive_utc(),
        }
    }

    fn member(id: i64, user: UserId, team_id: TeamId) -> Membership {
        Membership {
            id,
            user_id: user,
            team_id,
            is_active: true,
            created_at: at(1, 0),
        }
    }

    fn day_slots(day: u32, first_id: i64) -> Vec<Slot> {
        (0..3)
            .map(|n| Slot {
                id: first_id + n,
                team_id: 1,
                start_time: at(day, (n * 8) as u32),
                end_time: at(day, (n * 8) as u32) + Duration::hours(8),
                assigned_member: None,
                is_holiday: false,
            })
            .collect()
    }

    fn three_shift() -> TeamPolicy {
        TeamPolicy::from_hours(8, 8.0, 40.0, 8.0)
    }

    #[test]
    fn test_each_member_takes_one_shift() {
        let members = vec![member(1, 10, 1), member(2, 20, 1), member(3, 30, 1)];
        let assigner = FairAssigner::new(&team(three_shift()), &members, FairnessConfig::default());
        let mut ledger = Ledger::new();

        let outcome = assigner.assign(&mut ledger, &day_slots(16, 1));
        assert_eq!(outcome.assignments_made, 3);
        assert_eq!(outcome.total_slots_considered, 3);
        assert!(outcome.violations.is_empty());

        let mut users: Vec<_> = outcome.assigned.iter().map(|(_, u)| *u).collect();
        users.sort();
        assert_eq!(users, vec![10, 20, 30]);
    }

    #[test]
    fn test_unavailable_member_leaves_gap() {
        let members = vec![member(1, 10, 1), member(2, 20, 1), member(3, 30, 1)];
        let assigner = FairAssigner::new(&team(three_shift()), &members, FairnessConfig::default());
        let mut ledger = Ledger::new();
        ledger.mark_unavailable(30, at(16, 0).date());

        let outcome = assigner.assign(&mut ledger, &day_slots(16, 1));
        assert_eq!(outcome.assignments_made, 2);
        assert!(outcome.assigned.iter().all(|(_, u)| *u != 30));
        assert_eq!(outcome.violations.len(), 1);
        assert_eq!(outcome.violations[0].slot_id, 3);
        assert_eq!(outcome.violations[0].member_id, None);
        assert_eq!(outcome.violations[0].reason, NO_SUITABLE_MEMBER);
    }

    #[test]
    fn test_fewer_recent_assignments_wins() {
        let members = vec![member(1, 10, 1), member(2, 20, 1)];
        let assigner = FairAssigner::new(&team(three_shift()), &members, FairnessConfig::default());
        let mut ledger = Ledger::new();
        // user 10 worked twice this week, user 20 once
        let history = day_slots(12, 100);
        ledger.book(10, &history[0]);
        let history = day_slots(13, 200);
        ledger.book(10, &history[0]);
        ledger.book(20, &history[1]);

        let slot = &day_slots(16, 1)[0];
        assert_eq!(assigner.best_candidate(&ledger, slot, None), Some(20));
        assert_eq!(assigner.best_candidate(&ledger, slot, Some(20)), Some(10));
    }

    #[test]
    fn test_tie_goes_to_first_member() {
        let members = vec![member(1, 30, 1), member(2, 10, 1)];
        let assigner = FairAssigner::new(&team(three_shift()), &members, FairnessConfig::default());
        let ledger = Ledger::new();
        let slot = &day_slots(16, 1)[0];
        assert_eq!(assigner.best_candidate(&ledger, slot, None), Some(30));
    }

    #[test]
    fn test_other_team_members_never_considered() {
        let members = vec![member(1, 10, 2), member(2, 20, 1)];
        let assigner = FairAssigner::new(&team(three_shift()), &members, FairnessConfig::default());
        assert_eq!(assigner.candidates(), &[20]);

        let mut foreign = day_slots(16, 1)[0].clone();
        foreign.team_id = 2;
        assert_eq!(assigner.best_candidate(&Ledger::new(), &foreign, None), None);
    }

    #[test]
    fn test_batch_picks_pass_their_own_rules() {
        let members: Vec<_> = (1..=4).map(|i| member(i, i * 10, 1)).collect();
        let policy = TeamPolicy::from_hours(4, 8.0, 40.0, 8.0);
        let assigner = FairAssigner::new(&team(policy), &members, FairnessConfig::default());
        let mut ledger = Ledger::new();

        let slots: Vec<Slot> = (0..6 * 7)
            .map(|n| {
                let start = at(15, 0) + Duration::hours(4 * n);
                Slot {
                    id: n + 1,
                    team_id: 1,
                    start_time: start,
                    end_time: start + Duration::hours(4),
                    assigned_member: None,
                    is_holiday: false,
                }
            })
            .collect();
        let outcome = assigner.assign(&mut ledger, &slots);
        assert!(outcome.assignments_made > 0);

        for (slot_id, user) in &outcome.assigned {
            let slot = slots.iter().find(|s| s.id == *slot_id).unwrap();
            assert!(
                constraints::check(&ledger, &policy, *user, slot, CheckMode::Revalidation).is_ok(),
                "slot {} for user {} breaks a rule",
                slot_id,
                user
            );
        }
    }
}
