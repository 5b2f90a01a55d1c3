//! In-memory implementation of [`ScheduleStore`] for tests and dry runs

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{NaiveDate, NaiveDateTime};

use super::{ScheduleStore, SlotFilter};
use crate::error::Result;
use crate::models::{
    Alert, AlertId, Availability, Holiday, LeaveId, LeaveRequest, LeaveStatus, Membership,
    NewSlot, NewTeam, Slot, SlotId, SwapId, SwapRequest, Team, TeamId, UserId,
};
use crate::scheduler::error::SchedulerError;

#[derive(Default)]
struct State {
    next_id: i64,
    teams: BTreeMap<TeamId, Team>,
    memberships: BTreeMap<i64, Membership>,
    holidays: HashMap<(TeamId, NaiveDate), Holiday>,
    availability: HashMap<(UserId, NaiveDate), bool>,
    leaves: BTreeMap<LeaveId, LeaveRequest>,
    slots: BTreeMap<SlotId, Slot>,
    swaps: BTreeMap<SwapId, SwapRequest>,
    alerts: BTreeMap<AlertId, Alert>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn slot_exists(&self, team_id: TeamId, start: NaiveDateTime) -> bool {
        self.slots
            .values()
            .any(|s| s.team_id == team_id && s.start_time == start)
    }

    fn sorted(mut slots: Vec<Slot>) -> Vec<Slot> {
        slots.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id)));
        slots
    }
}

/// Store keeping every record in process memory
#[derive(Default)]
pub struct MemoryScheduleStore {
    state: RwLock<State>,
}

impl MemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|e| SchedulerError::storage("read", e.to_string()).into())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|e| SchedulerError::storage("write", e.to_string()).into())
    }
}

impl ScheduleStore for MemoryScheduleStore {
    fn insert_team(&self, team: &NewTeam, now: NaiveDateTime) -> Result<Team> {
        let mut state = self.write()?;
        let name = team.name.trim();
        if state
            .teams
            .values()
            .any(|t| t.name.eq_ignore_ascii_case(name))
        {
            return Err(SchedulerError::DuplicateTeamName {
                name: name.to_string(),
            }
            .into());
        }
        let created = Team {
            id: state.next_id(),
            name: name.to_string(),
            policy: team.policy,
            is_active: false,
            created_at: now,
        };
        state.teams.insert(created.id, created.clone());
        Ok(created)
    }

    fn get_team(&self, team_id: TeamId) -> Result<Option<Team>> {
        Ok(self.read()?.teams.get(&team_id).cloned())
    }

    fn list_teams(&self, active_only: bool) -> Result<Vec<Team>> {
        Ok(self
            .read()?
            .teams
            .values()
            .filter(|t| !active_only || t.is_active)
            .cloned()
            .collect())
    }

    fn set_team_active(&self, team_id: TeamId, active: bool) -> Result<()> {
        let mut state = self.write()?;
        let team = state
            .teams
            .get_mut(&team_id)
            .ok_or(SchedulerError::TeamNotFound { team_id })?;
        team.is_active = active;
        Ok(())
    }

    fn insert_membership(
        &self,
        user_id: UserId,
        team_id: TeamId,
        now: NaiveDateTime,
    ) -> Result<Membership> {
        let mut state = self.write()?;
        if state
            .memberships
            .values()
            .any(|m| m.user_id == user_id && m.team_id == team_id)
        {
            return Err(SchedulerError::MembershipExists { user_id, team_id }.into());
        }
        let membership = Membership {
            id: state.next_id(),
            user_id,
            team_id,
            is_active: true,
            created_at: now,
        };
        state.memberships.insert(membership.id, membership.clone());
        Ok(membership)
    }

    fn get_membership(&self, user_id: UserId, team_id: TeamId) -> Result<Option<Membership>> {
        Ok(self
            .read()?
            .memberships
            .values()
            .find(|m| m.user_id == user_id && m.team_id == team_id)
            .cloned())
    }

    fn memberships_for_user(&self, user_id: UserId) -> Result<Vec<Membership>> {
        Ok(self
            .read()?
            .memberships
            .values()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect())
    }

    fn set_membership_active(
        &self,
        user_id: UserId,
        team_id: TeamId,
        active: bool,
    ) -> Result<()> {
        let mut state = self.write()?;
        let membership = state
            .memberships
            .values_mut()
            .find(|m| m.user_id == user_id && m.team_id == team_id)
            .ok_or(SchedulerError::MembershipNotFound { user_id, team_id })?;
        membership.is_active = active;
        Ok(())
    }

    fn delete_membership(&self, user_id: UserId, team_id: TeamId) -> Result<bool> {
        let mut state = self.write()?;
        let before = state.memberships.len();
        state
            .memberships
            .retain(|_, m| !(m.user_id == user_id && m.team_id == team_id));
        Ok(state.memberships.len() < before)
    }

    fn active_members(&self, team_id: TeamId) -> Result<Vec<Membership>> {
        Ok(self
            .read()?
            .memberships
            .values()
            .filter(|m| m.team_id == team_id && m.is_active)
            .cloned()
            .collect())
    }

    fn add_holiday(&self, holiday: &Holiday) -> Result<()> {
        self.write()?
            .holidays
            .insert((holiday.team_id, holiday.date), holiday.clone());
        Ok(())
    }

    fn holidays_between(
        &self,
        team_id: TeamId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<HashSet<NaiveDate>> {
        Ok(self
            .read()?
            .holidays
            .keys()
            .filter(|(team, date)| *team == team_id && *date >= from && *date <= to)
            .map(|(_, date)| *date)
            .collect())
    }

    fn set_availability(&self, availability: &Availability) -> Result<()> {
        self.write()?.availability.insert(
            (availability.user_id, availability.date),
            availability.is_available,
        );
        Ok(())
    }

    fn get_availability(&self, user_id: UserId, date: NaiveDate) -> Result<Option<Availability>> {
        Ok(self
            .read()?
            .availability
            .get(&(user_id, date))
            .map(|is_available| Availability {
                user_id,
                date,
                is_available: *is_available,
            }))
    }

    fn unavailable_days(
        &self,
        user_ids: &[UserId],
        team_id: TeamId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<HashSet<(UserId, NaiveDate)>> {
        let state = self.read()?;
        let in_range = |user: &UserId, date: &NaiveDate| {
            user_ids.contains(user) && *date >= from && *date <= to
        };

        let mut blocked: HashSet<(UserId, NaiveDate)> = state
            .availability
            .iter()
            .filter(|((user, date), available)| !**available && in_range(user, date))
            .map(|(key, _)| *key)
            .collect();
        blocked.extend(
            state
                .leaves
                .values()
                .filter(|l| {
                    l.status == LeaveStatus::Approved
                        && l.team_id == team_id
                        && in_range(&l.user_id, &l.date)
                })
                .map(|l| (l.user_id, l.date)),
        );
        Ok(blocked)
    }

    fn insert_leave(
        &self,
        user_id: UserId,
        team_id: TeamId,
        date: NaiveDate,
        reason: Option<&str>,
        now: NaiveDateTime,
    ) -> Result<LeaveRequest> {
        let mut state = self.write()?;
        if state
            .leaves
            .values()
            .any(|l| l.user_id == user_id && l.team_id == team_id && l.date == date)
        {
            return Err(SchedulerError::DuplicateLeave {
                user_id,
                date: date.to_string(),
            }
            .into());
        }
        let leave = LeaveRequest {
            id: state.next_id(),
            user_id,
            team_id,
            date,
            reason: reason.map(str::to_string),
            status: LeaveStatus::Pending,
            created_at: now,
            responded_at: None,
        };
        state.leaves.insert(leave.id, leave.clone());
        Ok(leave)
    }

    fn get_leave(&self, leave_id: LeaveId) -> Result<Option<LeaveRequest>> {
        Ok(self.read()?.leaves.get(&leave_id).cloned())
    }

    fn approve_leave(&self, leave_id: LeaveId, now: NaiveDateTime) -> Result<Vec<SlotId>> {
        let mut state = self.write()?;
        let leave = state
            .leaves
            .get(&leave_id)
            .cloned()
            .ok_or(SchedulerError::LeaveNotFound { leave_id })?;
        if leave.status != LeaveStatus::Pending {
            return Err(SchedulerError::LeaveAlreadyResolved { leave_id }.into());
        }

        let mut cleared: Vec<&mut Slot> = state
            .slots
            .values_mut()
            .filter(|s| {
                s.team_id == leave.team_id
                    && s.assigned_member == Some(leave.user_id)
                    && s.date() == leave.date
            })
            .collect();
        cleared.sort_by_key(|s| s.start_time);
        let cleared_ids: Vec<SlotId> = cleared
            .into_iter()
            .map(|slot| {
                slot.assigned_member = None;
                slot.id
            })
            .collect();

        state.availability.insert((leave.user_id, leave.date), false);
        if let Some(stored) = state.leaves.get_mut(&leave_id) {
            stored.status = LeaveStatus::Approved;
            stored.responded_at = Some(now);
        }
        Ok(cleared_ids)
    }

    fn reject_leave(&self, leave_id: LeaveId, now: NaiveDateTime) -> Result<()> {
        let mut state = self.write()?;
        let leave = state
            .leaves
            .get_mut(&leave_id)
            .ok_or(SchedulerError::LeaveNotFound { leave_id })?;
        if leave.status != LeaveStatus::Pending {
            return Err(SchedulerError::LeaveAlreadyResolved { leave_id }.into());
        }
        leave.status = LeaveStatus::Rejected;
        leave.responded_at = Some(now);
        Ok(())
    }

    fn insert_slots(&self, slots: &[NewSlot]) -> Result<usize> {
        let mut state = self.write()?;
        let mut inserted = 0;
        for slot in slots {
            if state.slot_exists(slot.team_id, slot.start_time) {
                continue;
            }
            let id = state.next_id();
            state.slots.insert(
                id,
                Slot {
                    id,
                    team_id: slot.team_id,
                    start_time: slot.start_time,
                    end_time: slot.end_time,
                    assigned_member: None,
                    is_holiday: false,
                },
            );
            inserted += 1;
        }
        Ok(inserted)
    }

    fn slot_starts_between(
        &self,
        team_id: TeamId,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<HashSet<NaiveDateTime>> {
        Ok(self
            .read()?
            .slots
            .values()
            .filter(|s| s.team_id == team_id && s.start_time >= from && s.start_time < to)
            .map(|s| s.start_time)
            .collect())
    }

    fn get_slot(&self, slot_id: SlotId) -> Result<Option<Slot>> {
        Ok(self.read()?.slots.get(&slot_id).cloned())
    }

    fn slots_between(
        &self,
        team_id: Option<TeamId>,
        from: NaiveDateTime,
        to: NaiveDateTime,
        filter: SlotFilter,
    ) -> Result<Vec<Slot>> {
        let state = self.read()?;
        let slots = state
            .slots
            .values()
            .filter(|s| team_id.map_or(true, |t| s.team_id == t))
            .filter(|s| s.start_time >= from && s.start_time < to && filter.matches(s))
            .cloned()
            .collect();
        Ok(State::sorted(slots))
    }

    fn assignments_for_users(
        &self,
        user_ids: &[UserId],
        from: NaiveDateTime,
    ) -> Result<Vec<Slot>> {
        let state = self.read()?;
        let slots = state
            .slots
            .values()
            .filter(|s| {
                s.start_time >= from
                    && s.assigned_member.is_some_and(|m| user_ids.contains(&m))
            })
            .cloned()
            .collect();
        Ok(State::sorted(slots))
    }

    fn apply_assignments(&self, changes: &[(SlotId, Option<UserId>)]) -> Result<()> {
        let mut state = self.write()?;
        if let Some((slot_id, _)) = changes
            .iter()
            .find(|(slot_id, _)| !state.slots.contains_key(slot_id))
        {
            return Err(SchedulerError::SlotNotFound { slot_id: *slot_id }.into());
        }
        for (slot_id, member) in changes {
            if let Some(slot) = state.slots.get_mut(slot_id) {
                slot.assigned_member = *member;
            }
        }
        Ok(())
    }

    fn delete_unassigned_before(&self, before: NaiveDateTime) -> Result<usize> {
        let mut state = self.write()?;
        let count = state.slots.len();
        state
            .slots
            .retain(|_, s| s.assigned_member.is_some() || s.start_time >= before);
        Ok(count - state.slots.len())
    }

    fn delete_unassigned_between(
        &self,
        team_id: TeamId,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<usize> {
        let mut state = self.write()?;
        let count = state.slots.len();
        state.slots.retain(|_, s| {
            !(s.team_id == team_id
                && s.assigned_member.is_none()
                && s.start_time >= from
                && s.start_time < to)
        });
        Ok(count - state.slots.len())
    }

    fn insert_swap(
        &self,
        from_slot: SlotId,
        to_slot: SlotId,
        requested_by: UserId,
        now: NaiveDateTime,
    ) -> Result<SwapRequest> {
        let mut state = self.write()?;
        let swap = SwapRequest {
            id: state.next_id(),
            from_slot,
            to_slot,
            requested_by,
            accepted: false,
            rejected: false,
            created_at: now,
            responded_at: None,
        };
        state.swaps.insert(swap.id, swap.clone());
        Ok(swap)
    }

    fn get_swap(&self, swap_id: SwapId) -> Result<Option<SwapRequest>> {
        Ok(self.read()?.swaps.get(&swap_id).cloned())
    }

    fn pending_swap_exists(&self, from_slot: SlotId, to_slot: SlotId) -> Result<bool> {
        Ok(self
            .read()?
            .swaps
            .values()
            .any(|s| s.from_slot == from_slot && s.to_slot == to_slot && s.is_pending()))
    }

    fn pending_swaps(&self) -> Result<Vec<SwapRequest>> {
        Ok(self
            .read()?
            .swaps
            .values()
            .filter(|s| s.is_pending())
            .cloned()
            .collect())
    }

    fn complete_swap(&self, swap_id: SwapId, now: NaiveDateTime) -> Result<()> {
        let mut state = self.write()?;
        let swap = state
            .swaps
            .get(&swap_id)
            .cloned()
            .ok_or(SchedulerError::SwapNotFound { swap_id })?;
        if !swap.is_pending() {
            return Err(SchedulerError::SwapAlreadyResolved { swap_id }.into());
        }
        let from_member = state
            .slots
            .get(&swap.from_slot)
            .ok_or(SchedulerError::SlotNotFound {
                slot_id: swap.from_slot,
            })?
            .assigned_member;
        let to_member = state
            .slots
            .get(&swap.to_slot)
            .ok_or(SchedulerError::SlotNotFound {
                slot_id: swap.to_slot,
            })?
            .assigned_member;

        if let Some(slot) = state.slots.get_mut(&swap.from_slot) {
            slot.assigned_member = to_member;
        }
        if let Some(slot) = state.slots.get_mut(&swap.to_slot) {
            slot.assigned_member = from_member;
        }
        if let Some(stored) = state.swaps.get_mut(&swap_id) {
            stored.accepted = true;
            stored.responded_at = Some(now);
        }
        Ok(())
    }

    fn reject_swap(&self, swap_id: SwapId, now: NaiveDateTime) -> Result<()> {
        let mut state = self.write()?;
        let swap = state
            .swaps
            .get_mut(&swap_id)
            .ok_or(SchedulerError::SwapNotFound { swap_id })?;
        if !swap.is_pending() {
            return Err(SchedulerError::SwapAlreadyResolved { swap_id }.into());
        }
        swap.rejected = true;
        swap.responded_at = Some(now);
        Ok(())
    }

    fn open_alert_for_slot(&self, slot_id: SlotId) -> Result<Option<Alert>> {
        Ok(self
            .read()?
            .alerts
            .values()
            .find(|a| a.slot_id == slot_id && !a.resolved)
            .cloned())
    }

    fn insert_alert(
        &self,
        team_id: TeamId,
        slot_id: SlotId,
        message: &str,
        now: NaiveDateTime,
    ) -> Result<Alert> {
        let mut state = self.write()?;
        let alert = Alert {
            id: state.next_id(),
            team_id,
            slot_id,
            message: message.to_string(),
            created_at: now,
            resolved: false,
            resolved_at: None,
        };
        state.alerts.insert(alert.id, alert.clone());
        Ok(alert)
    }

    fn resolve_alert(&self, alert_id: AlertId, now: NaiveDateTime) -> Result<()> {
        if let Some(alert) = self.write()?.alerts.get_mut(&alert_id) {
            alert.resolved = true;
            alert.resolved_at = Some(now);
        }
        Ok(())
    }

    fn open_alerts(&self) -> Result<Vec<Alert>> {
        Ok(self
            .read()?
            .alerts
            .values()
            .filter(|a| !a.resolved)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::contract;

    #[test]
    fn test_team_names_are_unique() {
        contract::team_names_are_unique(&MemoryScheduleStore::new());
    }

    #[test]
    fn test_slot_insert_is_idempotent() {
        contract::slot_insert_is_idempotent(&MemoryScheduleStore::new());
    }

    #[test]
    fn test_slot_queries_filter_and_order() {
        contract::slot_queries_filter_and_order(&MemoryScheduleStore::new());
    }

    #[test]
    fn test_cleanup_keeps_assigned_slots() {
        contract::cleanup_keeps_assigned_slots(&MemoryScheduleStore::new());
    }

    #[test]
    fn test_memberships_round_trip() {
        contract::memberships_round_trip(&MemoryScheduleStore::new());
    }

    #[test]
    fn test_leave_approval_blocks_and_clears() {
        contract::leave_approval_blocks_and_clears(&MemoryScheduleStore::new());
    }

    #[test]
    fn test_swap_exchange_is_symmetric() {
        contract::swap_exchange_is_symmetric(&MemoryScheduleStore::new());
    }

    #[test]
    fn test_alerts_open_and_resolve() {
        contract::alerts_open_and_resolve(&MemoryScheduleStore::new());
    }
}
