//! Leave request lifecycle

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::error::SchedulerError;
use crate::error::Result;
use crate::models::{LeaveId, LeaveRequest, SlotId, TeamId, UserId};
use crate::storage::ScheduleStore;

/// Approved leave and the assignments it released
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveApproval {
    pub leave: LeaveRequest,
    pub cleared_slots: Vec<SlotId>,
}

pub struct LeaveService<'a> {
    store: &'a dyn ScheduleStore,
}

impl<'a> LeaveService<'a> {
    pub fn new(store: &'a dyn ScheduleStore) -> Self {
        Self { store }
    }

    fn find(&self, leave_id: LeaveId) -> Result<LeaveRequest> {
        self.store
            .get_leave(leave_id)?
            .ok_or_else(|| SchedulerError::LeaveNotFound { leave_id }.into())
    }

    /// Record a pending request for one day off
    pub fn request(
        &self,
        user_id: UserId,
        team_id: TeamId,
        date: NaiveDate,
        reason: Option<&str>,
        now: NaiveDateTime,
    ) -> Result<LeaveRequest> {
        if self.store.get_membership(user_id, team_id)?.is_none() {
            return Err(SchedulerError::MembershipNotFound { user_id, team_id }.into());
        }
        let leave = self.store.insert_leave(user_id, team_id, date, reason, now)?;
        tracing::info!(leave_id = leave.id, user_id, team_id, %date, "Leave requested");
        Ok(leave)
    }

    /// Approve: mark the day unavailable and release the user's slots on it
    pub fn approve(&self, leave_id: LeaveId, now: NaiveDateTime) -> Result<LeaveApproval> {
        let cleared_slots = self.store.approve_leave(leave_id, now)?;
        let leave = self.find(leave_id)?;
        tracing::info!(
            leave_id,
            user_id = leave.user_id,
            date = %leave.date,
            cleared = cleared_slots.len(),
            "Leave approved"
        );
        Ok(LeaveApproval {
            leave,
            cleared_slots,
        })
    }

    pub fn reject(&self, leave_id: LeaveId, now: NaiveDateTime) -> Result<LeaveRequest> {
        self.store.reject_leave(leave_id, now)?;
        tracing::info!(leave_id, "Leave rejected");
        self.find(leave_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LeaveStatus, NewTeam, TeamPolicy};
    use crate::storage::MemoryScheduleStore;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_request_requires_membership() {
        let store = MemoryScheduleStore::new();
        let team = store
            .insert_team(&NewTeam::new("Platform", TeamPolicy::default()), at(1))
            .unwrap();
        let leaves = LeaveService::new(&store);

        assert!(leaves
            .request(5, team.id, at(16).date(), None, at(1))
            .is_err());

        store.insert_membership(5, team.id, at(1)).unwrap();
        let leave = leaves
            .request(5, team.id, at(16).date(), Some("conference"), at(1))
            .unwrap();
        assert_eq!(leave.status, LeaveStatus::Pending);
    }

    #[test]
    fn test_reject_then_cannot_approve() {
        let store = MemoryScheduleStore::new();
        let team = store
            .insert_team(&NewTeam::new("Platform", TeamPolicy::default()), at(1))
            .unwrap();
        store.insert_membership(5, team.id, at(1)).unwrap();
        let leaves = LeaveService::new(&store);
        let leave = leaves.request(5, team.id, at(16).date(), None, at(1)).unwrap();

        let rejected = leaves.reject(leave.id, at(2)).unwrap();
        assert_eq!(rejected.status, LeaveStatus::Rejected);
        assert!(leaves.approve(leave.id, at(3)).is_err());
        assert!(store.get_availability(5, at(16).date()).unwrap().is_none());
    }
}
