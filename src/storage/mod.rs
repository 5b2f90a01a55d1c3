//! Persistence boundary of the rota engine
//!
//! The engine talks to storage only through [`ScheduleStore`], a synchronous
//! trait where every call is one bounded unit of work. Multi-row writes
//! (slot batches, assignment batches, swap exchange, leave approval) are
//! atomic: either every row is written or none.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Rota Engine                             │
//! │   generator, assigner, revalidator, swaps, leave, monitor   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   ScheduleStore trait                       │
//! └─────────────────────────────────────────────────────────────┘
//!                    │                       │
//!                    ▼                       ▼
//!          ┌─────────────────┐     ┌─────────────────┐
//!          │     SQLite      │     │    In-memory    │
//!          │  Implementation │     │  Implementation │
//!          └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use oncall_rota::storage::{SqliteScheduleStore, MemoryScheduleStore};
//!
//! // Production: use SQLite
//! let store = SqliteScheduleStore::new("data/oncall.db")?;
//!
//! // Testing: use the in-memory store
//! let store = MemoryScheduleStore::new();
//! ```

mod memory;
mod sqlite;

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashSet;

use crate::error::Result;
use crate::models::{
    Alert, AlertId, Availability, Holiday, LeaveId, LeaveRequest, Membership, NewSlot, NewTeam,
    Slot, SlotId, SwapId, SwapRequest, Team, TeamId, UserId,
};

pub use memory::MemoryScheduleStore;
pub use sqlite::SqliteScheduleStore;

/// Which slots a range query returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotFilter {
    Any,
    Assigned,
    Unassigned,
}

impl SlotFilter {
    pub fn matches(&self, slot: &Slot) -> bool {
        match self {
            Self::Any => true,
            Self::Assigned => slot.assigned_member.is_some(),
            Self::Unassigned => slot.assigned_member.is_none(),
        }
    }
}

/// Storage operations required by the rota engine
pub trait ScheduleStore: Send + Sync {
    // ------------------------------------------------------------------
    // Teams
    // ------------------------------------------------------------------

    /// Insert a team; names are unique case-insensitively. New teams start inactive.
    fn insert_team(&self, team: &NewTeam, now: NaiveDateTime) -> Result<Team>;

    fn get_team(&self, team_id: TeamId) -> Result<Option<Team>>;

    /// All teams ordered by id, optionally only active ones
    fn list_teams(&self, active_only: bool) -> Result<Vec<Team>>;

    fn set_team_active(&self, team_id: TeamId, active: bool) -> Result<()>;

    // ------------------------------------------------------------------
    // Memberships
    // ------------------------------------------------------------------

    /// Link a user to a team; fails if the (user, team) pair already exists
    fn insert_membership(
        &self,
        user_id: UserId,
        team_id: TeamId,
        now: NaiveDateTime,
    ) -> Result<Membership>;

    fn get_membership(&self, user_id: UserId, team_id: TeamId) -> Result<Option<Membership>>;

    fn memberships_for_user(&self, user_id: UserId) -> Result<Vec<Membership>>;

    fn set_membership_active(&self, user_id: UserId, team_id: TeamId, active: bool)
        -> Result<()>;

    /// Returns whether a membership was removed
    fn delete_membership(&self, user_id: UserId, team_id: TeamId) -> Result<bool>;

    /// Active memberships of a team ordered by membership id
    fn active_members(&self, team_id: TeamId) -> Result<Vec<Membership>>;

    // ------------------------------------------------------------------
    // Holidays & availability
    // ------------------------------------------------------------------

    fn add_holiday(&self, holiday: &Holiday) -> Result<()>;

    /// Holiday dates of a team within `[from, to]`
    fn holidays_between(
        &self,
        team_id: TeamId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<HashSet<NaiveDate>>;

    /// Insert or replace the availability record for (user, date)
    fn set_availability(&self, availability: &Availability) -> Result<()>;

    fn get_availability(&self, user_id: UserId, date: NaiveDate) -> Result<Option<Availability>>;

    /// (user, date) pairs within `[from, to]` that are blocked either by an
    /// `is_available = false` record or by approved leave for `team_id`
    fn unavailable_days(
        &self,
        user_ids: &[UserId],
        team_id: TeamId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<HashSet<(UserId, NaiveDate)>>;

    // ------------------------------------------------------------------
    // Leave
    // ------------------------------------------------------------------

    /// Insert a pending leave request; unique per (user, team, date)
    fn insert_leave(
        &self,
        user_id: UserId,
        team_id: TeamId,
        date: NaiveDate,
        reason: Option<&str>,
        now: NaiveDateTime,
    ) -> Result<LeaveRequest>;

    fn get_leave(&self, leave_id: LeaveId) -> Result<Option<LeaveRequest>>;

    /// Atomically approve a leave request: mark it approved, record the user
    /// as unavailable on that date, and clear the user's assignments in that
    /// team on that date. Returns the cleared slot ids.
    fn approve_leave(&self, leave_id: LeaveId, now: NaiveDateTime) -> Result<Vec<SlotId>>;

    fn reject_leave(&self, leave_id: LeaveId, now: NaiveDateTime) -> Result<()>;

    // ------------------------------------------------------------------
    // Slots
    // ------------------------------------------------------------------

    /// Insert slots in one transaction, ignoring keys that already exist.
    /// Returns the number of rows actually created.
    fn insert_slots(&self, slots: &[NewSlot]) -> Result<usize>;

    /// Start times of a team's existing slots within `[from, to)`
    fn slot_starts_between(
        &self,
        team_id: TeamId,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<HashSet<NaiveDateTime>>;

    fn get_slot(&self, slot_id: SlotId) -> Result<Option<Slot>>;

    /// Slots starting within `[from, to)` ordered by start time, optionally
    /// restricted to one team
    fn slots_between(
        &self,
        team_id: Option<TeamId>,
        from: NaiveDateTime,
        to: NaiveDateTime,
        filter: SlotFilter,
    ) -> Result<Vec<Slot>>;

    /// Every assigned slot (any team) held by one of `user_ids` starting at
    /// or after `from`
    fn assignments_for_users(&self, user_ids: &[UserId], from: NaiveDateTime)
        -> Result<Vec<Slot>>;

    /// Set or clear assignees of several slots in one transaction
    fn apply_assignments(&self, changes: &[(SlotId, Option<UserId>)]) -> Result<()>;

    /// Delete unassigned slots starting before `before`; assigned slots are kept
    fn delete_unassigned_before(&self, before: NaiveDateTime) -> Result<usize>;

    /// Delete a team's unassigned slots starting within `[from, to)`
    fn delete_unassigned_between(
        &self,
        team_id: TeamId,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<usize>;

    // ------------------------------------------------------------------
    // Swaps
    // ------------------------------------------------------------------

    fn insert_swap(
        &self,
        from_slot: SlotId,
        to_slot: SlotId,
        requested_by: UserId,
        now: NaiveDateTime,
    ) -> Result<SwapRequest>;

    fn get_swap(&self, swap_id: SwapId) -> Result<Option<SwapRequest>>;

    fn pending_swap_exists(&self, from_slot: SlotId, to_slot: SlotId) -> Result<bool>;

    fn pending_swaps(&self) -> Result<Vec<SwapRequest>>;

    /// Atomically exchange the assignees of both slots and mark the swap accepted
    fn complete_swap(&self, swap_id: SwapId, now: NaiveDateTime) -> Result<()>;

    fn reject_swap(&self, swap_id: SwapId, now: NaiveDateTime) -> Result<()>;

    // ------------------------------------------------------------------
    // Alerts
    // ------------------------------------------------------------------

    fn open_alert_for_slot(&self, slot_id: SlotId) -> Result<Option<Alert>>;

    fn insert_alert(
        &self,
        team_id: TeamId,
        slot_id: SlotId,
        message: &str,
        now: NaiveDateTime,
    ) -> Result<Alert>;

    fn resolve_alert(&self, alert_id: AlertId, now: NaiveDateTime) -> Result<()>;

    fn open_alerts(&self) -> Result<Vec<Alert>>;
}
