// Core data structures for the on-call rota engine

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::scheduler::error::{SchedulerError, SchedulerResult};

pub type TeamId = i64;
pub type UserId = i64;
pub type SlotId = i64;
pub type MembershipId = i64;
pub type LeaveId = i64;
pub type SwapId = i64;
pub type AlertId = i64;

const MINUTES_PER_DAY: i64 = 24 * 60;

// ============================================================================
// Team Policy
// ============================================================================

/// Scheduling parameters of a team
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TeamPolicy {
    /// Length of one coverage slot in minutes
    pub slot_duration_minutes: i64,

    /// Maximum assigned hours per member per calendar day
    pub max_hours_per_day: f64,

    /// Maximum assigned hours per member per Monday-based week
    pub max_hours_per_week: f64,

    /// Minimum rest between two shifts of the same member
    pub min_rest_hours: f64,
}

impl Default for TeamPolicy {
    fn default() -> Self {
        Self {
            slot_duration_minutes: 60,
            max_hours_per_day: 8.0,
            max_hours_per_week: 40.0,
            min_rest_hours: 8.0,
        }
    }
}

impl TeamPolicy {
    /// Create a policy from slot length in whole hours
    pub fn from_hours(slot_hours: i64, max_day: f64, max_week: f64, min_rest: f64) -> Self {
        Self {
            slot_duration_minutes: slot_hours * 60,
            max_hours_per_day: max_day,
            max_hours_per_week: max_week,
            min_rest_hours: min_rest,
        }
    }

    /// Slot length as a duration
    pub fn slot_duration(&self) -> Duration {
        Duration::minutes(self.slot_duration_minutes)
    }

    /// Slot length in fractional hours
    pub fn slot_hours(&self) -> f64 {
        self.slot_duration_minutes as f64 / 60.0
    }

    /// Number of slots that partition one calendar day
    pub fn slots_per_day(&self) -> i64 {
        if self.slot_duration_minutes <= 0 {
            return 0;
        }
        MINUTES_PER_DAY / self.slot_duration_minutes
    }

    /// Minimum rest as a duration (rounded down to whole seconds)
    pub fn min_rest(&self) -> Duration {
        Duration::seconds((self.min_rest_hours * 3600.0) as i64)
    }

    /// Validate the policy before it is persisted
    ///
    /// Slot lengths that do not divide the day evenly are rejected so the
    /// generator never has to produce a short trailing slot.
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.slot_duration_minutes <= 0 {
            return Err(SchedulerError::invalid_policy(
                "slot_duration",
                "Slot duration must be greater than 0",
            ));
        }
        if self.slot_duration_minutes > MINUTES_PER_DAY {
            return Err(SchedulerError::invalid_policy(
                "slot_duration",
                "Slot duration cannot exceed 24 hours",
            ));
        }
        if MINUTES_PER_DAY % self.slot_duration_minutes != 0 {
            return Err(SchedulerError::invalid_policy(
                "slot_duration",
                format!(
                    "Slot duration of {} minutes does not divide 24 hours evenly",
                    self.slot_duration_minutes
                ),
            ));
        }
        if !(self.max_hours_per_day > 0.0 && self.max_hours_per_day <= 24.0) {
            return Err(SchedulerError::invalid_policy(
                "max_hours_per_day",
                "Daily hours must be greater than 0 and at most 24",
            ));
        }
        if !(self.max_hours_per_week > 0.0 && self.max_hours_per_week <= 168.0) {
            return Err(SchedulerError::invalid_policy(
                "max_hours_per_week",
                "Weekly hours must be greater than 0 and at most 168",
            ));
        }
        if self.max_hours_per_week < self.max_hours_per_day {
            return Err(SchedulerError::invalid_policy(
                "max_hours_per_week",
                "Weekly hours cannot be less than daily hours",
            ));
        }
        if !(self.min_rest_hours >= 0.0) {
            return Err(SchedulerError::invalid_policy(
                "min_rest_hours",
                "Minimum rest hours cannot be negative",
            ));
        }
        if self.min_rest_hours > self.max_hours_per_day {
            return Err(SchedulerError::invalid_policy(
                "min_rest_hours",
                "Minimum rest hours cannot be greater than maximum daily hours",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Team & Membership
// ============================================================================

/// A team that owns slots and memberships
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub policy: TeamPolicy,
    /// Derived from active headcount; never set directly by users
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

/// Input for creating a team
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTeam {
    pub name: String,
    pub policy: TeamPolicy,
}

impl NewTeam {
    pub fn new(name: impl Into<String>, policy: TeamPolicy) -> Self {
        Self {
            name: name.into(),
            policy,
        }
    }

    /// Validate name and policy
    pub fn validate(&self) -> SchedulerResult<()> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(SchedulerError::invalid_policy("name", "Team name is required"));
        }
        if name.chars().count() < 3 {
            return Err(SchedulerError::invalid_policy(
                "name",
                "Team name must be at least 3 characters long",
            ));
        }
        self.policy.validate()
    }
}

/// Link between a user and a team
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub id: MembershipId,
    pub user_id: UserId,
    pub team_id: TeamId,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

/// A day on which a team generates no slots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holiday {
    pub team_id: TeamId,
    pub date: NaiveDate,
    pub description: String,
}

/// Explicit availability of a user on a date
///
/// A missing record means available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub user_id: UserId,
    pub date: NaiveDate,
    pub is_available: bool,
}

// ============================================================================
// Leave
// ============================================================================

/// Lifecycle state of a leave request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
}

impl LeaveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for LeaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LeaveStatus {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(SchedulerError::storage(
                "decode leave status",
                format!("Unknown leave status '{other}'"),
            )),
        }
    }
}

/// A request for a day off from a team's rota
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub id: LeaveId,
    pub user_id: UserId,
    pub team_id: TeamId,
    pub date: NaiveDate,
    pub reason: Option<String>,
    pub status: LeaveStatus,
    pub created_at: NaiveDateTime,
    pub responded_at: Option<NaiveDateTime>,
}

// ============================================================================
// Slot
// ============================================================================

/// A fixed-duration coverage window of a team
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub id: SlotId,
    pub team_id: TeamId,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub assigned_member: Option<UserId>,
    pub is_holiday: bool,
}

impl Slot {
    /// Coverage mirrors the presence of an assignee
    pub fn is_covered(&self) -> bool {
        self.assigned_member.is_some()
    }

    /// Calendar date the slot starts on
    pub fn date(&self) -> NaiveDate {
        self.start_time.date()
    }

    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }

    pub fn hours(&self) -> f64 {
        self.duration().num_seconds() as f64 / 3600.0
    }

    /// Monday of the week the slot belongs to
    pub fn week_start(&self) -> NaiveDate {
        week_start(self.date())
    }
}

/// A slot waiting to be inserted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSlot {
    pub team_id: TeamId,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
}

/// Monday on or before the given date
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

// ============================================================================
// Swap
// ============================================================================

/// Lifecycle state of a swap request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapStatus {
    Pending,
    Accepted,
    Rejected,
}

/// Proposed exchange of assignees between two slots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapRequest {
    pub id: SwapId,
    pub from_slot: SlotId,
    pub to_slot: SlotId,
    pub requested_by: UserId,
    pub accepted: bool,
    pub rejected: bool,
    pub created_at: NaiveDateTime,
    pub responded_at: Option<NaiveDateTime>,
}

impl SwapRequest {
    pub fn is_pending(&self) -> bool {
        !(self.accepted || self.rejected)
    }

    pub fn status(&self) -> SwapStatus {
        if self.accepted {
            SwapStatus::Accepted
        } else if self.rejected {
            SwapStatus::Rejected
        } else {
            SwapStatus::Pending
        }
    }
}

// ============================================================================
// Alert
// ============================================================================

/// Open or resolved coverage-gap alert for one slot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub team_id: TeamId,
    pub slot_id: SlotId,
    pub message: String,
    pub created_at: NaiveDateTime,
    pub resolved: bool,
    pub resolved_at: Option<NaiveDateTime>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_default_policy_is_valid() {
        assert!(TeamPolicy::default().validate().is_ok());
    }

    #[test]
    fn test_policy_rejects_non_divisor_duration() {
        let policy = TeamPolicy::from_hours(5, 10.0, 40.0, 8.0);
        let err = policy.validate().unwrap_err();
        assert_eq!(err.field(), Some("slot_duration"));
    }

    #[test]
    fn test_policy_rejects_week_below_day() {
        let policy = TeamPolicy::from_hours(8, 8.0, 6.0, 4.0);
        let err = policy.validate().unwrap_err();
        assert_eq!(err.field(), Some("max_hours_per_week"));
    }

    #[test]
    fn test_policy_rejects_rest_above_day() {
        let policy = TeamPolicy::from_hours(4, 8.0, 40.0, 12.0);
        let err = policy.validate().unwrap_err();
        assert_eq!(err.field(), Some("min_rest_hours"));
    }

    #[test]
    fn test_policy_slot_math() {
        let policy = TeamPolicy::from_hours(8, 8.0, 40.0, 8.0);
        assert_eq!(policy.slots_per_day(), 3);
        assert_eq!(policy.slot_hours(), 8.0);
        assert_eq!(policy.slot_duration(), Duration::hours(8));

        let half_hour = TeamPolicy {
            slot_duration_minutes: 30,
            ..TeamPolicy::default()
        };
        assert!(half_hour.validate().is_ok());
        assert_eq!(half_hour.slots_per_day(), 48);
    }

    #[test]
    fn test_new_team_name_validation() {
        let team = NewTeam::new("  ab ", TeamPolicy::default());
        assert_eq!(team.validate().unwrap_err().field(), Some("name"));
        assert!(NewTeam::new("Platform", TeamPolicy::default()).validate().is_ok());
    }

    #[test]
    fn test_slot_helpers() {
        let slot = Slot {
            id: 1,
            team_id: 1,
            start_time: dt(2024, 1, 17, 8),
            end_time: dt(2024, 1, 17, 16),
            assigned_member: None,
            is_holiday: false,
        };
        assert!(!slot.is_covered());
        assert_eq!(slot.hours(), 8.0);
        // 2024-01-17 is a Wednesday
        assert_eq!(slot.week_start(), NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    }

    #[test]
    fn test_swap_status() {
        let mut swap = SwapRequest {
            id: 1,
            from_slot: 1,
            to_slot: 2,
            requested_by: 7,
            accepted: false,
            rejected: false,
            created_at: dt(2024, 1, 1, 0),
            responded_at: None,
        };
        assert!(swap.is_pending());
        swap.accepted = true;
        assert_eq!(swap.status(), SwapStatus::Accepted);
    }

    #[test]
    fn test_leave_status_parse() {
        assert_eq!("approved".parse::<LeaveStatus>().unwrap(), LeaveStatus::Approved);
        let err = "unknown".parse::<LeaveStatus>().unwrap_err();
        assert!(matches!(err, SchedulerError::Storage { .. }));
        assert!(!err.is_validation());
    }
}
