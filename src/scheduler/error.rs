//! Error types for the scheduler module

use std::fmt;

use crate::models::{LeaveId, SlotId, SwapId, TeamId, UserId};

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerError {
    /// Team does not exist
    TeamNotFound { team_id: TeamId },

    /// Slot does not exist
    SlotNotFound { slot_id: SlotId },

    /// Swap request does not exist
    SwapNotFound { swap_id: SwapId },

    /// Leave request does not exist
    LeaveNotFound { leave_id: LeaveId },

    /// Membership does not exist
    MembershipNotFound { user_id: UserId, team_id: TeamId },

    /// Start date after end date
    InvalidDateRange { start: String, end: String },

    /// Malformed policy or input value
    InvalidPolicy { field: String, reason: String },

    /// User is already linked to this team
    MembershipExists { user_id: UserId, team_id: TeamId },

    /// User already belongs to a different team
    AlreadyInAnotherTeam { user_id: UserId, team_id: TeamId },

    /// Team name already taken
    DuplicateTeamName { name: String },

    /// Leave request for the same day already exists
    DuplicateLeave { user_id: UserId, date: String },

    /// Leave request was already approved or rejected
    LeaveAlreadyResolved { leave_id: LeaveId },

    /// Requester does not hold the slot they want to give away
    NotSlotOwner { slot_id: SlotId, user_id: UserId },

    /// Swap needs an assignee on both sides
    SlotUnassigned { slot_id: SlotId },

    /// Swap target is held by the requester
    SwapWithSelf { slot_id: SlotId },

    /// Swap slots belong to different teams
    SwapTeamMismatch { from_slot: SlotId, to_slot: SlotId },

    /// Swap slots fall on different dates
    SwapDateMismatch { from_slot: SlotId, to_slot: SlotId },

    /// Same pair already has a pending request
    DuplicateSwap { from_slot: SlotId, to_slot: SlotId },

    /// Swap request was already accepted or rejected
    SwapAlreadyResolved { swap_id: SwapId },

    /// Swap can no longer be executed as requested
    SwapStale { swap_id: SwapId, reason: String },

    /// Swap is refused by an availability constraint
    SwapBlocked { swap_id: SwapId, reason: String },

    /// Storage failure surfaced through the scheduler
    Storage { operation: String, reason: String },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TeamNotFound { team_id } => write!(f, "Team {} not found", team_id),
            Self::SlotNotFound { slot_id } => write!(f, "Slot {} not found", slot_id),
            Self::SwapNotFound { swap_id } => write!(f, "Swap request {} not found", swap_id),
            Self::LeaveNotFound { leave_id } => write!(f, "Leave request {} not found", leave_id),
            Self::MembershipNotFound { user_id, team_id } => {
                write!(f, "User {} is not a member of team {}", user_id, team_id)
            }
            Self::InvalidDateRange { start, end } => {
                write!(f, "Invalid date range: {} is after {}", start, end)
            }
            Self::InvalidPolicy { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
            Self::MembershipExists { user_id, team_id } => {
                write!(f, "User {} is already a member of team {}", user_id, team_id)
            }
            Self::AlreadyInAnotherTeam { user_id, team_id } => {
                write!(f, "User {} already belongs to team {}", user_id, team_id)
            }
            Self::DuplicateTeamName { name } => {
                write!(f, "A team named '{}' already exists", name)
            }
            Self::DuplicateLeave { user_id, date } => {
                write!(f, "User {} already requested leave for {}", user_id, date)
            }
            Self::LeaveAlreadyResolved { leave_id } => {
                write!(f, "Leave request {} was already responded to", leave_id)
            }
            Self::NotSlotOwner { slot_id, user_id } => {
                write!(f, "Slot {} is not assigned to user {}", slot_id, user_id)
            }
            Self::SlotUnassigned { slot_id } => write!(f, "Slot {} has no assignee", slot_id),
            Self::SwapWithSelf { slot_id } => {
                write!(f, "Slot {} is already assigned to the requester", slot_id)
            }
            Self::SwapTeamMismatch { from_slot, to_slot } => {
                write!(f, "Slots {} and {} belong to different teams", from_slot, to_slot)
            }
            Self::SwapDateMismatch { from_slot, to_slot } => {
                write!(f, "Slots {} and {} are on different dates", from_slot, to_slot)
            }
            Self::DuplicateSwap { from_slot, to_slot } => {
                write!(
                    f,
                    "A pending swap request already exists for slots {} and {}",
                    from_slot, to_slot
                )
            }
            Self::SwapAlreadyResolved { swap_id } => {
                write!(f, "Swap request {} was already responded to", swap_id)
            }
            Self::SwapStale { swap_id, reason } => {
                write!(f, "Swap request {} is stale: {}", swap_id, reason)
            }
            Self::SwapBlocked { swap_id, reason } => {
                write!(f, "Swap request {} blocked: {}", swap_id, reason)
            }
            Self::Storage { operation, reason } => {
                write!(f, "Storage error during '{}': {}", operation, reason)
            }
        }
    }
}

impl std::error::Error for SchedulerError {}

impl SchedulerError {
    /// Create an invalid policy error
    pub fn invalid_policy(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPolicy {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid date range error
    pub fn invalid_date_range(start: impl fmt::Display, end: impl fmt::Display) -> Self {
        Self::InvalidDateRange {
            start: start.to_string(),
            end: end.to_string(),
        }
    }

    /// Create a storage error with context
    pub fn storage(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Storage {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Field name for validation errors, if any
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::InvalidPolicy { field, .. } => Some(field.as_str()),
            Self::InvalidDateRange { .. } => Some("date_range"),
            _ => None,
        }
    }

    /// Validation errors are rejected before any persistence happens
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidPolicy { .. } | Self::InvalidDateRange { .. }
        )
    }

    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Storage { .. } | Self::SwapStale { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_policy_error() {
        let err = SchedulerError::invalid_policy("max_hours_per_day", "must be positive");
        assert!(err.to_string().contains("max_hours_per_day"));
        assert_eq!(err.field(), Some("max_hours_per_day"));
        assert!(err.is_validation());
    }

    #[test]
    fn test_invalid_date_range_error() {
        let err = SchedulerError::invalid_date_range("2024-02-01", "2024-01-01");
        assert!(err.to_string().contains("2024-02-01"));
        assert_eq!(err.field(), Some("date_range"));
    }

    #[test]
    fn test_is_recoverable() {
        let storage = SchedulerError::storage("insert_slots", "database is locked");
        assert!(storage.is_recoverable());

        let swap = SchedulerError::DuplicateSwap {
            from_slot: 1,
            to_slot: 2,
        };
        assert!(!swap.is_recoverable());
        assert!(!swap.is_validation());
    }
}
