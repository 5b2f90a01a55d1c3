//! Coverage-gap monitoring and empty-slot notifications
//!
//! The monitor scans unassigned slots that start soon, keeps one open
//! [`Alert`](crate::models::Alert) per uncovered slot, and queues an
//! [`EmptySlotNotification`] into a [`NotificationStore`]. Delivery to a live
//! channel is done separately by the [`NotificationDispatcher`].
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │      CoverageMonitor                       │
//! │  - Scan unassigned slots in [now, +72h]    │
//! │  - Raise / resolve alerts                  │
//! └────────────────────────────────────────────┘
//!                     │ push (slot-id de-dup, TTL)
//!                     ▼
//! ┌────────────────────────────────────────────┐
//! │      NotificationStore                     │
//! └────────────────────────────────────────────┘
//!                     │ pending
//!                     ▼
//! ┌────────────────────────────────────────────┐
//! │      NotificationDispatcher (backoff)      │
//! └────────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//!   ┌─────────────┐       ┌───────────────┐
//!   │ TracingSink │       │ BroadcastSink │
//!   └─────────────┘       └───────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use oncall_rota::notifications::{CoverageMonitor, InMemoryNotificationStore};
//!
//! let outbox = InMemoryNotificationStore::new(chrono::Duration::hours(24));
//! let report = CoverageMonitor::new(&store, &outbox, chrono::Duration::hours(72))
//!     .scan(now)?;
//! println!("{} new alerts", report.alerts_created);
//! ```

mod dispatcher;
mod monitor;
mod sink;
mod store;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::models::{Slot, SlotId, Team, TeamId};

pub use dispatcher::{DispatchReport, NotificationDispatcher};
pub use monitor::{CoverageMonitor, CoverageReport};
pub use sink::{BroadcastSink, NotificationSink, SinkError, SinkResult, TracingSink};
pub use store::{DeliveryState, InMemoryNotificationStore, NotificationStore};

/// Payload describing a slot that is about to start without an assignee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmptySlotNotification {
    pub id: Uuid,
    pub slot_id: SlotId,
    pub team_id: TeamId,
    pub team_name: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    /// Rounded to one decimal
    pub hours_from_now: f64,
    pub notification_time: NaiveDateTime,
    pub message: String,
}

impl EmptySlotNotification {
    pub fn new(team: &Team, slot: &Slot, now: NaiveDateTime) -> Self {
        let seconds = (slot.start_time - now).num_seconds() as f64;
        let hours_from_now = (seconds / 360.0).round() / 10.0;
        Self {
            id: Uuid::new_v4(),
            slot_id: slot.id,
            team_id: team.id,
            team_name: team.name.clone(),
            start_time: slot.start_time,
            end_time: slot.end_time,
            hours_from_now,
            notification_time: now,
            message: format!(
                "Team '{}' has no one on call from {} to {}",
                team.name,
                slot.start_time.format("%Y-%m-%d %H:%M"),
                slot.end_time.format("%H:%M"),
            ),
        }
    }
}

impl fmt::Display for EmptySlotNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[slot {}] {} (starts in {})",
            self.slot_id,
            self.message,
            crate::utils::format_hours(self.hours_from_now)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TeamPolicy;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn test_notification_payload() {
        let team = Team {
            id: 3,
            name: "Platform".to_string(),
            policy: TeamPolicy::default(),
            is_active: true,
            created_at: at(1, 0, 0),
        };
        let slot = Slot {
            id: 42,
            team_id: 3,
            start_time: at(16, 8, 0),
            end_time: at(16, 16, 0),
            assigned_member: None,
            is_holiday: false,
        };

        let n = EmptySlotNotification::new(&team, &slot, at(15, 22, 30));
        assert_eq!(n.slot_id, 42);
        assert_eq!(n.team_name, "Platform");
        assert_eq!(n.hours_from_now, 9.5);
        assert_eq!(n.notification_time, at(15, 22, 30));
        assert!(n.message.contains("2024-01-16 08:00"));
        assert!(n.to_string().contains("9.5h"));
    }
}
