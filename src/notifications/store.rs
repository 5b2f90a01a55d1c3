//! Pending-notification store with TTL and slot-id de-duplication

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::EmptySlotNotification;
use crate::models::SlotId;

/// Where a stored notification is in its delivery lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
    Pending,
    Delivered,
    /// Retries exhausted
    Dropped,
}

/// Holding area between the coverage monitor and the dispatcher
///
/// At most one notification per slot is kept while it is younger than the
/// TTL, whatever its delivery state, so a slot that stays uncovered across
/// many scans is announced once.
pub trait NotificationStore: Send + Sync {
    /// Store a notification; returns false if its slot was already
    /// announced within the TTL
    fn push(&self, notification: EmptySlotNotification, now: NaiveDateTime) -> bool;

    /// Notifications still waiting for delivery, oldest first
    fn pending(&self, now: NaiveDateTime) -> Vec<EmptySlotNotification>;

    /// Every unexpired notification regardless of state, oldest first
    fn recent(&self, now: NaiveDateTime) -> Vec<(EmptySlotNotification, DeliveryState)>;

    /// Record the delivery outcome of a notification
    fn mark(&self, id: Uuid, state: DeliveryState);

    /// Drop entries older than the TTL; returns how many were removed
    fn purge_expired(&self, now: NaiveDateTime) -> usize;
}

struct Entry {
    notification: EmptySlotNotification,
    stored_at: NaiveDateTime,
    state: DeliveryState,
}

/// Process-local [`NotificationStore`]
pub struct InMemoryNotificationStore {
    ttl: Duration,
    entries: Mutex<HashMap<SlotId, Entry>>,
}

impl InMemoryNotificationStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<SlotId, Entry>> {
        // a panic while holding the lock cannot leave an entry half-written
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_live(&self, entry: &Entry, now: NaiveDateTime) -> bool {
        entry.stored_at + self.ttl > now
    }

    fn collect(
        &self,
        now: NaiveDateTime,
        keep: impl Fn(DeliveryState) -> bool,
    ) -> Vec<(EmptySlotNotification, DeliveryState)> {
        let entries = self.entries();
        let mut live: Vec<&Entry> = entries
            .values()
            .filter(|e| self.is_live(e, now) && keep(e.state))
            .collect();
        live.sort_by_key(|e| (e.stored_at, e.notification.slot_id));
        live.into_iter()
            .map(|e| (e.notification.clone(), e.state))
            .collect()
    }
}

impl NotificationStore for InMemoryNotificationStore {
    fn push(&self, notification: EmptySlotNotification, now: NaiveDateTime) -> bool {
        let mut entries = self.entries();
        if let Some(existing) = entries.get(&notification.slot_id) {
            if self.is_live(existing, now) {
                tracing::trace!(slot_id = notification.slot_id, "Duplicate notification suppressed");
                return false;
            }
        }
        entries.insert(
            notification.slot_id,
            Entry {
                notification,
                stored_at: now,
                state: DeliveryState::Pending,
            },
        );
        true
    }

    fn pending(&self, now: NaiveDateTime) -> Vec<EmptySlotNotification> {
        self.collect(now, |state| state == DeliveryState::Pending)
            .into_iter()
            .map(|(n, _)| n)
            .collect()
    }

    fn recent(&self, now: NaiveDateTime) -> Vec<(EmptySlotNotification, DeliveryState)> {
        self.collect(now, |_| true)
    }

    fn mark(&self, id: Uuid, state: DeliveryState) {
        let mut entries = self.entries();
        if let Some(entry) = entries.values_mut().find(|e| e.notification.id == id) {
            entry.state = state;
        }
    }

    fn purge_expired(&self, now: NaiveDateTime) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, e| e.stored_at + self.ttl > now);
        before - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Slot, Team, TeamPolicy};
    use chrono::NaiveDate;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn notification(slot_id: SlotId, now: NaiveDateTime) -> EmptySlotNotification {
        let team = Team {
            id: 1,
            name: "Platform".to_string(),
            policy: TeamPolicy::default(),
            is_active: true,
            created_at: at(0),
        };
        let slot = Slot {
            id: slot_id,
            team_id: 1,
            start_time: now + Duration::hours(5),
            end_time: now + Duration::hours(6),
            assigned_member: None,
            is_holiday: false,
        };
        EmptySlotNotification::new(&team, &slot, now)
    }

    #[test]
    fn test_duplicate_slot_suppressed_within_ttl() {
        let store = InMemoryNotificationStore::new(Duration::hours(4));
        assert!(store.push(notification(7, at(1)), at(1)));
        assert!(!store.push(notification(7, at(2)), at(2)));
        assert!(store.push(notification(8, at(2)), at(2)));
        assert_eq!(store.pending(at(2)).len(), 2);

        // after the TTL the slot may be announced again
        assert!(store.push(notification(7, at(6)), at(6)));
    }

    #[test]
    fn test_delivered_are_not_pending_but_still_deduplicated() {
        let store = InMemoryNotificationStore::new(Duration::hours(4));
        let n = notification(7, at(1));
        let id = n.id;
        store.push(n, at(1));

        store.mark(id, DeliveryState::Delivered);
        assert!(store.pending(at(1)).is_empty());
        assert_eq!(store.recent(at(1))[0].1, DeliveryState::Delivered);
        assert!(!store.push(notification(7, at(2)), at(2)));
    }

    #[test]
    fn test_purge_and_expiry() {
        let store = InMemoryNotificationStore::new(Duration::hours(4));
        store.push(notification(1, at(1)), at(1));
        store.push(notification(2, at(3)), at(3));

        assert_eq!(store.pending(at(6)).len(), 1);
        assert_eq!(store.purge_expired(at(6)), 1);
        assert_eq!(store.recent(at(6)).len(), 1);
    }

    #[test]
    fn test_pending_oldest_first() {
        let store = InMemoryNotificationStore::new(Duration::hours(4));
        store.push(notification(9, at(2)), at(2));
        store.push(notification(3, at(1)), at(1));
        let ids: Vec<_> = store.pending(at(2)).iter().map(|n| n.slot_id).collect();
        assert_eq!(ids, vec![3, 9]);
    }
}
