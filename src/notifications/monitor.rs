//! Coverage-gap monitor
//!
//! Unassigned slots of active teams starting within the look-ahead window get
//! one open alert each and an empty-slot notification. Open alerts are
//! resolved once their slot is covered, removed, or has already started.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{EmptySlotNotification, NotificationStore};
use crate::error::Result;
use crate::metrics;
use crate::models::{Team, TeamId};
use crate::storage::{ScheduleStore, SlotFilter};

/// Result of one coverage scan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub slots_scanned: usize,
    pub alerts_created: usize,
    pub alerts_resolved: usize,
    pub open_alerts: usize,
    /// Notifications newly queued by this scan
    pub notifications: Vec<EmptySlotNotification>,
}

pub struct CoverageMonitor<'a> {
    store: &'a dyn ScheduleStore,
    outbox: &'a dyn NotificationStore,
    window: Duration,
}

impl<'a> CoverageMonitor<'a> {
    pub fn new(store: &'a dyn ScheduleStore, outbox: &'a dyn NotificationStore, window: Duration) -> Self {
        Self {
            store,
            outbox,
            window,
        }
    }

    /// Raise and resolve alerts for the window starting at `now`
    pub fn scan(&self, now: NaiveDateTime) -> Result<CoverageReport> {
        let _timer = metrics::start_job_timer("coverage_scan");
        let teams: HashMap<TeamId, Team> = self
            .store
            .list_teams(true)?
            .into_iter()
            .map(|t| (t.id, t))
            .collect();

        let mut report = CoverageReport::default();
        let open = self
            .store
            .slots_between(None, now, now + self.window, SlotFilter::Unassigned)?;

        for slot in &open {
            let Some(team) = teams.get(&slot.team_id) else {
                continue;
            };
            report.slots_scanned += 1;

            if self.store.open_alert_for_slot(slot.id)?.is_none() {
                let notification = EmptySlotNotification::new(team, slot, now);
                self.store
                    .insert_alert(team.id, slot.id, &notification.message, now)?;
                report.alerts_created += 1;
                tracing::warn!(
                    team_id = team.id,
                    slot_id = slot.id,
                    start = %slot.start_time,
                    "Coverage gap detected"
                );
                if self.outbox.push(notification.clone(), now) {
                    report.notifications.push(notification);
                }
            }
        }

        let alerts = self.store.open_alerts()?;
        let mut still_open = alerts.len();
        for alert in alerts {
            let outcome = match self.store.get_slot(alert.slot_id)? {
                Some(slot) if slot.is_covered() => Some("covered"),
                Some(slot) if slot.start_time <= now => Some("started"),
                Some(_) => None,
                None => Some("removed"),
            };
            if let Some(outcome) = outcome {
                self.store.resolve_alert(alert.id, now)?;
                report.alerts_resolved += 1;
                still_open -= 1;
                tracing::info!(
                    alert_id = alert.id,
                    slot_id = alert.slot_id,
                    outcome,
                    "Coverage gap resolved"
                );
            }
        }
        report.open_alerts = still_open;

        metrics::record_alerts(report.alerts_created, report.alerts_resolved, report.open_alerts);
        tracing::info!(
            scanned = report.slots_scanned,
            created = report.alerts_created,
            resolved = report.alerts_resolved,
            open = report.open_alerts,
            "Coverage scan complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewSlot, NewTeam, TeamPolicy};
    use crate::notifications::InMemoryNotificationStore;
    use crate::storage::MemoryScheduleStore;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn setup(active: bool) -> (MemoryScheduleStore, Team) {
        let store = MemoryScheduleStore::new();
        let team = store
            .insert_team(
                &NewTeam::new("Platform", TeamPolicy::from_hours(8, 8.0, 40.0, 8.0)),
                at(1, 0),
            )
            .unwrap();
        store.set_team_active(team.id, active).unwrap();
        // one slot inside the window, one past 72h
        let slots: Vec<NewSlot> = [at(15, 16), at(19, 0)]
            .iter()
            .map(|s| NewSlot {
                team_id: team.id,
                start_time: *s,
                end_time: *s + Duration::hours(8),
            })
            .collect();
        store.insert_slots(&slots).unwrap();
        (store, team)
    }

    #[test]
    fn test_gap_raises_one_alert_and_notification() {
        let (store, team) = setup(true);
        let outbox = InMemoryNotificationStore::new(Duration::hours(24));
        let monitor = CoverageMonitor::new(&store, &outbox, Duration::hours(72));

        let report = monitor.scan(at(15, 9)).unwrap();
        assert_eq!(report.slots_scanned, 1);
        assert_eq!(report.alerts_created, 1);
        assert_eq!(report.notifications.len(), 1);
        assert_eq!(report.notifications[0].team_name, team.name);
        assert_eq!(report.notifications[0].hours_from_now, 7.0);

        // second scan: alert already open, nothing new
        let again = monitor.scan(at(15, 10)).unwrap();
        assert_eq!(again.alerts_created, 0);
        assert!(again.notifications.is_empty());
        assert_eq!(again.open_alerts, 1);
        assert_eq!(outbox.pending(at(15, 10)).len(), 1);
    }

    #[test]
    fn test_alert_resolved_once_slot_is_covered() {
        let (store, _team) = setup(true);
        let outbox = InMemoryNotificationStore::new(Duration::hours(24));
        let monitor = CoverageMonitor::new(&store, &outbox, Duration::hours(72));
        monitor.scan(at(15, 9)).unwrap();

        let alert = store.open_alerts().unwrap().remove(0);
        store.apply_assignments(&[(alert.slot_id, Some(10))]).unwrap();

        let report = monitor.scan(at(15, 10)).unwrap();
        assert_eq!(report.alerts_resolved, 1);
        assert_eq!(report.open_alerts, 0);
        assert!(store.open_alerts().unwrap().is_empty());
    }

    #[test]
    fn test_alert_resolved_once_slot_has_started() {
        let (store, _team) = setup(true);
        let outbox = InMemoryNotificationStore::new(Duration::hours(24));
        let monitor = CoverageMonitor::new(&store, &outbox, Duration::hours(72));
        monitor.scan(at(15, 9)).unwrap();
        assert_eq!(store.open_alerts().unwrap().len(), 1);

        // the slot at 15 16:00 is still empty but already running
        let report = monitor.scan(at(15, 17)).unwrap();
        assert_eq!(report.alerts_resolved, 1);
        assert_eq!(report.alerts_created, 0);
        assert_eq!(report.open_alerts, 0);
        assert!(store.open_alerts().unwrap().is_empty());
    }

    #[test]
    fn test_inactive_teams_are_ignored() {
        let (store, _team) = setup(false);
        let outbox = InMemoryNotificationStore::new(Duration::hours(24));
        let report = CoverageMonitor::new(&store, &outbox, Duration::hours(72))
            .scan(at(15, 9))
            .unwrap();
        assert_eq!(report, CoverageReport::default());
    }
}
