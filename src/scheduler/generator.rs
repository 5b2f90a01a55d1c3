//! Slot generation for a date range
//!
//! Each non-holiday day is partitioned into `slots_per_day` contiguous slots
//! starting at midnight. Existing (team, start) keys are skipped, the rest are
//! inserted in one transaction, and the team's open slots in the range are
//! then handed to the fair assigner.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::assignment::{self, AssignmentOutcome};
use super::error::SchedulerError;
use crate::config::FairnessConfig;
use crate::error::Result;
use crate::metrics;
use crate::models::{NewSlot, Team, TeamId};
use crate::storage::ScheduleStore;

/// Result of generating one team's slots
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOutcome {
    pub team_id: TeamId,
    pub slots_created: usize,
    pub assignment: AssignmentOutcome,
}

/// Compute the slots missing from `existing` for `[start, end]`
pub fn plan_slots(
    team: &Team,
    start: NaiveDate,
    end: NaiveDate,
    holidays: &HashSet<NaiveDate>,
    existing: &HashSet<NaiveDateTime>,
) -> Vec<NewSlot> {
    let duration = team.policy.slot_duration();
    let per_day = team.policy.slots_per_day();
    let mut planned = Vec::new();

    for date in start.iter_days().take_while(|d| *d <= end) {
        if holidays.contains(&date) {
            tracing::debug!(team_id = team.id, %date, "Skipping holiday");
            continue;
        }
        let midnight = date.and_time(NaiveTime::MIN);
        for n in 0..per_day {
            let start_time = midnight + duration * n as i32;
            if existing.contains(&start_time) {
                continue;
            }
            planned.push(NewSlot {
                team_id: team.id,
                start_time,
                end_time: start_time + duration,
            });
        }
    }
    planned
}

/// Generates slots and runs the first assignment pass
pub struct SlotGenerator<'a> {
    store: &'a dyn ScheduleStore,
    weights: FairnessConfig,
}

impl<'a> SlotGenerator<'a> {
    pub fn new(store: &'a dyn ScheduleStore, weights: FairnessConfig) -> Self {
        Self { store, weights }
    }

    /// Create missing slots for `[start, end]` and assign the open ones
    pub fn generate(&self, team: &Team, start: NaiveDate, end: NaiveDate) -> Result<GenerationOutcome> {
        if start > end {
            return Err(SchedulerError::invalid_date_range(start, end).into());
        }
        team.policy.validate()?;

        let holidays = self.store.holidays_between(team.id, start, end)?;
        let existing = self.store.slot_starts_between(
            team.id,
            start.and_time(NaiveTime::MIN),
            (end + Duration::days(1)).and_time(NaiveTime::MIN),
        )?;

        let planned = plan_slots(team, start, end, &holidays, &existing);
        let slots_created = self.store.insert_slots(&planned)?;
        metrics::record_generation(team.id, slots_created);

        tracing::info!(
            team_id = team.id,
            %start,
            %end,
            slots_created,
            holidays = holidays.len(),
            "Slots generated"
        );

        let assignment = assignment::assign_open_slots(self.store, team, start, end, self.weights)?;

        Ok(GenerationOutcome {
            team_id: team.id,
            slots_created,
            assignment,
        })
    }

    /// Delete unassigned slots that started more than `days` before `now`
    pub fn cleanup(&self, now: NaiveDateTime, days: i64) -> Result<usize> {
        let cutoff = now - Duration::days(days);
        let deleted = self.store.delete_unassigned_before(cutoff)?;
        if deleted > 0 {
            tracing::info!(deleted, %cutoff, "Old unassigned slots removed");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TeamPolicy;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn team(slot_hours: i64) -> Team {
        Team {
            id: 1,
            name: "Platform".to_string(),
            policy: TeamPolicy::from_hours(slot_hours, 8.0, 40.0, 8.0),
            is_active: true,
            created_at: date(1).and_time(NaiveTime::MIN),
        }
    }

    #[test]
    fn test_plan_partitions_day() {
        let planned = plan_slots(&team(8), date(16), date(16), &HashSet::new(), &HashSet::new());
        let hours: Vec<_> = planned
            .iter()
            .map(|s| s.start_time.format("%H:%M").to_string())
            .collect();
        assert_eq!(hours, vec!["00:00", "08:00", "16:00"]);
        assert_eq!(planned[2].end_time, date(17).and_time(NaiveTime::MIN));
    }

    #[test]
    fn test_plan_skips_holidays_and_existing() {
        let holidays: HashSet<_> = [date(17)].into_iter().collect();
        let existing: HashSet<_> = [date(16).and_hms_opt(8, 0, 0).unwrap()]
            .into_iter()
            .collect();

        let planned = plan_slots(&team(8), date(16), date(18), &holidays, &existing);
        assert_eq!(planned.len(), 5);
        assert!(planned.iter().all(|s| s.start_time.date() != date(17)));
        assert!(!planned
            .iter()
            .any(|s| s.start_time == date(16).and_hms_opt(8, 0, 0).unwrap()));
    }

    #[test]
    fn test_plan_sub_hour_slots() {
        let mut t = team(1);
        t.policy.slot_duration_minutes = 30;
        let planned = plan_slots(&t, date(16), date(16), &HashSet::new(), &HashSet::new());
        assert_eq!(planned.len(), 48);
        assert_eq!(
            planned[1].start_time,
            date(16).and_hms_opt(0, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_empty_range_when_reversed() {
        let planned = plan_slots(&team(8), date(18), date(16), &HashSet::new(), &HashSet::new());
        assert!(planned.is_empty());
    }
}
