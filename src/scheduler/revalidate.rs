//! Repair pass over existing assignments
//!
//! Every assigned slot from the start date on is re-checked against the
//! availability, hour-cap and rest rules with the slot itself left out of the
//! member's totals. A violating slot is moved to the best other candidate if
//! one exists; otherwise the assignment stays and is reported unresolved.
//! The same-day adjacency rule is only enforced when a slot is first
//! assigned and is not re-checked here.

use chrono::{Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::assignment::{FairAssigner, Violation};
use super::constraints::{self, CheckMode};
use super::ledger::Ledger;
use crate::config::FairnessConfig;
use crate::error::Result;
use crate::metrics;
use crate::models::{SlotId, Team, UserId};
use crate::storage::{ScheduleStore, SlotFilter};

pub const NOT_A_MEMBER: &str = "User is no longer an active member of this team";

/// Assigned slots are scanned this far past the start date
const SCAN_HORIZON_DAYS: i64 = 366;

/// Counters of one revalidation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RevalidationReport {
    pub slots_checked: usize,
    pub violations_found: usize,
    pub violations_fixed: usize,
    /// Violations left in place because nobody else qualified
    pub unresolved: Vec<Violation>,
}

impl RevalidationReport {
    pub fn merge(&mut self, other: RevalidationReport) {
        self.slots_checked += other.slots_checked;
        self.violations_found += other.violations_found;
        self.violations_fixed += other.violations_fixed;
        self.unresolved.extend(other.unresolved);
    }
}

pub struct Revalidator<'a> {
    store: &'a dyn ScheduleStore,
    weights: FairnessConfig,
}

impl<'a> Revalidator<'a> {
    pub fn new(store: &'a dyn ScheduleStore, weights: FairnessConfig) -> Self {
        Self { store, weights }
    }

    /// Re-check one team's assignments starting on or after `from`
    pub fn revalidate_team(&self, team: &Team, from: NaiveDate) -> Result<RevalidationReport> {
        let window_start = from.and_time(NaiveTime::MIN);
        let window_end = window_start + Duration::days(SCAN_HORIZON_DAYS);
        let slots =
            self.store
                .slots_between(Some(team.id), window_start, window_end, SlotFilter::Assigned)?;

        let mut report = RevalidationReport {
            slots_checked: slots.len(),
            ..RevalidationReport::default()
        };
        if slots.is_empty() {
            return Ok(report);
        }

        let members = self.store.active_members(team.id)?;
        let assigner = FairAssigner::new(team, &members, self.weights);

        let mut users: BTreeSet<UserId> = assigner.candidates().iter().copied().collect();
        users.extend(slots.iter().filter_map(|s| s.assigned_member));
        let users: Vec<UserId> = users.into_iter().collect();

        let last_date = slots
            .last()
            .map(|s| s.date())
            .unwrap_or(from);
        let mut ledger = Ledger::load(self.store, team.id, &users, from, last_date)?;

        let mut changes: Vec<(SlotId, Option<UserId>)> = Vec::new();
        for slot in &slots {
            let Some(holder) = slot.assigned_member else {
                continue;
            };

            let reason = if !assigner.is_candidate(holder) {
                Some(NOT_A_MEMBER.to_string())
            } else {
                constraints::check(&ledger, &team.policy, holder, slot, CheckMode::Revalidation)
                    .err()
                    .map(|r| r.to_string())
            };
            let Some(reason) = reason else {
                continue;
            };

            report.violations_found += 1;
            tracing::warn!(
                team_id = team.id,
                slot_id = slot.id,
                user = holder,
                %reason,
                "Constraint violation in existing assignment"
            );

            ledger.unbook(holder, slot.id);
            match assigner.best_candidate(&ledger, slot, Some(holder)) {
                Some(replacement) => {
                    ledger.book(replacement, slot);
                    changes.push((slot.id, Some(replacement)));
                    report.violations_fixed += 1;
                    tracing::info!(
                        slot_id = slot.id,
                        from = holder,
                        to = replacement,
                        "Reassigned violating slot"
                    );
                }
                None => {
                    ledger.book(holder, slot);
                    report
                        .unresolved
                        .push(Violation::new(slot.id, Some(holder), reason));
                }
            }
        }

        self.store.apply_assignments(&changes)?;
        metrics::record_revalidation(team.id, report.violations_found, report.violations_fixed);
        Ok(report)
    }
}
