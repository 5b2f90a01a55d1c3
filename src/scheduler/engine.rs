//! Rota engine facade
//!
//! [`RotaEngine`] owns the store, the configuration and the per-team locks,
//! and exposes every scheduling operation as one bounded unit of work. The
//! three periodic entry points ([`RotaEngine::run_generation`],
//! [`RotaEngine::run_coverage_scan`] and [`RotaEngine::run_revalidation`])
//! never fail for expected "nothing to do" cases; they return a structured
//! result with a success flag and counters.
//!
//! Locking happens here and only here. Components below the facade
//! (generator, assigner, revalidator, swap coordinator, leave service) take
//! no locks, so a locked operation can freely compose them.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::activation::{self, GateDecision, GateOutcome, MembershipChange, MembershipService};
use super::assignment::{FairAssigner, Violation};
use super::capacity::{self, CapacityEstimate};
use super::error::SchedulerError;
use super::generator::{plan_slots, GenerationOutcome, SlotGenerator};
use super::ledger::Ledger;
use super::leave::{LeaveApproval, LeaveService};
use super::lock::TeamLocks;
use super::revalidate::{RevalidationReport, Revalidator};
use super::swap::SwapCoordinator;
use crate::config::{Config, FairnessConfig};
use crate::error::Result;
use crate::metrics;
use crate::models::{
    Availability, Holiday, LeaveId, LeaveRequest, Membership, NewTeam, SlotId, SwapId,
    SwapRequest, Team, TeamId, UserId,
};
use crate::notifications::{CoverageMonitor, CoverageReport, NotificationStore};
use crate::storage::{ScheduleStore, SlotFilter};

/// How far ahead a reset clears a team's schedule
const RESET_HORIZON_DAYS: i64 = 3650;

pub const NO_ACTIVE_MEMBERS: &str = "No active members found";
pub const TEAM_NOT_ACTIVE: &str = "Team is not active";

// ============================================================================
// Reports
// ============================================================================

/// Outcome of one team inside a generation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TeamStatus {
    Completed,
    Skipped { reason: String },
    Failed { error: String },
}

impl TeamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Skipped { .. } => "skipped",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Per-team generation result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamRun {
    pub team_id: TeamId,
    pub team_name: String,
    #[serde(flatten)]
    pub status: TeamStatus,
    pub slots_created: usize,
    pub assignments_made: usize,
    pub violations: Vec<Violation>,
}

impl TeamRun {
    fn new(team: &Team, status: TeamStatus) -> Self {
        Self {
            team_id: team.id,
            team_name: team.name.clone(),
            status,
            slots_created: 0,
            assignments_made: 0,
            violations: Vec::new(),
        }
    }

    fn completed(team: &Team, outcome: GenerationOutcome) -> Self {
        Self {
            slots_created: outcome.slots_created,
            assignments_made: outcome.assignment.assignments_made,
            violations: outcome.assignment.violations,
            ..Self::new(team, TeamStatus::Completed)
        }
    }
}

/// Result of the multi-team generation job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// False only when the job could not run at all
    pub success: bool,
    pub error: Option<String>,
    pub message: Option<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub runs: Vec<TeamRun>,
    pub total_slots_created: usize,
    pub total_assignments: usize,
    pub total_violations: usize,
    /// Old unassigned slots removed by cleanup
    pub slots_deleted: usize,
}

impl BatchReport {
    fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            success: true,
            error: None,
            message: None,
            start,
            end,
            runs: Vec::new(),
            total_slots_created: 0,
            total_assignments: 0,
            total_violations: 0,
            slots_deleted: 0,
        }
    }

    fn push(&mut self, run: TeamRun) {
        self.total_slots_created += run.slots_created;
        self.total_assignments += run.assignments_made;
        self.total_violations += run.violations.len();
        self.runs.push(run);
    }

    pub fn failed_teams(&self) -> usize {
        self.runs
            .iter()
            .filter(|r| matches!(r.status, TeamStatus::Failed { .. }))
            .count()
    }
}

/// Success flag plus the result of a periodic job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome<T> {
    pub success: bool,
    pub error: Option<String>,
    pub result: T,
}

impl<T: Default> JobOutcome<T> {
    fn from_result(job: &str, result: Result<T>) -> Self {
        match result {
            Ok(result) => Self {
                success: true,
                error: None,
                result,
            },
            Err(e) => {
                tracing::error!(job, error = %e, "Job could not run");
                Self {
                    success: false,
                    error: Some(e.to_string()),
                    result: T::default(),
                }
            }
        }
    }
}

/// Recalculation of the upcoming window after a membership change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recalculation {
    pub team_id: TeamId,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub assignments_cleared: usize,
    pub generation: GenerationOutcome,
}

/// A persisted membership change and what the activation gate did with it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipUpdate {
    pub change: MembershipChange,
    /// None when the gate could not be evaluated (logged)
    pub gate: Option<GateOutcome>,
}

/// Team with its staffing numbers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamOverview {
    pub team: Team,
    pub members: Vec<Membership>,
    pub capacity: CapacityEstimate,
}

/// Result of a destructive reset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetOutcome {
    pub assignments_cleared: usize,
    pub slots_deleted: usize,
}

// ============================================================================
// Engine
// ============================================================================

pub struct RotaEngine {
    store: Arc<dyn ScheduleStore>,
    outbox: Arc<dyn NotificationStore>,
    config: Config,
    locks: TeamLocks,
}

impl RotaEngine {
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        outbox: Arc<dyn NotificationStore>,
        config: Config,
    ) -> Self {
        Self {
            store,
            outbox,
            config,
            locks: TeamLocks::new(),
        }
    }

    pub fn store(&self) -> &dyn ScheduleStore {
        self.store.as_ref()
    }

    pub fn outbox(&self) -> Arc<dyn NotificationStore> {
        Arc::clone(&self.outbox)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn weights(&self) -> FairnessConfig {
        self.config.fairness
    }

    fn team(&self, team_id: TeamId) -> Result<Team> {
        self.store
            .get_team(team_id)?
            .ok_or_else(|| SchedulerError::TeamNotFound { team_id }.into())
    }

    fn slot_team(&self, slot_id: SlotId) -> Result<TeamId> {
        self.store
            .get_slot(slot_id)?
            .map(|s| s.team_id)
            .ok_or_else(|| SchedulerError::SlotNotFound { slot_id }.into())
    }

    // ------------------------------------------------------------------
    // Teams
    // ------------------------------------------------------------------

    /// Validate and persist a new team; it starts inactive
    pub fn create_team(&self, team: &NewTeam, now: NaiveDateTime) -> Result<Team> {
        team.validate()?;
        let team = self.store.insert_team(team, now)?;
        tracing::info!(
            team_id = team.id,
            name = %team.name,
            required = capacity::minimum_members(&team.policy),
            "Team created"
        );
        Ok(team)
    }

    pub fn capacity(&self, team_id: TeamId) -> Result<CapacityEstimate> {
        Ok(capacity::estimate(&self.team(team_id)?.policy))
    }

    pub fn describe_team(&self, team_id: TeamId) -> Result<TeamOverview> {
        let team = self.team(team_id)?;
        let members = self.store.active_members(team_id)?;
        let capacity = capacity::estimate(&team.policy);
        Ok(TeamOverview {
            team,
            members,
            capacity,
        })
    }

    pub fn add_holiday(&self, holiday: &Holiday) -> Result<()> {
        self.team(holiday.team_id)?;
        self.store.add_holiday(holiday)?;
        tracing::info!(team_id = holiday.team_id, date = %holiday.date, "Holiday added");
        Ok(())
    }

    pub fn set_availability(&self, availability: &Availability) -> Result<()> {
        self.store.set_availability(availability)?;
        tracing::info!(
            user_id = availability.user_id,
            date = %availability.date,
            available = availability.is_available,
            "Availability recorded"
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Membership and activation gate
    // ------------------------------------------------------------------

    pub fn add_member(
        &self,
        user_id: UserId,
        team_id: TeamId,
        now: NaiveDateTime,
    ) -> Result<MembershipUpdate> {
        self.locks.with_team(team_id, || {
            let (_, change) = MembershipService::new(self.store()).add_member(user_id, team_id, now)?;
            Ok(self.apply_gate(change, now.date()))
        })
    }

    pub fn remove_member(
        &self,
        user_id: UserId,
        team_id: TeamId,
        now: NaiveDateTime,
    ) -> Result<MembershipUpdate> {
        self.locks.with_team(team_id, || {
            let change = MembershipService::new(self.store()).remove_member(user_id, team_id)?;
            Ok(self.apply_gate(change, now.date()))
        })
    }

    pub fn deactivate_member(
        &self,
        user_id: UserId,
        team_id: TeamId,
        now: NaiveDateTime,
    ) -> Result<MembershipUpdate> {
        self.locks.with_team(team_id, || {
            let change = MembershipService::new(self.store()).deactivate_member(user_id, team_id)?;
            Ok(self.apply_gate(change, now.date()))
        })
    }

    pub fn reactivate_member(
        &self,
        user_id: UserId,
        team_id: TeamId,
        now: NaiveDateTime,
    ) -> Result<MembershipUpdate> {
        self.locks.with_team(team_id, || {
            let change = MembershipService::new(self.store()).reactivate_member(user_id, team_id)?;
            Ok(self.apply_gate(change, now.date()))
        })
    }

    /// Evaluate the gate and run its follow-up; caller holds the team lock.
    /// Failures are logged and never reach the membership caller.
    fn apply_gate(&self, change: MembershipChange, today: NaiveDate) -> MembershipUpdate {
        let gate = match activation::evaluate_gate(self.store(), change.team_id, change.event) {
            Ok(gate) => gate,
            Err(e) => {
                tracing::error!(team_id = change.team_id, error = %e, "Activation gate failed");
                return MembershipUpdate { change, gate: None };
            }
        };

        let follow_up = match gate.decision {
            GateDecision::Activated => self.team(change.team_id).and_then(|team| {
                let end = today + Duration::days(self.config.scheduling.generation_days_ahead - 1);
                SlotGenerator::new(self.store(), self.weights())
                    .generate(&team, today, end)
                    .map(|outcome| {
                        tracing::info!(
                            team_id = team.id,
                            slots_created = outcome.slots_created,
                            assigned = outcome.assignment.assignments_made,
                            "Initial schedule generated for newly active team"
                        );
                    })
            }),
            GateDecision::Recalculate => self
                .team(change.team_id)
                .and_then(|team| self.recalculate_locked(&team, today))
                .map(|_| ()),
            GateDecision::Deactivated | GateDecision::NoAction => Ok(()),
        };
        if let Err(e) = follow_up {
            tracing::error!(
                team_id = change.team_id,
                decision = ?gate.decision,
                error = %e,
                "Scheduling follow-up of membership change failed"
            );
        }

        MembershipUpdate {
            change,
            gate: Some(gate),
        }
    }

    // ------------------------------------------------------------------
    // Generation
    // ------------------------------------------------------------------

    /// Generate and assign one team's slots for `[start, end]`
    ///
    /// Bad input and unknown teams are errors; everything else is reported
    /// in the returned [`TeamRun`]. An inactive team is skipped unless
    /// `force` is set.
    pub fn generate_for_team(
        &self,
        team_id: TeamId,
        start: NaiveDate,
        end: NaiveDate,
        force: bool,
    ) -> Result<TeamRun> {
        if start > end {
            return Err(SchedulerError::invalid_date_range(start, end).into());
        }
        let team = self.team(team_id)?;
        if !team.is_active && !force {
            tracing::info!(team_id, "Skipping inactive team");
            let run = TeamRun::new(
                &team,
                TeamStatus::Skipped {
                    reason: TEAM_NOT_ACTIVE.to_string(),
                },
            );
            metrics::record_team_run(run.status.as_str());
            return Ok(run);
        }
        if !team.is_active {
            tracing::warn!(team_id, "Generating for inactive team on request");
        }
        Ok(self.run_team(&team, start, end))
    }

    fn run_team(&self, team: &Team, start: NaiveDate, end: NaiveDate) -> TeamRun {
        let run = self.locks.with_team(team.id, || {
            match self.store.active_members(team.id) {
                Ok(members) if members.is_empty() => {
                    tracing::info!(team_id = team.id, "Skipping team without active members");
                    return TeamRun::new(
                        team,
                        TeamStatus::Skipped {
                            reason: NO_ACTIVE_MEMBERS.to_string(),
                        },
                    );
                }
                Ok(_) => {}
                Err(e) => return self.failed_run(team, e),
            }

            match SlotGenerator::new(self.store(), self.weights()).generate(team, start, end) {
                Ok(outcome) => TeamRun::completed(team, outcome),
                Err(e) => self.failed_run(team, e),
            }
        });
        metrics::record_team_run(run.status.as_str());
        run
    }

    fn failed_run(&self, team: &Team, error: crate::error::Error) -> TeamRun {
        tracing::error!(team_id = team.id, error = %error, "Team generation failed");
        TeamRun::new(
            team,
            TeamStatus::Failed {
                error: error.to_string(),
            },
        )
    }

    /// Daily job: generate the next window for every active team, then
    /// remove long-past unassigned slots
    pub fn run_generation(&self, now: NaiveDateTime) -> BatchReport {
        let _timer = metrics::start_job_timer("generation");
        let start = now.date();
        let end = start + Duration::days(self.config.scheduling.generation_days_ahead - 1);
        let mut report = BatchReport::new(start, end);

        let teams = match self.store.list_teams(true) {
            Ok(teams) => teams,
            Err(e) => {
                tracing::error!(error = %e, "Generation job could not list teams");
                report.success = false;
                report.error = Some(e.to_string());
                return report;
            }
        };

        if teams.is_empty() {
            tracing::info!("No active teams to generate slots for");
            report.message = Some("No active teams".to_string());
        }
        for team in &teams {
            report.push(self.run_team(team, start, end));
        }

        match SlotGenerator::new(self.store(), self.weights())
            .cleanup(now, self.config.scheduling.cleanup_after_days)
        {
            Ok(deleted) => report.slots_deleted = deleted,
            Err(e) => tracing::error!(error = %e, "Cleanup of old unassigned slots failed"),
        }

        tracing::info!(
            %start,
            %end,
            teams = report.runs.len(),
            failed = report.failed_teams(),
            slots_created = report.total_slots_created,
            assignments = report.total_assignments,
            violations = report.total_violations,
            "Generation job complete"
        );
        report
    }

    // ------------------------------------------------------------------
    // Recalculation and revalidation
    // ------------------------------------------------------------------

    /// Re-plan the upcoming window of one team from scratch
    pub fn recalculate(&self, team_id: TeamId, today: NaiveDate) -> Result<Recalculation> {
        let team = self.team(team_id)?;
        self.locks
            .with_team(team_id, || self.recalculate_locked(&team, today))
    }

    /// Clear and re-assign the window; the store sees one atomic batch
    fn recalculate_locked(&self, team: &Team, today: NaiveDate) -> Result<Recalculation> {
        let scheduling = &self.config.scheduling;
        let start = today + Duration::days(scheduling.recalculation_start_offset_days);
        let end = start + Duration::days(scheduling.recalculation_days - 1);
        team.policy.validate()?;
        let window_start = start.and_time(NaiveTime::MIN);
        let window_end = (end + Duration::days(1)).and_time(NaiveTime::MIN);

        // inserting missing slots never touches existing assignments
        let holidays = self.store.holidays_between(team.id, start, end)?;
        let existing = self.store.slot_starts_between(team.id, window_start, window_end)?;
        let slots_created = self
            .store
            .insert_slots(&plan_slots(team, start, end, &holidays, &existing))?;
        metrics::record_generation(team.id, slots_created);

        let mut slots =
            self.store
                .slots_between(Some(team.id), window_start, window_end, SlotFilter::Any)?;
        let members = self.store.active_members(team.id)?;
        let assigner = FairAssigner::new(team, &members, self.weights());
        let mut ledger = Ledger::load(self.store(), team.id, assigner.candidates(), start, end)?;

        let mut changes: HashMap<SlotId, Option<UserId>> = HashMap::new();
        for slot in &mut slots {
            if let Some(user) = slot.assigned_member.take() {
                ledger.unbook(user, slot.id);
                changes.insert(slot.id, None);
            }
        }
        let assignments_cleared = changes.len();

        let assignment = assigner.assign(&mut ledger, &slots);
        for &(slot_id, user) in &assignment.assigned {
            changes.insert(slot_id, Some(user));
        }
        let mut batch: Vec<(SlotId, Option<UserId>)> = changes.into_iter().collect();
        batch.sort_by_key(|(slot_id, _)| *slot_id);
        self.store.apply_assignments(&batch)?;
        metrics::record_assignment(
            team.id,
            assignment.assignments_made,
            assignment.violations.len(),
        );

        tracing::info!(
            team_id = team.id,
            %start,
            %end,
            slots_created,
            cleared = assignments_cleared,
            assigned = assignment.assignments_made,
            violations = assignment.violations.len(),
            "Schedule recalculated"
        );
        Ok(Recalculation {
            team_id: team.id,
            start,
            end,
            assignments_cleared,
            generation: GenerationOutcome {
                team_id: team.id,
                slots_created,
                assignment,
            },
        })
    }

    /// Re-check assignments from `from` on, for one team or all teams
    pub fn revalidate(&self, team_id: Option<TeamId>, from: NaiveDate) -> Result<RevalidationReport> {
        let teams = match team_id {
            Some(id) => vec![self.team(id)?],
            None => self.store.list_teams(false)?,
        };

        let revalidator = Revalidator::new(self.store(), self.weights());
        let mut report = RevalidationReport::default();
        for team in &teams {
            let team_report = self
                .locks
                .with_team(team.id, || revalidator.revalidate_team(team, from))?;
            report.merge(team_report);
        }

        tracing::info!(
            teams = teams.len(),
            %from,
            checked = report.slots_checked,
            found = report.violations_found,
            fixed = report.violations_fixed,
            "Revalidation complete"
        );
        Ok(report)
    }

    /// Periodic job: revalidate every team starting a few days back
    pub fn run_revalidation(&self, today: NaiveDate) -> JobOutcome<RevalidationReport> {
        let _timer = metrics::start_job_timer("revalidation");
        let from = today - Duration::days(self.config.scheduling.revalidation_days_back);
        JobOutcome::from_result("revalidation", self.revalidate(None, from))
    }

    /// Periodic job: raise and resolve coverage-gap alerts
    pub fn run_coverage_scan(&self, now: NaiveDateTime) -> JobOutcome<CoverageReport> {
        let window = Duration::hours(self.config.scheduling.coverage_window_hours);
        let monitor = CoverageMonitor::new(self.store(), self.outbox.as_ref(), window);
        JobOutcome::from_result("coverage_scan", monitor.scan(now))
    }

    // ------------------------------------------------------------------
    // Swaps and leave
    // ------------------------------------------------------------------

    pub fn request_swap(
        &self,
        requester: UserId,
        from_slot: SlotId,
        to_slot: SlotId,
        now: NaiveDateTime,
    ) -> Result<SwapRequest> {
        SwapCoordinator::new(self.store()).request(requester, from_slot, to_slot, now)
    }

    pub fn approve_swap(&self, swap_id: SwapId, now: NaiveDateTime) -> Result<SwapRequest> {
        let team_id = self.swap_team(swap_id)?;
        self.locks.with_team(team_id, || {
            SwapCoordinator::new(self.store()).approve(swap_id, now)
        })
    }

    pub fn reject_swap(&self, swap_id: SwapId, now: NaiveDateTime) -> Result<SwapRequest> {
        SwapCoordinator::new(self.store()).reject(swap_id, now)
    }

    fn swap_team(&self, swap_id: SwapId) -> Result<TeamId> {
        let swap = self
            .store
            .get_swap(swap_id)?
            .ok_or(SchedulerError::SwapNotFound { swap_id })?;
        self.slot_team(swap.from_slot)
    }

    pub fn request_leave(
        &self,
        user_id: UserId,
        team_id: TeamId,
        date: NaiveDate,
        reason: Option<&str>,
        now: NaiveDateTime,
    ) -> Result<LeaveRequest> {
        LeaveService::new(self.store()).request(user_id, team_id, date, reason, now)
    }

    pub fn approve_leave(&self, leave_id: LeaveId, now: NaiveDateTime) -> Result<LeaveApproval> {
        let leave = self
            .store
            .get_leave(leave_id)?
            .ok_or(SchedulerError::LeaveNotFound { leave_id })?;
        self.locks.with_team(leave.team_id, || {
            LeaveService::new(self.store()).approve(leave_id, now)
        })
    }

    pub fn reject_leave(&self, leave_id: LeaveId, now: NaiveDateTime) -> Result<LeaveRequest> {
        LeaveService::new(self.store()).reject(leave_id, now)
    }

    // ------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------

    /// Destructive: clear every future assignment of the team and delete
    /// its future slots
    pub fn reset_team(&self, team_id: TeamId, now: NaiveDateTime) -> Result<ResetOutcome> {
        self.team(team_id)?;
        let horizon = now + Duration::days(RESET_HORIZON_DAYS);
        self.locks.with_team(team_id, || {
            let assigned =
                self.store
                    .slots_between(Some(team_id), now, horizon, SlotFilter::Assigned)?;
            let cleared: Vec<(SlotId, Option<UserId>)> =
                assigned.iter().map(|s| (s.id, None)).collect();
            self.store.apply_assignments(&cleared)?;
            let slots_deleted = self.store.delete_unassigned_between(team_id, now, horizon)?;

            tracing::warn!(
                team_id,
                assignments_cleared = cleared.len(),
                slots_deleted,
                "Team schedule reset"
            );
            Ok(ResetOutcome {
                assignments_cleared: cleared.len(),
                slots_deleted,
            })
        })
    }
}
