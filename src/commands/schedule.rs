use anyhow::{bail, Result};
use chrono::{Duration, NaiveDate};

use oncall_rota::config::Config;
use oncall_rota::scheduler::{TeamRun, TeamStatus};
use oncall_rota::utils::{local_now, local_today};

use super::{open_engine, print_violations};

fn print_run(run: &TeamRun) {
    match &run.status {
        TeamStatus::Completed => println!(
            "  [{}] {}: {} slots created, {} assigned, {} violations",
            run.team_id,
            run.team_name,
            run.slots_created,
            run.assignments_made,
            run.violations.len()
        ),
        TeamStatus::Skipped { reason } => {
            println!("  [{}] {}: skipped ({reason})", run.team_id, run.team_name)
        }
        TeamStatus::Failed { error } => {
            println!("  [{}] {}: FAILED ({error})", run.team_id, run.team_name)
        }
    }
    print_violations(&run.violations);
}

pub fn generate(
    config: &Config,
    team: Option<i64>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    force: bool,
) -> Result<()> {
    let engine = open_engine(config)?;

    let Some(team_id) = team else {
        if force {
            bail!("--force requires --team; the batch job only covers active teams");
        }
        if start.is_some() || end.is_some() {
            bail!("--start/--end require --team; the batch job always uses the configured window");
        }
        let report = engine.run_generation(local_now());
        if !report.success {
            bail!(
                "Generation could not run: {}",
                report.error.unwrap_or_default()
            );
        }
        println!("Generated {} .. {}", report.start, report.end);
        if let Some(message) = &report.message {
            println!("  {message}");
        }
        for run in &report.runs {
            print_run(run);
        }
        println!(
            "Total: {} slots, {} assignments, {} violations, {} old slots removed",
            report.total_slots_created,
            report.total_assignments,
            report.total_violations,
            report.slots_deleted
        );
        return Ok(());
    };

    let start = start.unwrap_or_else(local_today);
    let end = end.unwrap_or(start + Duration::days(config.scheduling.generation_days_ahead - 1));
    let run = engine.generate_for_team(team_id, start, end, force)?;
    println!("Generated {start} .. {end}");
    print_run(&run);
    Ok(())
}

pub fn revalidate(config: &Config, team: Option<i64>, from: Option<NaiveDate>) -> Result<()> {
    let engine = open_engine(config)?;
    let from = from.unwrap_or_else(local_today);
    let report = engine.revalidate(team, from)?;

    println!("Revalidated assignments from {from}");
    println!("  Checked:  {}", report.slots_checked);
    println!("  Found:    {}", report.violations_found);
    println!("  Fixed:    {}", report.violations_fixed);
    if !report.unresolved.is_empty() {
        println!("  Unresolved:");
        print_violations(&report.unresolved);
    }
    Ok(())
}

pub fn scan(config: &Config) -> Result<()> {
    let engine = open_engine(config)?;
    let outcome = engine.run_coverage_scan(local_now());
    if !outcome.success {
        bail!("Coverage scan failed: {}", outcome.error.unwrap_or_default());
    }
    let report = outcome.result;
    println!(
        "Scanned {} uncovered slots in the next {}h",
        report.slots_scanned, config.scheduling.coverage_window_hours
    );
    println!(
        "  Alerts: {} new, {} resolved, {} open",
        report.alerts_created, report.alerts_resolved, report.open_alerts
    );
    for notification in &report.notifications {
        println!("  {notification}");
    }
    Ok(())
}

pub fn swap_request(config: &Config, user: i64, from_slot: i64, to_slot: i64) -> Result<()> {
    let engine = open_engine(config)?;
    let swap = engine.request_swap(user, from_slot, to_slot, local_now())?;
    println!(
        "Swap request {} created: slot {} <-> slot {}",
        swap.id, swap.from_slot, swap.to_slot
    );
    Ok(())
}

pub fn swap_respond(config: &Config, swap_id: i64, approve: bool) -> Result<()> {
    let engine = open_engine(config)?;
    let swap = if approve {
        engine.approve_swap(swap_id, local_now())?
    } else {
        engine.reject_swap(swap_id, local_now())?
    };
    println!("Swap request {} is now {:?}", swap.id, swap.status());
    Ok(())
}

pub fn swap_list(config: &Config) -> Result<()> {
    let engine = open_engine(config)?;
    let pending = engine.store().pending_swaps()?;
    if pending.is_empty() {
        println!("No pending swap requests");
    }
    for swap in pending {
        println!(
            "  {:>4}  user {} offers slot {} for slot {} (since {})",
            swap.id, swap.requested_by, swap.from_slot, swap.to_slot, swap.created_at
        );
    }
    Ok(())
}

pub fn leave_request(
    config: &Config,
    user: i64,
    team: i64,
    date: NaiveDate,
    reason: Option<String>,
) -> Result<()> {
    let engine = open_engine(config)?;
    let leave = engine.request_leave(user, team, date, reason.as_deref(), local_now())?;
    println!("Leave request {} for user {} on {} is {}", leave.id, user, date, leave.status);
    Ok(())
}

pub fn leave_respond(config: &Config, leave_id: i64, approve: bool) -> Result<()> {
    let engine = open_engine(config)?;
    if approve {
        let approval = engine.approve_leave(leave_id, local_now())?;
        println!(
            "Leave request {} approved; {} slot(s) released",
            leave_id,
            approval.cleared_slots.len()
        );
        if !approval.cleared_slots.is_empty() {
            println!("  They are refilled by the next generation run");
        }
    } else {
        let leave = engine.reject_leave(leave_id, local_now())?;
        println!("Leave request {} is {}", leave.id, leave.status);
    }
    Ok(())
}

pub fn reset(config: &Config, team: i64, confirmed: bool) -> Result<()> {
    if !confirmed {
        bail!("Reset deletes every future slot of team {team}; pass --yes to confirm");
    }
    let engine = open_engine(config)?;
    let outcome = engine.reset_team(team, local_now())?;
    println!(
        "Team {team} reset: {} assignments cleared, {} slots deleted",
        outcome.assignments_cleared, outcome.slots_deleted
    );
    Ok(())
}
