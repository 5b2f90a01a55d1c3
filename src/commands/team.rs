use anyhow::Result;
use chrono::NaiveDate;

use oncall_rota::config::Config;
use oncall_rota::models::{Availability, Holiday, NewTeam, TeamPolicy};
use oncall_rota::scheduler::MembershipUpdate;
use oncall_rota::utils::{format_hours, local_now};

use super::open_engine;

pub fn create(config: &Config, name: String, policy: TeamPolicy) -> Result<()> {
    let engine = open_engine(config)?;
    let team = engine.create_team(&NewTeam::new(name, policy), local_now())?;
    let required = oncall_rota::scheduler::minimum_members(&team.policy);

    println!("Created team {} '{}'", team.id, team.name);
    println!(
        "  Slots: {} minutes, {} per day",
        team.policy.slot_duration_minutes,
        team.policy.slots_per_day()
    );
    println!("  Needs {required} active members before it is scheduled");
    Ok(())
}

pub fn show(config: &Config, team_id: i64) -> Result<()> {
    let engine = open_engine(config)?;
    let overview = engine.describe_team(team_id)?;
    let team = &overview.team;
    let status = if team.is_active { "active" } else { "inactive" };

    println!("Team {} '{}' ({status})", team.id, team.name);
    println!("================================");
    println!(
        "  Slot length:   {}",
        format_hours(team.policy.slot_hours())
    );
    println!(
        "  Daily cap:     {}",
        format_hours(team.policy.max_hours_per_day)
    );
    println!(
        "  Weekly cap:    {}",
        format_hours(team.policy.max_hours_per_week)
    );
    println!(
        "  Minimum rest:  {}",
        format_hours(team.policy.min_rest_hours)
    );
    println!(
        "  Members:       {} active / {} required",
        overview.members.len(),
        overview.capacity.required()
    );
    for member in &overview.members {
        println!("    - user {}", member.user_id);
    }
    Ok(())
}

pub fn list(config: &Config, active_only: bool) -> Result<()> {
    let engine = open_engine(config)?;
    let teams = engine.store().list_teams(active_only)?;
    if teams.is_empty() {
        println!("No teams found");
        return Ok(());
    }
    for team in teams {
        let marker = if team.is_active { "*" } else { " " };
        println!("{marker} {:>4}  {}", team.id, team.name);
    }
    Ok(())
}

pub fn holiday(config: &Config, team_id: i64, date: NaiveDate, description: String) -> Result<()> {
    let engine = open_engine(config)?;
    engine.add_holiday(&Holiday {
        team_id,
        date,
        description,
    })?;
    println!("Holiday on {date} added to team {team_id}");
    Ok(())
}

pub fn capacity(config: &Config, team_id: i64) -> Result<()> {
    let engine = open_engine(config)?;
    let estimate = engine.capacity(team_id)?;
    println!("Capacity estimate for team {team_id}");
    println!("  Slots per day:              {}", estimate.slots_per_day);
    println!("  Slots per member per day:   {}", estimate.slots_per_member_daily);
    println!("  Slots per member per week:  {}", estimate.slots_per_member_weekly);
    println!("  Members (daily bound):      {}", estimate.daily_members);
    println!("  Members (weekly bound):     {}", estimate.weekly_members);
    println!("  Required:                   {}", estimate.required());
    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub enum MemberOp {
    Add,
    Remove,
    Deactivate,
    Reactivate,
}

pub fn member(config: &Config, op: MemberOp, user_id: i64, team_id: i64) -> Result<()> {
    let engine = open_engine(config)?;
    let now = local_now();
    let update = match op {
        MemberOp::Add => engine.add_member(user_id, team_id, now)?,
        MemberOp::Remove => engine.remove_member(user_id, team_id, now)?,
        MemberOp::Deactivate => engine.deactivate_member(user_id, team_id, now)?,
        MemberOp::Reactivate => engine.reactivate_member(user_id, team_id, now)?,
    };
    print_update(&update);
    Ok(())
}

fn print_update(update: &MembershipUpdate) {
    println!(
        "User {} {} (team {})",
        update.change.user_id, update.change.event, update.change.team_id
    );
    match &update.gate {
        Some(gate) => println!(
            "  Active members: {} / {} required -> {:?}",
            gate.active_members, gate.required, gate.decision
        ),
        None => println!("  Activation check failed; see logs"),
    }
}

pub fn availability(config: &Config, user_id: i64, date: NaiveDate, is_available: bool) -> Result<()> {
    let engine = open_engine(config)?;
    engine.set_availability(&Availability {
        user_id,
        date,
        is_available,
    })?;
    let state = if is_available { "available" } else { "unavailable" };
    println!("User {user_id} marked {state} on {date}");
    Ok(())
}
