//! Common test utilities

#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::sync::Arc;

use oncall_rota::config::Config;
use oncall_rota::models::{NewTeam, Slot, Team, TeamPolicy, UserId};
use oncall_rota::notifications::InMemoryNotificationStore;
use oncall_rota::scheduler::RotaEngine;
use oncall_rota::storage::{MemoryScheduleStore, ScheduleStore, SlotFilter};

/// January 2024; the 15th is a Monday
pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
}

pub fn at(day: u32, hour: u32) -> NaiveDateTime {
    date(day).and_hms_opt(hour, 0, 0).unwrap()
}

/// Engine over the in-memory store with default configuration
pub fn memory_engine() -> RotaEngine {
    engine_over(Arc::new(MemoryScheduleStore::new()))
}

pub fn engine_over(store: Arc<dyn ScheduleStore>) -> RotaEngine {
    RotaEngine::new(
        store,
        Arc::new(InMemoryNotificationStore::new(Duration::hours(24))),
        Config::default(),
    )
}

/// Three 8h shifts a day; needs five members to activate
pub fn three_shift() -> TeamPolicy {
    TeamPolicy::from_hours(8, 8.0, 40.0, 8.0)
}

/// One 24h slot a day; needs two members to activate
pub fn daily() -> TeamPolicy {
    TeamPolicy::from_hours(24, 24.0, 168.0, 0.0)
}

/// Create a team and add `users` in order at `now`
pub fn team_with_members(
    engine: &RotaEngine,
    name: &str,
    policy: TeamPolicy,
    users: &[UserId],
    now: NaiveDateTime,
) -> Team {
    let team = engine
        .create_team(&NewTeam::new(name, policy), at(1, 0))
        .unwrap();
    for &user in users {
        engine.add_member(user, team.id, now).unwrap();
    }
    engine.store().get_team(team.id).unwrap().unwrap()
}

/// Every slot of a team starting within `[first, last]` (whole days)
pub fn slots_on(engine: &RotaEngine, team: &Team, first: u32, last: u32) -> Vec<Slot> {
    engine
        .store()
        .slots_between(Some(team.id), at(first, 0), at(last, 0) + Duration::days(1), SlotFilter::Any)
        .unwrap()
}

pub fn holder_of(engine: &RotaEngine, slot: &Slot) -> Option<UserId> {
    engine
        .store()
        .get_slot(slot.id)
        .unwrap()
        .unwrap()
        .assigned_member
}
