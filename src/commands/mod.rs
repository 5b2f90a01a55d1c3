//! CLI sub-commands
//!
//! Thin wrappers over [`RotaEngine`]; they parse nothing and decide nothing
//! beyond printing results.

pub mod run;
pub mod schedule;
pub mod team;

use anyhow::{Context, Result};
use chrono::Duration;
use std::sync::Arc;

use oncall_rota::config::Config;
use oncall_rota::notifications::InMemoryNotificationStore;
use oncall_rota::scheduler::{RotaEngine, Violation};
use oncall_rota::storage::SqliteScheduleStore;

/// Open the configured database and build an engine around it
pub fn open_engine(config: &Config) -> Result<RotaEngine> {
    let store = SqliteScheduleStore::new(&config.database.sqlite_path).with_context(|| {
        format!(
            "Failed to open database at {}",
            config.database.sqlite_path.display()
        )
    })?;
    let outbox = InMemoryNotificationStore::new(Duration::hours(config.notifications.ttl_hours));
    Ok(RotaEngine::new(
        Arc::new(store),
        Arc::new(outbox),
        config.clone(),
    ))
}

/// Create the database file and schema
pub fn init_db(config: &Config) -> Result<()> {
    open_engine(config)?;
    println!(
        "Database ready at {}",
        config.database.sqlite_path.display()
    );
    Ok(())
}

pub(crate) fn print_violations(violations: &[Violation]) {
    for v in violations {
        match v.member_id {
            Some(member) => println!("  ! slot {} (user {}): {}", v.slot_id, member, v.reason),
            None => println!("  ! slot {}: {}", v.slot_id, v.reason),
        }
    }
}
