//! oncall-rota - On-call rota engine
//!
//! Generates fixed-duration coverage slots for teams, assigns them to members
//! under hard constraints with a fairness score, repairs assignments that
//! drift out of policy, and raises alerts for slots about to start uncovered.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`models`] - Core data structures and types
//! - [`storage`] - Persistence boundary (SQLite, in-memory)
//! - [`scheduler`] - Capacity, generation, assignment, revalidation, swaps
//! - [`notifications`] - Coverage-gap monitor and notification delivery
//! - [`metrics`] - Prometheus metrics
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use oncall_rota::config::Config;
//! use oncall_rota::notifications::InMemoryNotificationStore;
//! use oncall_rota::scheduler::RotaEngine;
//! use oncall_rota::storage::SqliteScheduleStore;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let store = SqliteScheduleStore::new(&config.database.sqlite_path)?;
//!     let outbox = InMemoryNotificationStore::new(chrono::Duration::hours(24));
//!     let engine = RotaEngine::new(Arc::new(store), Arc::new(outbox), config);
//!     let report = engine.run_generation(chrono::Local::now().naive_local());
//!     println!("{} slots created", report.total_slots_created);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod notifications;
pub mod scheduler;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::models::{NewTeam, Slot, Team, TeamPolicy};
    pub use crate::scheduler::{RotaEngine, SchedulerError};
    pub use crate::storage::{MemoryScheduleStore, ScheduleStore, SqliteScheduleStore};
}

// Direct re-exports for convenience
pub use models::{Slot, Team, TeamPolicy};
