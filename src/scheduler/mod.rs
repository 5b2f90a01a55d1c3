//! On-call rota scheduling
//!
//! This module turns team policies and memberships into a concrete rota:
//! fixed-duration slots covering every non-holiday day, each assigned to one
//! member chosen by hard constraints and a fairness score.
//!
//! # Features
//!
//! - **Capacity Estimate**: minimum headcount needed for 24/7 coverage
//! - **Activation Gate**: teams are scheduled only once fully staffed
//! - **Idempotent Generation**: re-running a window never duplicates slots
//! - **Fair Assignment**: availability, hour caps, rest gap and adjacency
//!   rules, then lowest recent workload wins
//! - **Revalidation**: repair pass over existing assignments
//! - **Swaps and Leave**: member-negotiated exchanges and approved days off
//! - **Per-team Locking**: operations on one team are serialized
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                         RotaEngine                            │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐    │
//! │  │  Activation │  │    Slot     │  │     Revalidator     │    │
//! │  │    Gate     │  │  Generator  │  │                     │    │
//! │  └──────┬──────┘  └──────┬──────┘  └──────────┬──────────┘    │
//! │         │                │                     │              │
//! │         └────────────────┼─────────────────────┘              │
//! │                   ┌──────▼──────┐                             │
//! │                   │    Fair     │◄── constraints + ledger     │
//! │                   │  Assigner   │                             │
//! │                   └──────┬──────┘                             │
//! └──────────────────────────┼────────────────────────────────────┘
//!                            ▼
//!                     ScheduleStore
//! ```
//!
//! # Modules
//!
//! - [`capacity`] - Minimum headcount estimate
//! - [`activation`] - Team activation gate and membership service
//! - [`generator`] - Slot generation and cleanup
//! - [`assignment`] - Fair assignment engine
//! - [`constraints`] - Hard rules and fairness score
//! - [`ledger`] - Running per-member totals
//! - [`revalidate`] - Repair pass over existing assignments
//! - [`swap`] - Slot swaps
//! - [`leave`] - Leave requests
//! - [`lock`] - Per-team mutual exclusion
//! - [`engine`] - Facade and periodic entry points
//! - [`trigger`] - Timers driving the periodic entry points
//!
//! # Quick Start
//!
//! ```ignore
//! use oncall_rota::scheduler::RotaEngine;
//! use oncall_rota::models::{NewTeam, TeamPolicy};
//!
//! let engine = RotaEngine::new(store, outbox, config);
//! let team = engine.create_team(&NewTeam::new("Platform", TeamPolicy::default()), now)?;
//! for user in 1..=13 {
//!     engine.add_member(user, team.id, now)?;
//! }
//! // the team is now active and has its first week generated
//! let report = engine.run_generation(now);
//! ```

pub mod activation;
pub mod assignment;
pub mod capacity;
pub mod constraints;
pub mod engine;
pub mod error;
pub mod generator;
pub mod leave;
pub mod ledger;
pub mod lock;
pub mod revalidate;
pub mod swap;
pub mod trigger;

pub use activation::{GateDecision, GateOutcome, MembershipEvent, MembershipService};
pub use assignment::{assign_open_slots, AssignmentOutcome, FairAssigner, Violation};
pub use capacity::{minimum_members, CapacityEstimate};
pub use engine::{
    BatchReport, JobOutcome, MembershipUpdate, Recalculation, ResetOutcome, RotaEngine,
    TeamOverview, TeamRun, TeamStatus, NO_ACTIVE_MEMBERS, TEAM_NOT_ACTIVE,
};
pub use error::{SchedulerError, SchedulerResult};
pub use generator::{GenerationOutcome, SlotGenerator};
pub use leave::{LeaveApproval, LeaveService};
pub use lock::TeamLocks;
pub use revalidate::{RevalidationReport, Revalidator};
pub use swap::SwapCoordinator;
pub use trigger::{JobEvent, JobTrigger};
