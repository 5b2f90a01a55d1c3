use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use oncall_rota::config::Config;

mod commands;

#[derive(Parser)]
#[command(
    name = "oncall-rota",
    version,
    about = "On-call rota engine: slot generation, fair assignment, swaps and coverage alerts",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); environment variables are used otherwise
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    InitDb,

    /// Manage teams
    Team {
        #[command(subcommand)]
        action: TeamAction,
    },

    /// Manage team memberships
    Member {
        #[command(subcommand)]
        action: MemberAction,
    },

    /// Record a user's availability for a date
    Availability {
        #[command(subcommand)]
        action: AvailabilityAction,
    },

    /// Manage leave requests
    Leave {
        #[command(subcommand)]
        action: LeaveAction,
    },

    /// Generate and assign slots (one team or every active team)
    Generate {
        /// Team to generate for; all active teams if omitted
        #[arg(short, long)]
        team: Option<i64>,

        /// First date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Last date (YYYY-MM-DD), defaults to the configured window
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Generate even if the team is below its required headcount
        #[arg(long)]
        force: bool,
    },

    /// Re-check existing assignments and repair violations
    Revalidate {
        /// Restrict to one team
        #[arg(short, long)]
        team: Option<i64>,

        /// Start date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        from: Option<NaiveDate>,
    },

    /// Scan for uncovered slots starting soon and raise alerts
    Scan,

    /// Manage slot swaps
    Swap {
        #[command(subcommand)]
        action: SwapAction,
    },

    /// Show the minimum headcount a team needs
    Capacity {
        /// Team ID
        team: i64,
    },

    /// Clear a team's future assignments and delete its future slots
    Reset {
        /// Team ID
        team: i64,

        /// Confirm the destructive reset
        #[arg(long, default_value = "false")]
        yes: bool,
    },

    /// Run the periodic jobs until interrupted
    Run {
        /// Print metrics in Prometheus text format on shutdown
        #[arg(long, default_value = "false")]
        print_metrics: bool,
    },
}

#[derive(Subcommand)]
enum TeamAction {
    /// Create a team
    Create {
        /// Team name (unique, at least 3 characters)
        name: String,

        /// Slot length in minutes
        #[arg(long, default_value = "60")]
        slot_minutes: i64,

        /// Maximum hours per member per day
        #[arg(long, default_value = "8")]
        max_day: f64,

        /// Maximum hours per member per week
        #[arg(long, default_value = "40")]
        max_week: f64,

        /// Minimum rest hours between shifts
        #[arg(long, default_value = "8")]
        min_rest: f64,
    },

    /// Show a team with its members and capacity
    Show {
        /// Team ID
        team: i64,
    },

    /// List teams
    List {
        /// Only active teams
        #[arg(long, default_value = "false")]
        active: bool,
    },

    /// Add a holiday on which no slots are generated
    Holiday {
        /// Team ID
        team: i64,

        /// Date (YYYY-MM-DD)
        date: NaiveDate,

        /// Description
        #[arg(short, long, default_value = "Holiday")]
        description: String,
    },
}

#[derive(Subcommand)]
enum MemberAction {
    /// Add a user to a team
    Add { user: i64, team: i64 },
    /// Remove a user from a team
    Remove { user: i64, team: i64 },
    /// Deactivate a membership
    Deactivate { user: i64, team: i64 },
    /// Reactivate a membership
    Reactivate { user: i64, team: i64 },
}

#[derive(Subcommand)]
enum AvailabilityAction {
    /// Mark a user available or unavailable on a date
    Set {
        user: i64,
        date: NaiveDate,
        /// Mark as unavailable
        #[arg(long, default_value = "false")]
        unavailable: bool,
    },
}

#[derive(Subcommand)]
enum LeaveAction {
    /// Request a day off
    Request {
        user: i64,
        team: i64,
        date: NaiveDate,
        #[arg(short, long)]
        reason: Option<String>,
    },
    /// Approve a leave request
    Approve { leave: i64 },
    /// Reject a leave request
    Reject { leave: i64 },
}

#[derive(Subcommand)]
enum SwapAction {
    /// Propose exchanging your slot with another member's slot
    Request {
        /// Requesting user
        user: i64,
        /// Slot held by the requester
        from_slot: i64,
        /// Slot held by the other member
        to_slot: i64,
    },
    /// Approve a pending swap
    Approve { swap: i64 },
    /// Reject a pending swap
    Reject { swap: i64 },
    /// List pending swaps
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate()?;

    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&log_format, &config.logging.level, cli.verbose)?;

    if let Err(e) = oncall_rota::metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics initialization failed, continuing without metrics");
    }

    match cli.command {
        Commands::InitDb => commands::init_db(&config)?,

        Commands::Team { action } => match action {
            TeamAction::Create {
                name,
                slot_minutes,
                max_day,
                max_week,
                min_rest,
            } => {
                let policy = oncall_rota::models::TeamPolicy {
                    slot_duration_minutes: slot_minutes,
                    max_hours_per_day: max_day,
                    max_hours_per_week: max_week,
                    min_rest_hours: min_rest,
                };
                commands::team::create(&config, name, policy)?;
            }
            TeamAction::Show { team } => commands::team::show(&config, team)?,
            TeamAction::List { active } => commands::team::list(&config, active)?,
            TeamAction::Holiday {
                team,
                date,
                description,
            } => commands::team::holiday(&config, team, date, description)?,
        },

        Commands::Member { action } => match action {
            MemberAction::Add { user, team } => {
                commands::team::member(&config, commands::team::MemberOp::Add, user, team)?
            }
            MemberAction::Remove { user, team } => {
                commands::team::member(&config, commands::team::MemberOp::Remove, user, team)?
            }
            MemberAction::Deactivate { user, team } => commands::team::member(
                &config,
                commands::team::MemberOp::Deactivate,
                user,
                team,
            )?,
            MemberAction::Reactivate { user, team } => commands::team::member(
                &config,
                commands::team::MemberOp::Reactivate,
                user,
                team,
            )?,
        },

        Commands::Availability { action } => match action {
            AvailabilityAction::Set {
                user,
                date,
                unavailable,
            } => commands::team::availability(&config, user, date, !unavailable)?,
        },

        Commands::Leave { action } => match action {
            LeaveAction::Request {
                user,
                team,
                date,
                reason,
            } => commands::schedule::leave_request(&config, user, team, date, reason)?,
            LeaveAction::Approve { leave } => commands::schedule::leave_respond(&config, leave, true)?,
            LeaveAction::Reject { leave } => commands::schedule::leave_respond(&config, leave, false)?,
        },

        Commands::Generate {
            team,
            start,
            end,
            force,
        } => {
            tracing::info!(team = ?team, start = ?start, end = ?end, force, "Starting generate command");
            commands::schedule::generate(&config, team, start, end, force)?;
        }

        Commands::Revalidate { team, from } => {
            tracing::info!(team = ?team, from = ?from, "Starting revalidate command");
            commands::schedule::revalidate(&config, team, from)?;
        }

        Commands::Scan => commands::schedule::scan(&config)?,

        Commands::Swap { action } => match action {
            SwapAction::Request {
                user,
                from_slot,
                to_slot,
            } => commands::schedule::swap_request(&config, user, from_slot, to_slot)?,
            SwapAction::Approve { swap } => commands::schedule::swap_respond(&config, swap, true)?,
            SwapAction::Reject { swap } => commands::schedule::swap_respond(&config, swap, false)?,
            SwapAction::List => commands::schedule::swap_list(&config)?,
        },

        Commands::Capacity { team } => commands::team::capacity(&config, team)?,

        Commands::Reset { team, yes } => commands::schedule::reset(&config, team, yes)?,

        Commands::Run { print_metrics } => commands::run::run(config, print_metrics).await?,
    }

    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("oncall_rota=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_new(format!("oncall_rota={level},warn"))?
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
