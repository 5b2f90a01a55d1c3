//! SQLite implementation of [`ScheduleStore`]
//!
//! Timestamps are stored as naive local text (`YYYY-MM-DD HH:MM:SS`) through
//! rusqlite's chrono support, so range predicates compare lexically.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Transaction};

use super::{ScheduleStore, SlotFilter};
use crate::error::Result;
use crate::models::{
    Alert, AlertId, Availability, Holiday, LeaveId, LeaveRequest, LeaveStatus, Membership,
    NewSlot, NewTeam, Slot, SlotId, SwapId, SwapRequest, Team, TeamId, TeamPolicy, UserId,
};
use crate::scheduler::error::SchedulerError;

const TEAM_COLUMNS: &str = "id, name, slot_duration_minutes, max_hours_per_day, \
     max_hours_per_week, min_rest_hours, is_active, created_at";
const SLOT_COLUMNS: &str = "id, team_id, start_time, end_time, assigned_member, is_holiday";
const MEMBERSHIP_COLUMNS: &str = "id, user_id, team_id, is_active, created_at";
const LEAVE_COLUMNS: &str =
    "id, user_id, team_id, date, reason, status, created_at, responded_at";
const SWAP_COLUMNS: &str =
    "id, from_slot, to_slot, requested_by, accepted, rejected, created_at, responded_at";
const ALERT_COLUMNS: &str = "id, team_id, slot_id, message, created_at, resolved, resolved_at";

/// SQLite-backed schedule store
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection.
pub struct SqliteScheduleStore {
    conn: Mutex<Connection>,
}

impl SqliteScheduleStore {
    /// Open (or create) a database file
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path).context("Failed to open SQLite database")?;

        // Enable WAL mode for better concurrency
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite schedule store initialized");
        Ok(store)
    }

    /// Create in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to create in-memory SQLite")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| SchedulerError::storage("lock", e.to_string()).into())
    }

    /// Create database schema
    fn create_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS teams (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    slot_duration_minutes INTEGER NOT NULL,
                    max_hours_per_day REAL NOT NULL,
                    max_hours_per_week REAL NOT NULL,
                    min_rest_hours REAL NOT NULL,
                    is_active INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                );

                CREATE UNIQUE INDEX IF NOT EXISTS idx_teams_name
                    ON teams(name COLLATE NOCASE);

                CREATE TABLE IF NOT EXISTS memberships (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL,
                    team_id INTEGER NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
                    is_active INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL,
                    UNIQUE(user_id, team_id)
                );

                CREATE TABLE IF NOT EXISTS holidays (
                    team_id INTEGER NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
                    date TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    PRIMARY KEY (team_id, date)
                );

                CREATE TABLE IF NOT EXISTS availability (
                    user_id INTEGER NOT NULL,
                    date TEXT NOT NULL,
                    is_available INTEGER NOT NULL,
                    PRIMARY KEY (user_id, date)
                );

                CREATE TABLE IF NOT EXISTS leave_requests (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL,
                    team_id INTEGER NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
                    date TEXT NOT NULL,
                    reason TEXT,
                    status TEXT NOT NULL DEFAULT 'pending',
                    created_at TEXT NOT NULL,
                    responded_at TEXT,
                    UNIQUE(user_id, team_id, date)
                );

                CREATE TABLE IF NOT EXISTS slots (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    team_id INTEGER NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
                    start_time TEXT NOT NULL,
                    end_time TEXT NOT NULL,
                    assigned_member INTEGER,
                    is_covered INTEGER NOT NULL DEFAULT 0,
                    is_holiday INTEGER NOT NULL DEFAULT 0,
                    UNIQUE(team_id, start_time)
                );

                CREATE INDEX IF NOT EXISTS idx_slots_start
                    ON slots(start_time);

                CREATE INDEX IF NOT EXISTS idx_slots_member
                    ON slots(assigned_member, start_time);

                CREATE TABLE IF NOT EXISTS swap_requests (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    from_slot INTEGER NOT NULL REFERENCES slots(id) ON DELETE CASCADE,
                    to_slot INTEGER NOT NULL REFERENCES slots(id) ON DELETE CASCADE,
                    requested_by INTEGER NOT NULL,
                    accepted INTEGER NOT NULL DEFAULT 0,
                    rejected INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    responded_at TEXT
                );

                CREATE TABLE IF NOT EXISTS alerts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    team_id INTEGER NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
                    slot_id INTEGER NOT NULL REFERENCES slots(id) ON DELETE CASCADE,
                    message TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    resolved INTEGER NOT NULL DEFAULT 0,
                    resolved_at TEXT
                );

                CREATE INDEX IF NOT EXISTS idx_alerts_open
                    ON alerts(slot_id, resolved);
                "#,
        )
        .context("Failed to create SQLite schema")?;

        Ok(())
    }

    fn find_team(conn: &Connection, team_id: TeamId) -> Result<Option<Team>> {
        let team = conn
            .query_row(
                &format!("SELECT {TEAM_COLUMNS} FROM teams WHERE id = ?1"),
                params![team_id],
                team_from_row,
            )
            .optional()?;
        Ok(team)
    }

    fn find_membership(
        conn: &Connection,
        user_id: UserId,
        team_id: TeamId,
    ) -> Result<Option<Membership>> {
        let membership = conn
            .query_row(
                &format!(
                    "SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE user_id = ?1 AND team_id = ?2"
                ),
                params![user_id, team_id],
                membership_from_row,
            )
            .optional()?;
        Ok(membership)
    }

    fn find_leave(conn: &Connection, leave_id: LeaveId) -> Result<Option<LeaveRequest>> {
        let leave = conn
            .query_row(
                &format!("SELECT {LEAVE_COLUMNS} FROM leave_requests WHERE id = ?1"),
                params![leave_id],
                leave_from_row,
            )
            .optional()?;
        Ok(leave)
    }

    fn find_slot(conn: &Connection, slot_id: SlotId) -> Result<Option<Slot>> {
        let slot = conn
            .query_row(
                &format!("SELECT {SLOT_COLUMNS} FROM slots WHERE id = ?1"),
                params![slot_id],
                slot_from_row,
            )
            .optional()?;
        Ok(slot)
    }

    fn find_swap(conn: &Connection, swap_id: SwapId) -> Result<Option<SwapRequest>> {
        let swap = conn
            .query_row(
                &format!("SELECT {SWAP_COLUMNS} FROM swap_requests WHERE id = ?1"),
                params![swap_id],
                swap_from_row,
            )
            .optional()?;
        Ok(swap)
    }

    fn find_alert(conn: &Connection, alert_id: AlertId) -> Result<Option<Alert>> {
        let alert = conn
            .query_row(
                &format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?1"),
                params![alert_id],
                alert_from_row,
            )
            .optional()?;
        Ok(alert)
    }

    fn assign(tx: &Transaction<'_>, slot_id: SlotId, member: Option<UserId>) -> Result<()> {
        let updated = tx.execute(
            "UPDATE slots SET assigned_member = ?2, is_covered = ?3 WHERE id = ?1",
            params![slot_id, member, member.is_some()],
        )?;
        if updated == 0 {
            return Err(SchedulerError::SlotNotFound { slot_id }.into());
        }
        Ok(())
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn team_from_row(row: &Row<'_>) -> rusqlite::Result<Team> {
    Ok(Team {
        id: row.get(0)?,
        name: row.get(1)?,
        policy: TeamPolicy {
            slot_duration_minutes: row.get(2)?,
            max_hours_per_day: row.get(3)?,
            max_hours_per_week: row.get(4)?,
            min_rest_hours: row.get(5)?,
        },
        is_active: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn membership_from_row(row: &Row<'_>) -> rusqlite::Result<Membership> {
    Ok(Membership {
        id: row.get(0)?,
        user_id: row.get(1)?,
        team_id: row.get(2)?,
        is_active: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn leave_from_row(row: &Row<'_>) -> rusqlite::Result<LeaveRequest> {
    Ok(LeaveRequest {
        id: row.get(0)?,
        user_id: row.get(1)?,
        team_id: row.get(2)?,
        date: row.get(3)?,
        reason: row.get(4)?,
        status: row.get::<_, String>(5)?.parse().map_err(|e: SchedulerError| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?,
        created_at: row.get(6)?,
        responded_at: row.get(7)?,
    })
}

fn slot_from_row(row: &Row<'_>) -> rusqlite::Result<Slot> {
    Ok(Slot {
        id: row.get(0)?,
        team_id: row.get(1)?,
        start_time: row.get(2)?,
        end_time: row.get(3)?,
        assigned_member: row.get(4)?,
        is_holiday: row.get(5)?,
    })
}

fn swap_from_row(row: &Row<'_>) -> rusqlite::Result<SwapRequest> {
    Ok(SwapRequest {
        id: row.get(0)?,
        from_slot: row.get(1)?,
        to_slot: row.get(2)?,
        requested_by: row.get(3)?,
        accepted: row.get(4)?,
        rejected: row.get(5)?,
        created_at: row.get(6)?,
        responded_at: row.get(7)?,
    })
}

fn alert_from_row(row: &Row<'_>) -> rusqlite::Result<Alert> {
    Ok(Alert {
        id: row.get(0)?,
        team_id: row.get(1)?,
        slot_id: row.get(2)?,
        message: row.get(3)?,
        created_at: row.get(4)?,
        resolved: row.get(5)?,
        resolved_at: row.get(6)?,
    })
}

fn placeholders(count: usize, offset: usize) -> String {
    (0..count)
        .map(|i| format!("?{}", i + offset + 1))
        .collect::<Vec<_>>()
        .join(",")
}

// ============================================================================
// ScheduleStore
// ============================================================================

impl ScheduleStore for SqliteScheduleStore {
    fn insert_team(&self, team: &NewTeam, now: NaiveDateTime) -> Result<Team> {
        let conn = self.conn()?;
        let name = team.name.trim();

        let taken: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM teams WHERE name = ?1 COLLATE NOCASE)",
            params![name],
            |row| row.get(0),
        )?;
        if taken {
            return Err(SchedulerError::DuplicateTeamName {
                name: name.to_string(),
            }
            .into());
        }

        conn.execute(
            r#"
                INSERT INTO teams (name, slot_duration_minutes, max_hours_per_day,
                                   max_hours_per_week, min_rest_hours, is_active, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)
                "#,
            params![
                name,
                team.policy.slot_duration_minutes,
                team.policy.max_hours_per_day,
                team.policy.max_hours_per_week,
                team.policy.min_rest_hours,
                now
            ],
        )
        .context("Failed to insert team")?;

        Ok(Team {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            policy: team.policy,
            is_active: false,
            created_at: now,
        })
    }

    fn get_team(&self, team_id: TeamId) -> Result<Option<Team>> {
        let conn = self.conn()?;
        Self::find_team(&conn, team_id)
    }

    fn list_teams(&self, active_only: bool) -> Result<Vec<Team>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TEAM_COLUMNS} FROM teams WHERE (?1 = 0 OR is_active = 1) ORDER BY id"
        ))?;
        let teams = stmt
            .query_map(params![active_only], team_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(teams)
    }

    fn set_team_active(&self, team_id: TeamId, active: bool) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE teams SET is_active = ?2 WHERE id = ?1",
            params![team_id, active],
        )?;
        if updated == 0 {
            return Err(SchedulerError::TeamNotFound { team_id }.into());
        }
        Ok(())
    }

    fn insert_membership(
        &self,
        user_id: UserId,
        team_id: TeamId,
        now: NaiveDateTime,
    ) -> Result<Membership> {
        let conn = self.conn()?;
        if Self::find_membership(&conn, user_id, team_id)?.is_some() {
            return Err(SchedulerError::MembershipExists { user_id, team_id }.into());
        }
        conn.execute(
            "INSERT INTO memberships (user_id, team_id, is_active, created_at) VALUES (?1, ?2, 1, ?3)",
            params![user_id, team_id, now],
        )
        .context("Failed to insert membership")?;

        Ok(Membership {
            id: conn.last_insert_rowid(),
            user_id,
            team_id,
            is_active: true,
            created_at: now,
        })
    }

    fn get_membership(&self, user_id: UserId, team_id: TeamId) -> Result<Option<Membership>> {
        let conn = self.conn()?;
        Self::find_membership(&conn, user_id, team_id)
    }

    fn memberships_for_user(&self, user_id: UserId) -> Result<Vec<Membership>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE user_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt
            .query_map(params![user_id], membership_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn set_membership_active(
        &self,
        user_id: UserId,
        team_id: TeamId,
        active: bool,
    ) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE memberships SET is_active = ?3 WHERE user_id = ?1 AND team_id = ?2",
            params![user_id, team_id, active],
        )?;
        if updated == 0 {
            return Err(SchedulerError::MembershipNotFound { user_id, team_id }.into());
        }
        Ok(())
    }

    fn delete_membership(&self, user_id: UserId, team_id: TeamId) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM memberships WHERE user_id = ?1 AND team_id = ?2",
            params![user_id, team_id],
        )?;
        Ok(deleted > 0)
    }

    fn active_members(&self, team_id: TeamId) -> Result<Vec<Membership>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM memberships
             WHERE team_id = ?1 AND is_active = 1 ORDER BY id"
        ))?;
        let rows = stmt
            .query_map(params![team_id], membership_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn add_holiday(&self, holiday: &Holiday) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO holidays (team_id, date, description) VALUES (?1, ?2, ?3)",
            params![holiday.team_id, holiday.date, holiday.description],
        )
        .context("Failed to insert holiday")?;
        Ok(())
    }

    fn holidays_between(
        &self,
        team_id: TeamId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<HashSet<NaiveDate>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT date FROM holidays WHERE team_id = ?1 AND date >= ?2 AND date <= ?3",
        )?;
        let dates = stmt
            .query_map(params![team_id, from, to], |row| row.get::<_, NaiveDate>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(dates)
    }

    fn set_availability(&self, availability: &Availability) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO availability (user_id, date, is_available) VALUES (?1, ?2, ?3)",
            params![
                availability.user_id,
                availability.date,
                availability.is_available
            ],
        )?;
        Ok(())
    }

    fn get_availability(&self, user_id: UserId, date: NaiveDate) -> Result<Option<Availability>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                "SELECT user_id, date, is_available FROM availability WHERE user_id = ?1 AND date = ?2",
                params![user_id, date],
                |row| {
                    Ok(Availability {
                        user_id: row.get(0)?,
                        date: row.get(1)?,
                        is_available: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    fn unavailable_days(
        &self,
        user_ids: &[UserId],
        team_id: TeamId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<HashSet<(UserId, NaiveDate)>> {
        if user_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let conn = self.conn()?;
        let users = placeholders(user_ids.len(), 3);
        let query = format!(
            r#"
                SELECT user_id, date FROM availability
                WHERE is_available = 0 AND date >= ?1 AND date <= ?2 AND user_id IN ({users})
                UNION
                SELECT user_id, date FROM leave_requests
                WHERE status = 'approved' AND team_id = ?3
                  AND date >= ?1 AND date <= ?2 AND user_id IN ({users})
                "#
        );

        let mut values: Vec<Box<dyn rusqlite::ToSql>> =
            vec![Box::new(from), Box::new(to), Box::new(team_id)];
        values.extend(
            user_ids
                .iter()
                .map(|id| Box::new(*id) as Box<dyn rusqlite::ToSql>),
        );

        let mut stmt = conn.prepare(&query).context("Failed to prepare availability query")?;
        let blocked = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                Ok((row.get::<_, UserId>(0)?, row.get::<_, NaiveDate>(1)?))
            })?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(blocked)
    }

    fn insert_leave(
        &self,
        user_id: UserId,
        team_id: TeamId,
        date: NaiveDate,
        reason: Option<&str>,
        now: NaiveDateTime,
    ) -> Result<LeaveRequest> {
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM leave_requests WHERE user_id = ?1 AND team_id = ?2 AND date = ?3)",
            params![user_id, team_id, date],
            |row| row.get(0),
        )?;
        if exists {
            return Err(SchedulerError::DuplicateLeave {
                user_id,
                date: date.to_string(),
            }
            .into());
        }

        conn.execute(
            r#"
                INSERT INTO leave_requests (user_id, team_id, date, reason, status, created_at)
                VALUES (?1, ?2, ?3, ?4, 'pending', ?5)
                "#,
            params![user_id, team_id, date, reason, now],
        )
        .context("Failed to insert leave request")?;

        Ok(LeaveRequest {
            id: conn.last_insert_rowid(),
            user_id,
            team_id,
            date,
            reason: reason.map(str::to_string),
            status: LeaveStatus::Pending,
            created_at: now,
            responded_at: None,
        })
    }

    fn get_leave(&self, leave_id: LeaveId) -> Result<Option<LeaveRequest>> {
        let conn = self.conn()?;
        Self::find_leave(&conn, leave_id)
    }

    fn approve_leave(&self, leave_id: LeaveId, now: NaiveDateTime) -> Result<Vec<SlotId>> {
        let mut conn = self.conn()?;
        let leave =
            Self::find_leave(&conn, leave_id)?.ok_or(SchedulerError::LeaveNotFound { leave_id })?;
        if leave.status != LeaveStatus::Pending {
            return Err(SchedulerError::LeaveAlreadyResolved { leave_id }.into());
        }

        let day_start = leave.date.and_time(chrono::NaiveTime::MIN);
        let day_end = day_start + chrono::Duration::days(1);

        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE leave_requests SET status = 'approved', responded_at = ?2 WHERE id = ?1",
            params![leave_id, now],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO availability (user_id, date, is_available) VALUES (?1, ?2, 0)",
            params![leave.user_id, leave.date],
        )?;

        let cleared = {
            let mut stmt = tx.prepare(
                r#"
                    SELECT id FROM slots
                    WHERE team_id = ?1 AND assigned_member = ?2
                      AND start_time >= ?3 AND start_time < ?4
                    ORDER BY start_time
                    "#,
            )?;
            let ids = stmt
                .query_map(
                    params![leave.team_id, leave.user_id, day_start, day_end],
                    |row| row.get::<_, SlotId>(0),
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            ids
        };
        for slot_id in &cleared {
            Self::assign(&tx, *slot_id, None)?;
        }
        tx.commit()?;

        Ok(cleared)
    }

    fn reject_leave(&self, leave_id: LeaveId, now: NaiveDateTime) -> Result<()> {
        let conn = self.conn()?;
        let leave =
            Self::find_leave(&conn, leave_id)?.ok_or(SchedulerError::LeaveNotFound { leave_id })?;
        if leave.status != LeaveStatus::Pending {
            return Err(SchedulerError::LeaveAlreadyResolved { leave_id }.into());
        }
        conn.execute(
            "UPDATE leave_requests SET status = 'rejected', responded_at = ?2 WHERE id = ?1",
            params![leave_id, now],
        )?;
        Ok(())
    }

    fn insert_slots(&self, slots: &[NewSlot]) -> Result<usize> {
        if slots.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                r#"
                    INSERT OR IGNORE INTO slots (team_id, start_time, end_time, is_covered, is_holiday)
                    VALUES (?1, ?2, ?3, 0, 0)
                    "#,
            )?;
            for slot in slots {
                inserted += stmt.execute(params![slot.team_id, slot.start_time, slot.end_time])?;
            }
        }
        tx.commit().context("Failed to commit slot batch")?;
        Ok(inserted)
    }

    fn slot_starts_between(
        &self,
        team_id: TeamId,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<HashSet<NaiveDateTime>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT start_time FROM slots WHERE team_id = ?1 AND start_time >= ?2 AND start_time < ?3",
        )?;
        let starts = stmt
            .query_map(params![team_id, from, to], |row| {
                row.get::<_, NaiveDateTime>(0)
            })?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(starts)
    }

    fn get_slot(&self, slot_id: SlotId) -> Result<Option<Slot>> {
        let conn = self.conn()?;
        Self::find_slot(&conn, slot_id)
    }

    fn slots_between(
        &self,
        team_id: Option<TeamId>,
        from: NaiveDateTime,
        to: NaiveDateTime,
        filter: SlotFilter,
    ) -> Result<Vec<Slot>> {
        let conn = self.conn()?;
        let assignment = match filter {
            SlotFilter::Any => "",
            SlotFilter::Assigned => "AND assigned_member IS NOT NULL",
            SlotFilter::Unassigned => "AND assigned_member IS NULL",
        };
        let query = format!(
            r#"
                SELECT {SLOT_COLUMNS} FROM slots
                WHERE (?1 IS NULL OR team_id = ?1)
                  AND start_time >= ?2 AND start_time < ?3 {assignment}
                ORDER BY start_time, id
                "#
        );
        let mut stmt = conn.prepare(&query)?;
        let slots = stmt
            .query_map(params![team_id, from, to], slot_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(slots)
    }

    fn assignments_for_users(
        &self,
        user_ids: &[UserId],
        from: NaiveDateTime,
    ) -> Result<Vec<Slot>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let query = format!(
            "SELECT {SLOT_COLUMNS} FROM slots
             WHERE start_time >= ?1 AND assigned_member IN ({})
             ORDER BY start_time, id",
            placeholders(user_ids.len(), 1)
        );

        let mut values: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(from)];
        values.extend(
            user_ids
                .iter()
                .map(|id| Box::new(*id) as Box<dyn rusqlite::ToSql>),
        );

        let mut stmt = conn.prepare(&query)?;
        let slots = stmt
            .query_map(params_from_iter(values.iter()), slot_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(slots)
    }

    fn apply_assignments(&self, changes: &[(SlotId, Option<UserId>)]) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for (slot_id, member) in changes {
            Self::assign(&tx, *slot_id, *member)?;
        }
        tx.commit().context("Failed to commit assignments")?;
        Ok(())
    }

    fn delete_unassigned_before(&self, before: NaiveDateTime) -> Result<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM slots WHERE assigned_member IS NULL AND start_time < ?1",
            params![before],
        )?;
        Ok(deleted)
    }

    fn delete_unassigned_between(
        &self,
        team_id: TeamId,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            r#"
                DELETE FROM slots
                WHERE team_id = ?1 AND assigned_member IS NULL
                  AND start_time >= ?2 AND start_time < ?3
                "#,
            params![team_id, from, to],
        )?;
        Ok(deleted)
    }

    fn insert_swap(
        &self,
        from_slot: SlotId,
        to_slot: SlotId,
        requested_by: UserId,
        now: NaiveDateTime,
    ) -> Result<SwapRequest> {
        let conn = self.conn()?;
        conn.execute(
            r#"
                INSERT INTO swap_requests (from_slot, to_slot, requested_by, accepted, rejected, created_at)
                VALUES (?1, ?2, ?3, 0, 0, ?4)
                "#,
            params![from_slot, to_slot, requested_by, now],
        )
        .context("Failed to insert swap request")?;

        Ok(SwapRequest {
            id: conn.last_insert_rowid(),
            from_slot,
            to_slot,
            requested_by,
            accepted: false,
            rejected: false,
            created_at: now,
            responded_at: None,
        })
    }

    fn get_swap(&self, swap_id: SwapId) -> Result<Option<SwapRequest>> {
        let conn = self.conn()?;
        Self::find_swap(&conn, swap_id)
    }

    fn pending_swap_exists(&self, from_slot: SlotId, to_slot: SlotId) -> Result<bool> {
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            r#"
                SELECT EXISTS(SELECT 1 FROM swap_requests
                WHERE from_slot = ?1 AND to_slot = ?2 AND accepted = 0 AND rejected = 0)
                "#,
            params![from_slot, to_slot],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn pending_swaps(&self) -> Result<Vec<SwapRequest>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SWAP_COLUMNS} FROM swap_requests WHERE accepted = 0 AND rejected = 0 ORDER BY id"
        ))?;
        let swaps = stmt
            .query_map([], swap_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(swaps)
    }

    fn complete_swap(&self, swap_id: SwapId, now: NaiveDateTime) -> Result<()> {
        let mut conn = self.conn()?;
        let swap =
            Self::find_swap(&conn, swap_id)?.ok_or(SchedulerError::SwapNotFound { swap_id })?;
        if !swap.is_pending() {
            return Err(SchedulerError::SwapAlreadyResolved { swap_id }.into());
        }
        let from = Self::find_slot(&conn, swap.from_slot)?.ok_or(SchedulerError::SlotNotFound {
            slot_id: swap.from_slot,
        })?;
        let to = Self::find_slot(&conn, swap.to_slot)?.ok_or(SchedulerError::SlotNotFound {
            slot_id: swap.to_slot,
        })?;

        let tx = conn.transaction()?;
        Self::assign(&tx, from.id, to.assigned_member)?;
        Self::assign(&tx, to.id, from.assigned_member)?;
        tx.execute(
            "UPDATE swap_requests SET accepted = 1, responded_at = ?2 WHERE id = ?1",
            params![swap_id, now],
        )?;
        tx.commit().context("Failed to commit swap")?;
        Ok(())
    }

    fn reject_swap(&self, swap_id: SwapId, now: NaiveDateTime) -> Result<()> {
        let conn = self.conn()?;
        let swap =
            Self::find_swap(&conn, swap_id)?.ok_or(SchedulerError::SwapNotFound { swap_id })?;
        if !swap.is_pending() {
            return Err(SchedulerError::SwapAlreadyResolved { swap_id }.into());
        }
        conn.execute(
            "UPDATE swap_requests SET rejected = 1, responded_at = ?2 WHERE id = ?1",
            params![swap_id, now],
        )?;
        Ok(())
    }

    fn open_alert_for_slot(&self, slot_id: SlotId) -> Result<Option<Alert>> {
        let conn = self.conn()?;
        let alert = conn
            .query_row(
                &format!(
                    "SELECT {ALERT_COLUMNS} FROM alerts WHERE slot_id = ?1 AND resolved = 0
                     ORDER BY id LIMIT 1"
                ),
                params![slot_id],
                alert_from_row,
            )
            .optional()?;
        Ok(alert)
    }

    fn insert_alert(
        &self,
        team_id: TeamId,
        slot_id: SlotId,
        message: &str,
        now: NaiveDateTime,
    ) -> Result<Alert> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO alerts (team_id, slot_id, message, created_at, resolved) VALUES (?1, ?2, ?3, ?4, 0)",
            params![team_id, slot_id, message, now],
        )
        .context("Failed to insert alert")?;
        let id = conn.last_insert_rowid();
        Self::find_alert(&conn, id)?
            .ok_or_else(|| SchedulerError::storage("insert_alert", "alert vanished").into())
    }

    fn resolve_alert(&self, alert_id: AlertId, now: NaiveDateTime) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE alerts SET resolved = 1, resolved_at = ?2 WHERE id = ?1",
            params![alert_id, now],
        )?;
        Ok(())
    }

    fn open_alerts(&self) -> Result<Vec<Alert>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts WHERE resolved = 0 ORDER BY id"
        ))?;
        let alerts = stmt
            .query_map([], alert_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(alerts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::contract;
    use tempfile::TempDir;

    fn store() -> SqliteScheduleStore {
        SqliteScheduleStore::in_memory().unwrap()
    }

    #[test]
    fn test_file_store_creates_parent_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("rota.db");
        let store = SqliteScheduleStore::new(&path).unwrap();
        assert!(path.exists());
        assert!(store.list_teams(false).unwrap().is_empty());
    }

    #[test]
    fn test_file_store_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rota.db");
        {
            let store = SqliteScheduleStore::new(&path).unwrap();
            store
                .insert_team(&NewTeam::new("Platform", TeamPolicy::default()), contract::dt(1, 0))
                .unwrap();
        }
        let store = SqliteScheduleStore::new(&path).unwrap();
        let teams = store.list_teams(false).unwrap();
        assert_eq!(teams.len(), 1);
        assert_eq!(teams[0].policy, TeamPolicy::default());
    }

    #[test]
    fn test_team_names_are_unique() {
        contract::team_names_are_unique(&store());
    }

    #[test]
    fn test_slot_insert_is_idempotent() {
        contract::slot_insert_is_idempotent(&store());
    }

    #[test]
    fn test_slot_queries_filter_and_order() {
        contract::slot_queries_filter_and_order(&store());
    }

    #[test]
    fn test_cleanup_keeps_assigned_slots() {
        contract::cleanup_keeps_assigned_slots(&store());
    }

    #[test]
    fn test_memberships_round_trip() {
        contract::memberships_round_trip(&store());
    }

    #[test]
    fn test_leave_approval_blocks_and_clears() {
        contract::leave_approval_blocks_and_clears(&store());
    }

    #[test]
    fn test_swap_exchange_is_symmetric() {
        contract::swap_exchange_is_symmetric(&store());
    }

    #[test]
    fn test_alerts_open_and_resolve() {
        contract::alerts_open_and_resolve(&store());
    }

    #[test]
    fn test_apply_assignments_rolls_back_on_missing_slot() {
        let store = store();
        let team = store
            .insert_team(&NewTeam::new("Platform", TeamPolicy::default()), contract::dt(1, 0))
            .unwrap();
        store
            .insert_slots(&[NewSlot {
                team_id: team.id,
                start_time: contract::dt(15, 0),
                end_time: contract::dt(15, 1),
            }])
            .unwrap();
        let slot = &store
            .slots_between(Some(team.id), contract::dt(15, 0), contract::dt(16, 0), SlotFilter::Any)
            .unwrap()[0];

        let result = store.apply_assignments(&[(slot.id, Some(4)), (9999, Some(4))]);
        assert!(result.is_err());
        let unchanged = store.get_slot(slot.id).unwrap().unwrap();
        assert_eq!(unchanged.assigned_member, None);
    }

    #[test]
    fn test_unknown_leave_status_is_storage_error() {
        let store = store();
        let team = store
            .insert_team(&NewTeam::new("Platform", TeamPolicy::default()), contract::dt(1, 0))
            .unwrap();
        store.insert_membership(5, team.id, contract::dt(1, 0)).unwrap();
        let leave = store
            .insert_leave(5, team.id, contract::dt(16, 0).date(), None, contract::dt(1, 0))
            .unwrap();
        store
            .conn()
            .unwrap()
            .execute(
                "UPDATE leave_requests SET status = 'cancelled' WHERE id = ?1",
                params![leave.id],
            )
            .unwrap();

        let err = store.get_leave(leave.id).unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Storage);
    }
}
