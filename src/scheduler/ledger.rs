//! Per-member booking ledger
//!
//! Assignment decisions inside one batch depend on the hours and counts the
//! previous decisions just changed. The ledger holds those running totals in
//! memory so a batch is evaluated against its own picks before anything is
//! written back.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::models::{Slot, SlotId, TeamId, UserId};
use crate::storage::ScheduleStore;

/// How far back existing assignments are loaded; covers the 30-day fairness
/// window plus the 2-day rest lookback.
pub const HISTORY_DAYS: i64 = 32;

/// One assigned slot held by a member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Booking {
    pub slot_id: SlotId,
    pub team_id: TeamId,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Booking {
    pub fn date(&self) -> NaiveDate {
        self.start.date()
    }

    pub fn hours(&self) -> f64 {
        (self.end - self.start).num_seconds() as f64 / 3600.0
    }
}

impl From<&Slot> for Booking {
    fn from(slot: &Slot) -> Self {
        Self {
            slot_id: slot.id,
            team_id: slot.team_id,
            start: slot.start_time,
            end: slot.end_time,
        }
    }
}

/// Bookings and blocked days of a set of members
#[derive(Debug, Default, Clone)]
pub struct Ledger {
    bookings: HashMap<UserId, Vec<Booking>>,
    unavailable: HashSet<(UserId, NaiveDate)>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the ledger for `users` from storage
    ///
    /// Bookings are taken across all teams starting [`HISTORY_DAYS`] before
    /// `from`; blocked days are those within `[from, to]` for `team_id`.
    pub fn load(
        store: &dyn ScheduleStore,
        team_id: TeamId,
        users: &[UserId],
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Self> {
        let mut ledger = Self::new();
        if users.is_empty() {
            return Ok(ledger);
        }

        let history_start = (from - Duration::days(HISTORY_DAYS)).and_time(NaiveTime::MIN);
        for slot in store.assignments_for_users(users, history_start)? {
            if let Some(user) = slot.assigned_member {
                ledger.book(user, &slot);
            }
        }
        ledger.unavailable = store.unavailable_days(users, team_id, from, to)?;

        tracing::debug!(
            team_id,
            users = users.len(),
            bookings = ledger.bookings.values().map(Vec::len).sum::<usize>(),
            blocked_days = ledger.unavailable.len(),
            "Ledger loaded"
        );
        Ok(ledger)
    }

    /// Record an assignment, keeping bookings ordered by start
    pub fn book(&mut self, user: UserId, slot: &Slot) {
        let bookings = self.bookings.entry(user).or_default();
        if bookings.iter().any(|b| b.slot_id == slot.id) {
            return;
        }
        let pos = bookings.partition_point(|b| b.start <= slot.start_time);
        bookings.insert(pos, Booking::from(slot));
    }

    /// Drop an assignment; returns whether it was present
    pub fn unbook(&mut self, user: UserId, slot_id: SlotId) -> bool {
        match self.bookings.get_mut(&user) {
            Some(bookings) => {
                let before = bookings.len();
                bookings.retain(|b| b.slot_id != slot_id);
                bookings.len() < before
            }
            None => false,
        }
    }

    pub fn mark_unavailable(&mut self, user: UserId, date: NaiveDate) {
        self.unavailable.insert((user, date));
    }

    pub fn is_unavailable(&self, user: UserId, date: NaiveDate) -> bool {
        self.unavailable.contains(&(user, date))
    }

    pub fn bookings(&self, user: UserId) -> &[Booking] {
        self.bookings.get(&user).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Hours booked on a calendar day, optionally ignoring one slot
    pub fn hours_on(&self, user: UserId, date: NaiveDate, excluding: Option<SlotId>) -> f64 {
        self.bookings(user)
            .iter()
            .filter(|b| Some(b.slot_id) != excluding && b.date() == date)
            .map(Booking::hours)
            .sum()
    }

    /// Hours booked in the week starting at `week_start`
    pub fn hours_in_week(
        &self,
        user: UserId,
        week_start: NaiveDate,
        excluding: Option<SlotId>,
    ) -> f64 {
        let week_end = week_start + Duration::days(7);
        self.bookings(user)
            .iter()
            .filter(|b| Some(b.slot_id) != excluding)
            .filter(|b| b.date() >= week_start && b.date() < week_end)
            .map(Booking::hours)
            .sum()
    }

    /// Number of bookings whose date is in `[from, until)`, open-ended when
    /// `until` is `None`
    pub fn count_between(&self, user: UserId, from: NaiveDate, until: Option<NaiveDate>) -> usize {
        self.bookings(user)
            .iter()
            .filter(|b| b.date() >= from && until.map_or(true, |end| b.date() < end))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(id: SlotId, day: u32, hour: u32, hours: i64) -> Slot {
        let start = NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap();
        Slot {
            id,
            team_id: 1,
            start_time: start,
            end_time: start + Duration::hours(hours),
            assigned_member: None,
            is_holiday: false,
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn test_bookings_stay_ordered() {
        let mut ledger = Ledger::new();
        ledger.book(1, &slot(3, 16, 16, 8));
        ledger.book(1, &slot(1, 16, 0, 8));
        ledger.book(1, &slot(2, 16, 8, 8));
        ledger.book(1, &slot(2, 16, 8, 8));

        let ids: Vec<_> = ledger.bookings(1).iter().map(|b| b.slot_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_hour_totals() {
        let mut ledger = Ledger::new();
        // Monday 15th through Sunday 21st is one week
        ledger.book(1, &slot(1, 15, 0, 8));
        ledger.book(1, &slot(2, 16, 0, 4));
        ledger.book(1, &slot(3, 16, 12, 4));
        ledger.book(1, &slot(4, 22, 0, 8));

        assert_eq!(ledger.hours_on(1, date(16), None), 8.0);
        assert_eq!(ledger.hours_on(1, date(16), Some(2)), 4.0);
        assert_eq!(ledger.hours_in_week(1, date(15), None), 16.0);
        assert_eq!(ledger.hours_in_week(1, date(22), None), 8.0);
        assert_eq!(ledger.hours_on(2, date(16), None), 0.0);
    }

    #[test]
    fn test_count_between() {
        let mut ledger = Ledger::new();
        ledger.book(1, &slot(1, 10, 0, 8));
        ledger.book(1, &slot(2, 14, 0, 8));
        ledger.book(1, &slot(3, 20, 0, 8));

        assert_eq!(ledger.count_between(1, date(10), Some(date(14))), 1);
        assert_eq!(ledger.count_between(1, date(10), None), 3);
    }

    #[test]
    fn test_unbook_and_availability() {
        let mut ledger = Ledger::new();
        ledger.book(1, &slot(1, 10, 0, 8));
        assert!(ledger.unbook(1, 1));
        assert!(!ledger.unbook(1, 1));
        assert!(ledger.bookings(1).is_empty());

        ledger.mark_unavailable(1, date(10));
        assert!(ledger.is_unavailable(1, date(10)));
        assert!(!ledger.is_unavailable(2, date(10)));
    }
}
