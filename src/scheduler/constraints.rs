//! Hard constraints and fairness score for a (member, slot) pair

use chrono::Duration;
use std::fmt;

use super::ledger::Ledger;
use crate::config::FairnessConfig;
use crate::models::{Slot, TeamPolicy, UserId};

/// Buffer around a slot inside which no other booking may fall
const REST_BUFFER_HOURS: i64 = 1;

/// How far back the rest rule looks for the previous shift
const REST_LOOKBACK_DAYS: i64 = 2;

const RECENT_DAYS: i64 = 7;
const MONTHLY_DAYS: i64 = 30;

/// Which rule set applies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckMode {
    /// Picking a member for an open slot: rules 1 to 5
    Assignment,
    /// Re-checking an existing assignment: rules 1 to 4, the slot itself
    /// excluded from the member's totals
    Revalidation,
}

/// Why a member cannot take a slot
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    Unavailable,
    DailyLimit { limit: f64 },
    WeeklyLimit { limit: f64 },
    InsufficientRest { min_rest: f64 },
    AdjacentSameDay,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "User is not available on this date"),
            Self::DailyLimit { limit } => write!(f, "Would exceed daily limit ({}h)", limit),
            Self::WeeklyLimit { limit } => write!(f, "Would exceed weekly limit ({}h)", limit),
            Self::InsufficientRest { min_rest } => {
                write!(f, "Insufficient rest time (minimum {}h required)", min_rest)
            }
            Self::AdjacentSameDay => {
                write!(f, "Already holds a back-to-back slot on the same day")
            }
        }
    }
}

/// Check every hard rule for `user` taking `slot`
pub fn check(
    ledger: &Ledger,
    policy: &TeamPolicy,
    user: UserId,
    slot: &Slot,
    mode: CheckMode,
) -> Result<(), Rejection> {
    let excluding = match mode {
        CheckMode::Assignment => None,
        CheckMode::Revalidation => Some(slot.id),
    };
    let date = slot.date();
    let slot_hours = slot.hours();

    // 1. availability
    if ledger.is_unavailable(user, date) {
        return Err(Rejection::Unavailable);
    }

    // 2. daily cap
    if ledger.hours_on(user, date, excluding) + slot_hours > policy.max_hours_per_day {
        return Err(Rejection::DailyLimit {
            limit: policy.max_hours_per_day,
        });
    }

    // 3. weekly cap
    if ledger.hours_in_week(user, slot.week_start(), excluding) + slot_hours
        > policy.max_hours_per_week
    {
        return Err(Rejection::WeeklyLimit {
            limit: policy.max_hours_per_week,
        });
    }

    // 4. rest gap
    if !has_sufficient_rest(ledger, policy, user, slot, excluding) {
        return Err(Rejection::InsufficientRest {
            min_rest: policy.min_rest_hours,
        });
    }

    // 5. same-day adjacency
    if mode == CheckMode::Assignment && has_adjacent_slot(ledger, user, slot) {
        return Err(Rejection::AdjacentSameDay);
    }

    Ok(())
}

fn has_sufficient_rest(
    ledger: &Ledger,
    policy: &TeamPolicy,
    user: UserId,
    slot: &Slot,
    excluding: Option<i64>,
) -> bool {
    let buffer = Duration::hours(REST_BUFFER_HOURS);
    let window_start = slot.start_time - buffer;
    let window_end = slot.end_time + buffer;

    let bookings = ledger
        .bookings(user)
        .iter()
        .filter(|b| Some(b.slot_id) != excluding);

    let mut previous_end = None;
    let lookback = slot.start_time - Duration::days(REST_LOOKBACK_DAYS);
    for booking in bookings {
        if booking.start <= window_end && booking.end >= window_start {
            return false;
        }
        if booking.end < slot.start_time && booking.end >= lookback {
            previous_end = previous_end.max(Some(booking.end));
        }
    }

    match previous_end {
        Some(end) => slot.start_time - end >= policy.min_rest(),
        None => true,
    }
}

fn has_adjacent_slot(ledger: &Ledger, user: UserId, slot: &Slot) -> bool {
    ledger.bookings(user).iter().any(|b| {
        b.slot_id != slot.id
            && b.team_id == slot.team_id
            && b.date() == slot.date()
            && (b.end == slot.start_time || b.start == slot.end_time)
    })
}

/// Fairness score of `user` for a slot; lower is better
///
/// Counts bookings in the 7 days before the slot date and bookings dated
/// from 30 days before onward, later batch picks included.
pub fn fairness_score(ledger: &Ledger, weights: &FairnessConfig, user: UserId, slot: &Slot) -> f64 {
    let date = slot.date();
    let recent = ledger.count_between(user, date - Duration::days(RECENT_DAYS), Some(date));
    let monthly = ledger.count_between(user, date - Duration::days(MONTHLY_DAYS), None);
    weights.recent_weight * recent as f64 + weights.monthly_weight * monthly as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn slot(id: i64, day: u32, hour: u32, hours: i64) -> Slot {
        Slot {
            id,
            team_id: 1,
            start_time: at(day, hour),
            end_time: at(day, hour) + Duration::hours(hours),
            assigned_member: None,
            is_holiday: false,
        }
    }

    fn policy() -> TeamPolicy {
        TeamPolicy::from_hours(8, 8.0, 40.0, 8.0)
    }

    #[test]
    fn test_clean_ledger_passes() {
        let ledger = Ledger::new();
        assert!(check(&ledger, &policy(), 1, &slot(1, 16, 0, 8), CheckMode::Assignment).is_ok());
    }

    #[test]
    fn test_unavailable() {
        let mut ledger = Ledger::new();
        ledger.mark_unavailable(1, at(16, 0).date());
        let err = check(&ledger, &policy(), 1, &slot(1, 16, 8, 8), CheckMode::Assignment)
            .unwrap_err();
        assert_eq!(err, Rejection::Unavailable);
        assert_eq!(err.to_string(), "User is not available on this date");
    }

    #[test]
    fn test_daily_limit() {
        let mut ledger = Ledger::new();
        ledger.book(1, &slot(1, 16, 0, 8));
        let err = check(&ledger, &policy(), 1, &slot(2, 16, 16, 8), CheckMode::Assignment)
            .unwrap_err();
        assert_eq!(err.to_string(), "Would exceed daily limit (8h)");
    }

    #[test]
    fn test_weekly_limit() {
        let mut ledger = Ledger::new();
        // Monday 15th to Friday 19th, one 8h shift a day
        for (i, day) in (15..20).enumerate() {
            ledger.book(1, &slot(i as i64 + 1, day, 0, 8));
        }
        let err = check(&ledger, &policy(), 1, &slot(10, 20, 0, 8), CheckMode::Assignment)
            .unwrap_err();
        assert_eq!(err.to_string(), "Would exceed weekly limit (40h)");

        // next Monday starts a fresh week
        assert!(check(&ledger, &policy(), 1, &slot(11, 22, 0, 8), CheckMode::Assignment).is_ok());
    }

    #[test]
    fn test_rest_gap_from_previous_day() {
        let mut ledger = Ledger::new();
        ledger.book(1, &slot(1, 15, 16, 8));
        // previous shift ends at midnight; 04:00 start is only 4h later
        let short = TeamPolicy::from_hours(4, 8.0, 40.0, 8.0);
        let err = check(&ledger, &short, 1, &slot(2, 16, 4, 4), CheckMode::Assignment)
            .unwrap_err();
        assert_eq!(err, Rejection::InsufficientRest { min_rest: 8.0 });

        assert!(check(&ledger, &short, 1, &slot(3, 16, 8, 4), CheckMode::Assignment).is_ok());
    }

    #[test]
    fn test_buffer_blocks_following_shift() {
        let mut ledger = Ledger::new();
        ledger.book(1, &slot(1, 16, 12, 4));
        let loose = TeamPolicy::from_hours(4, 12.0, 60.0, 0.0);
        // later booking starts 1h after the candidate ends
        let err = check(&ledger, &loose, 1, &slot(2, 16, 7, 4), CheckMode::Assignment)
            .unwrap_err();
        assert!(matches!(err, Rejection::InsufficientRest { .. }));
    }

    #[test]
    fn test_revalidation_ignores_own_slot() {
        let mut ledger = Ledger::new();
        let held = slot(1, 16, 0, 8);
        ledger.book(1, &held);
        assert!(check(&ledger, &policy(), 1, &held, CheckMode::Revalidation).is_ok());
        assert!(check(&ledger, &policy(), 1, &held, CheckMode::Assignment).is_err());
    }

    #[test]
    fn test_adjacency_only_at_assignment() {
        let mut ledger = Ledger::new();
        let early = slot(1, 16, 0, 2);
        ledger.book(1, &early);
        let next = slot(2, 16, 2, 2);
        assert!(has_adjacent_slot(&ledger, 1, &next));
        assert!(!has_adjacent_slot(&ledger, 1, &early));
        assert!(!has_adjacent_slot(&ledger, 2, &next));
    }

    #[test]
    fn test_fairness_score_weights() {
        let mut ledger = Ledger::new();
        // two in the trailing week, one older but within 30 days
        ledger.book(1, &slot(1, 12, 0, 8));
        ledger.book(1, &slot(2, 14, 0, 8));
        ledger.book(1, &slot(3, 1, 0, 8));
        let weights = FairnessConfig::default();

        let score = fairness_score(&ledger, &weights, 1, &slot(9, 16, 0, 8));
        assert_eq!(score, 3.0 * 2.0 + 0.5 * 3.0);
        assert_eq!(fairness_score(&ledger, &weights, 2, &slot(9, 16, 0, 8)), 0.0);
    }
}
