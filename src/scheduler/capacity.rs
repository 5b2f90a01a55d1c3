//! Minimum headcount estimate for round-the-clock coverage
//!
//! The estimate overprovisions by one member on both the daily and the
//! weekly bound so that a single denial or leave day does not immediately
//! open a coverage gap. It is not a bin-packing optimum.

use serde::{Deserialize, Serialize};

use crate::models::TeamPolicy;

const HOURS_PER_DAY: f64 = 24.0;
const HOURS_PER_WEEK: f64 = 168.0;

/// Breakdown of the capacity estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityEstimate {
    /// Slots needed to cover one day
    pub slots_per_day: u32,
    /// Most slots one member can take per day
    pub slots_per_member_daily: u32,
    /// Most slots one member can take per week
    pub slots_per_member_weekly: u32,
    /// Headcount from the daily bound, safety margin included
    pub daily_members: u32,
    /// Headcount from the weekly bound, safety margin included
    pub weekly_members: u32,
}

impl CapacityEstimate {
    /// Required headcount (never below 1)
    pub fn required(&self) -> u32 {
        self.daily_members.max(self.weekly_members).max(1)
    }
}

/// Compute the full estimate for a policy
pub fn estimate(policy: &TeamPolicy) -> CapacityEstimate {
    let d = policy.slot_hours();
    let rest = policy.min_rest_hours.max(0.0);

    if d <= 0.0 {
        return CapacityEstimate {
            slots_per_day: 1,
            slots_per_member_daily: 1,
            slots_per_member_weekly: 1,
            daily_members: 2,
            weekly_members: 2,
        };
    }

    let min_gap = d + rest;
    let slots_per_day = floor_at_least_one(HOURS_PER_DAY / d);

    let slots_per_member_daily =
        floor_at_least_one((HOURS_PER_DAY / min_gap).min(policy.max_hours_per_day / d));
    let daily_members = slots_per_day / slots_per_member_daily + 1;

    let slots_per_member_weekly =
        floor_at_least_one((HOURS_PER_WEEK / min_gap).min(policy.max_hours_per_week / d));
    let weekly_members = (7 * slots_per_day) / slots_per_member_weekly + 1;

    CapacityEstimate {
        slots_per_day,
        slots_per_member_daily,
        slots_per_member_weekly,
        daily_members,
        weekly_members,
    }
}

/// Minimum active members a team needs before it is scheduled
pub fn minimum_members(policy: &TeamPolicy) -> u32 {
    estimate(policy).required()
}

fn floor_at_least_one(value: f64) -> u32 {
    if !value.is_finite() || value < 1.0 {
        return 1;
    }
    value.floor() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_three_shift_team() {
        let policy = TeamPolicy::from_hours(8, 8.0, 40.0, 8.0);
        let est = estimate(&policy);
        assert_eq!(est.slots_per_day, 3);
        assert_eq!(est.slots_per_member_daily, 1);
        // 168 / 16 = 10.5 but the weekly cap allows only 5 shifts
        assert_eq!(est.slots_per_member_weekly, 5);
        assert_eq!(est.daily_members, 4);
        assert_eq!(est.weekly_members, 5);
        assert_eq!(minimum_members(&policy), 5);
    }

    #[test]
    fn test_hourly_slots() {
        let policy = TeamPolicy::from_hours(1, 8.0, 40.0, 8.0);
        let est = estimate(&policy);
        assert_eq!(est.slots_per_day, 24);
        // 24 / 9 = 2.67 -> 2
        assert_eq!(est.slots_per_member_daily, 2);
        assert_eq!(est.daily_members, 13);
        // 168 / 9 = 18.67 -> 18
        assert_eq!(est.weekly_members, 168 / 18 + 1);
        assert_eq!(minimum_members(&policy), 13);
    }

    #[test]
    fn test_full_day_slot() {
        let policy = TeamPolicy::from_hours(24, 24.0, 168.0, 0.0);
        let est = estimate(&policy);
        assert_eq!(est.slots_per_day, 1);
        assert_eq!(est.daily_members, 2);
        assert_eq!(est.weekly_members, 2);
        assert_eq!(minimum_members(&policy), 2);
    }

    #[test]
    fn test_degenerate_duration_floor() {
        let policy = TeamPolicy {
            slot_duration_minutes: 0,
            ..TeamPolicy::default()
        };
        assert_eq!(minimum_members(&policy), 2);
    }

    proptest! {
        #[test]
        fn prop_rest_never_lowers_headcount(
            slot_hours in prop::sample::select(vec![1i64, 2, 3, 4, 6, 8, 12, 24]),
            max_day in 1.0f64..24.0,
            extra_week in 0.0f64..100.0,
            rest in 0.0f64..24.0,
            bump in 0.0f64..24.0,
        ) {
            let max_week = (max_day + extra_week).min(168.0);
            let before = TeamPolicy::from_hours(slot_hours, max_day, max_week, rest);
            let after = TeamPolicy::from_hours(slot_hours, max_day, max_week, rest + bump);
            prop_assert!(minimum_members(&after) >= minimum_members(&before));
        }

        #[test]
        fn prop_headcount_is_positive(
            slot_hours in prop::sample::select(vec![1i64, 2, 3, 4, 6, 8, 12, 24]),
            max_day in 0.5f64..24.0,
            rest in 0.0f64..24.0,
        ) {
            let policy = TeamPolicy::from_hours(slot_hours, max_day, 168.0, rest);
            prop_assert!(minimum_members(&policy) >= 2);
        }
    }
}
