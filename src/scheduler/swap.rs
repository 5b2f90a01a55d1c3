//! Member-negotiated slot swaps
//!
//! A swap exchanges the assignees of two slots of the same team on the same
//! date. Approval honours the negotiated pair as-is: the fair assigner is
//! not consulted, only availability of the requester's side is re-checked.

use chrono::NaiveDateTime;

use super::error::SchedulerError;
use crate::error::Result;
use crate::metrics;
use crate::models::{Slot, SlotId, SwapId, SwapRequest, UserId};
use crate::storage::ScheduleStore;

pub struct SwapCoordinator<'a> {
    store: &'a dyn ScheduleStore,
}

impl<'a> SwapCoordinator<'a> {
    pub fn new(store: &'a dyn ScheduleStore) -> Self {
        Self { store }
    }

    fn slot(&self, slot_id: SlotId) -> Result<Slot> {
        self.store
            .get_slot(slot_id)?
            .ok_or_else(|| SchedulerError::SlotNotFound { slot_id }.into())
    }

    fn pending(&self, swap_id: SwapId) -> Result<SwapRequest> {
        let swap = self
            .store
            .get_swap(swap_id)?
            .ok_or(SchedulerError::SwapNotFound { swap_id })?;
        if !swap.is_pending() {
            return Err(SchedulerError::SwapAlreadyResolved { swap_id }.into());
        }
        Ok(swap)
    }

    /// Validate and record a pending swap request
    pub fn request(
        &self,
        requester: UserId,
        from_slot: SlotId,
        to_slot: SlotId,
        now: NaiveDateTime,
    ) -> Result<SwapRequest> {
        let from = self.slot(from_slot)?;
        let to = self.slot(to_slot)?;

        if from.assigned_member != Some(requester) {
            return Err(SchedulerError::NotSlotOwner {
                slot_id: from_slot,
                user_id: requester,
            }
            .into());
        }
        match to.assigned_member {
            None => return Err(SchedulerError::SlotUnassigned { slot_id: to_slot }.into()),
            Some(holder) if holder == requester => {
                return Err(SchedulerError::SwapWithSelf { slot_id: to_slot }.into())
            }
            Some(_) => {}
        }
        if from.team_id != to.team_id {
            return Err(SchedulerError::SwapTeamMismatch { from_slot, to_slot }.into());
        }
        if from.date() != to.date() {
            return Err(SchedulerError::SwapDateMismatch { from_slot, to_slot }.into());
        }
        if self.store.pending_swap_exists(from_slot, to_slot)? {
            return Err(SchedulerError::DuplicateSwap { from_slot, to_slot }.into());
        }

        let swap = self.store.insert_swap(from_slot, to_slot, requester, now)?;
        tracing::info!(swap_id = swap.id, from_slot, to_slot, requester, "Swap requested");
        Ok(swap)
    }

    /// Exchange the two assignees
    pub fn approve(&self, swap_id: SwapId, now: NaiveDateTime) -> Result<SwapRequest> {
        let swap = self.pending(swap_id)?;
        let from = self.slot(swap.from_slot)?;
        let to = self.slot(swap.to_slot)?;

        let (Some(from_holder), Some(_)) = (from.assigned_member, to.assigned_member) else {
            metrics::record_swap("refused");
            let unassigned = if from.assigned_member.is_none() {
                from.id
            } else {
                to.id
            };
            return Err(SchedulerError::SwapStale {
                swap_id,
                reason: format!("slot {} is no longer assigned", unassigned),
            }
            .into());
        };

        let blocked =
            self.store
                .unavailable_days(&[from_holder], to.team_id, to.date(), to.date())?;
        if !blocked.is_empty() {
            metrics::record_swap("refused");
            return Err(SchedulerError::SwapBlocked {
                swap_id,
                reason: format!("user {} is not available on {}", from_holder, to.date()),
            }
            .into());
        }

        self.store.complete_swap(swap_id, now)?;
        metrics::record_swap("approved");
        tracing::info!(
            swap_id,
            from_slot = from.id,
            to_slot = to.id,
            "Swap approved"
        );

        self.store
            .get_swap(swap_id)?
            .ok_or_else(|| SchedulerError::SwapNotFound { swap_id }.into())
    }

    /// Close the request without touching any slot
    pub fn reject(&self, swap_id: SwapId, now: NaiveDateTime) -> Result<SwapRequest> {
        self.pending(swap_id)?;
        self.store.reject_swap(swap_id, now)?;
        metrics::record_swap("rejected");
        tracing::info!(swap_id, "Swap rejected");
        self.store
            .get_swap(swap_id)?
            .ok_or_else(|| SchedulerError::SwapNotFound { swap_id }.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::models::{Availability, NewSlot, NewTeam, TeamPolicy};
    use crate::storage::{MemoryScheduleStore, SlotFilter};
    use chrono::{Duration, NaiveDate};

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    /// Team with slots on the 16th (00, 08, 16) held by 10, 20, 30 and one
    /// slot on the 17th held by 20
    fn setup() -> (MemoryScheduleStore, Vec<Slot>) {
        let store = MemoryScheduleStore::new();
        let team = store
            .insert_team(&NewTeam::new("Platform", TeamPolicy::from_hours(8, 8.0, 40.0, 8.0)), at(1, 0))
            .unwrap();
        let starts = [at(16, 0), at(16, 8), at(16, 16), at(17, 0)];
        let new: Vec<NewSlot> = starts
            .iter()
            .map(|s| NewSlot {
                team_id: team.id,
                start_time: *s,
                end_time: *s + Duration::hours(8),
            })
            .collect();
        store.insert_slots(&new).unwrap();
        let slots = store
            .slots_between(Some(team.id), at(16, 0), at(18, 0), SlotFilter::Any)
            .unwrap();
        store
            .apply_assignments(&[
                (slots[0].id, Some(10)),
                (slots[1].id, Some(20)),
                (slots[2].id, Some(30)),
                (slots[3].id, Some(20)),
            ])
            .unwrap();
        (store, slots)
    }

    fn scheduler_err(err: Error) -> SchedulerError {
        err.as_scheduler().cloned().expect("scheduler error")
    }

    #[test]
    fn test_request_validation() {
        let (store, slots) = setup();
        let swaps = SwapCoordinator::new(&store);

        let err = swaps.request(20, slots[0].id, slots[1].id, at(1, 0)).unwrap_err();
        assert!(matches!(scheduler_err(err), SchedulerError::NotSlotOwner { .. }));

        let err = swaps.request(10, slots[0].id, slots[3].id, at(1, 0)).unwrap_err();
        assert!(matches!(scheduler_err(err), SchedulerError::SwapDateMismatch { .. }));

        let err = swaps.request(10, slots[0].id, slots[0].id, at(1, 0)).unwrap_err();
        assert!(matches!(scheduler_err(err), SchedulerError::SwapWithSelf { .. }));

        swaps.request(10, slots[0].id, slots[1].id, at(1, 0)).unwrap();
        let err = swaps.request(10, slots[0].id, slots[1].id, at(1, 0)).unwrap_err();
        assert!(matches!(scheduler_err(err), SchedulerError::DuplicateSwap { .. }));
    }

    #[test]
    fn test_approve_exchanges_only_the_pair() {
        let (store, slots) = setup();
        let swaps = SwapCoordinator::new(&store);
        let swap = swaps.request(10, slots[0].id, slots[1].id, at(1, 0)).unwrap();

        let done = swaps.approve(swap.id, at(2, 0)).unwrap();
        assert!(done.accepted);
        assert_eq!(done.responded_at, Some(at(2, 0)));

        let get = |id| store.get_slot(id).unwrap().unwrap().assigned_member;
        assert_eq!(get(slots[0].id), Some(20));
        assert_eq!(get(slots[1].id), Some(10));
        assert_eq!(get(slots[2].id), Some(30));
        assert_eq!(get(slots[3].id), Some(20));

        let err = swaps.approve(swap.id, at(2, 0)).unwrap_err();
        assert!(matches!(scheduler_err(err), SchedulerError::SwapAlreadyResolved { .. }));
    }

    #[test]
    fn test_approve_blocked_by_unavailability() {
        let (store, slots) = setup();
        let swaps = SwapCoordinator::new(&store);
        let swap = swaps.request(10, slots[0].id, slots[1].id, at(1, 0)).unwrap();
        store
            .set_availability(&Availability {
                user_id: 10,
                date: at(16, 0).date(),
                is_available: false,
            })
            .unwrap();

        let err = swaps.approve(swap.id, at(2, 0)).unwrap_err();
        assert!(matches!(scheduler_err(err), SchedulerError::SwapBlocked { .. }));
        assert_eq!(store.get_slot(slots[0].id).unwrap().unwrap().assigned_member, Some(10));
        assert!(store.get_swap(swap.id).unwrap().unwrap().is_pending());
    }

    #[test]
    fn test_approve_stale_after_unassignment() {
        let (store, slots) = setup();
        let swaps = SwapCoordinator::new(&store);
        let swap = swaps.request(10, slots[0].id, slots[1].id, at(1, 0)).unwrap();
        store.apply_assignments(&[(slots[1].id, None)]).unwrap();

        let err = swaps.approve(swap.id, at(2, 0)).unwrap_err();
        let err = scheduler_err(err);
        assert!(matches!(err, SchedulerError::SwapStale { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_reject_is_terminal() {
        let (store, slots) = setup();
        let swaps = SwapCoordinator::new(&store);
        let swap = swaps.request(10, slots[0].id, slots[1].id, at(1, 0)).unwrap();

        let rejected = swaps.reject(swap.id, at(2, 0)).unwrap();
        assert!(rejected.rejected);
        assert_eq!(store.get_slot(slots[0].id).unwrap().unwrap().assigned_member, Some(10));
        assert!(swaps.approve(swap.id, at(3, 0)).is_err());
        assert!(swaps.reject(swap.id, at(3, 0)).is_err());
    }
}
