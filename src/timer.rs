// Copyright 2025 TAKT OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Fixed pool of countdown slots driven by the periodic hardware tick
//! OWNERS: @kernel-time-team
//! PUBLIC API: TimerSet (alloc/free/bind/bind_preempt/arm/cancel/advance/pop_due), FireAction, Firing
//! DEPENDS_ON: arch::interrupt_free, types::{Tick, TimerId, QueueId}
//! INVARIANTS: Active slots form a singly linked list sorted ascending by deadline;
//!             the cached next-wake tick always equals the head deadline
//! ADR: docs/adr/0001-kernel-core-boundaries.md
//!
//! Expiry work per tick is bounded by the number of slots expiring on that
//! tick, never by the pool size: the sorted list lets the tick handler stop
//! at the first pending deadline, and the cached head deadline makes the
//! idle case a single compare. Equal deadlines fire in arming order.

use crate::arch;
use crate::config::MAX_TIMERS;
use crate::types::{QueueId, Tick, TimerId};

/// Error returned by timer-pool operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    /// Every slot in the pool is taken.
    PoolExhausted,
    /// The operation needs an allocated slot but the handle names an unused one.
    NotAllocated,
    /// The slot has no delivery binding yet, so arming it would fire into nothing.
    NotBound,
    /// The slot is still pending; cancel it (or let it fire) first.
    StillActive,
}

/// What a slot does when its deadline passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireAction {
    /// Deliver `payload` into the queue named by `queue`.
    Deliver { queue: QueueId, payload: u32 },
    /// Re-enter the scheduler to rotate the running task. Exactly one slot,
    /// owned by the kernel aggregate, carries this action.
    Preempt,
}

/// One expired slot, handed to the tick handler for dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Firing {
    pub timer: TimerId,
    pub action: FireAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Unused,
    Inactive,
    Active,
}

#[derive(Clone, Copy)]
struct TimerSlot {
    state: SlotState,
    deadline: Tick,
    action: Option<FireAction>,
    next: Option<TimerId>,
}

impl TimerSlot {
    const UNUSED: Self =
        Self { state: SlotState::Unused, deadline: Tick::ZERO, action: None, next: None };
}

/// The timer pool plus the current tick count.
pub struct TimerSet {
    now: Tick,
    next_wake: Option<Tick>,
    head: Option<TimerId>,
    slots: [TimerSlot; MAX_TIMERS],
}

impl TimerSet {
    /// Creates a pool with every slot unused, at tick zero.
    pub const fn new() -> Self {
        Self { now: Tick::ZERO, next_wake: None, head: None, slots: [TimerSlot::UNUSED; MAX_TIMERS] }
    }

    /// Current tick count.
    pub fn now(&self) -> Tick {
        self.now
    }

    /// The head deadline, `None` while no slot is active.
    pub fn next_wake(&self) -> Option<Tick> {
        self.next_wake
    }

    /// Claims an unused slot. Pool exhaustion is the caller's sizing bug and
    /// is reported, never retried.
    #[must_use = "pool exhaustion must be handled"]
    pub fn alloc(&mut self) -> Result<TimerId, TimerError> {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.state == SlotState::Unused {
                *slot = TimerSlot { state: SlotState::Inactive, ..TimerSlot::UNUSED };
                return Ok(TimerId::from_raw(index as u16));
            }
        }
        Err(TimerError::PoolExhausted)
    }

    /// Returns a slot to the pool. Pending slots are refused; cancel first.
    pub fn free(&mut self, id: TimerId) -> Result<(), TimerError> {
        let slot = self.slot_mut(id)?;
        if slot.state == SlotState::Active {
            return Err(TimerError::StillActive);
        }
        *slot = TimerSlot::UNUSED;
        Ok(())
    }

    /// Binds the delivery target and payload; does not arm.
    pub fn bind(&mut self, id: TimerId, queue: QueueId, payload: u32) -> Result<(), TimerError> {
        self.bind_action(id, FireAction::Deliver { queue, payload })
    }

    /// Marks `id` as the privileged slot whose expiry re-enters the scheduler.
    pub fn bind_preempt(&mut self, id: TimerId) -> Result<(), TimerError> {
        self.bind_action(id, FireAction::Preempt)
    }

    fn bind_action(&mut self, id: TimerId, action: FireAction) -> Result<(), TimerError> {
        let slot = self.slot_mut(id)?;
        match slot.state {
            SlotState::Unused => Err(TimerError::NotAllocated),
            SlotState::Active => Err(TimerError::StillActive),
            SlotState::Inactive => {
                slot.action = Some(action);
                Ok(())
            }
        }
    }

    /// Arms `id` to fire `timeout` ticks from now; zero fires on the very
    /// next tick. An already pending slot is re-armed at the new deadline.
    pub fn arm(&mut self, id: TimerId, timeout: u64) -> Result<(), TimerError> {
        arch::interrupt_free(|| {
            let idx = self.index_of(id)?;
            match self.slots[idx].state {
                SlotState::Unused => return Err(TimerError::NotAllocated),
                SlotState::Active => self.unlink(id),
                SlotState::Inactive => {}
            }
            if self.slots[idx].action.is_none() {
                return Err(TimerError::NotBound);
            }

            let deadline = self.now.after(timeout);
            // Walk past every slot due no later than us so equal deadlines
            // keep their arming order.
            let mut prev: Option<TimerId> = None;
            let mut cursor = self.head;
            while let Some(current) = cursor {
                let ci = current.as_index();
                if self.slots[ci].deadline > deadline {
                    break;
                }
                prev = Some(current);
                cursor = self.slots[ci].next;
            }

            self.slots[idx].deadline = deadline;
            self.slots[idx].next = cursor;
            self.slots[idx].state = SlotState::Active;
            match prev {
                None => {
                    self.head = Some(id);
                    self.next_wake = Some(deadline);
                }
                Some(p) => self.slots[p.as_index()].next = Some(id),
            }
            Ok(())
        })
    }

    /// Unlinks a pending slot back to the inactive state. Harmless on a slot
    /// that already fired.
    pub fn cancel(&mut self, id: TimerId) -> Result<(), TimerError> {
        arch::interrupt_free(|| {
            let idx = self.index_of(id)?;
            match self.slots[idx].state {
                SlotState::Unused => Err(TimerError::NotAllocated),
                SlotState::Inactive => Ok(()),
                SlotState::Active => {
                    self.unlink(id);
                    self.slots[idx].state = SlotState::Inactive;
                    Ok(())
                }
            }
        })
    }

    /// Advances the tick count by one. Invoked once per hardware tick,
    /// before the expiry drain.
    pub fn advance(&mut self) {
        self.now = self.now.next();
    }

    /// Pops the expired head, if any.
    ///
    /// The tick handler drains this in a loop; the loop runs once per slot
    /// expiring on this tick and the no-work case is one compare against
    /// the cached head deadline.
    pub fn pop_due(&mut self) -> Option<Firing> {
        arch::interrupt_free(|| {
            match self.next_wake {
                Some(wake) if wake <= self.now => {}
                _ => return None,
            }
            let head = self.head?;
            let idx = head.as_index();
            self.head = self.slots[idx].next;
            self.slots[idx].next = None;
            self.slots[idx].state = SlotState::Inactive;
            self.next_wake = self.head.map(|h| self.slots[h.as_index()].deadline);
            let action = self.slots[idx].action?;
            Some(Firing { timer: head, action })
        })
    }

    fn index_of(&self, id: TimerId) -> Result<usize, TimerError> {
        let idx = id.as_index();
        if idx < MAX_TIMERS {
            Ok(idx)
        } else {
            Err(TimerError::NotAllocated)
        }
    }

    fn slot_mut(&mut self, id: TimerId) -> Result<&mut TimerSlot, TimerError> {
        let idx = self.index_of(id)?;
        Ok(&mut self.slots[idx])
    }

    fn unlink(&mut self, id: TimerId) {
        let idx = id.as_index();
        if self.head == Some(id) {
            self.head = self.slots[idx].next;
        } else {
            let mut cursor = self.head;
            while let Some(current) = cursor {
                let ci = current.as_index();
                if self.slots[ci].next == Some(id) {
                    self.slots[ci].next = self.slots[idx].next;
                    break;
                }
                cursor = self.slots[ci].next;
            }
        }
        self.slots[idx].next = None;
        self.next_wake = self.head.map(|h| self.slots[h.as_index()].deadline);
    }
}

impl Default for TimerSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_TIMERS;

    fn queue(raw: u16) -> QueueId {
        QueueId::from_raw(raw)
    }

    fn armed(set: &mut TimerSet, payload: u32, timeout: u64) -> TimerId {
        let id = set.alloc().unwrap();
        set.bind(id, queue(0), payload).unwrap();
        set.arm(id, timeout).unwrap();
        id
    }

    fn drain(set: &mut TimerSet) -> std::vec::Vec<u32> {
        let mut fired = std::vec::Vec::new();
        while let Some(firing) = set.pop_due() {
            match firing.action {
                FireAction::Deliver { payload, .. } => fired.push(payload),
                FireAction::Preempt => fired.push(u32::MAX),
            }
        }
        fired
    }

    #[test]
    fn equal_deadlines_fire_in_arming_order() {
        let mut set = TimerSet::new();
        armed(&mut set, 1, 5);
        armed(&mut set, 2, 5);
        armed(&mut set, 3, 10);

        let mut fired = std::vec::Vec::new();
        for _ in 0..10 {
            set.advance();
            fired.extend(drain(&mut set));
        }
        assert_eq!(fired, [1, 2, 3]);
    }

    #[test]
    fn zero_timeout_fires_on_next_tick() {
        let mut set = TimerSet::new();
        armed(&mut set, 7, 0);
        assert!(set.pop_due().is_none()); // not before the tick arrives
        set.advance();
        assert_eq!(drain(&mut set), [7]);
    }

    #[test]
    fn next_wake_tracks_the_head() {
        let mut set = TimerSet::new();
        assert_eq!(set.next_wake(), None);
        let late = armed(&mut set, 1, 30);
        assert_eq!(set.next_wake(), Some(Tick::from_raw(30)));
        let early = armed(&mut set, 2, 10);
        assert_eq!(set.next_wake(), Some(Tick::from_raw(10)));

        set.cancel(early).unwrap();
        assert_eq!(set.next_wake(), Some(Tick::from_raw(30)));
        set.cancel(late).unwrap();
        assert_eq!(set.next_wake(), None);
    }

    #[test]
    fn drain_is_bounded_by_due_slots() {
        let mut set = TimerSet::new();
        armed(&mut set, 1, 1);
        armed(&mut set, 2, 50);
        set.advance();
        assert_eq!(drain(&mut set), [1]);
        // The pending slot stays linked and keeps the cache.
        assert_eq!(set.next_wake(), Some(Tick::from_raw(50)));
    }

    #[test]
    fn rearm_moves_a_pending_slot() {
        let mut set = TimerSet::new();
        let id = armed(&mut set, 9, 100);
        set.arm(id, 2).unwrap();
        assert_eq!(set.next_wake(), Some(Tick::from_raw(2)));
        set.advance();
        set.advance();
        assert_eq!(drain(&mut set), [9]);
        // Fired once; the old deadline is gone.
        for _ in 0..120 {
            set.advance();
        }
        assert_eq!(drain(&mut set), []);
    }

    #[test]
    fn free_refuses_pending_slots() {
        let mut set = TimerSet::new();
        let id = armed(&mut set, 1, 5);
        assert_eq!(set.free(id), Err(TimerError::StillActive));
        set.cancel(id).unwrap();
        assert_eq!(set.free(id), Ok(()));
    }

    #[test]
    fn arm_requires_a_binding() {
        let mut set = TimerSet::new();
        let id = set.alloc().unwrap();
        assert_eq!(set.arm(id, 5), Err(TimerError::NotBound));
        set.bind_preempt(id).unwrap();
        assert_eq!(set.arm(id, 5), Ok(()));
    }

    #[test]
    fn pool_exhaustion_is_reported() {
        let mut set = TimerSet::new();
        for _ in 0..MAX_TIMERS {
            assert!(set.alloc().is_ok());
        }
        assert_eq!(set.alloc(), Err(TimerError::PoolExhausted));
    }

    #[test]
    fn unused_handles_are_rejected() {
        let mut set = TimerSet::new();
        let id = TimerId::from_raw(3);
        assert_eq!(set.bind(id, queue(0), 0), Err(TimerError::NotAllocated));
        assert_eq!(set.arm(id, 1), Err(TimerError::NotAllocated));
        assert_eq!(set.cancel(id), Err(TimerError::NotAllocated));
    }
}
