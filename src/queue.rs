// Copyright 2025 TAKT OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Interrupt-safe bounded queues, the only interrupt→task data path
//! OWNERS: @kernel-team
//! PUBLIC API: EventQueue (put/get/status), QueueTable (create + handle access), QueueFlags
//! DEPENDS_ON: arch::interrupt_free, types::{TaskId, QueueId}
//! INVARIANTS: free + queued == capacity; cursors wrap modulo capacity; put never blocks
//! ADR: docs/adr/0001-kernel-core-boundaries.md
//!
//! A producer in interrupt context must never wait, so a full queue drops
//! the value, raises the overrun flag and reports the overflow to whoever
//! can still look at a return value. The optional wake target is a task
//! handle, not a pointer; the kernel aggregate turns it into an actual
//! wake-up so the queue itself stays free of scheduler state.

use bitflags::bitflags;

use crate::arch;
use crate::config::MAX_QUEUES;
use crate::types::{QueueId, TaskId};

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    /// Sticky status bits of a queue.
    pub struct QueueFlags: u32 {
        /// At least one value was dropped because the queue was full.
        const OVERRUN = 1 << 0;
    }
}

/// Error returned by queue operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// The queue was full; the value was dropped and the overrun flag set.
    Overflow,
    /// The arena has no slot left for another queue.
    TableFull,
    /// The handle does not name a registered queue.
    NoSuchQueue,
}

/// Fixed-capacity ring of `u32` events.
///
/// The backing storage belongs to the creator and is lent to the queue for
/// the rest of the boot; capacity is `buf.len()` and never changes.
pub struct EventQueue {
    buf: &'static mut [u32],
    put_at: usize,
    get_at: usize,
    free: usize,
    flags: QueueFlags,
    wake: Option<TaskId>,
}

impl EventQueue {
    /// Wraps `buf` as an empty queue, optionally waking `wake` on enqueue.
    pub fn new(buf: &'static mut [u32], wake: Option<TaskId>) -> Self {
        let free = buf.len();
        Self { buf, put_at: 0, get_at: 0, free, flags: QueueFlags::empty(), wake }
    }

    /// Appends `value`.
    ///
    /// On success returns the bound wake target, if any, for the caller to
    /// transition out of its sleep. A full queue drops the value, raises
    /// [`QueueFlags::OVERRUN`] and reports [`QueueError::Overflow`];
    /// producers in interrupt context cannot block and do not retry.
    #[must_use = "overflow and the wake target must be handled"]
    pub fn put(&mut self, value: u32) -> Result<Option<TaskId>, QueueError> {
        arch::interrupt_free(|| {
            if self.free == 0 {
                self.flags |= QueueFlags::OVERRUN;
                return Err(QueueError::Overflow);
            }
            let capacity = self.buf.len();
            self.buf[self.put_at] = value;
            self.put_at = (self.put_at + 1) % capacity;
            self.free -= 1;
            Ok(self.wake)
        })
    }

    /// Removes and returns the oldest value; `None` means empty, a normal
    /// condition rather than a fault.
    pub fn get(&mut self) -> Option<u32> {
        arch::interrupt_free(|| {
            let capacity = self.buf.len();
            if self.free == capacity {
                return None;
            }
            let value = self.buf[self.get_at];
            self.get_at = (self.get_at + 1) % capacity;
            self.free += 1;
            Some(value)
        })
    }

    /// Number of queued values.
    pub fn status(&self) -> usize {
        self.buf.len() - self.free
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Whether an overflow has happened since the flag was last cleared.
    pub fn overflowed(&self) -> bool {
        self.flags.contains(QueueFlags::OVERRUN)
    }

    pub fn clear_overflow(&mut self) {
        self.flags.remove(QueueFlags::OVERRUN);
    }

    /// The task woken by successful enqueues, if one is bound.
    pub fn wake_target(&self) -> Option<TaskId> {
        self.wake
    }
}

/// Arena of registered queues, addressed by [`QueueId`].
///
/// Interrupt producers and the timer pool hold queue handles, never queue
/// references, so every delivery funnels through this table.
pub struct QueueTable {
    slots: [Option<EventQueue>; MAX_QUEUES],
}

impl QueueTable {
    /// Creates an arena with every slot unregistered.
    pub const fn new() -> Self {
        const EMPTY: Option<EventQueue> = None;
        Self { slots: [EMPTY; MAX_QUEUES] }
    }

    /// Registers a queue over `buf` and returns its handle.
    #[must_use = "arena exhaustion must be handled"]
    pub fn create(
        &mut self,
        buf: &'static mut [u32],
        wake: Option<TaskId>,
    ) -> Result<QueueId, QueueError> {
        let Some(index) = self.slots.iter().position(Option::is_none) else {
            return Err(QueueError::TableFull);
        };
        self.slots[index] = Some(EventQueue::new(buf, wake));
        Ok(QueueId::from_raw(index as u16))
    }

    /// Appends `value` to the queue named by `id`; see [`EventQueue::put`].
    #[must_use = "overflow and the wake target must be handled"]
    pub fn put(&mut self, id: QueueId, value: u32) -> Result<Option<TaskId>, QueueError> {
        self.queue_mut(id).ok_or(QueueError::NoSuchQueue)?.put(value)
    }

    /// Removes the oldest value from the queue named by `id`.
    pub fn get(&mut self, id: QueueId) -> Result<Option<u32>, QueueError> {
        Ok(self.queue_mut(id).ok_or(QueueError::NoSuchQueue)?.get())
    }

    /// Queued count of `id`; unregistered handles read as empty.
    pub fn status(&self, id: QueueId) -> usize {
        self.slots
            .get(id.as_index())
            .and_then(|slot| slot.as_ref())
            .map(EventQueue::status)
            .unwrap_or(0)
    }

    /// Direct access for the queue's owner.
    pub fn queue_mut(&mut self, id: QueueId) -> Option<&mut EventQueue> {
        self.slots.get_mut(id.as_index()).and_then(|slot| slot.as_mut())
    }
}

impl Default for QueueTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leak_buf(capacity: usize) -> &'static mut [u32] {
        std::boxed::Box::leak(std::vec![0u32; capacity].into_boxed_slice())
    }

    #[test]
    fn fifo_order_and_overflow() {
        let mut q = EventQueue::new(leak_buf(4), None);
        for value in 1..=4 {
            assert_eq!(q.put(value), Ok(None));
        }
        assert_eq!(q.put(5), Err(QueueError::Overflow));
        assert_eq!(q.status(), 4);
        assert!(q.overflowed());

        for expected in 1..=4 {
            assert_eq!(q.get(), Some(expected));
        }
        assert_eq!(q.get(), None);
        assert_eq!(q.status(), 0);
        // The overrun flag is sticky until cleared.
        assert!(q.overflowed());
        q.clear_overflow();
        assert!(!q.overflowed());
    }

    #[test]
    fn cursors_wrap() {
        let mut q = EventQueue::new(leak_buf(3), None);
        assert_eq!(q.put(1), Ok(None));
        assert_eq!(q.put(2), Ok(None));
        assert_eq!(q.get(), Some(1));
        assert_eq!(q.put(3), Ok(None));
        assert_eq!(q.put(4), Ok(None)); // write cursor has wrapped
        assert_eq!(q.status(), 3);
        assert_eq!(q.get(), Some(2));
        assert_eq!(q.get(), Some(3));
        assert_eq!(q.get(), Some(4));
        assert_eq!(q.get(), None);
    }

    #[test]
    fn free_plus_queued_is_capacity() {
        let mut q = EventQueue::new(leak_buf(5), None);
        assert_eq!(q.capacity(), 5);
        for step in 0..4 {
            assert_eq!(q.put(step), Ok(None));
            assert_eq!(q.status(), step as usize + 1);
        }
        let _ = q.get();
        assert_eq!(q.status(), 3);
    }

    #[test]
    fn put_reports_wake_target() {
        let waker = crate::types::TaskId::from_raw(7);
        let mut q = EventQueue::new(leak_buf(2), Some(waker));
        assert_eq!(q.put(9), Ok(Some(waker)));
        assert_eq!(q.wake_target(), Some(waker));
    }

    #[test]
    fn arena_routes_by_handle() {
        let mut table = QueueTable::new();
        let a = table.create(leak_buf(2), None).unwrap();
        let b = table.create(leak_buf(2), None).unwrap();
        assert_ne!(a, b);

        assert_eq!(table.put(a, 10), Ok(None));
        assert_eq!(table.put(b, 20), Ok(None));
        assert_eq!(table.status(a), 1);
        assert_eq!(table.get(b), Ok(Some(20)));
        assert_eq!(table.get(b), Ok(None));
        assert_eq!(table.get(a), Ok(Some(10)));

        let bogus = QueueId::from_raw(99);
        assert_eq!(table.put(bogus, 1), Err(QueueError::NoSuchQueue));
        assert_eq!(table.status(bogus), 0);
    }

    #[test]
    fn arena_exhaustion_is_reported() {
        let mut table = QueueTable::new();
        for _ in 0..crate::config::MAX_QUEUES {
            assert!(table.create(leak_buf(1), None).is_ok());
        }
        assert_eq!(table.create(leak_buf(1), None), Err(QueueError::TableFull));
    }
}
