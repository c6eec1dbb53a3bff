// Copyright 2025 TAKT OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Minimal newtypes for handle-addressed kernel pools
//! OWNERS: @kernel-team
//! PUBLIC API: Tick, TaskId, TimerId, QueueId, LevelId
//! DEPENDS_ON: config::MAX_LEVELS
//! INVARIANTS: Handles are pool indices, never pointers; LevelId is validated
//! ADR: docs/adr/0001-kernel-core-boundaries.md
//!
//! Every cross-component reference in the kernel core is an index into a
//! fixed pool. Newtypes keep a timer index from being confused with a task
//! index at compile time, at zero runtime cost.

use core::fmt;

use crate::config::MAX_LEVELS;

/// One firing of the periodic hardware time source.
///
/// Absolute, monotonic, and only ever advanced by the timer pool.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
#[repr(transparent)]
pub struct Tick(u64);

impl Tick {
    /// Time zero, the instant the kernel core is initialised.
    pub const ZERO: Self = Self(0);

    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    /// The following tick.
    #[inline]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// The tick `timeout` firings from now.
    #[inline]
    pub const fn after(self, timeout: u64) -> Self {
        Self(self.0.saturating_add(timeout))
    }
}

impl From<u64> for Tick {
    #[inline]
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<Tick> for u64 {
    #[inline]
    fn from(tick: Tick) -> Self {
        tick.0
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a task slot in the fixed task pool.
///
/// **Ownership**: only the task pool creates these; holders may store and
/// compare them but never fabricate one.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TaskId(u16);

impl TaskId {
    #[inline]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_raw(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn as_index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a countdown slot in the fixed timer pool.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TimerId(u16);

impl TimerId {
    #[inline]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_raw(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn as_index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a registered queue in the queue arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct QueueId(u16);

impl QueueId {
    #[inline]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_raw(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn as_index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Priority class of a running task. Level 0 is the highest priority.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct LevelId(u8);

impl LevelId {
    /// Highest-priority class; the scheduler scans downward from here.
    pub const HIGHEST: Self = Self(0);

    /// Lowest-priority class, home of the idle task.
    pub const LOWEST: Self = Self((MAX_LEVELS - 1) as u8);

    /// Validating constructor; rejects classes beyond the configured range.
    #[inline]
    pub const fn new(raw: u8) -> Option<Self> {
        if (raw as usize) < MAX_LEVELS {
            Some(Self(raw))
        } else {
            None
        }
    }

    #[inline]
    pub const fn as_raw(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn as_index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for LevelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_arithmetic() {
        let t = Tick::ZERO;
        assert_eq!(t.next(), Tick::from_raw(1));
        assert_eq!(t.after(10), Tick::from_raw(10));
        assert!(Tick::from_raw(5) < Tick::from_raw(6));
    }

    #[test]
    fn level_bounds() {
        assert_eq!(LevelId::new(0), Some(LevelId::HIGHEST));
        assert_eq!(LevelId::new(MAX_LEVELS as u8), None);
        assert_eq!(LevelId::LOWEST.as_index(), MAX_LEVELS - 1);
    }
}
