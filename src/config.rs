// Copyright 2025 TAKT OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Compile-time pool sizes and deterministic scheduling knobs
//! OWNERS: @kernel-team
//! PUBLIC API: pool-size constants, default_slice_ticks(), set_default_slice_ticks()
//! DEPENDS_ON: core::sync::atomic
//! INVARIANTS: Pool sizes are final at build time; knob defaults stable across boots
//! ADR: docs/adr/0001-kernel-core-boundaries.md
//!
//! Every table in the kernel core is placed once at bring-up and never
//! resized, so all capacities live here as constants guarded by
//! compile-time assertions. The one runtime knob is the default time
//! slice, kept overridable so tests can shorten schedules.

use core::sync::atomic::{AtomicU64, Ordering};

use static_assertions::const_assert;

/// Rows in the memory manager's free-range table.
pub const MAX_FREE_ROWS: usize = 4096;

/// Countdown slots in the timer pool.
pub const MAX_TIMERS: usize = 500;

/// Task slots in the task pool.
pub const MAX_TASKS: usize = 100;

/// Priority classes; level 0 is scanned first.
pub const MAX_LEVELS: usize = 10;

/// Running tasks one priority class can hold.
pub const LEVEL_CAP: usize = MAX_TASKS / MAX_LEVELS;

/// Queues the arena can register.
pub const MAX_QUEUES: usize = 32;

const_assert!(MAX_TASKS % MAX_LEVELS == 0);
const_assert!(LEVEL_CAP > 0);
const_assert!(MAX_FREE_ROWS > 0);
const_assert!(MAX_TIMERS > 1); // at least the slice timer plus one
const_assert!(MAX_LEVELS <= u8::MAX as usize);

const DEFAULT_SLICE_TICKS: u64 = 2;

static SLICE_TICKS: AtomicU64 = AtomicU64::new(DEFAULT_SLICE_TICKS);

/// Returns the time slice, in ticks, given to tasks that do not choose one.
#[inline]
pub fn default_slice_ticks() -> u64 {
    SLICE_TICKS.load(Ordering::Relaxed)
}

/// Overrides the default time slice.
///
/// Primarily for tests that want short, fully observable schedules while
/// keeping runs reproducible. A zero slice is clamped to one tick.
#[inline]
pub fn set_default_slice_ticks(value: u64) {
    SLICE_TICKS.store(value.max(1), Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test mutates the shared knob so parallel test threads never
    // observe each other's overrides.
    #[test]
    fn slice_override_and_clamp() {
        set_default_slice_ticks(7);
        assert_eq!(default_slice_ticks(), 7);
        set_default_slice_ticks(0);
        assert_eq!(default_slice_ticks(), 1);
        set_default_slice_ticks(DEFAULT_SLICE_TICKS);
    }
}
