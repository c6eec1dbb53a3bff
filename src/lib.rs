// Copyright 2025 TAKT OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! TAKT kernel core.
//!
//! The runtime heart of a single-core, single-address-space kernel: a
//! region-based memory manager, interrupt-safe bounded queues, a
//! deadline-sorted timer pool and a multilevel round-robin scheduler,
//! tied together by a periodic hardware tick.
//!
//! Everything here is sized at compile time. There is no heap, no
//! dynamic pool growth and no cross-core state; the only concurrency is
//! the interleaving of interrupt context with exactly one running task,
//! and the only synchronisation primitive is masking interrupts.
//!
//! Boot code (descriptor tables, interrupt controller, tick source) lives
//! outside this crate. The integration points are [`kernel::Kernel::init`]
//! for bring-up and [`kernel::Kernel::on_tick`] for the periodic interrupt.

#![no_std]
#![cfg_attr(not(test), forbid(clippy::unwrap_used))]

#[cfg(test)]
extern crate std;

#[macro_use]
pub mod log;

pub mod arch;
pub mod config;
pub mod kernel;
pub mod mm;
pub mod queue;
pub mod task;
pub mod timer;
pub mod types;
pub mod uart;

#[cfg(feature = "panic_handler")]
mod panic;
