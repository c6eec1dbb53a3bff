// Copyright 2025 TAKT OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Architecture seam between portable kernel logic and the machine
//! OWNERS: @kernel-arch-team
//! PUBLIC API: interrupt_free, Context, switch, wait_for_interrupt
//! DEPENDS_ON: arch::riscv backend
//! INVARIANTS: Portable code never touches CSRs or asm directly; host builds get stubs
//! ADR: docs/adr/0001-kernel-core-boundaries.md

pub mod riscv;

/// Saved execution state of a task that is not on the processor.
///
/// Switches happen at kernel call boundaries only (the tick entry or an
/// explicit sleep), so the record carries the callee-saved set plus return
/// address and stack pointer; the interrupted task's caller-saved registers
/// are preserved on its kernel stack by the trap prologue that invoked us.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Context {
    /// Return address; for a task that has never run, its entry point.
    pub ra: usize,
    /// Stack pointer.
    pub sp: usize,
    /// Callee-saved registers `s0`..`s11`.
    pub s: [usize; 12],
}

impl Context {
    /// An all-zero record, the state of an unallocated task slot.
    pub const fn zeroed() -> Self {
        Self { ra: 0, sp: 0, s: [0; 12] }
    }

    /// Seeds a first-run frame: control transfers to `entry` on a fresh
    /// stack the first time the record is loaded.
    pub const fn first_run(entry: usize, stack_top: usize) -> Self {
        Self { ra: entry, sp: stack_top, s: [0; 12] }
    }
}

/// Runs `f` with hardware interrupts masked, restoring the previous state.
///
/// This is the kernel's sole synchronisation discipline: any state mutated
/// from both interrupt and task context is touched only inside one of these
/// sections. Nesting is fine; the outermost section restores the mask.
#[inline]
pub fn interrupt_free<R>(f: impl FnOnce() -> R) -> R {
    #[cfg(all(target_arch = "riscv64", target_os = "none"))]
    {
        let was_enabled = ::riscv::register::sstatus::read().sie();
        unsafe {
            ::riscv::register::sstatus::clear_sie();
        }
        let result = f();
        if was_enabled {
            unsafe {
                ::riscv::register::sstatus::set_sie();
            }
        }
        result
    }
    #[cfg(not(all(target_arch = "riscv64", target_os = "none")))]
    {
        f()
    }
}

/// Swaps execution from the context in `save` to the context in `load`.
///
/// # Safety
///
/// Both pointers must reference distinct, valid `Context` records; `load`
/// must hold either a state previously written by this function or a
/// [`Context::first_run`] frame with a live stack. On host builds this is
/// a bookkeeping no-op so scheduler logic can run under `cargo test`.
#[inline]
pub unsafe fn switch(save: *mut Context, load: *const Context) {
    #[cfg(all(target_arch = "riscv64", target_os = "none"))]
    unsafe {
        riscv::context_switch(save, load)
    }
    #[cfg(not(all(target_arch = "riscv64", target_os = "none")))]
    {
        let _ = (save, load);
    }
}

/// Issues a WFI instruction or yields on the host.
#[inline]
pub fn wait_for_interrupt() {
    #[cfg(all(target_arch = "riscv64", target_os = "none"))]
    unsafe {
        core::arch::asm!("wfi", options(nomem, nostack, preserves_flags));
    }
    #[cfg(not(all(target_arch = "riscv64", target_os = "none")))]
    {
        core::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_free_passes_through() {
        let value = interrupt_free(|| 42);
        assert_eq!(value, 42);
    }

    #[test]
    fn first_run_frame_targets_entry() {
        let ctx = Context::first_run(0x8020_0000, 0x8030_0000);
        assert_eq!(ctx.ra, 0x8020_0000);
        assert_eq!(ctx.sp, 0x8030_0000);
        assert_eq!(ctx.s, [0; 12]);
    }
}
