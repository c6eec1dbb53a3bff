// Copyright 2025 TAKT OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! RISC-V backend for the architecture seam.
//!
//! Holds the context-switch primitive. The save/restore layout must match
//! [`crate::arch::Context`] field for field: `ra` at offset 0, `sp` at 8,
//! then `s0`..`s11`.

#[cfg(all(target_arch = "riscv64", target_os = "none"))]
core::arch::global_asm!(
    r#"
    .section .text
    .global __takt_context_switch
    .align 2
__takt_context_switch:
    sd ra, 0(a0)
    sd sp, 8(a0)
    sd s0, 16(a0)
    sd s1, 24(a0)
    sd s2, 32(a0)
    sd s3, 40(a0)
    sd s4, 48(a0)
    sd s5, 56(a0)
    sd s6, 64(a0)
    sd s7, 72(a0)
    sd s8, 80(a0)
    sd s9, 88(a0)
    sd s10, 96(a0)
    sd s11, 104(a0)

    ld ra, 0(a1)
    ld sp, 8(a1)
    ld s0, 16(a1)
    ld s1, 24(a1)
    ld s2, 32(a1)
    ld s3, 40(a1)
    ld s4, 48(a1)
    ld s5, 56(a1)
    ld s6, 64(a1)
    ld s7, 72(a1)
    ld s8, 80(a1)
    ld s9, 88(a1)
    ld s10, 96(a1)
    ld s11, 104(a1)
    ret
"#
);

#[cfg(all(target_arch = "riscv64", target_os = "none"))]
extern "C" {
    fn __takt_context_switch(save: *mut super::Context, load: *const super::Context);
}

/// Transfers control to the context in `load`, saving the caller in `save`.
///
/// # Safety
///
/// See [`crate::arch::switch`]; this is its target-side body.
#[cfg(all(target_arch = "riscv64", target_os = "none"))]
#[inline]
pub unsafe fn context_switch(save: *mut super::Context, load: *const super::Context) {
    unsafe { __takt_context_switch(save, load) }
}
