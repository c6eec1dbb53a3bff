// Copyright 2025 TAKT OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Opt-in panic handler for kernel images without their own.

use core::fmt::Write;
use core::panic::PanicInfo;

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    // The raw writer bypasses the UART mutex, which may be held by the
    // panicking flow.
    let mut uart = crate::uart::raw_writer();
    let _ = writeln!(uart, "panic: {}", info);
    loop {
        crate::arch::wait_for_interrupt();
    }
}
