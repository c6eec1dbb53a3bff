// Copyright 2025 TAKT OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Minimal structured logging with severity levels
//! OWNERS: @kernel-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests against the host capture sink
//! PUBLIC API: log_* macros, emit(level,target,args); with_captured/clear_captured on host
//! DEPENDS_ON: uart::KernelUart (hardware sink), spin (capture sink)
//! INVARIANTS: Debug/Trace only in debug builds; one line per emission
//! ADR: docs/adr/0001-kernel-core-boundaries.md
//!
//! On hardware every line goes out over the boot UART. Host builds write
//! into a fixed capture buffer instead, so tests can assert on what the
//! kernel would have printed; lines past the buffer's end are dropped.

use core::fmt::{Arguments, Write};

/// Logging severity used by the kernel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Level {
    const fn tag(self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        }
    }

    const fn enabled(self) -> bool {
        match self {
            Level::Debug | Level::Trace => cfg!(debug_assertions),
            _ => true,
        }
    }
}

/// Emits one structured line if the level is enabled for the current build.
pub fn emit(level: Level, target: &'static str, args: Arguments<'_>) {
    if !level.enabled() {
        return;
    }

    #[cfg(all(target_arch = "riscv64", target_os = "none"))]
    {
        let mut uart = crate::uart::KernelUart::lock();
        let _ = writeln!(uart, "[{} {}] {}", level.tag(), target, args);
    }
    #[cfg(not(all(target_arch = "riscv64", target_os = "none")))]
    {
        let mut capture = CAPTURE.lock();
        let _ = writeln!(capture, "[{} {}] {}", level.tag(), target, args);
    }
}

#[cfg(not(all(target_arch = "riscv64", target_os = "none")))]
const CAPTURE_BYTES: usize = 8192;

/// Host stand-in for the UART: a bounded append-only byte buffer.
#[cfg(not(all(target_arch = "riscv64", target_os = "none")))]
struct Capture {
    buf: [u8; CAPTURE_BYTES],
    len: usize,
}

#[cfg(not(all(target_arch = "riscv64", target_os = "none")))]
impl Write for Capture {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        let take = bytes.len().min(CAPTURE_BYTES - self.len);
        self.buf[self.len..self.len + take].copy_from_slice(&bytes[..take]);
        self.len += take;
        Ok(())
    }
}

#[cfg(not(all(target_arch = "riscv64", target_os = "none")))]
static CAPTURE: spin::Mutex<Capture> =
    spin::Mutex::new(Capture { buf: [0; CAPTURE_BYTES], len: 0 });

/// Runs `f` over everything captured since the last [`clear_captured`].
#[cfg(not(all(target_arch = "riscv64", target_os = "none")))]
pub fn with_captured<R>(f: impl FnOnce(&str) -> R) -> R {
    let capture = CAPTURE.lock();
    f(core::str::from_utf8(&capture.buf[..capture.len]).unwrap_or(""))
}

/// Empties the capture buffer.
#[cfg(not(all(target_arch = "riscv64", target_os = "none")))]
pub fn clear_captured() {
    CAPTURE.lock().len = 0;
}

#[doc(hidden)]
#[macro_export]
macro_rules! __log_at {
    ($level:expr, target: $target:expr, $($arg:tt)+) => {{
        $crate::log::emit($level, $target, format_args!($($arg)+));
    }};
    ($level:expr, $($arg:tt)+) => {{
        $crate::log::emit($level, module_path!(), format_args!($($arg)+));
    }};
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)+) => { $crate::__log_at!($crate::log::Level::Error, $($arg)+) };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)+) => { $crate::__log_at!($crate::log::Level::Warn, $($arg)+) };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)+) => { $crate::__log_at!($crate::log::Level::Info, $($arg)+) };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)+) => { $crate::__log_at!($crate::log::Level::Debug, $($arg)+) };
}

#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)+) => { $crate::__log_at!($crate::log::Level::Trace, $($arg)+) };
}
