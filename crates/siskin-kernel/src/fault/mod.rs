// SPDX-License-Identifier: GPL-3.0-or-later

//! Fatal faults and the halting error routine.
//!
//! A fatal fault stops the machine until the user acknowledges it with
//! the Enter+Escape chord. The global interrupt flag is captured on
//! entry and restored on exit, so execution can technically continue -
//! in practice the caller follows up by aborting its operation, which
//! turns the faulted call into a no-op.
//!
//! Allocation failure is deliberately not here: it is a quiet
//! null-return the caller decides about.

#[cfg(test)]
mod fault_test;

use core::fmt;

use siskin_hal::{Buttons, Platform};

/// The ways the kernel can be caught out.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Fault {
    /// A heap access outside its map or use window.
    Boundary,
    /// free/realloc/memcpy of a chunk the calling process does not own.
    Ownership,
    /// A stack checksum that no longer matches at context restore.
    StackIntegrity,
    /// Boot-time configuration does not match the linked image.
    Config,
}

impl Fault {
    /// The message shown on the display.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Boundary => "Address out of bounds",
            Self::Ownership => "Foreign memory chunk",
            Self::StackIntegrity => "Stack inconsistency",
            Self::Config => "Heap start init incorrect",
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Halt with `message` until the user acknowledges.
///
/// Captures the global interrupt flag, disables interrupts, shows the
/// message, waits for the Enter+Escape chord to be pressed and
/// released again, then restores the captured flag.
pub fn error<P: Platform>(p: &mut P, message: &str) {
    let enabled = p.interrupts_enabled();
    p.set_interrupts_enabled(false);

    log::error!("fatal: {message}");
    p.display_clear();
    p.display_line1(message);

    while p.input() != Buttons::CHORD {}
    p.wait_for_no_input();

    p.set_interrupts_enabled(enabled);
}

/// Halt for a classified fault.
pub fn fatal<P: Platform>(p: &mut P, fault: Fault) {
    error(p, fault.message());
}
