// SPDX-License-Identifier: GPL-3.0-or-later

//! Nested critical sections.
//!
//! A critical section masks only the scheduler's timer-compare
//! interrupt; every other interrupt stays serviceable. Sections nest:
//! the timer interrupt is re-enabled only when the outermost section is
//! left. Up to 255 levels of nesting are supported.
//!
//! The global interrupt-enable flag is never unconditionally set or
//! cleared here. Both operations capture it, work with interrupts
//! disabled, and restore the captured value on the way out - so a
//! caller that runs with interrupts off stays that way, and a nested
//! section inside a driver byte-transfer behaves.

#[cfg(test)]
mod critical_test;

use crate::platform::IrqControl;

/// Enter a critical section: mask the scheduler interrupt and bump the
/// nesting depth.
pub fn enter<I: IrqControl + ?Sized>(irq: &mut I) {
    let enabled = irq.interrupts_enabled();
    irq.set_interrupts_enabled(false);
    irq.set_critical_depth(irq.critical_depth().wrapping_add(1));
    irq.set_scheduler_interrupt_enabled(false);
    irq.set_interrupts_enabled(enabled);
}

/// Leave a critical section: drop the nesting depth and unmask the
/// scheduler interrupt once the outermost section is gone.
///
/// Leaving more often than entering is a kernel bug; the depth is
/// decremented saturating so a miscount cannot unmask the scheduler
/// while a section is still logically open.
pub fn leave<I: IrqControl + ?Sized>(irq: &mut I) {
    let enabled = irq.interrupts_enabled();
    irq.set_interrupts_enabled(false);
    let depth = irq.critical_depth().saturating_sub(1);
    irq.set_critical_depth(depth);
    if depth == 0 {
        irq.set_scheduler_interrupt_enabled(true);
    }
    irq.set_interrupts_enabled(enabled);
}
