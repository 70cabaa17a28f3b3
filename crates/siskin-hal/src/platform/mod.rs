// SPDX-License-Identifier: GPL-3.0-or-later

//! Platform abstraction traits.
//!
//! [`IrqControl`] is the small, object-safe surface the critical-section
//! controller and the memory drivers need: the global interrupt-enable
//! flag, the scheduler-timer interrupt mask and the nesting depth that
//! gates it. [`Platform`] extends it with everything else the kernel
//! asks of the board: the hardware stack pointer, button input, the
//! two-line display, the coarse clock and a couple of hooks.
//!
//! Real boards implement these over their registers; host tests use
//! [`crate::mock::MockPlatform`].


use crate::addr::MemAddr;

use bitflags::bitflags;

/// Coarse system time in timer ticks.
pub type Time = u32;

bitflags! {
    /// State of the four board buttons, bit `i` set iff button `i` is
    /// pressed.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct Buttons: u8 {
        /// Button 1 (Enter).
        const ENTER = 1 << 0;
        /// Button 2 (Down).
        const DOWN = 1 << 1;
        /// Button 3 (Up).
        const UP = 1 << 2;
        /// Button 4 (Escape).
        const ESC = 1 << 3;
    }
}

impl Buttons {
    /// The Enter+Escape chord: acknowledges fatal errors and opens the
    /// task manager at a scheduler tick.
    pub const CHORD: Self = Self::ENTER.union(Self::ESC);
}

/// Interrupt plumbing of the target CPU.
///
/// The global interrupt-enable flag is the machine's status-register
/// bit; the scheduler interrupt is the timer-compare interrupt that
/// drives preemption. The critical-section nesting depth lives here
/// too because enter/leave are pure interrupt plumbing; see
/// [`crate::critical`] for the only code that should touch it.
pub trait IrqControl {
    /// Whether the global interrupt-enable flag is set.
    fn interrupts_enabled(&self) -> bool;

    /// Set or clear the global interrupt-enable flag.
    fn set_interrupts_enabled(&mut self, enabled: bool);

    /// Whether the scheduler timer-compare interrupt is unmasked.
    fn scheduler_interrupt_enabled(&self) -> bool;

    /// Mask or unmask the scheduler timer-compare interrupt.
    fn set_scheduler_interrupt_enabled(&mut self, enabled: bool);

    /// Current critical-section nesting depth.
    fn critical_depth(&self) -> u8;

    /// Overwrite the critical-section nesting depth.
    fn set_critical_depth(&mut self, depth: u8);
}

/// Everything the kernel asks of the board beyond interrupt plumbing.
pub trait Platform: IrqControl {
    /// One-time hardware bring-up: scheduler timer (compare value
    /// `tick_period`), the free-running coarse clock, button inputs
    /// and the display.
    fn init(&mut self, tick_period: u8);

    /// The hardware stack pointer.
    fn stack_pointer(&self) -> MemAddr;

    /// Retarget the hardware stack pointer.
    fn set_stack_pointer(&mut self, sp: MemAddr);

    /// Sample the button state.
    fn input(&mut self) -> Buttons;

    /// Clear the display.
    fn display_clear(&mut self);

    /// Write the first display line.
    fn display_line1(&mut self, text: &str);

    /// Write the second display line.
    fn display_line2(&mut self, text: &str);

    /// Coarse system time, monotonically increasing in timer ticks
    /// (wraps after `Time::MAX`).
    fn now(&mut self) -> Time;

    /// Entropy for seeding the scheduler's pseudorandom source.
    fn entropy(&mut self) -> u64;

    /// First address past the linker-placed static data. The internal
    /// heap map must not start below this.
    fn statics_end(&self) -> MemAddr;

    /// Park the CPU until the next interrupt. A process that killed
    /// itself spins here until the scheduler tick reclaims the CPU.
    fn idle(&mut self);

    /// Developer escape: the task-manager overlay, entered from the
    /// scheduler tick on the Enter+Escape chord. The overlay is board
    /// business; the default does nothing.
    fn task_manager(&mut self) {}

    /// Busy-wait until every button is released.
    fn wait_for_no_input(&mut self) {
        while !self.input().is_empty() {}
    }

    /// Busy-wait until any button is pressed.
    fn wait_for_input(&mut self) {
        while self.input().is_empty() {}
    }
}
