// SPDX-License-Identifier: GPL-3.0-or-later

//! Target glue for the context switch.
//!
//! The one thing the kernel cannot express portably is the register
//! save/restore around [`crate::Kernel::schedule`]: the timer ISR must
//! push the interrupted process's whole register file onto *its*
//! stack, and pop the chosen process's file afterwards, without the
//! compiler emitting a prologue of its own. That sequence, the
//! dispatcher trampoline, and the static kernel handle the ISR needs
//! live here, per target architecture.
//!
//! Host builds have no target glue; tests drive the portable tick body
//! through `Kernel::simulate_tick` instead.

#[cfg(target_arch = "avr")]
pub mod avr;
