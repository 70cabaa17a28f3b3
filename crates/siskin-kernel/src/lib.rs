// SPDX-License-Identifier: GPL-3.0-or-later

//! # Siskin kernel
//!
//! The core of a small preemptive multitasking OS for single-CPU 8-bit
//! microcontrollers:
//!
//! - a timer-driven scheduler with five interchangeable policies,
//!   stack-based context switching and stack-checksum integrity checks
//! - nested critical sections that mask only the scheduler interrupt
//!   and restore the global interrupt flag exactly as found
//! - two byte-addressable heaps (on-chip SRAM and external serial RAM)
//!   sharing one nibble-packed allocation-map design, with four
//!   allocation strategies, owner tracking, neighbour-coalescing
//!   realloc and automatic cleanup when a process dies
//!
//! All state lives in one [`Kernel`] value. The hardware below it is
//! the trait surface of `siskin-hal`, so the whole kernel runs under
//! host tests against mock hardware; only the register save/restore of
//! the context switch is target assembly, isolated in [`arch`].

#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod arch;
pub mod clock;
pub mod config;
pub mod fault;
pub mod heap;
pub mod kernel;
pub mod sched;

// The critical-section controller lives with the interrupt plumbing in
// the HAL; it is as much kernel API as the heaps are.
pub use siskin_hal::critical;

pub use fault::Fault;
pub use heap::{AllocStrategy, Heap};
pub use kernel::{HeapId, Kernel};
pub use sched::{Priority, ProcessId, ProcessState, ProgramId, SchedulingStrategy};
pub use siskin_hal::{MemAddr, MemValue};
