// SPDX-License-Identifier: GPL-3.0-or-later

//! Compile-time configuration.
//!
//! Geometry of the on-chip SRAM, the heap carve-out, the per-process
//! stack layout and the scheduler tick. The values target an
//! ATmega644-class part (4 KiB internal SRAM at `0x0100`, 64 KiB
//! serial RAM), but nothing outside this module knows that.
//!
//! Memory layout of the internal SRAM:
//!
//! ```text
//! 0x0100                                                        0x10FF
//! ┌─────────┬───────────┬─────────────────┬───┬────────┬────────────┐
//! │ statics │ heap map  │    heap use     │gap│ stacks │ sched stack│
//! │ (offset)│           │                 │   │ 7 .. 0 │            │
//! └─────────┴───────────┴─────────────────┴───┴────────┴────────────┘
//!           ▲ INT_HEAP_START                  ▲        ▲ grows down
//!                                             │ process stacks,
//!                                             │ highest pid lowest
//! ```

use crate::heap::AllocStrategy;
use crate::sched::{Priority, ProcessId};
use siskin_hal::{MemAddr, Time};

/// Length of the process table; slot 0 is the idle process.
pub const MAX_PROCESSES: usize = 8;

/// Length of the program table; program 0 is the idle loop.
pub const MAX_PROGRAMS: usize = 16;

/// Priority given to autostarted programs.
pub const DEFAULT_PRIORITY: Priority = 10;

/// Strategy every heap starts out with.
pub const DEFAULT_ALLOCATION_STRATEGY: AllocStrategy = AllocStrategy::FirstFit;

/// First address of the on-chip SRAM.
pub const SRAM_START: MemAddr = MemAddr::new(0x0100);

/// Size of the on-chip SRAM in bytes.
pub const SRAM_SIZE: usize = 4096;

/// Last valid address of the on-chip SRAM.
pub const SRAM_END: MemAddr = MemAddr::new(0x0100 + SRAM_SIZE as u16 - 1);

/// Bytes of internal SRAM reserved for static data before the heap map.
pub const HEAP_OFFSET: usize = 256;

/// First address of the internal heap (map region comes first).
pub const INT_HEAP_START: MemAddr = MemAddr::new(SRAM_START.as_u16() + HEAP_OFFSET as u16);

/// Bytes of internal SRAM given to the internal heap (map + use).
pub const INT_HEAP_SIZE: usize = SRAM_SIZE / 2 - HEAP_OFFSET;

/// First address served by the external serial RAM.
pub const EXT_RAM_START: MemAddr = MemAddr::new(0x0000);

/// Size of the external serial RAM in bytes.
pub const EXT_RAM_SIZE: usize = 0x1_0000;

/// Stack bytes reserved per process.
pub const STACK_SIZE_PER_PROCESS: usize = 224;

/// Stack bytes reserved for the scheduler itself, at the very top of
/// SRAM.
pub const SCHEDULER_STACK_SIZE: usize = 128;

/// Where the scheduler stack begins (stacks grow downward).
pub const SCHEDULER_STACK_BOTTOM: MemAddr = SRAM_END;

/// Registers saved per context: 32 general-purpose plus the status
/// register.
pub const REGISTER_FILE_SIZE: usize = 33;

/// Bytes of a return address on the stack.
pub const RETURN_ADDRESS_SIZE: usize = 2;

/// Bytes of the synthetic frame `exec` builds: return address plus a
/// zeroed register file.
pub const INITIAL_FRAME_SIZE: usize = REGISTER_FILE_SIZE + RETURN_ADDRESS_SIZE;

/// Timer compare value of the scheduler tick.
pub const SCHEDULER_TICK_PERIOD: u8 = 60;

/// Coarse-clock ticks per millisecond (20 MHz core, 256 prescaler).
pub const TICKS_PER_MS: Time = 78;

/// Highest address of `pid`'s stack; the stack grows down from here.
#[must_use]
pub const fn process_stack_bottom(pid: ProcessId) -> MemAddr {
    SRAM_END.sub((SCHEDULER_STACK_SIZE + pid as usize * STACK_SIZE_PER_PROCESS) as u16)
}

/// Lowest address belonging to `pid`'s stack.
#[must_use]
pub const fn process_stack_top(pid: ProcessId) -> MemAddr {
    process_stack_bottom(pid).sub(STACK_SIZE_PER_PROCESS as u16 - 1)
}

// The owner nibble holds pids 1..=14; 0 is "free" and 0xF marks chunk
// continuation, so the process table must fit.
const _: () = assert!(MAX_PROCESSES <= 15);

// The program autostart mask is a u16.
const _: () = assert!(MAX_PROGRAMS <= 16);

// Heap and stacks must not overlap.
const _: () = assert!(
    INT_HEAP_START.as_u16() as usize + INT_HEAP_SIZE
        <= SRAM_END.as_u16() as usize - SCHEDULER_STACK_SIZE - MAX_PROCESSES * STACK_SIZE_PER_PROCESS
        + 1
);

// A synthetic frame must fit a process stack.
const _: () = assert!(INITIAL_FRAME_SIZE < STACK_SIZE_PER_PROCESS);
