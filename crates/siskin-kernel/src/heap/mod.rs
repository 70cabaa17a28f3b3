// SPDX-License-Identifier: GPL-3.0-or-later

//! Byte-addressable heaps with a nibble-packed allocation map.
//!
//! A heap is two adjacent windows on one memory driver:
//!
//! ```text
//! map_start          use_start                       use_start + use_size
//! ┌──────────────────┬───────────────────────────────┐
//! │ allocation map   │ use region (bytes handed out) │
//! │ one nibble per   │                               │
//! │ use byte         │                               │
//! └──────────────────┴───────────────────────────────┘
//! ```
//!
//! The map nibble of a use byte encodes:
//! - `0x0` - the byte is free
//! - `1..=0xE` - the byte starts a chunk owned by that process id
//! - `0xF` - the byte continues the chunk started before it
//!
//! So a chunk of n bytes reads `owner, F, F, ...` (n-1 times), and a
//! free run reads `0, 0, ...`. Which half of a map byte a use byte
//! lands in follows from the parity of `addr - use_start`, never from
//! the absolute address, so an odd `use_start` works.
//!
//! Every mutating operation and every strategy scan runs inside a
//! critical section: a scheduler tick that kills a process frees
//! memory, and a half-measured free run must never be visible.

mod ops;
mod strategies;

#[cfg(test)]
mod map_test;
#[cfg(test)]
mod strategies_test;

use crate::config::MAX_PROCESSES;
use crate::sched::ProcessId;
use siskin_hal::{IrqControl, MemAddr, MemDriver, MemValue, critical};

/// Map nibble of a free use byte.
pub const NIBBLE_FREE: MemValue = 0x0;

/// Map nibble continuing a chunk.
pub const NIBBLE_CONTINUATION: MemValue = 0xF;

/// Largest process id that fits the owner nibble.
pub const MAX_OWNER: ProcessId = 0xE;

/// How the allocator picks a free run.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AllocStrategy {
    /// First sufficiently large run from the bottom of the use region.
    FirstFit,
    /// Like first fit, but resuming where the last allocation ended.
    NextFit,
    /// The smallest sufficiently large run; ties to the lowest address.
    BestFit,
    /// The largest sufficiently large run; ties to the lowest address.
    WorstFit,
}

/// A heap descriptor bound to its backing driver.
///
/// The allocation frames bound, per process, the interval of use bytes
/// that could hold chunks of that process; `free_process_memory` walks
/// only that interval at termination time. `(null, null)` means the
/// process owns nothing here.
pub struct Heap<D> {
    driver: D,
    name: &'static str,
    map_start: MemAddr,
    map_size: usize,
    use_start: MemAddr,
    use_size: usize,
    strategy: AllocStrategy,
    next_fit_cursor: MemAddr,
    frame_start: [MemAddr; MAX_PROCESSES],
    frame_end: [MemAddr; MAX_PROCESSES],
}

impl<D: MemDriver> Heap<D> {
    /// A heap with explicit geometry.
    ///
    /// The map must be able to describe the whole use region (one
    /// nibble per use byte) and both windows must lie inside the
    /// driver's address window.
    #[must_use]
    pub fn new(
        driver: D,
        name: &'static str,
        map_start: MemAddr,
        map_size: usize,
        use_start: MemAddr,
        use_size: usize,
        strategy: AllocStrategy,
    ) -> Self {
        debug_assert!(use_size <= 2 * map_size, "map cannot describe the use region");
        debug_assert!(driver.contains(map_start));
        debug_assert!(driver.contains(use_start.add(use_size as u16 - 1)));
        Self {
            driver,
            name,
            map_start,
            map_size,
            use_start,
            use_size,
            strategy,
            next_fit_cursor: MemAddr::null(),
            frame_start: [MemAddr::null(); MAX_PROCESSES],
            frame_end: [MemAddr::null(); MAX_PROCESSES],
        }
    }

    /// Carve a heap out of `[start, start + size)`: one third map, two
    /// thirds use region.
    #[must_use]
    pub fn carve(driver: D, name: &'static str, start: MemAddr, size: usize, strategy: AllocStrategy) -> Self {
        let map_size = size / 3;
        let use_size = 2 * (size / 3);
        Self::new(
            driver,
            name,
            start,
            map_size,
            start.add(map_size as u16),
            use_size,
            strategy,
        )
    }

    /// Prepare the backing driver and zero the allocation map.
    pub fn init(&mut self, irq: &mut dyn IrqControl) {
        self.driver.init(irq);
        let mut addr = self.map_start;
        let end = self.map_start.add(self.map_size as u16);
        while addr < end {
            self.driver.write(irq, addr, 0);
            addr = addr.add(1);
        }
        self.next_fit_cursor = MemAddr::null();
        self.frame_start = [MemAddr::null(); MAX_PROCESSES];
        self.frame_end = [MemAddr::null(); MAX_PROCESSES];
    }

    /// The heap's name, for diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// First address of the map region.
    #[must_use]
    pub const fn map_start(&self) -> MemAddr {
        self.map_start
    }

    /// Size of the map region in bytes.
    #[must_use]
    pub const fn map_size(&self) -> usize {
        self.map_size
    }

    /// First address of the use region.
    #[must_use]
    pub const fn use_start(&self) -> MemAddr {
        self.use_start
    }

    /// Size of the use region in bytes.
    #[must_use]
    pub const fn use_size(&self) -> usize {
        self.use_size
    }

    /// The active allocation strategy.
    #[must_use]
    pub const fn strategy(&self) -> AllocStrategy {
        self.strategy
    }

    /// Switch the allocation strategy.
    pub fn set_strategy(&mut self, strategy: AllocStrategy) {
        self.strategy = strategy;
    }

    /// Where the next next-fit scan resumes; null means "from the
    /// bottom".
    #[must_use]
    pub const fn next_fit_cursor(&self) -> MemAddr {
        self.next_fit_cursor
    }

    /// Pin the next-fit cursor (tests and the task manager use this).
    pub fn set_next_fit_cursor(&mut self, cursor: MemAddr) {
        self.next_fit_cursor = cursor;
    }

    /// The allocation frame of `pid`, `(null, null)` if it owns
    /// nothing here.
    #[must_use]
    pub fn frame(&self, pid: ProcessId) -> (MemAddr, MemAddr) {
        (self.frame_start[pid as usize], self.frame_end[pid as usize])
    }

    /// The backing driver.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Whether `addr` lies in the use region.
    #[must_use]
    pub fn valid_use_addr(&self, addr: MemAddr) -> bool {
        addr >= self.use_start && (addr.diff(self.use_start) as usize) < self.use_size
    }

    /// Whether `addr` lies in the map region.
    #[must_use]
    pub fn valid_map_addr(&self, addr: MemAddr) -> bool {
        addr >= self.map_start && (addr.diff(self.map_start) as usize) < self.map_size
    }

    /// Map byte and nibble half describing the use byte at `addr`.
    ///
    /// Even offsets from `use_start` land in the high nibble.
    fn map_position(&self, addr: MemAddr) -> (MemAddr, bool) {
        let offset = addr.diff(self.use_start);
        (self.map_start.add(offset / 2), offset % 2 == 0)
    }

    /// The map nibble of the use byte at `addr`; 0 outside the use
    /// region.
    pub fn map_entry(&mut self, irq: &mut dyn IrqControl, addr: MemAddr) -> MemValue {
        if !self.valid_use_addr(addr) {
            return 0;
        }
        let (byte, high) = self.map_position(addr);
        let value = self.driver.read(irq, byte);
        if high { value >> 4 } else { value & 0x0F }
    }

    /// Overwrite the map nibble of the use byte at `addr`.
    ///
    /// Read-modify-write of the shared map byte, so it takes its own
    /// critical section.
    fn set_map_entry(&mut self, irq: &mut dyn IrqControl, addr: MemAddr, value: MemValue) {
        debug_assert!(value <= 0xF);
        if !self.valid_use_addr(addr) {
            return;
        }
        critical::enter(irq);
        let (byte, high) = self.map_position(addr);
        let old = self.driver.read(irq, byte);
        let new = if high {
            (old & 0x0F) | (value << 4)
        } else {
            (old & 0xF0) | (value & 0x0F)
        };
        self.driver.write(irq, byte, new);
        critical::leave(irq);
    }

    /// First byte of the chunk (or free run) containing `addr`; null
    /// outside the use region.
    pub fn first_byte_of_chunk(&mut self, irq: &mut dyn IrqControl, addr: MemAddr) -> MemAddr {
        if !self.valid_use_addr(addr) {
            return MemAddr::null();
        }
        let mut a = addr;
        if self.map_entry(irq, addr) == NIBBLE_FREE {
            while self.valid_use_addr(a) && self.map_entry(irq, a) == NIBBLE_FREE {
                a = a.sub(1);
            }
            a.add(1)
        } else {
            while self.valid_use_addr(a) && self.map_entry(irq, a) == NIBBLE_CONTINUATION {
                a = a.sub(1);
            }
            a
        }
    }

    /// Size of the allocated chunk containing `addr`; 0 for free
    /// regions and outside the use region.
    pub fn chunk_size(&mut self, irq: &mut dyn IrqControl, addr: MemAddr) -> usize {
        if !self.valid_use_addr(addr) || self.map_entry(irq, addr) == NIBBLE_FREE {
            return 0;
        }
        let first = self.first_byte_of_chunk(irq, addr);
        let mut size = 1;
        let mut a = first.add(1);
        while self.valid_use_addr(a) && self.map_entry(irq, a) == NIBBLE_CONTINUATION {
            size += 1;
            a = a.add(1);
        }
        size
    }

    /// Length of the span starting exactly at `addr`: an allocated
    /// chunk's size, or the length of a free run. The unrestricted
    /// sibling of [`Heap::chunk_size`], used by the strategies and by
    /// realloc to measure neighbours.
    pub fn span_len(&mut self, irq: &mut dyn IrqControl, addr: MemAddr) -> usize {
        if !self.valid_use_addr(addr) {
            return 0;
        }
        let mut len = 1;
        let mut a = addr.add(1);
        if self.map_entry(irq, addr) == NIBBLE_FREE {
            while self.valid_use_addr(a) && self.map_entry(irq, a) == NIBBLE_FREE {
                len += 1;
                a = a.add(1);
            }
        } else {
            while self.valid_use_addr(a) && self.map_entry(irq, a) == NIBBLE_CONTINUATION {
                len += 1;
                a = a.add(1);
            }
        }
        len
    }

    /// Owner of the chunk containing `addr`; 0 for free regions and
    /// outside the use region.
    pub fn owner_of(&mut self, irq: &mut dyn IrqControl, addr: MemAddr) -> ProcessId {
        if !self.valid_use_addr(addr) {
            return 0;
        }
        let first = self.first_byte_of_chunk(irq, addr);
        self.map_entry(irq, first)
    }

    /// Read a use byte through the driver. No ownership check: data
    /// access is the caller's business, exactly like dereferencing
    /// the returned address would be.
    pub fn read_byte(&mut self, irq: &mut dyn IrqControl, addr: MemAddr) -> MemValue {
        self.driver.read(irq, addr)
    }

    /// Write a use byte through the driver.
    pub fn write_byte(&mut self, irq: &mut dyn IrqControl, addr: MemAddr, value: MemValue) {
        self.driver.write(irq, addr, value);
    }
}
