// SPDX-License-Identifier: GPL-3.0-or-later

//! Allocation, release and realloc.
//!
//! Every operation here is atomic: it holds the heap's critical
//! section for its entire body. Boundary and ownership violations
//! halt through the fault routine and leave the heap untouched;
//! running out of memory quietly returns null.

use super::{AllocStrategy, Heap, MAX_OWNER, NIBBLE_CONTINUATION, NIBBLE_FREE, strategies};
use crate::fault::{self, Fault};
use crate::sched::ProcessId;
use siskin_hal::{IrqControl, MemAddr, MemDriver, Platform, critical};

impl<D: MemDriver> Heap<D> {
    /// Whether `pid` can be encoded in an owner nibble.
    fn encodable_owner(pid: ProcessId) -> bool {
        pid >= 1 && pid <= MAX_OWNER
    }

    /// Find a free run of `size` bytes with the active strategy.
    fn find_free(&mut self, irq: &mut dyn IrqControl, size: usize) -> MemAddr {
        match self.strategy() {
            AllocStrategy::FirstFit => strategies::first_fit(self, irq, size),
            AllocStrategy::NextFit => strategies::next_fit(self, irq, size),
            AllocStrategy::BestFit => strategies::best_fit(self, irq, size),
            AllocStrategy::WorstFit => strategies::worst_fit(self, irq, size),
        }
    }

    /// Mark `[first, first + size)` as a chunk owned by `owner`.
    fn write_chunk(&mut self, irq: &mut dyn IrqControl, first: MemAddr, size: usize, owner: ProcessId) {
        self.set_map_entry(irq, first, owner);
        let mut i = 1;
        while i < size {
            self.set_map_entry(irq, first.add(i as u16), NIBBLE_CONTINUATION);
            i += 1;
        }
    }

    /// Zero the map nibbles of `[first, first + size)`.
    fn clear_chunk(&mut self, irq: &mut dyn IrqControl, first: MemAddr, size: usize) {
        let mut i = 0;
        while i < size {
            self.set_map_entry(irq, first.add(i as u16), NIBBLE_FREE);
            i += 1;
        }
    }

    /// Grow `owner`'s allocation frame to cover `[first, last]`.
    fn widen_frame(&mut self, owner: ProcessId, first: MemAddr, last: MemAddr) {
        let slot = owner as usize;
        if self.frame_start[slot].is_null() {
            self.frame_start[slot] = first;
            self.frame_end[slot] = last;
            return;
        }
        if first < self.frame_start[slot] {
            self.frame_start[slot] = first;
        }
        if last > self.frame_end[slot] {
            self.frame_end[slot] = last;
        }
    }

    /// Recompute `owner`'s allocation frame by scanning the use region
    /// chunk-wise from both ends. Clears it to `(null, null)` when no
    /// chunk is left.
    fn retighten_frame(&mut self, irq: &mut dyn IrqControl, owner: ProcessId) {
        let mut start = MemAddr::null();
        let mut end = MemAddr::null();
        let mut addr = self.use_start();
        while self.valid_use_addr(addr) {
            let len = self.span_len(irq, addr);
            if len == 0 {
                break;
            }
            if self.map_entry(irq, addr) == owner {
                if start.is_null() {
                    start = addr;
                }
                end = addr.add(len as u16 - 1);
            }
            addr = addr.add(len as u16);
        }
        self.frame_start[owner as usize] = start;
        self.frame_end[owner as usize] = end;
    }

    /// Allocate `size` bytes for `owner`.
    ///
    /// Returns the first use byte of the new chunk, or null when no
    /// sufficiently large free run exists (or the request is empty,
    /// or `owner` cannot own memory on a nibble map).
    pub fn malloc<P: Platform>(&mut self, p: &mut P, size: usize, owner: ProcessId) -> MemAddr {
        critical::enter(p);
        if size == 0 || size > self.use_size() || !Self::encodable_owner(owner) {
            critical::leave(p);
            return MemAddr::null();
        }
        let addr = self.find_free(p, size);
        if addr.is_null() {
            log::debug!("{}: no free run of {size} bytes", self.name());
            critical::leave(p);
            return MemAddr::null();
        }
        self.write_chunk(p, addr, size, owner);
        self.widen_frame(owner, addr, addr.add(size as u16 - 1));
        critical::leave(p);
        addr
    }

    /// Release the chunk containing `addr` if `owner` owns it.
    ///
    /// A wrong owner (including a double free, whose chunk owner reads
    /// 0) is an ownership fault: the machine halts for acknowledgment
    /// and the heap stays unchanged.
    pub fn free_owner_restricted<P: Platform>(
        &mut self,
        p: &mut P,
        addr: MemAddr,
        owner: ProcessId,
    ) -> bool {
        critical::enter(p);
        if !self.valid_use_addr(addr) {
            fault::fatal(p, Fault::Boundary);
            critical::leave(p);
            return false;
        }
        let chunk_owner = self.owner_of(p, addr);
        if chunk_owner == NIBBLE_FREE || chunk_owner != owner {
            fault::fatal(p, Fault::Ownership);
            critical::leave(p);
            return false;
        }
        let first = self.first_byte_of_chunk(p, addr);
        let size = self.chunk_size(p, addr);
        self.clear_chunk(p, first, size);

        // Re-tighten the frame only when an extremum was released.
        let last = first.add(size as u16 - 1);
        let slot = owner as usize;
        if self.frame_start[slot] == first || self.frame_end[slot] == last {
            self.retighten_frame(p, owner);
        }
        critical::leave(p);
        true
    }

    /// Release every chunk `pid` owns on this heap and clear its
    /// allocation frame. Called by the scheduler when a process dies.
    pub fn free_process_memory<P: Platform>(&mut self, p: &mut P, pid: ProcessId) {
        critical::enter(p);
        let (frame_start, frame_end) = self.frame(pid);
        if !frame_start.is_null() {
            let mut addr = frame_start;
            while self.valid_use_addr(addr) && addr <= frame_end {
                let len = self.span_len(p, addr);
                if len == 0 {
                    break;
                }
                if self.map_entry(p, addr) == pid {
                    self.clear_chunk(p, addr, len);
                }
                addr = addr.add(len as u16);
            }
        }
        self.frame_start[pid as usize] = MemAddr::null();
        self.frame_end[pid as usize] = MemAddr::null();
        critical::leave(p);
    }

    /// Resize the chunk containing `addr` to `new_size` bytes for
    /// `owner`.
    ///
    /// Growth prefers, in order: the free run to the right, the free
    /// run to the left (moving the data down), both neighbours
    /// together, and finally a fresh chunk found with the active
    /// strategy (copy and free the old one). The returned address is
    /// the chunk's new first byte - it may differ from the old one.
    /// Returns null when the heap cannot satisfy the new size; the
    /// old chunk survives untouched in that case.
    pub fn realloc<P: Platform>(
        &mut self,
        p: &mut P,
        addr: MemAddr,
        new_size: usize,
        owner: ProcessId,
    ) -> MemAddr {
        critical::enter(p);
        if !self.valid_use_addr(addr) {
            fault::fatal(p, Fault::Boundary);
            critical::leave(p);
            return MemAddr::null();
        }
        let chunk_owner = self.owner_of(p, addr);
        if chunk_owner == NIBBLE_FREE || chunk_owner != owner {
            fault::fatal(p, Fault::Ownership);
            critical::leave(p);
            return MemAddr::null();
        }

        let first = self.first_byte_of_chunk(p, addr);
        let old_size = self.chunk_size(p, addr);

        if new_size == 0 {
            // Shrinking to nothing is a free.
            self.clear_chunk(p, first, old_size);
            self.retighten_frame(p, owner);
            critical::leave(p);
            return MemAddr::null();
        }

        if new_size == old_size {
            critical::leave(p);
            return first;
        }

        if new_size < old_size {
            // Trailing bytes go back to the map; the owner nibble
            // stays where it was.
            self.clear_chunk(p, first.add(new_size as u16), old_size - new_size);
            if self.frame_end[owner as usize] == first.add(old_size as u16 - 1) {
                self.retighten_frame(p, owner);
            }
            critical::leave(p);
            return first;
        }

        let need = new_size - old_size;

        // (a) Grow into the right neighbour.
        let right_start = first.add(old_size as u16);
        let right = if self.valid_use_addr(right_start) && self.map_entry(p, right_start) == NIBBLE_FREE
        {
            self.span_len(p, right_start)
        } else {
            0
        };
        if right >= need {
            let mut i = 0;
            while i < need {
                self.set_map_entry(p, right_start.add(i as u16), NIBBLE_CONTINUATION);
                i += 1;
            }
            self.widen_frame(owner, first, first.add(new_size as u16 - 1));
            critical::leave(p);
            return first;
        }

        // (b) Grow into the left neighbour, moving the data down.
        let left = if first > self.use_start() && self.map_entry(p, first.sub(1)) == NIBBLE_FREE {
            let run_start = self.first_byte_of_chunk(p, first.sub(1));
            first.diff(run_start) as usize
        } else {
            0
        };
        if left >= need {
            let new_first = first.sub(need as u16);
            self.move_down(p, first, new_first, old_size);
            self.write_chunk(p, new_first, new_size, owner);
            self.retighten_frame(p, owner);
            critical::leave(p);
            return new_first;
        }

        // (c) Both neighbours together.
        if left + right >= need {
            let new_first = first.sub(left as u16);
            self.move_down(p, first, new_first, old_size);
            self.write_chunk(p, new_first, new_size, owner);
            self.retighten_frame(p, owner);
            critical::leave(p);
            return new_first;
        }

        // (d) A fresh chunk somewhere else; only here is the strategy
        // consulted.
        let fresh = self.find_free(p, new_size);
        if fresh.is_null() {
            critical::leave(p);
            return MemAddr::null();
        }
        self.write_chunk(p, fresh, new_size, owner);
        let mut i = 0;
        while i < old_size {
            let byte = self.read_byte(p, first.add(i as u16));
            self.write_byte(p, fresh.add(i as u16), byte);
            i += 1;
        }
        self.clear_chunk(p, first, old_size);
        self.retighten_frame(p, owner);
        critical::leave(p);
        fresh
    }

    /// Copy `len` use bytes from `src` down to `dst` (`dst < src`),
    /// ascending, so overlapping chunks move correctly.
    fn move_down<P: Platform>(&mut self, p: &mut P, src: MemAddr, dst: MemAddr, len: usize) {
        debug_assert!(dst < src);
        let mut i = 0;
        while i < len {
            let byte = self.read_byte(p, src.add(i as u16));
            self.write_byte(p, dst.add(i as u16), byte);
            i += 1;
        }
    }

    /// Whether `[addr, addr + len)` starts and ends inside chunks
    /// owned by `owner` (the endpoints are what the copy routine
    /// checks before touching data).
    pub fn owns_range(
        &mut self,
        irq: &mut dyn IrqControl,
        addr: MemAddr,
        len: usize,
        owner: ProcessId,
    ) -> bool {
        if len == 0 || !self.valid_use_addr(addr) {
            return false;
        }
        let last = addr.add(len as u16 - 1);
        if !self.valid_use_addr(last) {
            return false;
        }
        self.owner_of(irq, addr) == owner && self.owner_of(irq, last) == owner
    }
}
