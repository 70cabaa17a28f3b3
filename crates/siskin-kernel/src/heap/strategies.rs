// SPDX-License-Identifier: GPL-3.0-or-later

//! Allocation strategies.
//!
//! All four operate on the allocation map only and return the first
//! use byte of a suitable free run, or null when no run of `size`
//! bytes exists. Each scan takes a critical section of its own: a
//! concurrent free (a timer tick killing a process) would otherwise
//! perturb the run being measured.

use super::{Heap, NIBBLE_FREE};
use siskin_hal::{IrqControl, MemAddr, MemDriver, critical};

/// Linear scan for a free run of `size` bytes, starting at `from`.
fn scan_from<D: MemDriver>(
    heap: &mut Heap<D>,
    irq: &mut dyn IrqControl,
    size: usize,
    from: MemAddr,
) -> MemAddr {
    let mut candidate = MemAddr::null();
    let mut addr = from;
    while heap.valid_use_addr(addr) {
        if heap.map_entry(irq, addr) == NIBBLE_FREE {
            if candidate.is_null() {
                candidate = addr;
            }
            if addr.diff(candidate) as usize + 1 >= size {
                return candidate;
            }
        } else {
            candidate = MemAddr::null();
        }
        addr = addr.add(1);
    }
    MemAddr::null()
}

/// First fit: the lowest suitable run.
pub(super) fn first_fit<D: MemDriver>(
    heap: &mut Heap<D>,
    irq: &mut dyn IrqControl,
    size: usize,
) -> MemAddr {
    critical::enter(irq);
    let bottom = heap.use_start();
    let addr = scan_from(heap, irq, size, bottom);
    critical::leave(irq);
    addr
}

/// Next fit: first fit resuming at the cursor, wrapping once, and
/// leaving the cursor just past a successful allocation.
pub(super) fn next_fit<D: MemDriver>(
    heap: &mut Heap<D>,
    irq: &mut dyn IrqControl,
    size: usize,
) -> MemAddr {
    critical::enter(irq);
    let cursor = heap.next_fit_cursor();
    let bottom = heap.use_start();
    let mut addr = if cursor.is_null() {
        MemAddr::null()
    } else {
        scan_from(heap, irq, size, cursor)
    };
    if addr.is_null() {
        // Not yet primed, or nothing past the cursor: wrap to the
        // bottom of the use region.
        addr = scan_from(heap, irq, size, bottom);
    }
    if !addr.is_null() {
        let past = addr.add(size as u16);
        let cursor = if heap.valid_use_addr(past) { past } else { MemAddr::null() };
        heap.set_next_fit_cursor(cursor);
    }
    critical::leave(irq);
    addr
}

/// Best fit: the smallest suitable run, ties to the lowest address.
pub(super) fn best_fit<D: MemDriver>(
    heap: &mut Heap<D>,
    irq: &mut dyn IrqControl,
    size: usize,
) -> MemAddr {
    critical::enter(irq);
    let mut best = MemAddr::null();
    let mut best_len = usize::MAX;
    let mut addr = heap.use_start();
    while heap.valid_use_addr(addr) {
        let len = heap.span_len(irq, addr);
        if len == 0 {
            break;
        }
        if heap.map_entry(irq, addr) == NIBBLE_FREE && len >= size && len < best_len {
            best = addr;
            best_len = len;
        }
        addr = addr.add(len as u16);
    }
    critical::leave(irq);
    best
}

/// Worst fit: the largest suitable run, ties to the lowest address.
pub(super) fn worst_fit<D: MemDriver>(
    heap: &mut Heap<D>,
    irq: &mut dyn IrqControl,
    size: usize,
) -> MemAddr {
    critical::enter(irq);
    let mut worst = MemAddr::null();
    let mut worst_len = 0;
    let mut addr = heap.use_start();
    while heap.valid_use_addr(addr) {
        let len = heap.span_len(irq, addr);
        if len == 0 {
            break;
        }
        if heap.map_entry(irq, addr) == NIBBLE_FREE && len >= size && len > worst_len {
            worst = addr;
            worst_len = len;
        }
        addr = addr.add(len as u16);
    }
    critical::leave(irq);
    worst
}
