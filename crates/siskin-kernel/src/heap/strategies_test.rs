// SPDX-License-Identifier: GPL-3.0-or-later

//! Tests for the allocation strategies.
//!
//! The hole pattern used throughout: fill the whole use region with
//! four chunks, then free the first and third, leaving exactly a
//! 15-byte and a 10-byte hole separated by an allocated 5-byte block
//! and followed by allocated memory to the end.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{AllocStrategy, Heap};
use siskin_hal::MemAddr;
use siskin_hal::mock::{MockPlatform, MockRam};

const USE_START: u16 = 0x0200;
const USE_SIZE: usize = 600;

fn test_heap(strategy: AllocStrategy) -> (MockPlatform, Heap<MockRam>) {
    let p = MockPlatform::new();
    let ram = MockRam::new(MemAddr::new(0), 0x1000);
    let heap = Heap::new(
        ram,
        "internal",
        MemAddr::new(0x00D4),
        300,
        MemAddr::new(USE_START),
        USE_SIZE,
        strategy,
    );
    (p, heap)
}

/// Two holes of 15 and 10 bytes; returns their addresses.
fn two_holes(p: &mut MockPlatform, heap: &mut Heap<MockRam>) -> (MemAddr, MemAddr) {
    let a = heap.malloc(p, 15, 1);
    let b = heap.malloc(p, 5, 1);
    let c = heap.malloc(p, 10, 1);
    let d = heap.malloc(p, USE_SIZE - 30, 1);
    assert!(!a.is_null() && !b.is_null() && !c.is_null() && !d.is_null());
    assert!(heap.free_owner_restricted(p, a, 1));
    assert!(heap.free_owner_restricted(p, c, 1));
    (a, c)
}

#[test]
fn first_fit_takes_the_lowest_hole() {
    let (mut p, mut heap) = test_heap(AllocStrategy::FirstFit);
    let (a, _c) = two_holes(&mut p, &mut heap);

    assert_eq!(heap.malloc(&mut p, 5, 2), a);
}

#[test]
fn best_fit_takes_the_smallest_sufficient_hole() {
    let (mut p, mut heap) = test_heap(AllocStrategy::BestFit);
    let (a, c) = two_holes(&mut p, &mut heap);

    assert_eq!(heap.malloc(&mut p, 5, 2), c);
    // A request too big for the small hole lands in the big one.
    assert_eq!(heap.malloc(&mut p, 12, 2), a);
}

#[test]
fn worst_fit_takes_the_largest_hole() {
    let (mut p, mut heap) = test_heap(AllocStrategy::WorstFit);
    let (a, _c) = two_holes(&mut p, &mut heap);

    assert_eq!(heap.malloc(&mut p, 5, 2), a);
}

#[test]
fn best_fit_breaks_ties_to_the_lowest_address() {
    let (mut p, mut heap) = test_heap(AllocStrategy::BestFit);
    let a = heap.malloc(&mut p, 10, 1);
    let _b = heap.malloc(&mut p, 5, 1);
    let c = heap.malloc(&mut p, 10, 1);
    let _d = heap.malloc(&mut p, USE_SIZE - 25, 1);
    assert!(heap.free_owner_restricted(&mut p, a, 1));
    assert!(heap.free_owner_restricted(&mut p, c, 1));

    assert_eq!(heap.malloc(&mut p, 10, 2), a);
}

#[test]
fn next_fit_resumes_past_the_last_allocation() {
    let (mut p, mut heap) = test_heap(AllocStrategy::NextFit);
    let (a, c) = two_holes(&mut p, &mut heap);

    // Unprimed cursor degenerates to first fit.
    assert_eq!(heap.malloc(&mut p, 12, 2), a);
    assert_eq!(heap.next_fit_cursor(), a.add(12));

    // The next scan starts at the cursor; the 3 bytes left of the
    // first hole are too small, so the second hole wins.
    assert_eq!(heap.malloc(&mut p, 8, 2), c);
    assert_eq!(heap.next_fit_cursor(), c.add(8));
}

#[test]
fn next_fit_wraps_around_once() {
    let (mut p, mut heap) = test_heap(AllocStrategy::NextFit);
    let (a, c) = two_holes(&mut p, &mut heap);

    // Pin the cursor beyond both holes: the scan finds nothing ahead,
    // wraps, and takes the first hole.
    heap.set_next_fit_cursor(c.add(15));
    assert_eq!(heap.malloc(&mut p, 5, 2), a);
    assert_eq!(heap.next_fit_cursor(), a.add(5));
}

#[test]
fn next_fit_cursor_resets_when_allocation_ends_at_the_window() {
    let (mut p, mut heap) = test_heap(AllocStrategy::NextFit);
    let a = heap.malloc(&mut p, USE_SIZE, 1);
    assert_eq!(a, MemAddr::new(USE_START));
    // The allocation ran to the end of the window; the cursor must
    // not point past it.
    assert!(heap.next_fit_cursor().is_null());
}

#[test]
fn all_strategies_report_exhaustion_as_null() {
    for strategy in [
        AllocStrategy::FirstFit,
        AllocStrategy::NextFit,
        AllocStrategy::BestFit,
        AllocStrategy::WorstFit,
    ] {
        let (mut p, mut heap) = test_heap(strategy);
        let (_a, _c) = two_holes(&mut p, &mut heap);
        // Both holes are 15 and 10 bytes; 16 fits nowhere.
        assert!(heap.malloc(&mut p, 16, 2).is_null(), "{strategy:?}");
    }
}

#[test]
fn strategy_switch_round_trips() {
    let (_p, mut heap) = test_heap(AllocStrategy::FirstFit);
    heap.set_strategy(AllocStrategy::WorstFit);
    assert_eq!(heap.strategy(), AllocStrategy::WorstFit);
}
