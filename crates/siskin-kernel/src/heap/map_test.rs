// SPDX-License-Identifier: GPL-3.0-or-later

//! Tests for the nibble map and the chunk walks.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{AllocStrategy, Heap};
use siskin_hal::mock::{MockPlatform, MockRam};
use siskin_hal::{MemAddr, MemDriver};

const MAP_START: u16 = 0x00D4;
const USE_START: u16 = 0x0200;
const USE_SIZE: usize = 600;

fn test_heap() -> (MockPlatform, Heap<MockRam>) {
    let p = MockPlatform::new();
    let ram = MockRam::new(MemAddr::new(0), 0x1000);
    let heap = Heap::new(
        ram,
        "internal",
        MemAddr::new(MAP_START),
        300,
        MemAddr::new(USE_START),
        USE_SIZE,
        AllocStrategy::FirstFit,
    );
    (p, heap)
}

#[test]
fn geometry() {
    let (_p, heap) = test_heap();
    assert_eq!(heap.map_start(), MemAddr::new(MAP_START));
    assert_eq!(heap.map_size(), 300);
    assert_eq!(heap.use_start(), MemAddr::new(USE_START));
    assert_eq!(heap.use_size(), USE_SIZE);
    assert!(heap.valid_use_addr(MemAddr::new(USE_START)));
    assert!(heap.valid_use_addr(MemAddr::new(USE_START + 599)));
    assert!(!heap.valid_use_addr(MemAddr::new(USE_START + 600)));
    assert!(!heap.valid_use_addr(MemAddr::new(USE_START - 1)));
    assert!(heap.valid_map_addr(MemAddr::new(MAP_START)));
    assert!(!heap.valid_map_addr(MemAddr::new(USE_START)));
}

#[test]
fn carve_splits_one_third_map_two_thirds_use() {
    let ram = MockRam::new(MemAddr::new(0), 0x1000);
    let heap = Heap::carve(ram, "carved", MemAddr::new(0x100), 900, AllocStrategy::FirstFit);
    assert_eq!(heap.map_start(), MemAddr::new(0x100));
    assert_eq!(heap.map_size(), 300);
    assert_eq!(heap.use_start(), MemAddr::new(0x100 + 300));
    assert_eq!(heap.use_size(), 600);
}

#[test]
fn map_entry_parity_with_even_use_start() {
    let (mut p, mut heap) = test_heap();
    // Plant a raw map byte: high nibble belongs to the lower-addressed
    // use byte when use_start is even.
    heap.driver_mut().write(&mut p, MemAddr::new(MAP_START), 0xAB);
    assert_eq!(heap.map_entry(&mut p, MemAddr::new(USE_START)), 0xA);
    assert_eq!(heap.map_entry(&mut p, MemAddr::new(USE_START + 1)), 0xB);
}

#[test]
fn map_entry_parity_follows_use_start_not_absolute_address() {
    // Odd use_start: the absolute-address parity is inverted, the
    // offset parity must win.
    let mut p = MockPlatform::new();
    let ram = MockRam::new(MemAddr::new(0), 0x1000);
    let mut heap = Heap::new(
        ram,
        "odd",
        MemAddr::new(MAP_START),
        300,
        MemAddr::new(0x0201),
        USE_SIZE,
        AllocStrategy::FirstFit,
    );
    heap.driver_mut().write(&mut p, MemAddr::new(MAP_START), 0xAB);
    // 0x0201 has offset 0 (even) -> high nibble, although the absolute
    // address is odd.
    assert_eq!(heap.map_entry(&mut p, MemAddr::new(0x0201)), 0xA);
    // 0x0202 has offset 1 -> low nibble, although the address is even.
    assert_eq!(heap.map_entry(&mut p, MemAddr::new(0x0202)), 0xB);
}

#[test]
fn map_entry_outside_use_region_reads_zero() {
    let (mut p, mut heap) = test_heap();
    assert_eq!(heap.map_entry(&mut p, MemAddr::new(0x0050)), 0);
    assert_eq!(heap.map_entry(&mut p, MemAddr::new(USE_START + 600)), 0);
}

#[test]
fn chunk_walks() {
    let (mut p, mut heap) = test_heap();
    let a = heap.malloc(&mut p, 10, 1);
    assert_eq!(a, MemAddr::new(USE_START));

    // Every byte of the chunk resolves to the same first byte.
    for i in 0..10 {
        assert_eq!(heap.first_byte_of_chunk(&mut p, a.add(i)), a);
        assert_eq!(heap.chunk_size(&mut p, a.add(i)), 10);
        assert_eq!(heap.owner_of(&mut p, a.add(i)), 1);
    }

    // The byte after the chunk is free.
    assert_eq!(heap.chunk_size(&mut p, a.add(10)), 0);
    assert_eq!(heap.owner_of(&mut p, a.add(10)), 0);
}

#[test]
fn chunk_walk_round_trip_law() {
    // first_byte(chunk_size(a) + first_byte(a) - 1) == first_byte(a)
    let (mut p, mut heap) = test_heap();
    let a = heap.malloc(&mut p, 7, 2);
    let b = heap.malloc(&mut p, 3, 2);
    for addr in [a, a.add(3), b, b.add(2)] {
        let first = heap.first_byte_of_chunk(&mut p, addr);
        let size = heap.chunk_size(&mut p, addr) as u16;
        let last = first.add(size - 1);
        assert_eq!(heap.first_byte_of_chunk(&mut p, last), first);
    }
}

#[test]
fn span_len_measures_free_runs_and_chunks() {
    let (mut p, mut heap) = test_heap();
    let a = heap.malloc(&mut p, 4, 1);
    let _b = heap.malloc(&mut p, 6, 1);

    assert_eq!(heap.span_len(&mut p, a), 4);
    assert_eq!(heap.span_len(&mut p, a.add(4)), 6);
    // The tail of the use region is one long free run.
    assert_eq!(heap.span_len(&mut p, a.add(10)), USE_SIZE - 10);
}

#[test]
fn free_run_walks() {
    let (mut p, mut heap) = test_heap();
    let a = heap.malloc(&mut p, 5, 1);
    let b = heap.malloc(&mut p, 5, 1);
    assert!(heap.free_owner_restricted(&mut p, a, 1));

    // Inside the freed hole: the walk finds the hole's first byte,
    // restricted size is 0.
    assert_eq!(heap.first_byte_of_chunk(&mut p, a.add(3)), a);
    assert_eq!(heap.chunk_size(&mut p, a.add(3)), 0);
    assert_eq!(heap.owner_of(&mut p, a.add(3)), 0);

    // The neighbouring chunk is untouched.
    assert_eq!(heap.chunk_size(&mut p, b), 5);
}
