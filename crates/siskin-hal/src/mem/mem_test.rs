// SPDX-License-Identifier: GPL-3.0-or-later

//! Tests for the memory drivers, in particular the serial-RAM wire
//! protocol.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{MemDriver, SerialRam};
use crate::addr::MemAddr;
use crate::mock::{MockPlatform, MockRam, MockSpiBus};
use crate::platform::IrqControl;

fn serial_ram() -> SerialRam<MockSpiBus> {
    SerialRam::new(MockSpiBus::new(0x1_0000), MemAddr::new(0), 0x1_0000)
}

#[test]
fn init_selects_byte_mode() {
    let mut p = MockPlatform::new();
    let mut ram = serial_ram();

    ram.init(&mut p);

    let transcript = ram.bus_mut().transcript();
    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript[0], std::vec![0x01, 0x00]);
}

#[test]
fn write_then_read_round_trips_through_the_chip() {
    let mut p = MockPlatform::new();
    let mut ram = serial_ram();
    ram.init(&mut p);

    ram.write(&mut p, MemAddr::new(0x1234), 0xA5);
    assert_eq!(ram.read(&mut p, MemAddr::new(0x1234)), 0xA5);
    assert_eq!(ram.read(&mut p, MemAddr::new(0x1235)), 0x00);
}

#[test]
fn wire_format_of_read_and_write() {
    let mut p = MockPlatform::new();
    let mut ram = serial_ram();
    ram.init(&mut p);

    ram.write(&mut p, MemAddr::new(0xBEEF), 0x42);
    let _ = ram.read(&mut p, MemAddr::new(0xBEEF));

    let transcript = ram.bus_mut().transcript();
    // Select window 0 is the mode write; then one window per command,
    // chip-select held for opcode, zero-padded big-endian address and
    // the data byte.
    assert_eq!(transcript[1], std::vec![0x02, 0x00, 0xBE, 0xEF, 0x42]);
    assert_eq!(transcript[2], std::vec![0x03, 0x00, 0xBE, 0xEF, 0x00]);
}

#[test]
fn byte_transfers_balance_their_critical_section() {
    let mut p = MockPlatform::new();
    p.set_scheduler_interrupt_enabled(true);

    let mut ram = serial_ram();
    ram.init(&mut p);
    assert!(
        p.scheduler_interrupt_enabled(),
        "scheduler must be unmasked again after init"
    );
    assert_eq!(p.critical_depth(), 0);

    ram.write(&mut p, MemAddr::new(0x0010), 0x01);
    let _ = ram.read(&mut p, MemAddr::new(0x0010));
    assert!(p.scheduler_interrupt_enabled());
    assert_eq!(p.critical_depth(), 0);
}

#[test]
fn nested_inside_an_outer_critical_section() {
    // A heap operation holds a section of its own around the transfer;
    // the driver's inner section must not unmask the scheduler when it
    // leaves.
    let mut p = MockPlatform::new();
    p.set_scheduler_interrupt_enabled(true);

    let mut ram = serial_ram();
    ram.init(&mut p);

    crate::critical::enter(&mut p);
    ram.write(&mut p, MemAddr::new(0x0020), 0x55);
    assert!(!p.scheduler_interrupt_enabled());
    assert_eq!(p.critical_depth(), 1);
    crate::critical::leave(&mut p);
    assert!(p.scheduler_interrupt_enabled());
}

#[test]
fn mock_ram_window_bounds() {
    let mut p = MockPlatform::new();
    let mut ram = MockRam::new(MemAddr::new(0x0100), 64);

    assert!(ram.contains(MemAddr::new(0x0100)));
    assert!(ram.contains(MemAddr::new(0x013F)));
    assert!(!ram.contains(MemAddr::new(0x0140)));
    assert!(!ram.contains(MemAddr::new(0x00FF)));

    ram.write(&mut p, MemAddr::new(0x0100), 7);
    assert_eq!(ram.read(&mut p, MemAddr::new(0x0100)), 7);
    assert_eq!(ram.raw()[0], 7);
}
