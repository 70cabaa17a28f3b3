// SPDX-License-Identifier: GPL-3.0-or-later

//! Tests for the fatal-error routine.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{Fault, error, fatal};
use siskin_hal::mock::MockPlatform;
use siskin_hal::{Buttons, IrqControl};

#[test]
fn error_displays_and_waits_for_the_chord() {
    let mut p = MockPlatform::new();
    // Not the chord, then the chord, then released.
    p.push_buttons([Buttons::ENTER, Buttons::CHORD, Buttons::CHORD, Buttons::empty()]);

    error(&mut p, "Stack inconsistency");

    assert!(p.displayed("Stack inconsistency"));
}

#[test]
fn interrupt_flag_restored_after_acknowledgment() {
    let mut p = MockPlatform::new();
    p.set_interrupts_enabled(true);
    p.acknowledge_next_fault();
    fatal(&mut p, Fault::Ownership);
    assert!(p.interrupts_enabled());

    let mut p = MockPlatform::new();
    p.set_interrupts_enabled(false);
    p.acknowledge_next_fault();
    fatal(&mut p, Fault::Boundary);
    assert!(!p.interrupts_enabled());
}

#[test]
fn fault_messages() {
    assert_eq!(Fault::StackIntegrity.message(), "Stack inconsistency");
    assert_eq!(Fault::Config.message(), "Heap start init incorrect");
    assert_eq!(std::format!("{}", Fault::Ownership), "Foreign memory chunk");
}
