// SPDX-License-Identifier: GPL-3.0-or-later

//! Tests for the delay loop.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::delay_ms;
use crate::config::TICKS_PER_MS;
use siskin_hal::Platform;
use siskin_hal::mock::MockPlatform;

#[test]
fn waits_out_the_requested_ticks() {
    let mut p = MockPlatform::new();
    p.set_clock_step(TICKS_PER_MS);

    let before = p.now();
    delay_ms(&mut p, 5);
    let after = p.now();

    assert!(after - before >= 5 * TICKS_PER_MS);
}

#[test]
fn zero_delay_returns_immediately() {
    let mut p = MockPlatform::new();
    let before = p.now();
    delay_ms(&mut p, 0);
    let after = p.now();
    // One sample for the start, one for the loop exit check, one for
    // `after` itself.
    assert!(after - before <= 3);
}

#[test]
fn survives_clock_wraparound() {
    let mut p = MockPlatform::new();
    // Start just below the wrap so the destination lands behind the
    // start value.
    p.set_clock(u32::MAX - TICKS_PER_MS);
    p.set_clock_step(TICKS_PER_MS);

    delay_ms(&mut p, 3);
    // Reaching here is the assertion: the wait must not hang on the
    // wrapped counter.
}
