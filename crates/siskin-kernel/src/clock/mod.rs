// SPDX-License-Identifier: GPL-3.0-or-later

//! Busy-wait delays over the coarse system clock.
//!
//! The platform keeps a free-running tick counter; `delay_ms` spins on
//! it until the target time passes. The wait is plain user code - it
//! holds no critical section, so the scheduler preempts it freely and
//! the delay is a lower bound, not a promise.

#[cfg(test)]
mod clock_test;

use crate::config::TICKS_PER_MS;
use siskin_hal::{Platform, Time};

/// Busy-wait for at least `ms` milliseconds.
///
/// Handles the tick counter wrapping past `Time::MAX` the same way as
/// a clock face: when the target lands "behind" the start, wait out
/// the wrap first.
pub fn delay_ms<P: Platform>(p: &mut P, ms: u16) {
    let start = p.now();
    let destination = start.wrapping_add(Time::from(ms) * TICKS_PER_MS);

    if start <= destination {
        loop {
            let now = p.now();
            if !(start <= now && now < destination) {
                break;
            }
        }
    } else {
        loop {
            let now = p.now();
            if !(now < destination || start <= now) {
                break;
            }
        }
    }
}
