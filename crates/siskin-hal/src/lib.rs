// SPDX-License-Identifier: GPL-3.0-or-later

//! # Siskin HAL
//!
//! Hardware abstraction for the Siskin kernel, targeting small 8-bit
//! microcontrollers with a 16-bit address space.
//!
//! This crate provides:
//! - [`MemAddr`]/[`MemValue`] - the byte-addressed memory vocabulary
//! - [`Platform`] - interrupt flag, scheduler-timer mask, stack pointer,
//!   buttons, display and clock of the target board
//! - [`critical`] - the nested critical-section controller
//! - [`MemDriver`] - byte read/write over a contiguous address window,
//!   with an internal-SRAM and a serial-attached-RAM implementation
//! - [`SpiBus`] - the 3-wire serial bus the external RAM hangs off
//! - [`mock`] - host-side implementations of all of the above, so the
//!   kernel can be exercised without a board
//!
//! The traits are the narrow seam between the kernel core and board
//! support: real display, button and SPI peripherals live with the
//! board crate, not here.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[cfg(any(test, feature = "std"))]
extern crate std;

mod addr;
pub mod critical;
pub mod mem;
pub mod platform;
pub mod spi;

#[cfg(any(test, feature = "std"))]
pub mod mock;

pub use addr::{MemAddr, MemValue};
pub use mem::MemDriver;
pub use platform::{Buttons, IrqControl, Platform, Time};
pub use spi::SpiBus;
