// SPDX-License-Identifier: GPL-3.0-or-later

//! Serial bus abstraction for the external RAM.
//!
//! The external RAM chip hangs off a 3-wire SPI bus driven MSB-first in
//! mode 0 at maximum clock. The bus is full duplex: every transferred
//! byte clocks one byte back in, so receiving is transferring a dummy
//! byte and keeping the answer.
//!
//! Chip-select framing belongs to the caller: a whole command (opcode,
//! address, data) runs inside one select window, and the
//! [`crate::mem::SerialRam`] driver keeps the window free of preemption
//! with a critical section.

/// Master side of the serial bus, one slave select.
pub trait SpiBus {
    /// Configure the bus pins and clock. Called once at boot.
    fn init(&mut self);

    /// Pull the slave's chip-select low.
    fn select(&mut self);

    /// Release the slave's chip-select.
    fn deselect(&mut self);

    /// Clock one byte out and the slave's answer byte in.
    fn transfer(&mut self, data: u8) -> u8;

    /// Clock a dummy byte out and keep what the slave answers.
    fn receive(&mut self) -> u8 {
        self.transfer(0x00)
    }
}
