// SPDX-License-Identifier: GPL-3.0-or-later

//! Memory drivers.
//!
//! A memory driver abstracts byte read/write over one contiguous
//! address window. The kernel's heaps sit on top of drivers and never
//! touch memory directly, which is what lets the external serial RAM
//! look exactly like the internal SRAM one level up.
//!
//! Drivers never report errors: an out-of-window address is a caller
//! bug and the heap layer checks for it before it gets here.

#[cfg(test)]
mod mem_test;

use crate::addr::{MemAddr, MemValue};
use crate::platform::IrqControl;
use crate::spi::SpiBus;
use crate::critical;

/// Byte read/write over a contiguous address window.
///
/// `read`/`write` take the interrupt controls so a driver whose
/// transfers must not be preempted (the serial RAM) can open its own
/// nested critical section per byte.
pub trait MemDriver {
    /// One-time preparation of the backing memory.
    fn init(&mut self, irq: &mut dyn IrqControl);

    /// Read the byte at `addr`.
    fn read(&mut self, irq: &mut dyn IrqControl, addr: MemAddr) -> MemValue;

    /// Write the byte at `addr`.
    fn write(&mut self, irq: &mut dyn IrqControl, addr: MemAddr, value: MemValue);

    /// First address of the window this driver serves.
    fn start(&self) -> MemAddr;

    /// Size of the window in bytes.
    fn size(&self) -> usize;

    /// Whether `addr` falls inside the window.
    fn contains(&self, addr: MemAddr) -> bool {
        addr >= self.start() && (addr.diff(self.start()) as usize) < self.size()
    }
}

/// The on-chip SRAM, addressed directly.
///
/// Reads and writes are single volatile accesses; nothing can preempt
/// them halfway, so no critical section is needed here.
pub struct Sram {
    start: MemAddr,
    size: usize,
}

impl Sram {
    /// Describe the on-chip SRAM window.
    ///
    /// # Safety
    ///
    /// `[start, start + size)` must be real, always-mapped RAM on the
    /// running machine, and nothing outside the kernel may alias the
    /// parts of it handed to heaps and stacks.
    #[must_use]
    pub const unsafe fn new(start: MemAddr, size: usize) -> Self {
        Self { start, size }
    }
}

impl MemDriver for Sram {
    fn init(&mut self, _irq: &mut dyn IrqControl) {
        // On-chip RAM needs no preparation.
    }

    fn read(&mut self, _irq: &mut dyn IrqControl, addr: MemAddr) -> MemValue {
        // SAFETY: the window was promised valid in `new`.
        unsafe { core::ptr::read_volatile(addr.as_u16() as usize as *const MemValue) }
    }

    fn write(&mut self, _irq: &mut dyn IrqControl, addr: MemAddr, value: MemValue) {
        // SAFETY: the window was promised valid in `new`.
        unsafe { core::ptr::write_volatile(addr.as_u16() as usize as *mut MemValue, value) }
    }

    fn start(&self) -> MemAddr {
        self.start
    }

    fn size(&self) -> usize {
        self.size
    }
}

/// Command set of the serial RAM chip (byte mode).
mod cmd {
    /// Write the mode register.
    pub const WRITE_MODE: u8 = 0x01;
    /// Mode-register value selecting byte read/write.
    pub const MODE_BYTE: u8 = 0x00;
    /// Write one data byte at an address.
    pub const WRITE: u8 = 0x02;
    /// Read one data byte at an address.
    pub const READ: u8 = 0x03;
}

/// Serial-attached RAM behind an [`SpiBus`].
///
/// Every command runs with the chip selected for the whole opcode +
/// 24-bit big-endian address (high byte zero) + data sequence, inside
/// a critical section so a scheduler tick cannot split the select
/// window between two processes.
pub struct SerialRam<S> {
    bus: S,
    start: MemAddr,
    size: usize,
}

impl<S: SpiBus> SerialRam<S> {
    /// Wrap the bus the RAM chip is wired to, serving `[start,
    /// start + size)`.
    #[must_use]
    pub const fn new(bus: S, start: MemAddr, size: usize) -> Self {
        Self { bus, start, size }
    }

    /// The bus, for board code that shares it.
    pub fn bus_mut(&mut self) -> &mut S {
        &mut self.bus
    }

    fn send_addr(&mut self, addr: MemAddr) {
        // 24-bit address, big endian; the chip ignores the high byte
        // on 16-bit parts but the protocol always carries it.
        self.bus.transfer(0x00);
        self.bus.transfer((addr.as_u16() >> 8) as u8);
        self.bus.transfer((addr.as_u16() & 0xFF) as u8);
    }
}

impl<S: SpiBus> MemDriver for SerialRam<S> {
    fn init(&mut self, irq: &mut dyn IrqControl) {
        critical::enter(irq);
        self.bus.init();
        self.bus.select();
        self.bus.transfer(cmd::WRITE_MODE);
        self.bus.transfer(cmd::MODE_BYTE);
        self.bus.deselect();
        critical::leave(irq);
    }

    fn read(&mut self, irq: &mut dyn IrqControl, addr: MemAddr) -> MemValue {
        critical::enter(irq);
        self.bus.select();
        self.bus.transfer(cmd::READ);
        self.send_addr(addr);
        let value = self.bus.receive();
        self.bus.deselect();
        critical::leave(irq);
        value
    }

    fn write(&mut self, irq: &mut dyn IrqControl, addr: MemAddr, value: MemValue) {
        critical::enter(irq);
        self.bus.select();
        self.bus.transfer(cmd::WRITE);
        self.send_addr(addr);
        self.bus.transfer(value);
        self.bus.deselect();
        critical::leave(irq);
    }

    fn start(&self) -> MemAddr {
        self.start
    }

    fn size(&self) -> usize {
        self.size
    }
}
