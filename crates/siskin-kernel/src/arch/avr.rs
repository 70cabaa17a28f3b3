// SPDX-License-Identifier: GPL-3.0-or-later

//! AVR context switch: the naked timer ISR and the register
//! save/restore sequences.
//!
//! The ISR must not get a compiler prologue - the whole point is that
//! the register push lands on the *interrupted* process's stack before
//! anything else runs, and that the pop happens from the *selected*
//! process's stack at the very end. The ISR is therefore a naked
//! function whose body is one assembly block: save the register file,
//! hand the stack pointer to a C-ABI shim around
//! [`crate::Kernel::schedule`], retarget SP to what it returns,
//! restore the register file, `reti`.
//!
//! Boards bind their concrete kernel type with [`scheduler_isr!`]:
//!
//! ```ignore
//! static KERNEL: KernelCell<Board, Sram, SerialRam<BoardSpi>> = KernelCell::new();
//! siskin_kernel::scheduler_isr!(KERNEL, Board, Sram, SerialRam<BoardSpi>);
//! ```

use core::cell::UnsafeCell;

use crate::kernel::Kernel;
use siskin_hal::{MemDriver, Platform};

/// Push the 32 general-purpose registers and SREG onto the current
/// stack, in the fixed order [`restore_context!`] undoes. For use in
/// non-naked context-switch glue; the ISR spells the same sequence
/// out inside its one assembly block.
#[macro_export]
macro_rules! save_context {
    () => {
        core::arch::asm!(
            "push r31", "push r30", "push r29", "push r28", "push r27", "push r26",
            "push r25", "push r24", "push r23", "push r22", "push r21", "push r20",
            "push r19", "push r18", "push r17", "push r16", "push r15", "push r14",
            "push r13", "push r12", "push r11", "push r10", "push r9", "push r8",
            "push r7", "push r6", "push r5", "push r4", "push r3", "push r2",
            "push r1", "push r0",
            "in   r0, 0x3F", // SREG
            "push r0",
            "clr  r1",       // the ABI zero register, trashed above
            options(nostack)
        )
    };
}

/// Pop SREG and the 32 general-purpose registers pushed by
/// [`save_context!`].
#[macro_export]
macro_rules! restore_context {
    () => {
        core::arch::asm!(
            "pop  r0",
            "out  0x3F, r0", // SREG
            "pop  r0", "pop r1", "pop r2", "pop r3", "pop r4", "pop r5",
            "pop  r6", "pop r7", "pop r8", "pop r9", "pop r10", "pop r11",
            "pop  r12", "pop r13", "pop r14", "pop r15", "pop r16", "pop r17",
            "pop  r18", "pop r19", "pop r20", "pop r21", "pop r22", "pop r23",
            "pop  r24", "pop r25", "pop r26", "pop r27", "pop r28", "pop r29",
            "pop  r30", "pop r31",
            options(nostack)
        )
    };
}

/// The statically known home of the board's kernel value.
///
/// Single-core, and the ISR runs with interrupts disabled, so accesses
/// never overlap; the cell hands out a raw mutable reference on that
/// understanding.
pub struct KernelCell<P: Platform, I: MemDriver, X: MemDriver> {
    inner: UnsafeCell<Option<Kernel<P, I, X>>>,
}

// SAFETY: single CPU; the only concurrent accessor is the ISR, which
// runs with interrupts globally disabled.
unsafe impl<P: Platform, I: MemDriver, X: MemDriver> Sync for KernelCell<P, I, X> {}

impl<P: Platform, I: MemDriver, X: MemDriver> KernelCell<P, I, X> {
    /// An empty cell, to be filled once at boot.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(None),
        }
    }

    /// Move the booted kernel in.
    ///
    /// # Safety
    ///
    /// Call once, before the scheduler timer is armed.
    pub unsafe fn install(&self, kernel: Kernel<P, I, X>) {
        // SAFETY: caller guarantees no ISR can race this store.
        unsafe { *self.inner.get() = Some(kernel) };
    }

    /// The kernel, for the ISR and the dispatcher.
    ///
    /// # Safety
    ///
    /// Only from contexts that cannot overlap another borrow: the ISR
    /// (interrupts disabled) or code holding a critical section.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get(&self) -> &mut Kernel<P, I, X> {
        // SAFETY: caller guarantees exclusive access; the cell is
        // filled during boot.
        unsafe { (*self.inner.get()).as_mut().unwrap_unchecked() }
    }
}

impl<P: Platform, I: MemDriver, X: MemDriver> Default for KernelCell<P, I, X> {
    fn default() -> Self {
        Self::new()
    }
}

/// Emit the timer-compare ISR, the dispatcher trampoline and the
/// first-process handoff for a concrete kernel type held in a
/// [`KernelCell`].
#[macro_export]
macro_rules! scheduler_isr {
    ($cell:path, $p:ty, $i:ty, $x:ty) => {
        /// C-ABI hop between the naked ISR and the portable scheduler
        /// body: takes the interrupted stack pointer, returns the one
        /// to resume.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn __siskin_schedule(sp: u16) -> u16 {
            // SAFETY: the ISR runs with interrupts globally disabled.
            unsafe { $cell.get() }
                .schedule($crate::MemAddr::new(sp))
                .as_u16()
        }

        /// Timer-compare ISR of the scheduler tick. Naked: the save
        /// and restore sequences below are the whole prologue and
        /// epilogue, mirroring `save_context!`/`restore_context!`.
        #[unsafe(naked)]
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn __vector_timer_compare() {
            core::arch::naked_asm!(
                // Save the interrupted process's register file onto
                // its own stack (PC is already there).
                "push r31", "push r30", "push r29", "push r28", "push r27", "push r26",
                "push r25", "push r24", "push r23", "push r22", "push r21", "push r20",
                "push r19", "push r18", "push r17", "push r16", "push r15", "push r14",
                "push r13", "push r12", "push r11", "push r10", "push r9", "push r8",
                "push r7", "push r6", "push r5", "push r4", "push r3", "push r2",
                "push r1", "push r0",
                "in   r0, 0x3F",
                "push r0",
                "clr  r1",
                // SP into the argument registers, pick the next
                // process, returned SP back into the hardware.
                "in   r24, 0x3D",
                "in   r25, 0x3E",
                "call {schedule}",
                "out  0x3D, r24",
                "out  0x3E, r25",
                // Restore the selected process's register file.
                "pop  r0",
                "out  0x3F, r0",
                "pop  r0", "pop r1", "pop r2", "pop r3", "pop r4", "pop r5",
                "pop  r6", "pop r7", "pop r8", "pop r9", "pop r10", "pop r11",
                "pop  r12", "pop r13", "pop r14", "pop r15", "pop r16", "pop r17",
                "pop  r18", "pop r19", "pop r20", "pop r21", "pop r22", "pop r23",
                "pop  r24", "pop r25", "pop r26", "pop r27", "pop r28", "pop r29",
                "pop  r30", "pop r31",
                "reti",
                schedule = sym __siskin_schedule,
            )
        }

        /// Trampoline every process enters first and returns into last:
        /// run the slot's program, reap the process when it returns.
        #[unsafe(no_mangle)]
        pub extern "C" fn dispatcher() {
            // SAFETY: table accesses inside take their own critical
            // sections.
            unsafe { $cell.get() }.dispatch();
            loop {}
        }

        /// Hand the CPU to the idle process after `Kernel::start`:
        /// restore its zeroed context and return into the dispatcher.
        ///
        /// # Safety
        ///
        /// Call once, at the end of boot, with the kernel installed
        /// and `start` already run (SP points at idle's synthetic
        /// frame).
        pub unsafe fn start_first_process() -> ! {
            unsafe {
                $crate::restore_context!();
                core::arch::asm!("ret", options(noreturn));
            }
        }
    };
}
