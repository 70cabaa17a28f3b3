// SPDX-License-Identifier: GPL-3.0-or-later

//! The kernel-state value.
//!
//! All mutable OS state - the platform handle, both heaps, the process
//! and program tables - lives in one [`Kernel`] value, and every
//! public operation is a method on it. The timer ISR needs a
//! statically known handle to this value; providing one is target
//! glue, see [`crate::arch`].
//!
//! Boot order ([`Kernel::init`] then [`Kernel::start`]):
//! 1. timers, buttons and display through [`Platform::init`]
//! 2. both heaps: driver init, then a zeroed allocation map
//! 3. the internal map must start at or above the linker's end of
//!    static data, else a configuration fault
//! 4. the idle program, then every autostart program, through `exec`
//! 5. `start` hands the CPU to the idle slot; the first timer tick
//!    begins real scheduling


use crate::config::{
    self, DEFAULT_PRIORITY, INITIAL_FRAME_SIZE, MAX_PROCESSES, MAX_PROGRAMS, REGISTER_FILE_SIZE,
};
use crate::fault::{self, Fault};
use crate::heap::{AllocStrategy, Heap};
use crate::sched::{
    self, IDLE, Priority, Process, ProcessId, ProcessState, ProgramFn, ProgramId, Scheduler,
    SchedulingStrategy, strategies,
};
use siskin_hal::{Buttons, MemAddr, MemDriver, MemValue, Platform, critical};

/// Which of the kernel's heaps an operation addresses.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum HeapId {
    /// The heap carved out of on-chip SRAM.
    Internal,
    /// The heap on the external serial RAM.
    External,
}

impl HeapId {
    /// Every heap the kernel manages, in lookup order.
    pub const ALL: [Self; 2] = [Self::Internal, Self::External];
}

/// The operating system in one value.
///
/// Generic over the platform and the two heap drivers so the same
/// kernel runs on the target and under host tests against mocks.
pub struct Kernel<P: Platform, I: MemDriver, X: MemDriver> {
    platform: P,
    int_heap: Heap<I>,
    ext_heap: Heap<X>,
    sched: Scheduler,
    dispatcher_entry: MemAddr,
}

/// The default idle program: spin until preempted. Boards that want
/// the classic blinking-dot idle install their own program 0 before
/// `init`.
pub fn idle_loop() {
    loop {
        core::hint::spin_loop();
    }
}

impl<P: Platform, I: MemDriver, X: MemDriver> Kernel<P, I, X> {
    /// Assemble the kernel. `dispatcher_entry` is the address the
    /// synthetic stack of every new process returns into - the
    /// dispatcher trampoline of the target glue, or any marker value
    /// under host tests.
    #[must_use]
    pub fn new(platform: P, int_heap: Heap<I>, ext_heap: Heap<X>, dispatcher_entry: MemAddr) -> Self {
        let mut platform = platform;
        let seed = platform.entropy();
        Self {
            platform,
            int_heap,
            ext_heap,
            sched: Scheduler::new(seed),
            dispatcher_entry,
        }
    }

    /// The platform, for board code and tests.
    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    /// The internal heap.
    pub fn int_heap_mut(&mut self) -> &mut Heap<I> {
        &mut self.int_heap
    }

    /// The external heap.
    pub fn ext_heap_mut(&mut self) -> &mut Heap<X> {
        &mut self.ext_heap
    }

    /// The process slot of `pid`.
    #[must_use]
    pub fn process(&self, pid: ProcessId) -> &Process {
        self.sched.slot(pid)
    }

    // ------------------------------------------------------------------
    // Bootstrap
    // ------------------------------------------------------------------

    /// Bring up the hardware, the heaps and the autostart processes.
    pub fn init(&mut self) {
        self.platform.init(config::SCHEDULER_TICK_PERIOD);
        self.platform.display_clear();
        self.platform.display_line1("Booting Siskin ...");
        log::info!("booting");

        self.int_heap.init(&mut self.platform);
        self.ext_heap.init(&mut self.platform);

        // The internal map must sit above the linker-placed statics;
        // anything else means the image and this configuration
        // disagree about the memory layout.
        if self.int_heap.map_start() < self.platform.statics_end() {
            fault::fatal(&mut self.platform, Fault::Config);
        }

        let programs = self.sched.programs_mut();
        if programs.lookup_function(IDLE).is_none() {
            programs.install(IDLE, idle_loop, true);
        }

        for id in 0..MAX_PROGRAMS as ProgramId {
            if self.sched.programs().autostart(id)
                && self.sched.programs().lookup_function(id).is_some()
                && self.exec(id, DEFAULT_PRIORITY).is_none()
            {
                log::warn!("autostart of program {id} failed");
            }
        }
    }

    /// Hand the CPU to the idle slot. On the target the caller then
    /// restores the idle context and returns into the dispatcher; the
    /// first timer tick takes over from there.
    pub fn start(&mut self) {
        self.sched.set_current(IDLE);
        self.sched.slot_mut(IDLE).state = ProcessState::Running;
        self.platform.set_stack_pointer(self.sched.slot(IDLE).sp);
        log::info!("scheduler started");
    }

    // ------------------------------------------------------------------
    // Programs and processes
    // ------------------------------------------------------------------

    /// Install `program` at a fixed id with its autostart mark, the
    /// compile-time registration of program declarations.
    pub fn install_program(&mut self, id: ProgramId, program: ProgramFn, autostart: bool) -> bool {
        self.sched.programs_mut().install(id, program, autostart)
    }

    /// Register `program` in the first free program slot.
    pub fn register_program(&mut self, program: ProgramFn) -> Option<ProgramId> {
        self.sched.programs_mut().register(program)
    }

    /// The entry point registered at `id`.
    #[must_use]
    pub fn lookup_program_function(&self, id: ProgramId) -> Option<ProgramFn> {
        self.sched.programs().lookup_function(id)
    }

    /// The id under which `program` is registered.
    #[must_use]
    pub fn lookup_program_id(&self, program: ProgramFn) -> Option<ProgramId> {
        self.sched.programs().lookup_id(program)
    }

    /// Number of registered programs.
    #[must_use]
    pub fn number_of_registered_programs(&self) -> usize {
        self.sched.programs().count()
    }

    /// Number of process slots in use.
    #[must_use]
    pub fn number_of_active_procs(&self) -> usize {
        self.sched.active_count()
    }

    /// The process currently on the CPU.
    #[must_use]
    pub fn current_proc(&self) -> ProcessId {
        self.sched.current()
    }

    /// The active scheduling policy.
    #[must_use]
    pub fn get_scheduling_strategy(&self) -> SchedulingStrategy {
        self.sched.strategy()
    }

    /// Switch the scheduling policy (runs its reset hook).
    pub fn set_scheduling_strategy(&mut self, strategy: SchedulingStrategy) {
        self.sched.set_strategy(strategy);
    }

    /// Start a process running `program` with `priority`.
    ///
    /// Finds the first Unused slot and builds the synthetic stack a
    /// context restore expects: the dispatcher's address at the very
    /// bottom (high byte below low byte, the order the return
    /// instruction pops), then a zeroed register file. Returns the new
    /// process id, or `None` when the table is full or the program id
    /// is invalid.
    pub fn exec(&mut self, program: ProgramId, priority: Priority) -> Option<ProcessId> {
        critical::enter(&mut self.platform);

        if self.sched.programs().lookup_function(program).is_none() {
            critical::leave(&mut self.platform);
            return None;
        }
        let Some(pid) = self.sched.find_unused_slot() else {
            critical::leave(&mut self.platform);
            return None;
        };

        // Synthetic stack: return address at the stack bottom, then
        // 33 zero bytes standing in for the register file.
        let bottom = config::process_stack_bottom(pid);
        let entry = self.dispatcher_entry.as_u16();
        let driver = self.int_heap.driver_mut();
        driver.write(&mut self.platform, bottom.sub(1), (entry >> 8) as u8);
        driver.write(&mut self.platform, bottom, (entry & 0xFF) as u8);
        for i in 0..REGISTER_FILE_SIZE as u16 {
            driver.write(&mut self.platform, bottom.sub(2 + i), 0);
        }
        let sp = bottom.sub(INITIAL_FRAME_SIZE as u16);

        *self.sched.slot_mut(pid) = Process {
            state: ProcessState::Ready,
            sp,
            program,
            priority,
            checksum: 0,
        };
        let checksum =
            sched::stack_checksum(self.int_heap.driver_mut(), &mut self.platform, pid, sp);
        self.sched.slot_mut(pid).checksum = checksum;
        strategies::reset_slot(self.sched.info_mut(), pid);

        log::debug!("exec: program {program} -> pid {pid}");
        critical::leave(&mut self.platform);
        Some(pid)
    }

    /// Terminate `pid`: mark the slot Unused and release its memory on
    /// every heap. Refuses the idle slot and slots not in use.
    ///
    /// A process killing itself never returns on the target: the
    /// critical-section depth is reset to 1, the final leave re-arms
    /// the scheduler, and the CPU parks until the next tick hands it
    /// to someone else.
    pub fn kill(&mut self, pid: ProcessId) -> bool {
        critical::enter(&mut self.platform);
        if pid == IDLE
            || pid as usize >= MAX_PROCESSES
            || self.sched.slot(pid).state == ProcessState::Unused
        {
            critical::leave(&mut self.platform);
            return false;
        }

        self.sched.slot_mut(pid).state = ProcessState::Unused;
        self.int_heap.free_process_memory(&mut self.platform, pid);
        self.ext_heap.free_process_memory(&mut self.platform, pid);
        log::debug!("kill: pid {pid}");

        if pid == self.sched.current() {
            // Whatever nesting the dying process held is void now;
            // one leave must re-arm the scheduler.
            self.platform.set_critical_depth(1);
            critical::leave(&mut self.platform);
            self.platform.idle();
            return true;
        }

        critical::leave(&mut self.platform);
        true
    }

    /// The dispatcher body: run the current slot's program, then kill
    /// the current process so returning from a program's main is a
    /// clean exit. The target glue wraps this in the actual trampoline
    /// every synthetic stack returns into.
    pub fn dispatch(&mut self) {
        let program = self.sched.slot(self.sched.current()).program;
        if let Some(entry) = self.sched.programs().lookup_function(program) {
            entry();
        }
        self.kill(self.sched.current());
    }

    // ------------------------------------------------------------------
    // Scheduler tick
    // ------------------------------------------------------------------

    /// The portable body of the timer ISR.
    ///
    /// Runs with interrupts disabled, between the register push and
    /// pop of the target glue: `sp` is the interrupted process's stack
    /// pointer with its register file already saved; the return value
    /// is the stack pointer of the process to resume.
    pub fn schedule(&mut self, sp: MemAddr) -> MemAddr {
        let current = self.sched.current();
        self.sched.slot_mut(current).sp = sp;

        // Policies may burn stack; from here on we run on our own.
        self.platform.set_stack_pointer(config::SCHEDULER_STACK_BOTTOM);

        let checksum =
            sched::stack_checksum(self.int_heap.driver_mut(), &mut self.platform, current, sp);
        self.sched.slot_mut(current).checksum = checksum;

        // A process that killed itself is already Unused; skip it.
        if self.sched.slot(current).state == ProcessState::Running {
            self.sched.slot_mut(current).state = ProcessState::Ready;
        }

        // Developer escape into the task manager.
        if self.platform.input() == Buttons::CHORD {
            self.platform.wait_for_no_input();
            self.platform.task_manager();
        }

        let mut next = self.sched.pick_next();
        while self.sched.slot(next).state == ProcessState::Unused {
            if next == IDLE {
                // Nothing runnable at all - not even idle. Boot never
                // finished or the table was trampled.
                fault::error(&mut self.platform, "No runnable process");
                break;
            }
            next = self.sched.pick_next();
        }

        let expected = self.sched.slot(next).checksum;
        let saved_sp = self.sched.slot(next).sp;
        let actual =
            sched::stack_checksum(self.int_heap.driver_mut(), &mut self.platform, next, saved_sp);
        if actual != expected {
            fault::fatal(&mut self.platform, Fault::StackIntegrity);
        }

        self.sched.set_current(next);
        self.sched.slot_mut(next).state = ProcessState::Running;
        self.platform.set_stack_pointer(saved_sp);
        saved_sp
    }

    // ------------------------------------------------------------------
    // Heap operations
    // ------------------------------------------------------------------

    /// Allocate `size` bytes on `heap` for the current process.
    pub fn malloc(&mut self, heap: HeapId, size: usize) -> MemAddr {
        let owner = self.sched.current();
        match heap {
            HeapId::Internal => self.int_heap.malloc(&mut self.platform, size, owner),
            HeapId::External => self.ext_heap.malloc(&mut self.platform, size, owner),
        }
    }

    /// Release the chunk containing `addr`, provided the current
    /// process owns it.
    pub fn free(&mut self, heap: HeapId, addr: MemAddr) -> bool {
        let owner = self.sched.current();
        self.free_owner_restricted(heap, addr, owner)
    }

    /// Release the chunk containing `addr`, provided `owner` owns it.
    pub fn free_owner_restricted(&mut self, heap: HeapId, addr: MemAddr, owner: ProcessId) -> bool {
        match heap {
            HeapId::Internal => self.int_heap.free_owner_restricted(&mut self.platform, addr, owner),
            HeapId::External => self.ext_heap.free_owner_restricted(&mut self.platform, addr, owner),
        }
    }

    /// Resize the current process's chunk containing `addr`.
    pub fn realloc(&mut self, heap: HeapId, addr: MemAddr, new_size: usize) -> MemAddr {
        let owner = self.sched.current();
        match heap {
            HeapId::Internal => self.int_heap.realloc(&mut self.platform, addr, new_size, owner),
            HeapId::External => self.ext_heap.realloc(&mut self.platform, addr, new_size, owner),
        }
    }

    /// Release everything `pid` owns on `heap`.
    pub fn free_process_memory(&mut self, heap: HeapId, pid: ProcessId) {
        match heap {
            HeapId::Internal => self.int_heap.free_process_memory(&mut self.platform, pid),
            HeapId::External => self.ext_heap.free_process_memory(&mut self.platform, pid),
        }
    }

    /// The allocation strategy of `heap`.
    #[must_use]
    pub fn get_allocation_strategy(&self, heap: HeapId) -> AllocStrategy {
        match heap {
            HeapId::Internal => self.int_heap.strategy(),
            HeapId::External => self.ext_heap.strategy(),
        }
    }

    /// Switch the allocation strategy of `heap`.
    pub fn set_allocation_strategy(&mut self, heap: HeapId, strategy: AllocStrategy) {
        match heap {
            HeapId::Internal => self.int_heap.set_strategy(strategy),
            HeapId::External => self.ext_heap.set_strategy(strategy),
        }
    }

    /// Copy `n` bytes between heap chunks, possibly across heaps.
    /// Both ranges must belong to the current process.
    pub fn memcpy(
        &mut self,
        from_heap: HeapId,
        from: MemAddr,
        to_heap: HeapId,
        to: MemAddr,
        n: usize,
    ) -> bool {
        if n == 0 {
            return true;
        }
        critical::enter(&mut self.platform);
        let owner = self.sched.current();
        let owns_from = match from_heap {
            HeapId::Internal => self.int_heap.owns_range(&mut self.platform, from, n, owner),
            HeapId::External => self.ext_heap.owns_range(&mut self.platform, from, n, owner),
        };
        let owns_to = match to_heap {
            HeapId::Internal => self.int_heap.owns_range(&mut self.platform, to, n, owner),
            HeapId::External => self.ext_heap.owns_range(&mut self.platform, to, n, owner),
        };
        if !owns_from || !owns_to {
            fault::fatal(&mut self.platform, Fault::Ownership);
            critical::leave(&mut self.platform);
            return false;
        }
        for i in 0..n as u16 {
            let byte = match from_heap {
                HeapId::Internal => self.int_heap.read_byte(&mut self.platform, from.add(i)),
                HeapId::External => self.ext_heap.read_byte(&mut self.platform, from.add(i)),
            };
            match to_heap {
                HeapId::Internal => self.int_heap.write_byte(&mut self.platform, to.add(i), byte),
                HeapId::External => self.ext_heap.write_byte(&mut self.platform, to.add(i), byte),
            }
        }
        critical::leave(&mut self.platform);
        true
    }

    /// The map nibble of the use byte at `addr` on `heap`.
    pub fn map_entry(&mut self, heap: HeapId, addr: MemAddr) -> MemValue {
        match heap {
            HeapId::Internal => self.int_heap.map_entry(&mut self.platform, addr),
            HeapId::External => self.ext_heap.map_entry(&mut self.platform, addr),
        }
    }

    /// Owner of the chunk containing `addr` on `heap`; 0 if free.
    pub fn owner_of(&mut self, heap: HeapId, addr: MemAddr) -> ProcessId {
        match heap {
            HeapId::Internal => self.int_heap.owner_of(&mut self.platform, addr),
            HeapId::External => self.ext_heap.owner_of(&mut self.platform, addr),
        }
    }

    /// First byte of the chunk containing `addr` on `heap`.
    pub fn first_byte_of_chunk(&mut self, heap: HeapId, addr: MemAddr) -> MemAddr {
        match heap {
            HeapId::Internal => self.int_heap.first_byte_of_chunk(&mut self.platform, addr),
            HeapId::External => self.ext_heap.first_byte_of_chunk(&mut self.platform, addr),
        }
    }

    /// Size of the allocated chunk containing `addr` on `heap`; 0 for
    /// free regions.
    pub fn chunk_size(&mut self, heap: HeapId, addr: MemAddr) -> usize {
        match heap {
            HeapId::Internal => self.int_heap.chunk_size(&mut self.platform, addr),
            HeapId::External => self.ext_heap.chunk_size(&mut self.platform, addr),
        }
    }

    /// Read a data byte of `heap`.
    pub fn read_byte(&mut self, heap: HeapId, addr: MemAddr) -> MemValue {
        match heap {
            HeapId::Internal => self.int_heap.read_byte(&mut self.platform, addr),
            HeapId::External => self.ext_heap.read_byte(&mut self.platform, addr),
        }
    }

    /// Write a data byte of `heap`.
    pub fn write_byte(&mut self, heap: HeapId, addr: MemAddr, value: MemValue) {
        match heap {
            HeapId::Internal => self.int_heap.write_byte(&mut self.platform, addr, value),
            HeapId::External => self.ext_heap.write_byte(&mut self.platform, addr, value),
        }
    }
}

#[cfg(any(test, feature = "std"))]
impl<P: Platform, I: MemDriver, X: MemDriver> Kernel<P, I, X> {
    /// Simulate one timer tick for host tests.
    ///
    /// Stands in for the target ISR around [`Kernel::schedule`]: push
    /// a 35-byte interrupted context (return address plus register
    /// file) onto the running process's stack, run the scheduler body,
    /// pop the context of whichever process was resumed. Returns
    /// whether the tick fired at all - a masked scheduler interrupt
    /// swallows it, exactly like the real timer would be gated.
    pub fn simulate_tick(&mut self) -> bool {
        if !self.platform.interrupts_enabled() || !self.platform.scheduler_interrupt_enabled() {
            return false;
        }

        let mut sp = self.platform.stack_pointer();
        for _ in 0..INITIAL_FRAME_SIZE {
            self.int_heap.driver_mut().write(&mut self.platform, sp, 0);
            sp = sp.sub(1);
        }

        let resumed = self.schedule(sp);

        self.platform.set_stack_pointer(resumed.add(INITIAL_FRAME_SIZE as u16));
        true
    }
}
