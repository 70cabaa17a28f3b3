// SPDX-License-Identifier: GPL-3.0-or-later

//! Process and program tables.
//!
//! A process is a slot in a fixed array: the slot index is the process
//! id. Slot 0 is the idle process. Each slot carries the saved stack
//! pointer, the program it runs, its priority and a checksum of its
//! stack image; the scheduling policies keep their per-slot state in
//! [`SchedulingInfo`] next to the table.
//!
//! Programs are nullary functions in a second fixed table, with a
//! parallel bitmask marking which of them start at boot. Registration
//! appends; deregistration does not exist.

pub mod strategies;


use crate::config::{self, MAX_PROCESSES, MAX_PROGRAMS};
use siskin_hal::{IrqControl, MemAddr, MemDriver};

use rand::SeedableRng;
use rand::rngs::SmallRng;

/// Index of a slot in the process table.
pub type ProcessId = u8;

/// Index of an entry in the program table.
pub type ProgramId = u8;

/// Scheduling priority, 0 (least) to 255 (most favourable).
pub type Priority = u8;

/// Aging counter of the inactive-aging policy.
pub type Age = u16;

/// XOR fold of a process's stack image.
pub type StackChecksum = u8;

/// A program's entry point. Programs are nullary and keep only
/// process-local state.
pub type ProgramFn = fn();

/// The idle process's slot and program id.
pub const IDLE: ProcessId = 0;

/// Lifecycle state of a process slot.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ProcessState {
    /// The slot is empty.
    #[default]
    Unused,
    /// Runnable, waiting to be picked.
    Ready,
    /// Currently on the CPU. At most one slot at a time.
    Running,
    /// Not runnable until something unblocks it.
    Blocked,
}

/// The scheduling policies.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SchedulingStrategy {
    /// Rotate through the Ready slots, one tick each.
    Even,
    /// Uniformly random among the Ready slots.
    Random,
    /// Priority-sized time slices, rotating evenly between them.
    RoundRobin,
    /// Waiting slots age by their priority; the oldest wins.
    InactiveAging,
    /// Keep the current process until it gives up the CPU for good.
    RunToCompletion,
}

/// One slot of the process table.
#[derive(Clone, Copy, Debug)]
pub struct Process {
    /// Lifecycle state.
    pub state: ProcessState,
    /// Saved top-of-stack at suspension time.
    pub sp: MemAddr,
    /// The program this slot runs.
    pub program: ProgramId,
    /// Scheduling priority.
    pub priority: Priority,
    /// XOR fold of the stack image at save time.
    pub checksum: StackChecksum,
}

impl Process {
    /// An empty slot.
    #[must_use]
    pub const fn unused() -> Self {
        Self {
            state: ProcessState::Unused,
            sp: MemAddr::null(),
            program: 0,
            priority: 0,
            checksum: 0,
        }
    }
}

impl Default for Process {
    fn default() -> Self {
        Self::unused()
    }
}

/// The program table: up to [`MAX_PROGRAMS`] entry points plus the
/// autostart bitmask.
pub struct ProgramTable {
    entries: [Option<ProgramFn>; MAX_PROGRAMS],
    autostart: u16,
}

impl ProgramTable {
    /// An empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: [None; MAX_PROGRAMS],
            autostart: 0,
        }
    }

    /// Install `program` at a fixed id, the way program declarations
    /// do at boot. Fails when a different program already sits there.
    ///
    /// A program's identity is its entry point, hence the pointer
    /// comparison.
    #[allow(unknown_lints, unpredictable_function_pointer_comparisons)]
    pub fn install(&mut self, id: ProgramId, program: ProgramFn, autostart: bool) -> bool {
        let Some(slot) = self.entries.get_mut(id as usize) else {
            return false;
        };
        if slot.is_some_and(|existing| existing != program) {
            return false;
        }
        *slot = Some(program);
        if autostart {
            self.autostart |= 1 << id;
        } else {
            self.autostart &= !(1 << id);
        }
        true
    }

    /// Register `program` in the first free slot (idempotent for a
    /// program already present). Returns its id, or `None` when the
    /// table is full.
    pub fn register(&mut self, program: ProgramFn) -> Option<ProgramId> {
        if let Some(id) = self.lookup_id(program) {
            return Some(id);
        }
        let id = self.entries.iter().position(Option::is_none)?;
        self.entries[id] = Some(program);
        Some(id as ProgramId)
    }

    /// The entry point registered at `id`.
    #[must_use]
    pub fn lookup_function(&self, id: ProgramId) -> Option<ProgramFn> {
        self.entries.get(id as usize).copied().flatten()
    }

    /// The id under which `program` is registered.
    #[allow(unknown_lints, unpredictable_function_pointer_comparisons)]
    #[must_use]
    pub fn lookup_id(&self, program: ProgramFn) -> Option<ProgramId> {
        self.entries
            .iter()
            .position(|entry| *entry == Some(program))
            .map(|id| id as ProgramId)
    }

    /// Whether the program at `id` starts at boot.
    #[must_use]
    pub fn autostart(&self, id: ProgramId) -> bool {
        (id as usize) < MAX_PROGRAMS && self.autostart & (1 << id) != 0
    }

    /// Number of registered programs.
    #[must_use]
    pub fn count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_some()).count()
    }
}

impl Default for ProgramTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared and per-slot state of the scheduling policies.
pub struct SchedulingInfo {
    /// Remaining ticks of the round-robin time slice.
    pub time_slice: u8,
    /// Inactive-aging counters, one per slot.
    pub ages: [Age; MAX_PROCESSES],
    /// Pseudorandom source of the Random policy.
    pub rng: SmallRng,
}

impl SchedulingInfo {
    /// Fresh policy state, randomness seeded from platform entropy.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            time_slice: 0,
            ages: [0; MAX_PROCESSES],
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

/// The process table with everything the policies need around it.
pub struct Scheduler {
    processes: [Process; MAX_PROCESSES],
    programs: ProgramTable,
    current: ProcessId,
    strategy: SchedulingStrategy,
    info: SchedulingInfo,
}

impl Scheduler {
    /// An empty scheduler, all slots unused.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            processes: [Process::unused(); MAX_PROCESSES],
            programs: ProgramTable::new(),
            current: IDLE,
            strategy: SchedulingStrategy::Even,
            info: SchedulingInfo::new(seed),
        }
    }

    /// The slot of `pid`.
    #[must_use]
    pub fn slot(&self, pid: ProcessId) -> &Process {
        &self.processes[pid as usize]
    }

    /// Mutable slot of `pid`.
    pub fn slot_mut(&mut self, pid: ProcessId) -> &mut Process {
        &mut self.processes[pid as usize]
    }

    /// All slots, for the policies.
    #[must_use]
    pub fn processes(&self) -> &[Process; MAX_PROCESSES] {
        &self.processes
    }

    /// The id of the slot currently on the CPU.
    #[must_use]
    pub const fn current(&self) -> ProcessId {
        self.current
    }

    /// Record which slot is on the CPU.
    pub fn set_current(&mut self, pid: ProcessId) {
        self.current = pid;
    }

    /// The program table.
    #[must_use]
    pub const fn programs(&self) -> &ProgramTable {
        &self.programs
    }

    /// Mutable program table.
    pub fn programs_mut(&mut self) -> &mut ProgramTable {
        &mut self.programs
    }

    /// The active scheduling policy.
    #[must_use]
    pub const fn strategy(&self) -> SchedulingStrategy {
        self.strategy
    }

    /// Switch the scheduling policy and run its reset hook.
    pub fn set_strategy(&mut self, strategy: SchedulingStrategy) {
        self.strategy = strategy;
        strategies::reset_strategy(strategy, &self.processes, self.current, &mut self.info);
    }

    /// Policy state, for the reset hooks.
    pub fn info_mut(&mut self) -> &mut SchedulingInfo {
        &mut self.info
    }

    /// Ask the active policy for the next process id.
    pub fn pick_next(&mut self) -> ProcessId {
        strategies::select(self.strategy, &self.processes, self.current, &mut self.info)
    }

    /// First Unused slot, if any.
    #[must_use]
    pub fn find_unused_slot(&self) -> Option<ProcessId> {
        self.processes
            .iter()
            .position(|slot| slot.state == ProcessState::Unused)
            .map(|pid| pid as ProcessId)
    }

    /// Number of slots not Unused.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.processes
            .iter()
            .filter(|slot| slot.state != ProcessState::Unused)
            .count()
    }
}

/// XOR fold of `pid`'s stack image: every byte from one above the
/// saved stack pointer down to the fixed bottom of the slot's stack
/// region.
///
/// The checksum catches both overflow into a neighbouring stack and
/// corruption of a suspended slot's register image.
pub fn stack_checksum<D: MemDriver>(
    driver: &mut D,
    irq: &mut dyn IrqControl,
    pid: ProcessId,
    sp: MemAddr,
) -> StackChecksum {
    let bottom = config::process_stack_bottom(pid);
    let mut sum = 0;
    let mut addr = sp.add(1);
    while addr <= bottom {
        sum ^= driver.read(irq, addr);
        addr = addr.add(1);
    }
    sum
}
