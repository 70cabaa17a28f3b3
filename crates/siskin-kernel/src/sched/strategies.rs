// SPDX-License-Identifier: GPL-3.0-or-later

//! Scheduling policies.
//!
//! Each policy maps `(slots, current)` to the next process id. Shared
//! rules: never an Unused or Blocked slot, never the idle slot while
//! any other slot is Ready, and the idle slot (0) when nothing else
//! is runnable. Run-to-completion is the one policy allowed to sit on
//! a Ready process forever.

use super::{IDLE, Process, ProcessId, ProcessState, SchedulingInfo, SchedulingStrategy};
use crate::config::MAX_PROCESSES;

use rand::Rng;

/// Dispatch to the active policy.
pub fn select(
    strategy: SchedulingStrategy,
    processes: &[Process; MAX_PROCESSES],
    current: ProcessId,
    info: &mut SchedulingInfo,
) -> ProcessId {
    match strategy {
        SchedulingStrategy::Even => even(processes, current),
        SchedulingStrategy::Random => random(processes, current, info),
        SchedulingStrategy::RoundRobin => round_robin(processes, current, info),
        SchedulingStrategy::InactiveAging => inactive_aging(processes, current, info),
        SchedulingStrategy::RunToCompletion => run_to_completion(processes, current),
    }
}

/// The next Ready slot after `current` in circular order, skipping the
/// idle slot; 0 when no other slot is Ready.
pub fn next_ready(processes: &[Process; MAX_PROCESSES], current: ProcessId) -> ProcessId {
    let len = MAX_PROCESSES as ProcessId;
    let after = (current + 1) % len;
    let mut candidate = after;
    loop {
        if candidate != IDLE && processes[candidate as usize].state == ProcessState::Ready {
            return candidate;
        }
        candidate = (candidate + 1) % len;
        if candidate == after {
            return IDLE;
        }
    }
}

/// Even: rotate to the next Ready slot, memoryless.
pub fn even(processes: &[Process; MAX_PROCESSES], current: ProcessId) -> ProcessId {
    next_ready(processes, current)
}

/// How many non-idle slots are Ready.
fn count_ready(processes: &[Process; MAX_PROCESSES]) -> usize {
    processes
        .iter()
        .enumerate()
        .filter(|(pid, slot)| *pid != IDLE as usize && slot.state == ProcessState::Ready)
        .count()
}

/// Random: a uniform draw among the Ready slots, realized by walking
/// the even sequence a random number of steps.
pub fn random(
    processes: &[Process; MAX_PROCESSES],
    current: ProcessId,
    info: &mut SchedulingInfo,
) -> ProcessId {
    let count = count_ready(processes);
    if count == 0 {
        return IDLE;
    }
    let steps = info.rng.gen_range(0..count);
    let mut next = current;
    for _ in 0..=steps {
        next = next_ready(processes, next);
    }
    next
}

/// Round robin: stay on `current` while the shared time slice lasts,
/// then rotate evenly and reload the slice from the next slot's
/// priority.
pub fn round_robin(
    processes: &[Process; MAX_PROCESSES],
    current: ProcessId,
    info: &mut SchedulingInfo,
) -> ProcessId {
    if processes[current as usize].state == ProcessState::Ready
        && current != IDLE
        && info.time_slice > 1
    {
        info.time_slice -= 1;
        return current;
    }
    let next = next_ready(processes, current);
    info.time_slice = processes[next as usize].priority;
    next
}

/// Inactive aging: every waiting slot ages by its priority, the
/// oldest wins; ties go to the higher priority, then to the lower id.
/// The winner's age restarts at its priority.
pub fn inactive_aging(
    processes: &[Process; MAX_PROCESSES],
    current: ProcessId,
    info: &mut SchedulingInfo,
) -> ProcessId {
    for pid in 1..MAX_PROCESSES {
        if pid != current as usize && processes[pid].state == ProcessState::Ready {
            info.ages[pid] = info.ages[pid].saturating_add(processes[pid].priority.into());
        }
    }

    let mut winner: Option<usize> = None;
    for pid in 1..MAX_PROCESSES {
        if processes[pid].state != ProcessState::Ready {
            continue;
        }
        match winner {
            None => winner = Some(pid),
            Some(best) => {
                if info.ages[pid] > info.ages[best]
                    || (info.ages[pid] == info.ages[best]
                        && processes[pid].priority > processes[best].priority)
                {
                    winner = Some(pid);
                }
            }
        }
    }

    let Some(pid) = winner else {
        return IDLE;
    };
    info.ages[pid] = processes[pid].priority.into();
    pid as ProcessId
}

/// Run to completion: keep `current` while it stays Ready, otherwise
/// rotate evenly.
pub fn run_to_completion(processes: &[Process; MAX_PROCESSES], current: ProcessId) -> ProcessId {
    if current != IDLE && processes[current as usize].state == ProcessState::Ready {
        return current;
    }
    next_ready(processes, current)
}

/// Reset hook for a policy switch: round robin seeds its time slice
/// from the current slot's priority, inactive aging starts all ages
/// over.
pub fn reset_strategy(
    strategy: SchedulingStrategy,
    processes: &[Process; MAX_PROCESSES],
    current: ProcessId,
    info: &mut SchedulingInfo,
) {
    match strategy {
        SchedulingStrategy::RoundRobin => {
            info.time_slice = processes[current as usize].priority;
        }
        SchedulingStrategy::InactiveAging => {
            info.ages = [0; MAX_PROCESSES];
        }
        _ => {}
    }
}

/// Reset hook for a freshly started process: its per-slot policy state
/// must not leak from a previous occupant.
pub fn reset_slot(info: &mut SchedulingInfo, pid: ProcessId) {
    info.ages[pid as usize] = 0;
}
