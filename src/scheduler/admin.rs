//! Administrative and introspection operations over the process table.
//!
//! None of this is on the scheduling hot path, but it mutates the same
//! shared state, so every operation is its own short scan under the
//! table lock.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write;

use crate::error::{ProcError, ProcResult};
use crate::scheduler::pcb::Pid;
use crate::scheduler::policy::mhrrn_score;
use crate::scheduler::{CpuId, PTABLE};

/// Children of a process, by true parent link and by the auxiliary
/// debugger-assigned link.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ChildrenReport {
    pub children: Vec<Pid>,
    pub debug_children: Vec<Pid>,
}

/// Override a process's queue tier directly, bypassing aging.
pub fn set_queue_level(pid: Pid, level: u32) -> ProcResult<()> {
    if !(1..=3).contains(&level) {
        return Err(ProcError::BadQueueLevel(level));
    }
    let mut table = PTABLE.lock();
    let slot = table.find_live(pid).ok_or(ProcError::NoSuchProcess(pid))?;
    table.procs[slot].queue = level;
    Ok(())
}

/// Set one process's HRRN priority bias.
pub fn set_priority(pid: Pid, priority: i64) -> ProcResult<()> {
    let mut table = PTABLE.lock();
    let slot = table.find_live(pid).ok_or(ProcError::NoSuchProcess(pid))?;
    table.procs[slot].priority = priority;
    Ok(())
}

/// Set every live process's HRRN priority bias.
pub fn set_priority_all(priority: i64) {
    let mut table = PTABLE.lock();
    for p in table.procs.iter_mut() {
        if p.is_live() {
            p.priority = priority;
        }
    }
}

/// Record the calling process as `target`'s debugger parent. Pure
/// introspection metadata; the true parent link is untouched.
pub fn set_debug_parent(cpu: CpuId, target: Pid) -> ProcResult<()> {
    let mut table = PTABLE.lock();
    let me = table
        .current_slot(cpu)
        .expect("set_debug_parent without a running process");
    let my_pid = table.procs[me].pid;
    let slot = table
        .find_live(target)
        .ok_or(ProcError::NoSuchProcess(target))?;
    table.procs[slot].debug_parent = Some(my_pid);
    Ok(())
}

/// Pid of a process's true parent.
pub fn parent_of(pid: Pid) -> ProcResult<Pid> {
    let table = PTABLE.lock();
    let slot = table.find_live(pid).ok_or(ProcError::NoSuchProcess(pid))?;
    let parent = table.procs[slot].parent.ok_or(ProcError::NoParent(pid))?;
    match table.resolve(parent) {
        Some(pslot) => Ok(table.procs[pslot].pid),
        None => Err(ProcError::NoParent(pid)),
    }
}

/// Every child of `pid`, by true link and by debugger link.
pub fn children_of(pid: Pid) -> ProcResult<ChildrenReport> {
    let table = PTABLE.lock();
    let slot = table.find_live(pid).ok_or(ProcError::NoSuchProcess(pid))?;
    let mut report = ChildrenReport::default();
    for p in table.procs.iter() {
        if !p.is_live() {
            continue;
        }
        if let Some(parent) = p.parent {
            if parent.slot == slot && parent.pid == pid {
                report.children.push(p.pid);
            }
        }
        if p.debug_parent == Some(pid) {
            report.debug_children.push(p.pid);
        }
    }
    Ok(report)
}

/// Render the full table as a human-readable report: one row per live
/// process with its scheduling state and current MHRRN score.
pub fn snapshot() -> String {
    let table = PTABLE.lock();
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<12}{:<6}{:<10}{:<7}{:<8}{:<9}{:<10}{}",
        "name", "pid", "state", "queue", "cycles", "arrival", "priority", "mhrrn"
    );
    let _ = writeln!(out, "{}", ".".repeat(68));
    for p in table.procs.iter() {
        if !p.is_live() {
            continue;
        }
        let _ = writeln!(
            out,
            "{:<12}{:<6}{:<10}{:<7}{:<8}{:<9}{:<10}{}",
            p.name,
            p.pid.0,
            p.state.as_str(),
            p.queue,
            p.executed_cycles,
            p.arrival_time,
            p.priority,
            mhrrn_score(p)
        );
    }
    out
}
