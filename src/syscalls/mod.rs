use log::{info, warn};

use crate::error::ProcResult;
use crate::ports::CpuPort;
use crate::scheduler::pcb::Pid;
use crate::scheduler::{admin, lifecycle, CpuId};
use crate::time;

/// Syscall numbers (passed in the syscall register from userland).
pub const SYS_FORK: u64 = 1;
pub const SYS_EXIT: u64 = 2;
pub const SYS_WAIT: u64 = 3;
pub const SYS_KILL: u64 = 4;
pub const SYS_GETPID: u64 = 5;
pub const SYS_SBRK: u64 = 6;
pub const SYS_SLEEP: u64 = 7;
pub const SYS_UPTIME: u64 = 8;
pub const SYS_YIELD: u64 = 9;
pub const SYS_SET_QUEUE: u64 = 10;
pub const SYS_SET_PRIORITY: u64 = 11;
pub const SYS_SET_PRIORITY_ALL: u64 = 12;
pub const SYS_INFO: u64 = 13;
pub const SYS_GET_PARENT: u64 = 14;
pub const SYS_GET_CHILDREN: u64 = 15;
pub const SYS_SET_DEBUG_PARENT: u64 = 16;

/// Central syscall dispatcher — called by the trap handler with the id
/// of the CPU it runs on. Results and failures travel as integers: -1
/// for any error, per the traditional ABI.
pub fn dispatch(cpu: CpuId, port: &dyn CpuPort, number: u64, arg0: i64, arg1: i64) -> i64 {
    match number {
        SYS_FORK => sys_fork(cpu, port),
        SYS_EXIT => sys_exit(cpu, port),
        SYS_WAIT => sys_wait(cpu, port),
        SYS_KILL => sys_kill(arg0),
        SYS_GETPID => sys_getpid(cpu),
        SYS_SBRK => sys_sbrk(cpu, arg0),
        SYS_SLEEP => sys_sleep(cpu, port, arg0),
        SYS_UPTIME => sys_uptime(),
        SYS_YIELD => sys_yield(cpu, port),
        SYS_SET_QUEUE => sys_set_queue(arg0, arg1),
        SYS_SET_PRIORITY => sys_set_priority(arg0, arg1),
        SYS_SET_PRIORITY_ALL => sys_set_priority_all(arg0),
        SYS_INFO => sys_info(),
        SYS_GET_PARENT => sys_get_parent(cpu),
        SYS_GET_CHILDREN => sys_get_children(arg0),
        SYS_SET_DEBUG_PARENT => sys_set_debug_parent(cpu, arg0),
        _ => {
            warn!("syscall: unknown number {}", number);
            -1
        }
    }
}

/// Collapse a core result into the integer ABI.
fn code(result: ProcResult<i64>) -> i64 {
    match result {
        Ok(value) => value,
        Err(_) => -1,
    }
}

/// Parse a pid argument; negative values never name a process.
fn pid_arg(raw: i64) -> Option<Pid> {
    u64::try_from(raw).ok().map(Pid)
}

pub fn sys_fork(cpu: CpuId, port: &dyn CpuPort) -> i64 {
    code(lifecycle::fork(cpu, port).map(|pid| pid.0 as i64))
}

pub fn sys_exit(cpu: CpuId, port: &dyn CpuPort) -> ! {
    lifecycle::exit(cpu, port)
}

pub fn sys_wait(cpu: CpuId, port: &dyn CpuPort) -> i64 {
    code(lifecycle::wait(cpu, port).map(|pid| pid.0 as i64))
}

pub fn sys_kill(pid: i64) -> i64 {
    match pid_arg(pid) {
        Some(pid) => code(lifecycle::kill(pid).map(|_| 0)),
        None => -1,
    }
}

pub fn sys_getpid(cpu: CpuId) -> i64 {
    lifecycle::getpid(cpu).0 as i64
}

/// Grow the address space; returns the old break, like sbrk.
pub fn sys_sbrk(cpu: CpuId, delta: i64) -> i64 {
    code(lifecycle::grow_memory(cpu, delta as isize).map(|old| old as i64))
}

pub fn sys_sleep(cpu: CpuId, port: &dyn CpuPort, ticks: i64) -> i64 {
    match u64::try_from(ticks) {
        Ok(n) => code(time::sleep_ticks(cpu, n, port).map(|_| 0)),
        Err(_) => -1,
    }
}

pub fn sys_uptime() -> i64 {
    time::uptime() as i64
}

pub fn sys_yield(cpu: CpuId, port: &dyn CpuPort) -> i64 {
    lifecycle::yield_now(cpu, port);
    0
}

pub fn sys_set_queue(pid: i64, level: i64) -> i64 {
    match (pid_arg(pid), u32::try_from(level)) {
        (Some(pid), Ok(level)) => code(admin::set_queue_level(pid, level).map(|_| 0)),
        _ => -1,
    }
}

pub fn sys_set_priority(pid: i64, priority: i64) -> i64 {
    match pid_arg(pid) {
        Some(pid) => code(admin::set_priority(pid, priority).map(|_| 0)),
        None => -1,
    }
}

pub fn sys_set_priority_all(priority: i64) -> i64 {
    admin::set_priority_all(priority);
    0
}

/// Dump the process table through the kernel log.
pub fn sys_info() -> i64 {
    for line in admin::snapshot().lines() {
        info!("{}", line);
    }
    0
}

pub fn sys_get_parent(cpu: CpuId) -> i64 {
    let me = lifecycle::getpid(cpu);
    code(admin::parent_of(me).map(|pid| pid.0 as i64))
}

/// Report a process's children (true and debugger-assigned) through the
/// kernel log; returns how many there are.
pub fn sys_get_children(pid: i64) -> i64 {
    let Some(pid) = pid_arg(pid) else {
        return -1;
    };
    match admin::children_of(pid) {
        Ok(report) => {
            for child in &report.children {
                info!("pid {}: child {}", pid, child);
            }
            for child in &report.debug_children {
                info!("pid {}: debugger child {}", pid, child);
            }
            (report.children.len() + report.debug_children.len()) as i64
        }
        Err(_) => -1,
    }
}

pub fn sys_set_debug_parent(cpu: CpuId, target: i64) -> i64 {
    match pid_arg(target) {
        Some(target) => code(admin::set_debug_parent(cpu, target).map(|_| 0)),
        None => -1,
    }
}
