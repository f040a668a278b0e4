pub mod admin;
pub mod context;
pub mod lifecycle;
pub mod pcb;
pub(crate) mod policy;

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;

use lazy_static::lazy_static;
use log::info;
use spin::Mutex;

use crate::error::ProcResult;
use crate::param::{NCPU, NPROC};
use crate::ports::{AddressSpace, CpuPort, Directory};
use pcb::{Channel, Pcb, Pid, ProcState, SlotRef};

/// Identifies an execution core. Supplied by the trap layer, which knows
/// which CPU it is running on.
pub type CpuId = usize;

/// The process table: every PCB, pid assignment, the root process, and
/// the per-CPU current slots, all behind one lock.
pub struct ProcTable {
    pub(crate) procs: [Pcb; NPROC],
    next_pid: u64,
    root: Option<SlotRef>,
    current: [Option<usize>; NCPU],
}

impl ProcTable {
    fn new() -> Self {
        ProcTable {
            procs: core::array::from_fn(|_| Pcb::unused()),
            next_pid: 1,
            root: None,
            current: [None; NCPU],
        }
    }

    /// Claim an UNUSED slot as EMBRYO and assign it the next pid.
    pub(crate) fn claim_slot(&mut self, arrival: u64) -> Option<usize> {
        let slot = self.procs.iter().position(|p| p.state == ProcState::Unused)?;
        let pid = Pid(self.next_pid);
        self.next_pid += 1;
        let p = &mut self.procs[slot];
        p.state = ProcState::Embryo;
        p.pid = pid;
        p.queue = crate::param::DEFAULT_QUEUE;
        p.arrival_time = arrival;
        p.executed_cycles = 1;
        p.waiting_time = 0;
        p.priority = 0;
        Some(slot)
    }

    /// Slot of the process currently running on `cpu`, if any.
    pub(crate) fn current_slot(&self, cpu: CpuId) -> Option<usize> {
        self.current[cpu]
    }

    /// Slot of the live process carrying `pid`.
    pub(crate) fn find_live(&self, pid: Pid) -> Option<usize> {
        self.procs
            .iter()
            .position(|p| p.is_live() && p.pid == pid)
    }

    /// Follow a stored back-reference, checking that the slot still
    /// holds the process it pointed at (slots are recycled).
    pub(crate) fn resolve(&self, r: SlotRef) -> Option<usize> {
        let p = &self.procs[r.slot];
        if p.is_live() && p.pid == r.pid {
            Some(r.slot)
        } else {
            None
        }
    }

    pub(crate) fn root(&self) -> Option<SlotRef> {
        self.root
    }

    /// Broadcast: every process sleeping on `chan` becomes RUNNABLE.
    pub(crate) fn wakeup_locked(&mut self, chan: Channel) {
        for p in self.procs.iter_mut() {
            if p.state == ProcState::Sleeping && p.chan == Some(chan) {
                p.state = ProcState::Runnable;
            }
        }
    }
}

lazy_static! {
    /// The global process table. The single lock around it is the only
    /// synchronization in this core.
    pub(crate) static ref PTABLE: Mutex<ProcTable> = Mutex::new(ProcTable::new());
}

/// Per-CPU scheduler state: identity plus the round-robin cursor for
/// tier 1. Owned by the loop, never shared.
pub struct CpuCore {
    pub id: CpuId,
    pub(crate) rr_cursor: usize,
}

impl CpuCore {
    pub fn new(id: CpuId) -> Self {
        assert!(id < NCPU, "cpu id {} out of range", id);
        CpuCore { id, rr_cursor: 0 }
    }
}

/// Create the first (root) process. All later orphans are reparented to
/// it. Calling this twice is a kernel bug.
pub fn bootstrap(
    name: &str,
    mem: Box<dyn AddressSpace>,
    cwd: Option<Arc<dyn Directory>>,
    port: &dyn CpuPort,
) -> ProcResult<Pid> {
    let slot = lifecycle::alloc_slot(port)?;
    let mut table = PTABLE.lock();
    assert!(table.root.is_none(), "bootstrap: root process already exists");
    let sz = mem.size();
    let p = &mut table.procs[slot];
    p.name = String::from(name);
    p.sz = sz;
    p.mem = Some(mem);
    p.cwd = cwd;
    p.state = ProcState::Runnable;
    let pid = p.pid;
    table.root = Some(SlotRef { slot, pid });
    info!("bootstrap: root process '{}' is pid {}", name, pid);
    Ok(pid)
}

/// One scheduling round: pick a process through the three-tier policy,
/// run the aging pass, switch into the choice and back. Returns the pid
/// dispatched, or `None` for an idle round.
pub fn run_round(cpu: &mut CpuCore, port: &dyn CpuPort) -> Option<Pid> {
    // Enable interrupts on this core so devices are never starved across
    // idle rounds.
    port.interrupts_on();

    let mut table = PTABLE.lock();
    let slot = table.pick_next(&mut cpu.rr_cursor)?;
    table.age_queues(slot);
    let p = &mut table.procs[slot];
    p.state = ProcState::Running;
    let pid = p.pid;
    table.current[cpu.id] = Some(slot);
    drop(table);

    // The dispatched process re-enters the core through its own scoped
    // lock acquisitions and must set its successor state before it
    // suspends back here.
    port.dispatch(cpu.id, slot);

    PTABLE.lock().current[cpu.id] = None;
    Some(pid)
}

/// The per-CPU scheduler loop. Each core calls this once after setup and
/// never returns.
pub fn scheduler(cpu: &mut CpuCore, port: &dyn CpuPort) -> ! {
    info!("scheduler: cpu {} entering scheduling loop", cpu.id);
    loop {
        run_round(cpu, port);
    }
}
