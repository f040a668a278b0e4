use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use core::fmt;

use crate::param::{DEFAULT_QUEUE, NOFILE};
use crate::ports::{AddressSpace, Directory, OpenFile};
use crate::scheduler::context::{Context, KernelStack};

/// Unique process identifier. Monotonically assigned, never recycled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(pub u64);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Unused,
    Embryo,
    Runnable,
    Running,
    Sleeping,
    Zombie,
}

impl ProcState {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcState::Unused => "UNUSED",
            ProcState::Embryo => "EMBRYO",
            ProcState::Runnable => "RUNNABLE",
            ProcState::Running => "RUNNING",
            ProcState::Sleeping => "SLEEPING",
            ProcState::Zombie => "ZOMBIE",
        }
    }
}

/// A wait condition a process can sleep on. Any component may broadcast
/// a wakeup for a channel; sleepers must re-check their condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// The global tick counter advanced.
    Clock,
    /// A child of the given parent exited.
    ChildExit(Pid),
    /// Arbitrary stable identifier supplied by an external subsystem.
    Token(u64),
}

/// Back-reference into the process table. Slots are recycled, so the
/// expected pid travels with the index and is checked on resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotRef {
    pub slot: usize,
    pub pid: Pid,
}

/// A process control block, one per table slot.
pub struct Pcb {
    pub state: ProcState,
    pub pid: Pid,
    pub name: String,
    pub(crate) parent: Option<SlotRef>,
    /// Introspection-only link assigned by a debugger process.
    pub debug_parent: Option<Pid>,
    /// Cooperative termination flag, observed at safe points.
    pub killed: bool,
    /// Channel slept on. Valid only while SLEEPING.
    pub chan: Option<Channel>,

    // Scheduling metadata.
    /// Queue tier: 1 = RR, 2 = LCFS, 3 = MHRRN.
    pub queue: u32,
    /// Tick count when the process was admitted to the ready pool.
    pub arrival_time: u64,
    /// Scheduling quanta actually granted. Starts at 1 so response-ratio
    /// divisions are always defined.
    pub executed_cycles: u64,
    /// Rounds spent RUNNABLE without being chosen. Zeroed on dispatch.
    pub waiting_time: u64,
    /// Externally settable HRRN priority bias.
    pub priority: i64,

    // Carried for other subsystems; opaque to the scheduler.
    pub sz: usize,
    pub(crate) mem: Option<Box<dyn AddressSpace>>,
    pub(crate) files: [Option<Arc<dyn OpenFile>>; NOFILE],
    pub(crate) cwd: Option<Arc<dyn Directory>>,
    pub(crate) kstack: Option<KernelStack>,
    pub(crate) context: Context,
}

impl Pcb {
    pub(crate) fn unused() -> Self {
        Pcb {
            state: ProcState::Unused,
            pid: Pid(0),
            name: String::new(),
            parent: None,
            debug_parent: None,
            killed: false,
            chan: None,
            queue: DEFAULT_QUEUE,
            arrival_time: 0,
            executed_cycles: 1,
            waiting_time: 0,
            priority: 0,
            sz: 0,
            mem: None,
            files: core::array::from_fn(|_| None),
            cwd: None,
            kstack: None,
            context: Context::default(),
        }
    }

    /// Whether this slot holds a process at all (any state but UNUSED).
    pub fn is_live(&self) -> bool {
        self.state != ProcState::Unused
    }

    /// Release everything the slot owns and clear its identity, making
    /// it available for reuse. Only called at reap time or when rolling
    /// back a failed allocation, with the table lock held.
    pub(crate) fn reset_to_unused(&mut self) {
        self.kstack = None;
        self.mem = None;
        self.files = core::array::from_fn(|_| None);
        self.cwd = None;
        self.sz = 0;
        self.pid = Pid(0);
        self.name.clear();
        self.parent = None;
        self.debug_parent = None;
        self.killed = false;
        self.chan = None;
        self.context = Context::default();
        self.state = ProcState::Unused;
    }

    /// Move the open-file handles out of the PCB so they can be dropped
    /// without holding the table lock.
    pub(crate) fn take_files(&mut self) -> [Option<Arc<dyn OpenFile>>; NOFILE] {
        core::mem::replace(&mut self.files, core::array::from_fn(|_| None))
    }
}
