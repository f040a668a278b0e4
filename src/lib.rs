//! ProtonOS process-management core: the process table, lifecycle
//! (fork/exit/wait/kill), channel-based sleep/wakeup, and the
//! three-tier RR/LCFS/MHRRN scheduler with queue aging.
//!
//! Hardware concerns live behind the traits in [`ports`]; the kernel
//! binary supplies them and links this crate like any other library,
//! which is also what lets the whole core run under `cargo test` on a
//! host.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod error;
pub mod param;
pub mod ports;
pub mod scheduler;
pub mod syscalls;
pub mod time;

pub use error::{ProcError, ProcResult};
pub use scheduler::pcb::{Channel, Pcb, Pid, ProcState};
pub use scheduler::{bootstrap, run_round, CpuCore, CpuId};
