//! Error taxonomy for the process core.
//!
//! Everything recoverable is a `ProcError`; invariant breaches (exiting
//! the root process, entering the scheduler without a current process)
//! are panics, since they indicate a kernel bug rather than a runtime
//! condition.

use thiserror::Error;

use crate::scheduler::pcb::Pid;

/// Result type for process-core operations.
pub type ProcResult<T> = Result<T, ProcError>;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProcError {
    /// Every slot in the process table is occupied.
    #[error("process table is full")]
    TableFull,

    /// Kernel stack or address-space allocation failed.
    #[error("out of memory")]
    OutOfMemory,

    /// No live process carries the given pid.
    #[error("no such process: {0}")]
    NoSuchProcess(Pid),

    /// `wait` was called with no live children and nothing to reap.
    #[error("no children to wait for")]
    NoChildren,

    /// The process has no parent (only ever true of the root process).
    #[error("process {0} has no parent")]
    NoParent(Pid),

    /// Queue levels are 1 (RR), 2 (LCFS) or 3 (MHRRN).
    #[error("queue level must be 1, 2 or 3, got {0}")]
    BadQueueLevel(u32),

    /// The process has no address space to grow.
    #[error("process has no address space")]
    NoAddressSpace,

    /// A blocking call was interrupted because the caller was killed.
    #[error("killed while sleeping")]
    Killed,
}
