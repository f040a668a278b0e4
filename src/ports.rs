//! Interfaces to the subsystems this core collaborates with but does not
//! implement: virtual memory, the file system, and the low-level CPU
//! switch machinery.

use alloc::boxed::Box;

use crate::error::ProcResult;
use crate::scheduler::context::{Context, KernelStack};
use crate::scheduler::CpuId;

/// A process's address space, owned by the virtual-memory subsystem.
/// The core only duplicates it on fork, grows it on sbrk, and drops it
/// at reap time.
pub trait AddressSpace: Send {
    /// Full copy of the space for a fork child. Fails on exhaustion.
    fn duplicate(&self) -> ProcResult<Box<dyn AddressSpace>>;

    /// Grow (or shrink, for negative `delta`) the space; returns the new
    /// size in bytes.
    fn grow(&mut self, delta: isize) -> ProcResult<usize>;

    /// Current size in bytes.
    fn size(&self) -> usize;
}

/// An open file object. The file-system layer owns the real type; the
/// core duplicates handles on fork (`Arc::clone`) and closes them on
/// exit by dropping.
pub trait OpenFile: Send + Sync {}

/// A directory reference (the current working directory). Same ownership
/// rules as [`OpenFile`].
pub trait Directory: Send + Sync {}

/// The CPU-level services the scheduler depends on but does not
/// implement. `dispatch`/`suspend` form the context-switch primitive and
/// are atomic from the core's point of view; the implementation is
/// responsible for interrupt safety around the actual register save and
/// restore.
pub trait CpuPort {
    /// Re-enable interrupts on the calling core. Invoked at the top of
    /// every scheduling round.
    fn interrupts_on(&self);

    /// Build the saved context of a brand-new process: trap frame placed
    /// at the top of `stack`, context returning through the fork-return
    /// trampoline.
    fn initial_context(&self, stack: &KernelStack) -> Context;

    /// Duplicate a parent's saved context for a fork child, with the
    /// return-value register forced to zero (the fork-child convention).
    fn child_context(&self, parent: &Context) -> Context;

    /// Resume the process occupying `slot` on core `cpu`. Returns once
    /// that process has suspended back to this core's scheduler loop.
    fn dispatch(&self, cpu: CpuId, slot: usize);

    /// Called from process context: save the current execution state and
    /// return control to the scheduler loop of core `cpu`. The caller
    /// must already have recorded its successor state in the table.
    fn suspend(&self, cpu: CpuId);
}
