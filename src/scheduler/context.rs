use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::param::KSTACK_SIZE;

/// Number of machine words in a saved context.
pub const CONTEXT_WORDS: usize = 8;

/// Saved execution context of a process.
///
/// The layout of the words is owned by the [`CpuPort`] implementation;
/// the scheduler stores one per process and hands them to the port
/// around context switches without interpreting them.
///
/// [`CpuPort`]: crate::ports::CpuPort
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Context {
    pub words: [u64; CONTEXT_WORDS],
}

/// Owned kernel stack memory — kept alive as long as the process exists.
pub struct KernelStack {
    mem: Box<[u8]>,
}

impl KernelStack {
    /// Allocate a zeroed kernel stack. Returns `None` on exhaustion so
    /// the caller can roll the process slot back instead of aborting.
    pub fn alloc() -> Option<KernelStack> {
        let mut mem = Vec::new();
        mem.try_reserve_exact(KSTACK_SIZE).ok()?;
        mem.resize(KSTACK_SIZE, 0u8);
        Some(KernelStack {
            mem: mem.into_boxed_slice(),
        })
    }

    pub fn size(&self) -> usize {
        self.mem.len()
    }

    /// Base address of the stack memory. The port computes its own top
    /// and alignment from this.
    pub fn base(&self) -> *const u8 {
        self.mem.as_ptr()
    }
}
