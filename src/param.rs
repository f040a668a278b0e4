//! Fixed sizing parameters for the process core.

/// Maximum number of processes the table can hold.
pub const NPROC: usize = 64;

/// Open-file handles per process.
pub const NOFILE: usize = 16;

/// Maximum number of execution cores running scheduler loops.
pub const NCPU: usize = 8;

/// Size of each process's kernel stack (16 KiB).
pub const KSTACK_SIZE: usize = 4096 * 4;

/// A RUNNABLE process whose waiting-time counter climbs past this many
/// scheduling rounds is promoted one queue level.
pub const AGING_THRESHOLD: u64 = 8000;

/// Queue level every new process starts in (the LCFS tier).
pub const DEFAULT_QUEUE: u32 = 2;
