//! The global tick clock.
//!
//! The timer interrupt (outside this crate) calls [`clock_tick`] once
//! per tick; everything that wants to wait for time sleeps on
//! [`Channel::Clock`] and re-checks elapsed ticks when woken.

use lazy_static::lazy_static;
use spin::Mutex;

use crate::error::{ProcError, ProcResult};
use crate::ports::CpuPort;
use crate::scheduler::lifecycle;
use crate::scheduler::pcb::Channel;
use crate::scheduler::CpuId;

lazy_static! {
    pub(crate) static ref TICKS: Mutex<u64> = Mutex::new(0);
}

/// Timer-interrupt hook: advance the clock and wake every process
/// sleeping on it.
pub fn clock_tick() {
    let mut ticks = TICKS.lock();
    *ticks += 1;
    drop(ticks);
    lifecycle::wakeup(Channel::Clock);
}

/// Current tick count.
pub fn ticks_now() -> u64 {
    *TICKS.lock()
}

/// Ticks since boot.
pub fn uptime() -> u64 {
    ticks_now()
}

/// Block the calling process until `n` ticks have elapsed. Wakes on
/// every clock broadcast and re-checks; fails with `Killed` as soon as
/// the caller is flagged for termination.
pub fn sleep_ticks(cpu: CpuId, n: u64, port: &dyn CpuPort) -> ProcResult<()> {
    let mut ticks = TICKS.lock();
    let start = *ticks;
    while *ticks - start < n {
        if lifecycle::current_killed(cpu) {
            return Err(ProcError::Killed);
        }
        ticks = lifecycle::sleep(cpu, Channel::Clock, &TICKS, ticks, port);
    }
    Ok(())
}
