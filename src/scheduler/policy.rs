//! The three-tier scheduling policy.
//!
//! Tiers are consulted strictly top-down each round: Round-Robin over
//! queue level 1, then Last-Come-First-Served over level 2, then the
//! priority-modulated Highest-Response-Ratio-Next (MHRRN) over level 3.
//! A single aging pass after each pick is the only starvation relief.

use crate::param::{AGING_THRESHOLD, NPROC};
use crate::scheduler::pcb::{Pcb, ProcState};
use crate::scheduler::ProcTable;

/// Response ratio for the tier-3 policy, integer arithmetic throughout:
/// `HRRN = (waiting + cycles) / cycles`, `MHRRN = (HRRN + priority) / 2`.
/// `executed_cycles` starts at 1, so the division is always defined.
pub fn mhrrn_score(p: &Pcb) -> i64 {
    let hrrn = ((p.waiting_time + p.executed_cycles) / p.executed_cycles) as i64;
    (hrrn + p.priority) / 2
}

impl ProcTable {
    /// Tier 1: circular scan from just past the last tier-1 dispatch.
    fn pick_round_robin(&self, cursor: &mut usize) -> Option<usize> {
        for i in 0..NPROC {
            let slot = (*cursor + i) % NPROC;
            let p = &self.procs[slot];
            if p.state == ProcState::Runnable && p.queue == 1 {
                *cursor = (slot + 1) % NPROC;
                return Some(slot);
            }
        }
        None
    }

    /// Tier 2: latest arrival wins; on equal arrivals the first slot
    /// scanned keeps the pick.
    fn pick_last_come_first_served(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (slot, p) in self.procs.iter().enumerate() {
            if p.state != ProcState::Runnable || p.queue != 2 {
                continue;
            }
            match best {
                Some(b) if p.arrival_time > self.procs[b].arrival_time => best = Some(slot),
                None => best = Some(slot),
                _ => {}
            }
        }
        best
    }

    /// Tier 3: maximum MHRRN score; ties keep the first slot scanned.
    fn pick_mhrrn(&self) -> Option<usize> {
        let mut best: Option<(usize, i64)> = None;
        for (slot, p) in self.procs.iter().enumerate() {
            if p.state != ProcState::Runnable || p.queue != 3 {
                continue;
            }
            let score = mhrrn_score(p);
            match best {
                Some((_, top)) if score > top => best = Some((slot, score)),
                None => best = Some((slot, score)),
                _ => {}
            }
        }
        best.map(|(slot, _)| slot)
    }

    /// Run the tiers in priority order. A lower tier is consulted only
    /// when every higher tier is empty; the RR cursor rewinds whenever
    /// tier 1 yields nothing.
    pub(crate) fn pick_next(&self, rr_cursor: &mut usize) -> Option<usize> {
        if let Some(slot) = self.pick_round_robin(rr_cursor) {
            return Some(slot);
        }
        *rr_cursor = 0;
        if let Some(slot) = self.pick_last_come_first_served() {
            return Some(slot);
        }
        self.pick_mhrrn()
    }

    /// Aging pass, run once per round right after `chosen` was picked.
    /// Every RUNNABLE process accrues one round of waiting; any occupied
    /// slot past the threshold moves one queue level up. The chosen
    /// process is charged a cycle and its waiting counter is cleared;
    /// it is about to run, not wait.
    pub(crate) fn age_queues(&mut self, chosen: usize) {
        self.procs[chosen].executed_cycles += 1;
        for p in self.procs.iter_mut() {
            if !p.is_live() {
                continue;
            }
            if p.state == ProcState::Runnable {
                p.waiting_time += 1;
            }
            if p.waiting_time > AGING_THRESHOLD && p.queue > 1 {
                p.queue -= 1;
                p.waiting_time = 0;
            }
        }
        self.procs[chosen].waiting_time = 0;
    }
}
