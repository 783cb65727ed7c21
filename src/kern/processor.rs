//! CPU core state shared across cores
//!
//! Everything here is atomic: any core may read or poke another core's
//! `CpuCore`. Scheduler-private per-core state lives in
//! [`SchedCpuCore`](crate::kern::sched::SchedCpuCore).
//!
//! ## Dispatch words
//!
//! The scheduling core tells a core what to run by replacing its 64-bit
//! dispatch word `{thread, sequence, claimed}`. The core claims an
//! unclaimed word by compare-and-swap before executing the thread, keeps a
//! copy in `running` while it executes, and records the sequence of every
//! dispatch it stops executing in `stopped_seq`. Sequences count up modulo
//! 2^31 and are compared with [`seq_reached`], so the scheduling core can
//! tell whether a dispatch it replaced is still live across a wrap.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use crate::kern::core_event::CoreEventQueue;
use crate::types::{CoreIndex, ProcessId, ThreadId, NIL};

/// Sequences are 31 bits; the top bit of the word is the claim flag
pub const SEQ_MASK: u32 = 0x7FFF_FFFF;
const CLAIMED: u64 = 1 << 63;

/// Whether sequence `at` is `seq` or later. Only valid while the two are
/// less than half the sequence space apart.
#[inline]
pub const fn seq_reached(at: u32, seq: u32) -> bool {
    (at.wrapping_sub(seq) & SEQ_MASK) <= SEQ_MASK / 2
}

/// Unpacked dispatch word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatch {
    pub thread: Option<ThreadId>,
    pub seq: u32,
    pub claimed: bool,
}

impl Dispatch {
    pub const fn idle(seq: u32) -> Self {
        Self {
            thread: None,
            seq,
            claimed: false,
        }
    }

    pub const fn run(thread: ThreadId, seq: u32) -> Self {
        Self {
            thread: Some(thread),
            seq,
            claimed: false,
        }
    }

    pub fn pack(self) -> u64 {
        let tid = self.thread.map_or(NIL, |t| t.0) as u64;
        let claimed = if self.claimed { CLAIMED } else { 0 };
        tid | (((self.seq & SEQ_MASK) as u64) << 32) | claimed
    }

    pub fn unpack(word: u64) -> Self {
        let tid = word as u32;
        Self {
            thread: (tid != NIL).then_some(ThreadId(tid)),
            seq: ((word >> 32) as u32) & SEQ_MASK,
            claimed: word & CLAIMED != 0,
        }
    }

    /// Same dispatch, ignoring the claim flag
    pub fn same(self, other: Dispatch) -> bool {
        self.thread == other.thread && self.seq == other.seq
    }
}

/// Shared state of one CPU core
#[derive(Debug)]
pub struct CpuCore {
    pub index: CoreIndex,
    pub events: CoreEventQueue,
    registered: AtomicBool,
    in_monitor: AtomicBool,
    halted: AtomicBool,
    assigned: AtomicU64,
    running: AtomicU64,
    stopped_seq: AtomicU32,
    active_process: AtomicU32,
}

impl CpuCore {
    pub fn new(index: CoreIndex, core_count: u32) -> Self {
        let idle = Dispatch::idle(0).pack();
        Self {
            index,
            events: CoreEventQueue::new(core_count),
            registered: AtomicBool::new(false),
            in_monitor: AtomicBool::new(false),
            halted: AtomicBool::new(false),
            assigned: AtomicU64::new(idle),
            running: AtomicU64::new(idle),
            stopped_seq: AtomicU32::new(0),
            active_process: AtomicU32::new(NIL),
        }
    }

    pub fn register(&self) -> bool {
        !self.registered.swap(true, Ordering::SeqCst)
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    pub fn set_in_monitor(&self, on: bool) {
        self.in_monitor.store(on, Ordering::SeqCst);
    }

    pub fn in_monitor(&self) -> bool {
        self.in_monitor.load(Ordering::SeqCst)
    }

    pub fn halt(&self) {
        self.halted.store(true, Ordering::SeqCst);
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Scheduling-core side
    // ------------------------------------------------------------------

    /// Replace the dispatch word, returning the one it replaced
    pub fn publish(&self, next: Dispatch) -> Dispatch {
        Dispatch::unpack(self.assigned.swap(next.pack(), Ordering::SeqCst))
    }

    /// Whether this core has stopped executing dispatch `seq`
    pub fn has_stopped(&self, seq: u32) -> bool {
        seq_reached(self.stopped_seq.load(Ordering::SeqCst), seq)
    }

    // ------------------------------------------------------------------
    // Owning-core side
    // ------------------------------------------------------------------

    pub fn assigned(&self) -> Dispatch {
        Dispatch::unpack(self.assigned.load(Ordering::SeqCst))
    }

    pub fn running(&self) -> Dispatch {
        Dispatch::unpack(self.running.load(Ordering::SeqCst))
    }

    /// Claim `d` for execution; fails if the scheduling core replaced it
    pub fn claim(&self, d: Dispatch) -> bool {
        let claimed = Dispatch { claimed: true, ..d };
        if self
            .assigned
            .compare_exchange(d.pack(), claimed.pack(), Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        self.running.store(claimed.pack(), Ordering::SeqCst);
        true
    }

    /// The core stopped executing whatever it was running. Only the owning
    /// core calls this, and it claims dispatches in sequence order.
    pub fn mark_stopped(&self) -> Option<ThreadId> {
        let prev = Dispatch::unpack(self.running.swap(Dispatch::idle(0).pack(), Ordering::SeqCst));
        if prev.thread.is_some() {
            self.stopped_seq.store(prev.seq, Ordering::SeqCst);
        }
        prev.thread
    }

    pub fn set_active_process(&self, process: Option<ProcessId>) {
        self.active_process
            .store(process.map_or(NIL, |p| p.0), Ordering::SeqCst);
    }

    pub fn active_process(&self) -> Option<ProcessId> {
        let p = self.active_process.load(Ordering::SeqCst);
        (p != NIL).then_some(ProcessId(p))
    }
}
