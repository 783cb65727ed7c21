//! Ready lists and the core-priority list
//!
//! Ready threads are bucketed by priority, FIFO within a bucket. A bitmap
//! tracks which buckets are non-empty so the best ready priority is found
//! with a leading-zero count. Threads woken from a wait (or preempted by a
//! better thread) enter at the head of their bucket; threads that used up
//! their quantum enter at the tail.
//!
//! The core-priority list orders cores by the priority they are running
//! at, worst first, so "which core would I preempt" is a scan from the
//! front that stops at the first core not worse than the candidate.

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use heapless::Vec as HVec;

use crate::kern::config::{MAX_CORES, PRIO_LEVELS};
use crate::types::{CoreIndex, Priority, ThreadId};

// ============================================================================
// Ready Lists
// ============================================================================

/// Which end of its bucket a thread is queued at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyPos {
    Head,
    Tail,
}

/// Per-priority FIFO lists of ready threads
#[derive(Debug)]
pub struct ReadyLists {
    queues: [VecDeque<ThreadId>; PRIO_LEVELS],
    /// Bit (31 - p) set when bucket p is non-empty
    bitmap: u32,
    count: usize,
}

impl ReadyLists {
    pub const fn new() -> Self {
        Self {
            queues: [const { VecDeque::new() }; PRIO_LEVELS],
            bitmap: 0,
            count: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn len(&self) -> usize {
        self.count
    }

    /// Queue `thread` at `prio`
    pub fn push(&mut self, thread: ThreadId, prio: Priority, pos: ReadyPos) {
        sched_assert!(prio.is_valid(), "ready push at invalid priority {:?}", prio);
        let q = &mut self.queues[prio.index()];
        match pos {
            ReadyPos::Head => q.push_front(thread),
            ReadyPos::Tail => q.push_back(thread),
        }
        self.bitmap |= Self::bit(prio);
        self.count += 1;
    }

    /// Take `thread` out of bucket `prio`
    pub fn remove(&mut self, thread: ThreadId, prio: Priority) -> bool {
        let q = &mut self.queues[prio.index()];
        let Some(pos) = q.iter().position(|t| *t == thread) else {
            return false;
        };
        q.remove(pos);
        if q.is_empty() {
            self.bitmap &= !Self::bit(prio);
        }
        self.count -= 1;
        true
    }

    /// Best priority with a ready thread
    pub fn best_priority(&self) -> Option<Priority> {
        if self.bitmap == 0 {
            None
        } else {
            Some(Priority(self.bitmap.leading_zeros() as u8))
        }
    }

    /// First thread in priority order accepted by `pred`
    pub fn first_where(&self, mut pred: impl FnMut(ThreadId) -> bool) -> Option<(ThreadId, Priority)> {
        self.iter().find(|(t, _)| pred(*t))
    }

    /// Every ready thread, best priority first, queue order within one
    pub fn iter(&self) -> impl Iterator<Item = (ThreadId, Priority)> + '_ {
        self.queues
            .iter()
            .enumerate()
            .filter(|(_, q)| !q.is_empty())
            .flat_map(|(p, q)| q.iter().map(move |t| (*t, Priority(p as u8))))
    }

    /// Snapshot of `iter()`
    pub fn snapshot(&self) -> Vec<(ThreadId, Priority)> {
        self.iter().collect()
    }

    #[inline]
    const fn bit(prio: Priority) -> u32 {
        1u32 << (31 - prio.0 as u32)
    }
}

// ============================================================================
// Core Priority List
// ============================================================================

/// Registered cores ordered worst running priority first
#[derive(Debug, Default)]
pub struct CorePrioList {
    entries: HVec<(CoreIndex, Priority), MAX_CORES>,
}

impl CorePrioList {
    pub const fn new() -> Self {
        Self {
            entries: HVec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Place `core` at `prio`, behind cores already at that priority
    pub fn set(&mut self, core: CoreIndex, prio: Priority) {
        if let Some(pos) = self.entries.iter().position(|(c, _)| *c == core) {
            self.entries.remove(pos);
        }
        let at = self
            .entries
            .iter()
            .position(|(_, p)| p.0 < prio.0)
            .unwrap_or(self.entries.len());
        let inserted = self.entries.insert(at, (core, prio));
        sched_assert!(inserted.is_ok(), "core priority list overflow at {}", core);
    }

    pub fn priority_of(&self, core: CoreIndex) -> Option<Priority> {
        self.entries.iter().find(|(c, _)| *c == core).map(|(_, p)| *p)
    }

    /// Cores worst first
    pub fn iter(&self) -> impl Iterator<Item = (CoreIndex, Priority)> + '_ {
        self.entries.iter().copied()
    }

    /// First idle core accepted by `allowed`
    pub fn idle_core(&self, mut allowed: impl FnMut(CoreIndex) -> bool) -> Option<CoreIndex> {
        self.iter()
            .take_while(|(_, p)| *p == Priority::IDLE)
            .map(|(c, _)| c)
            .find(|c| allowed(*c))
    }

    /// Worst core running strictly below `prio` and accepted by `allowed`
    pub fn preemptible(
        &self,
        prio: Priority,
        mut allowed: impl FnMut(CoreIndex) -> bool,
    ) -> Option<CoreIndex> {
        self.iter()
            .take_while(|(_, p)| prio.is_higher_than(*p))
            .map(|(c, _)| c)
            .find(|c| allowed(*c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_head_and_tail_within_tier() {
        let mut rl = ReadyLists::new();
        rl.push(ThreadId(1), Priority(5), ReadyPos::Tail);
        rl.push(ThreadId(2), Priority(5), ReadyPos::Tail);
        rl.push(ThreadId(3), Priority(5), ReadyPos::Head);
        rl.push(ThreadId(4), Priority(2), ReadyPos::Tail);

        let order: Vec<u32> = rl.iter().map(|(t, _)| t.0).collect();
        assert_eq!(order, vec![4, 3, 1, 2]);
        assert_eq!(rl.best_priority(), Some(Priority(2)));
        assert_eq!(rl.len(), 4);
    }

    #[test]
    fn test_remove_clears_bitmap() {
        let mut rl = ReadyLists::new();
        rl.push(ThreadId(1), Priority(0), ReadyPos::Tail);
        rl.push(ThreadId(2), Priority(31), ReadyPos::Tail);
        assert!(rl.remove(ThreadId(1), Priority(0)));
        assert!(!rl.remove(ThreadId(1), Priority(0)));
        assert_eq!(rl.best_priority(), Some(Priority(31)));
        assert!(rl.remove(ThreadId(2), Priority(31)));
        assert!(rl.is_empty());
        assert_eq!(rl.best_priority(), None);
    }

    #[test]
    fn test_first_where_skips_rejected() {
        let mut rl = ReadyLists::new();
        rl.push(ThreadId(1), Priority(1), ReadyPos::Tail);
        rl.push(ThreadId(2), Priority(3), ReadyPos::Tail);
        assert_eq!(
            rl.first_where(|t| t != ThreadId(1)),
            Some((ThreadId(2), Priority(3)))
        );
    }

    #[test]
    fn test_core_prio_list_order() {
        let mut cl = CorePrioList::new();
        cl.set(CoreIndex(0), Priority::IDLE);
        cl.set(CoreIndex(1), Priority::IDLE);
        cl.set(CoreIndex(2), Priority(4));
        cl.set(CoreIndex(3), Priority(9));

        let order: Vec<u32> = cl.iter().map(|(c, _)| c.0).collect();
        assert_eq!(order, vec![0, 1, 3, 2]);

        assert_eq!(cl.idle_core(|c| c != CoreIndex(0)), Some(CoreIndex(1)));
        cl.set(CoreIndex(0), Priority(1));
        cl.set(CoreIndex(1), Priority(1));
        assert_eq!(cl.idle_core(|_| true), None);

        // Only core 3 (9) and core 2 (4) are worse than 3
        assert_eq!(cl.preemptible(Priority(3), |_| true), Some(CoreIndex(3)));
        assert_eq!(cl.preemptible(Priority(3), |c| c != CoreIndex(3)), Some(CoreIndex(2)));
        assert_eq!(cl.preemptible(Priority(4), |c| c == CoreIndex(2)), None);
        assert_eq!(cl.priority_of(CoreIndex(0)), Some(Priority(1)));
    }

    proptest! {
        #[test]
        fn prop_fifo_within_tier(ops in prop::collection::vec((0u8..4, any::<bool>()), 1..64)) {
            let mut rl = ReadyLists::new();
            let mut model: Vec<VecDeque<u32>> = vec![VecDeque::new(); 4];
            for (i, (prio, head)) in ops.iter().enumerate() {
                let t = ThreadId(i as u32);
                if *head {
                    rl.push(t, Priority(*prio), ReadyPos::Head);
                    model[*prio as usize].push_front(i as u32);
                } else {
                    rl.push(t, Priority(*prio), ReadyPos::Tail);
                    model[*prio as usize].push_back(i as u32);
                }
            }
            let got: Vec<u32> = rl.iter().map(|(t, _)| t.0).collect();
            let want: Vec<u32> = model.iter().flat_map(|q| q.iter().copied()).collect();
            prop_assert_eq!(got, want);
        }
    }
}
