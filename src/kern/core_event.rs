//! Per-core event funnel
//!
//! Every asynchronous reason for a core to enter monitor arrives as a
//! [`CoreEvent`] on that core's queue. Events are not allocated: each core
//! owns a fixed set of event slots (one timer tick, one scheduler call, one
//! ICI mailbox per possible source core) and queuing an event means filling
//! its slot and pushing the slot index onto the core's [`AtomicStack`].
//! A slot already on the queue absorbs further events of its kind: ticks
//! keep the latest time, ICI kinds merge.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use alloc::boxed::Box;
use alloc::vec::Vec;
use heapless::Vec as HVec;

use crate::kern::config::MAX_CORES;
use crate::kern::ici::IciKind;
use crate::kern::queue::{AtomicStack, LinkArena};
use crate::types::{CoreIndex, ThreadId, NIL};

/// Slot index of the timer tick
pub const SLOT_TICK: u32 = 0;
/// Slot index of the running thread's scheduler call
pub const SLOT_CALL: u32 = 1;
/// First ICI mailbox slot; the mailbox for source core `n` is `SLOT_ICI_BASE + n`
pub const SLOT_ICI_BASE: u32 = 2;

/// Upper bound on events one drain can return
pub const MAX_DRAINED: usize = SLOT_ICI_BASE as usize + MAX_CORES;

/// An asynchronous notification for one core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreEvent {
    /// The periodic tick fired at `abs_time_ms`
    TimerTick { abs_time_ms: u64 },
    /// The thread running on this core called the scheduler
    SchedCall { thread: ThreadId, abs_time_ms: u64 },
    /// Core `src` raised an inter-core interrupt
    Ici { src: CoreIndex, kinds: IciKind },
}

#[derive(Debug)]
struct EventSlot {
    queued: AtomicBool,
    abs_time: AtomicU64,
    payload: AtomicU32,
}

impl EventSlot {
    fn new() -> Self {
        Self {
            queued: AtomicBool::new(false),
            abs_time: AtomicU64::new(0),
            payload: AtomicU32::new(0),
        }
    }
}

/// A core's event slots and the queue they travel on
#[derive(Debug)]
pub struct CoreEventQueue {
    slots: Box<[EventSlot]>,
    links: LinkArena,
    pending: AtomicStack,
}

impl CoreEventQueue {
    /// Slots for a system of `core_count` cores
    pub fn new(core_count: u32) -> Self {
        let count = SLOT_ICI_BASE as usize + core_count as usize;
        let slots: Vec<EventSlot> = (0..count).map(|_| EventSlot::new()).collect();
        Self {
            slots: slots.into_boxed_slice(),
            links: LinkArena::new(count),
            pending: AtomicStack::new(),
        }
    }

    /// Queue `event`. Never blocks.
    pub fn queue(&self, event: CoreEvent) {
        let slot_idx = match event {
            CoreEvent::TimerTick { abs_time_ms } => {
                let slot = &self.slots[SLOT_TICK as usize];
                slot.abs_time.fetch_max(abs_time_ms, Ordering::AcqRel);
                SLOT_TICK
            }
            CoreEvent::SchedCall {
                thread,
                abs_time_ms,
            } => {
                let slot = &self.slots[SLOT_CALL as usize];
                sched_assert!(
                    !slot.queued.load(Ordering::Acquire),
                    "second scheduler call queued before {} was drained",
                    thread
                );
                slot.abs_time.store(abs_time_ms, Ordering::Relaxed);
                slot.payload.store(thread.0, Ordering::Relaxed);
                SLOT_CALL
            }
            CoreEvent::Ici { src, kinds } => {
                let idx = SLOT_ICI_BASE + src.0;
                sched_assert!(
                    (idx as usize) < self.slots.len(),
                    "ICI from unknown {}",
                    src
                );
                self.slots[idx as usize]
                    .payload
                    .fetch_or(kinds.bits(), Ordering::AcqRel);
                idx
            }
        };

        if !self.slots[slot_idx as usize]
            .queued
            .swap(true, Ordering::AcqRel)
        {
            self.pending.push(&self.links, slot_idx);
        }
    }

    /// Whether any event is waiting to be drained
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Take every queued event, oldest slot first. Owning core only.
    pub fn drain(&self) -> HVec<CoreEvent, MAX_DRAINED> {
        let mut out = HVec::new();
        for idx in self.pending.drain(&self.links) {
            let slot = &self.slots[idx as usize];
            // Clear before reading so a racing producer re-queues the slot
            slot.queued.store(false, Ordering::SeqCst);
            let event = match idx {
                SLOT_TICK => CoreEvent::TimerTick {
                    abs_time_ms: slot.abs_time.load(Ordering::Acquire),
                },
                SLOT_CALL => {
                    let thread = slot.payload.swap(NIL, Ordering::AcqRel);
                    CoreEvent::SchedCall {
                        thread: ThreadId(thread),
                        abs_time_ms: slot.abs_time.load(Ordering::Relaxed),
                    }
                }
                _ => {
                    let kinds = IciKind::from_bits_truncate(slot.payload.swap(0, Ordering::AcqRel));
                    if kinds.is_empty() {
                        continue;
                    }
                    CoreEvent::Ici {
                        src: CoreIndex(idx - SLOT_ICI_BASE),
                        kinds,
                    }
                }
            };
            // One entry per slot, and there are at most MAX_DRAINED slots
            let _ = out.push(event);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_coalesce_to_latest() {
        let q = CoreEventQueue::new(2);
        q.queue(CoreEvent::TimerTick { abs_time_ms: 5 });
        q.queue(CoreEvent::TimerTick { abs_time_ms: 7 });
        q.queue(CoreEvent::TimerTick { abs_time_ms: 6 });
        assert!(q.has_pending());

        let events = q.drain();
        assert_eq!(events.as_slice(), &[CoreEvent::TimerTick { abs_time_ms: 7 }]);
        assert!(!q.has_pending());
    }

    #[test]
    fn test_ici_kinds_merge_per_source() {
        let q = CoreEventQueue::new(3);
        q.queue(CoreEvent::Ici {
            src: CoreIndex(2),
            kinds: IciKind::WAKEUP,
        });
        q.queue(CoreEvent::SchedCall {
            thread: ThreadId(4),
            abs_time_ms: 9,
        });
        q.queue(CoreEvent::Ici {
            src: CoreIndex(2),
            kinds: IciKind::TLB_INV,
        });
        q.queue(CoreEvent::Ici {
            src: CoreIndex(0),
            kinds: IciKind::STOP,
        });

        let events = q.drain();
        assert_eq!(
            events.as_slice(),
            &[
                CoreEvent::Ici {
                    src: CoreIndex(2),
                    kinds: IciKind::WAKEUP | IciKind::TLB_INV
                },
                CoreEvent::SchedCall {
                    thread: ThreadId(4),
                    abs_time_ms: 9
                },
                CoreEvent::Ici {
                    src: CoreIndex(0),
                    kinds: IciKind::STOP
                },
            ]
        );
    }

    #[test]
    fn test_slot_requeues_after_drain() {
        let q = CoreEventQueue::new(1);
        q.queue(CoreEvent::SchedCall {
            thread: ThreadId(1),
            abs_time_ms: 0,
        });
        assert_eq!(q.drain().len(), 1);
        q.queue(CoreEvent::SchedCall {
            thread: ThreadId(2),
            abs_time_ms: 1,
        });
        assert_eq!(
            q.drain().as_slice(),
            &[CoreEvent::SchedCall {
                thread: ThreadId(2),
                abs_time_ms: 1
            }]
        );
    }

    #[test]
    #[should_panic]
    fn test_double_call_is_fatal() {
        let q = CoreEventQueue::new(1);
        let call = CoreEvent::SchedCall {
            thread: ThreadId(1),
            abs_time_ms: 0,
        };
        q.queue(call);
        q.queue(call);
    }
}
