//! Inter-core interrupts and the TLB invalidation rendezvous
//!
//! An ICI is delivered by setting kind bits in the target core's mailbox
//! slot for the sending core (see [`CoreEvent::Ici`]) and raising the
//! hardware interrupt. Bits from the same source merge until drained.
//!
//! The TLB rendezvous is the one synchronous barrier in the scheduler: the
//! scheduling core publishes the invalidation parameters, every core
//! (itself included) flushes what applies to it and acknowledges once, and
//! the initiator spins until every acknowledgement is in before clearing
//! the parameters.
//!
//! [`CoreEvent::Ici`]: crate::kern::core_event::CoreEvent::Ici

use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use bitflags::bitflags;
use heapless::Vec as HVec;

use crate::kern::config::PAGE_SIZE;
use crate::kern::status::{KernError, KernResult};
use crate::types::{ProcessId, NIL};

bitflags! {
    /// Reasons one core interrupts another
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct IciKind: u32 {
        /// Re-read the dispatch word (new work or an idle core to wake)
        const WAKEUP = 1 << 0;
        /// Stop executing the current thread and enter monitor
        const STOP = 1 << 1;
        /// Take part in the TLB invalidation rendezvous
        const TLB_INV = 1 << 2;
        /// Reload the page directory of the active process
        const PAGE_DIR_UPDATE = 1 << 3;
        /// Halt this core
        const PANIC = 1 << 4;
        /// Enter the debugger
        const DEBUG = 1 << 5;
    }
}

/// Maximum address ranges in one invalidation
pub const TLB_MAX_RANGES: usize = 2;

/// One page-aligned virtual range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlbRange {
    pub base: usize,
    pub pages: usize,
}

/// Request to invalidate up to two ranges of one process's mappings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlbRequest {
    pub process: ProcessId,
    pub ranges: HVec<TlbRange, TLB_MAX_RANGES>,
}

impl TlbRequest {
    pub fn new(process: ProcessId, base: usize, pages: usize) -> Self {
        let mut ranges = HVec::new();
        // Capacity is at least one
        let _ = ranges.push(TlbRange { base, pages });
        Self { process, ranges }
    }

    pub fn with_range(mut self, base: usize, pages: usize) -> KernResult<Self> {
        self.ranges
            .push(TlbRange { base, pages })
            .map_err(|_| KernError::LimitExceeded)?;
        Ok(self)
    }

    pub fn validate(&self) -> KernResult<()> {
        if self.ranges.is_empty() {
            return Err(KernError::BadArgument);
        }
        for r in &self.ranges {
            if r.pages == 0 || r.base % PAGE_SIZE != 0 {
                return Err(KernError::BadArgument);
            }
            if r
                .pages
                .checked_mul(PAGE_SIZE)
                .and_then(|len| r.base.checked_add(len))
                .is_none()
            {
                return Err(KernError::BadArgument);
            }
        }
        Ok(())
    }
}

/// Shared invalidation parameters plus the acknowledgement counter
#[derive(Debug)]
pub struct TlbRendezvous {
    process: AtomicU32,
    bases: [AtomicUsize; TLB_MAX_RANGES],
    pages: [AtomicUsize; TLB_MAX_RANGES],
    acks: AtomicU32,
}

impl TlbRendezvous {
    pub const fn new() -> Self {
        Self {
            process: AtomicU32::new(NIL),
            bases: [AtomicUsize::new(0), AtomicUsize::new(0)],
            pages: [AtomicUsize::new(0), AtomicUsize::new(0)],
            acks: AtomicU32::new(0),
        }
    }

    /// Publish `req` and zero the acknowledgement counter
    pub fn publish(&self, req: &TlbRequest) {
        for i in 0..TLB_MAX_RANGES {
            let (base, pages) = req
                .ranges
                .get(i)
                .map(|r| (r.base, r.pages))
                .unwrap_or((0, 0));
            self.bases[i].store(base, Ordering::Relaxed);
            self.pages[i].store(pages, Ordering::Relaxed);
        }
        self.process.store(req.process.0, Ordering::Relaxed);
        self.acks.store(0, Ordering::SeqCst);
    }

    /// Parameters currently published, if any
    pub fn params(&self) -> Option<(ProcessId, [TlbRange; TLB_MAX_RANGES])> {
        let process = self.process.load(Ordering::Acquire);
        if process == NIL {
            return None;
        }
        let ranges = [0usize, 1].map(|i| TlbRange {
            base: self.bases[i].load(Ordering::Relaxed),
            pages: self.pages[i].load(Ordering::Relaxed),
        });
        Some((ProcessId(process), ranges))
    }

    /// Every page one core must flush given its active process
    pub fn pages_for(
        &self,
        active: Option<ProcessId>,
        kernel_va_base: usize,
        mut flush: impl FnMut(usize),
    ) {
        let Some((process, ranges)) = self.params() else {
            return;
        };
        let same_process = active == Some(process);
        for r in ranges.iter().filter(|r| r.pages != 0) {
            for p in 0..r.pages {
                let va = r.base + p * PAGE_SIZE;
                if same_process || va >= kernel_va_base {
                    flush(va);
                }
            }
        }
    }

    pub fn ack(&self) {
        self.acks.fetch_add(1, Ordering::SeqCst);
    }

    pub fn acks(&self) -> u32 {
        self.acks.load(Ordering::SeqCst)
    }

    /// Spin until `expected` cores have acknowledged
    pub fn wait_for(&self, expected: u32) {
        while self.acks.load(Ordering::SeqCst) < expected {
            core::hint::spin_loop();
        }
    }

    /// Drop the published parameters; the counter keeps its final value
    pub fn clear(&self) {
        self.process.store(NIL, Ordering::Release);
        for i in 0..TLB_MAX_RANGES {
            self.bases[i].store(0, Ordering::Relaxed);
            self.pages[i].store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KVA: usize = 0x8000_0000;

    #[test]
    fn test_request_validation() {
        assert_eq!(TlbRequest::new(ProcessId(1), 0x1000, 2).validate(), Ok(()));
        assert_eq!(
            TlbRequest::new(ProcessId(1), 0x1001, 2).validate(),
            Err(KernError::BadArgument)
        );
        assert_eq!(
            TlbRequest::new(ProcessId(1), 0x1000, 0).validate(),
            Err(KernError::BadArgument)
        );
        let two = TlbRequest::new(ProcessId(1), 0x1000, 1)
            .with_range(0x9000, 1)
            .unwrap();
        assert_eq!(
            two.with_range(0x2000, 1).unwrap_err(),
            KernError::LimitExceeded
        );
    }

    #[test]
    fn test_pages_for_other_process_only_kernel_range() {
        let rv = TlbRendezvous::new();
        let req = TlbRequest::new(ProcessId(3), 0x1000, 2)
            .with_range(KVA, 1)
            .unwrap();
        rv.publish(&req);

        let mut mine = Vec::new();
        rv.pages_for(Some(ProcessId(3)), KVA, |va| mine.push(va));
        assert_eq!(mine, vec![0x1000, 0x2000, KVA]);

        let mut other = Vec::new();
        rv.pages_for(Some(ProcessId(4)), KVA, |va| other.push(va));
        assert_eq!(other, vec![KVA]);

        let mut idle = Vec::new();
        rv.pages_for(None, KVA, |va| idle.push(va));
        assert_eq!(idle, vec![KVA]);
    }

    #[test]
    fn test_clear_keeps_ack_count() {
        let rv = TlbRendezvous::new();
        rv.publish(&TlbRequest::new(ProcessId(0), 0x4000, 1));
        rv.ack();
        rv.ack();
        rv.wait_for(2);
        rv.clear();
        assert!(rv.params().is_none());
        assert_eq!(rv.acks(), 2);

        let mut flushed = 0;
        rv.pages_for(Some(ProcessId(0)), KVA, |_| flushed += 1);
        assert_eq!(flushed, 0);
    }

    #[test]
    fn test_ici_kinds_merge() {
        let k = IciKind::WAKEUP | IciKind::TLB_INV;
        assert!(k.contains(IciKind::TLB_INV));
        assert_eq!(IciKind::from_bits_truncate(k.bits()), k);
    }
}
