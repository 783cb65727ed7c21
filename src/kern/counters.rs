//! Scheduler Performance Counters
//!
//! Per-kernel counters tracking paths through the scheduler. These are
//! useful for debugging, profiling and for tests asserting that a path was
//! (or was not) taken.
//!
//! ## Counter Categories
//!
//! - **Items**: scheduler items executed, waits blocked / satisfied at once
//! - **Dispatch**: thread dispatches, preemptions, quantum expiries
//! - **Cross-core**: ICIs sent, TLB shootdowns
//! - **Time**: timer items fired, sched-timer passes, idle entries

use core::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// Counter Type
// ============================================================================

/// Scheduler counter (atomically updated)
#[derive(Debug)]
pub struct SchedCounter {
    value: AtomicU64,
    name: &'static str,
}

impl SchedCounter {
    /// Create a new counter
    pub const fn new(name: &'static str) -> Self {
        Self {
            value: AtomicU64::new(0),
            name,
        }
    }

    /// Increment counter by 1
    #[inline]
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment counter by n
    #[inline]
    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Get current value
    #[inline]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Reset to zero
    #[inline]
    pub fn reset(&self) {
        self.value.store(0, Ordering::Relaxed);
    }

    /// Get counter name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Update max if current value is higher
    pub fn update_max(&self, current: u64) {
        self.value.fetch_max(current, Ordering::Relaxed);
    }
}

// ============================================================================
// Counter Macro (compile-time switchable)
// ============================================================================

/// Increment counter (only with the `sched_counters` feature)
macro_rules! counter {
    ($counter:expr) => {
        #[cfg(feature = "sched_counters")]
        {
            $counter.inc();
        }
    };
}
pub(crate) use counter;

// ============================================================================
// Counter Set
// ============================================================================

/// All counters kept by one kernel instance
#[derive(Debug)]
pub struct SchedCounters {
    pub items_executed: SchedCounter,
    pub waits_blocked: SchedCounter,
    pub waits_immediate: SchedCounter,
    pub dispatches: SchedCounter,
    pub preemptions: SchedCounter,
    pub quantum_expiries: SchedCounter,
    pub icis_sent: SchedCounter,
    pub tlb_shootdowns: SchedCounter,
    pub timers_fired: SchedCounter,
    pub sched_timer_passes: SchedCounter,
    pub idle_entries: SchedCounter,
    pub max_ready: SchedCounter,
}

impl SchedCounters {
    pub const fn new() -> Self {
        Self {
            items_executed: SchedCounter::new("items_executed"),
            waits_blocked: SchedCounter::new("waits_blocked"),
            waits_immediate: SchedCounter::new("waits_immediate"),
            dispatches: SchedCounter::new("dispatches"),
            preemptions: SchedCounter::new("preemptions"),
            quantum_expiries: SchedCounter::new("quantum_expiries"),
            icis_sent: SchedCounter::new("icis_sent"),
            tlb_shootdowns: SchedCounter::new("tlb_shootdowns"),
            timers_fired: SchedCounter::new("timers_fired"),
            sched_timer_passes: SchedCounter::new("sched_timer_passes"),
            idle_entries: SchedCounter::new("idle_entries"),
            max_ready: SchedCounter::new("max_ready"),
        }
    }

    fn all(&self) -> [&SchedCounter; 12] {
        [
            &self.items_executed,
            &self.waits_blocked,
            &self.waits_immediate,
            &self.dispatches,
            &self.preemptions,
            &self.quantum_expiries,
            &self.icis_sent,
            &self.tlb_shootdowns,
            &self.timers_fired,
            &self.sched_timer_passes,
            &self.idle_entries,
            &self.max_ready,
        ]
    }

    /// Reset all counters to zero
    pub fn reset_all(&self) {
        for c in self.all() {
            c.reset();
        }
    }

    /// Take a snapshot of all counters
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            items_executed: self.items_executed.get(),
            waits_blocked: self.waits_blocked.get(),
            waits_immediate: self.waits_immediate.get(),
            dispatches: self.dispatches.get(),
            preemptions: self.preemptions.get(),
            quantum_expiries: self.quantum_expiries.get(),
            icis_sent: self.icis_sent.get(),
            tlb_shootdowns: self.tlb_shootdowns.get(),
            timers_fired: self.timers_fired.get(),
            sched_timer_passes: self.sched_timer_passes.get(),
            idle_entries: self.idle_entries.get(),
            max_ready: self.max_ready.get(),
        }
    }
}

/// Point-in-time copy of a kernel's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub items_executed: u64,
    pub waits_blocked: u64,
    pub waits_immediate: u64,
    pub dispatches: u64,
    pub preemptions: u64,
    pub quantum_expiries: u64,
    pub icis_sent: u64,
    pub tlb_shootdowns: u64,
    pub timers_fired: u64,
    pub sched_timer_passes: u64,
    pub idle_entries: u64,
    pub max_ready: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_basic() {
        let counter = SchedCounter::new("test");
        assert_eq!(counter.get(), 0);
        assert_eq!(counter.name(), "test");

        counter.inc();
        assert_eq!(counter.get(), 1);

        counter.add(5);
        assert_eq!(counter.get(), 6);

        counter.reset();
        assert_eq!(counter.get(), 0);
    }

    #[test]
    fn test_counter_max() {
        let counter = SchedCounter::new("max_test");
        counter.update_max(10);
        assert_eq!(counter.get(), 10);

        counter.update_max(5);
        assert_eq!(counter.get(), 10);

        counter.update_max(20);
        assert_eq!(counter.get(), 20);
    }

    #[test]
    fn test_snapshot_and_reset() {
        let counters = SchedCounters::new();
        counter!(counters.dispatches);
        counter!(counters.dispatches);
        counters.icis_sent.add(3);

        let snap = counters.snapshot();
        #[cfg(feature = "sched_counters")]
        assert_eq!(snap.dispatches, 2);
        assert_eq!(snap.icis_sent, 3);

        counters.reset_all();
        assert_eq!(counters.snapshot(), CounterSnapshot::default());
    }
}
