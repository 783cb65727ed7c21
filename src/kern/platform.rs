//! Hardware collaborator interface
//!
//! The scheduler never touches hardware directly. A kernel port implements
//! [`Platform`] for its architecture; tests implement it with a simulated
//! clock and recorders.

use crate::types::CoreIndex;

/// Architecture services consumed by the scheduler
pub trait Platform: Sync {
    /// Monotonic milliseconds since boot
    fn abs_time_ms(&self) -> u64;

    /// Raise the inter-core interrupt from `from` to `to`
    fn send_ici(&self, from: CoreIndex, to: CoreIndex);

    /// Invalidate one page translation on `core` (called on that core)
    fn invalidate_tlb_page(&self, core: CoreIndex, va: usize);

    /// Reload the page directory on `core` (called on that core)
    fn update_page_dir(&self, _core: CoreIndex) {}

    /// Program the one-shot deadline timer `ms_from_now` in the future
    fn arm_sched_timer(&self, _ms_from_now: u64) {}

    /// Start the periodic system tick
    fn start_sys_tick(&self, _period_ms: u64) {}

    /// Stop `core` for good (panic ICI)
    fn halt_core(&self, _core: CoreIndex) {}

    /// Break into the debugger on `core`
    fn debug_break(&self, _core: CoreIndex) {}
}
