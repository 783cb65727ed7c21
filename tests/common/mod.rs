//! Simulated platform shared by the integration tests
//!
//! Time only moves when a test sets it. ICIs, TLB invalidations, page
//! directory reloads, debug breaks and deadline-timer programming are
//! recorded for inspection.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use k2sched::kern::{CoreRun, Kernel, Platform, SchedConfig, SchedItem};
use k2sched::types::CoreIndex;

pub const C0: CoreIndex = CoreIndex(0);

#[derive(Default)]
pub struct SimPlatform {
    now: AtomicU64,
    pub icis: Mutex<Vec<(CoreIndex, CoreIndex)>>,
    pub tlb_flushes: Mutex<Vec<(CoreIndex, usize)>>,
    pub armed: Mutex<Vec<u64>>,
    pub halted: Mutex<Vec<CoreIndex>>,
    pub page_dir_updates: Mutex<Vec<CoreIndex>>,
    pub debug_breaks: Mutex<Vec<CoreIndex>>,
}

impl SimPlatform {
    pub fn set_now(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    /// Pages flushed on `core`, in order
    pub fn flushes_on(&self, core: CoreIndex) -> Vec<usize> {
        self.tlb_flushes
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == core)
            .map(|(_, va)| *va)
            .collect()
    }
}

impl Platform for SimPlatform {
    fn abs_time_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    fn send_ici(&self, from: CoreIndex, to: CoreIndex) {
        self.icis.lock().unwrap().push((from, to));
    }

    fn invalidate_tlb_page(&self, core: CoreIndex, va: usize) {
        self.tlb_flushes.lock().unwrap().push((core, va));
    }

    fn arm_sched_timer(&self, ms_from_now: u64) {
        self.armed.lock().unwrap().push(ms_from_now);
    }

    fn halt_core(&self, core: CoreIndex) {
        self.halted.lock().unwrap().push(core);
    }

    fn update_page_dir(&self, core: CoreIndex) {
        self.page_dir_updates.lock().unwrap().push(core);
    }

    fn debug_break(&self, core: CoreIndex) {
        self.debug_breaks.lock().unwrap().push(core);
    }
}

/// A kernel with `cores` cores, all registered
pub fn boot(cores: u32) -> Kernel<SimPlatform> {
    boot_with(SchedConfig::new(cores).with_max_threads(32))
}

pub fn boot_with(config: SchedConfig) -> Kernel<SimPlatform> {
    // Only the first test in a binary installs it
    let _ = k2sched::console::init_logger(log::LevelFilter::Warn);
    let k = Kernel::new(config, SimPlatform::default()).expect("kernel init failed");
    for c in 0..config.core_count {
        k.add_current_core(CoreIndex(c)).expect("core registration failed");
    }
    k
}

/// Tick core 0 once per millisecond over `from..=to`; returns the last
/// monitor result
pub fn tick_through(k: &Kernel<SimPlatform>, from: u64, to: u64) -> CoreRun {
    let mut run = CoreRun::Idle;
    for t in from..=to {
        k.platform().set_now(t);
        k.on_timer_tick(C0);
        run = k.monitor(C0);
    }
    run
}

/// Scheduler call from whatever runs on core 0
pub fn call(k: &Kernel<SimPlatform>, item: SchedItem) -> CoreRun {
    k.thread_call_sched(C0, item)
}
