//! Kernel front end
//!
//! [`Kernel`] ties the per-core event queues to the scheduling core. Cores
//! interact with it in three ways:
//!
//! - Interrupt context queues a [`CoreEvent`] (tick, inter-core interrupt)
//!   and then runs the core's [`monitor`](Kernel::monitor).
//! - A running thread that needs the scheduler calls
//!   [`thread_call_sched`](Kernel::thread_call_sched) with a [`SchedItem`];
//!   its result is read back with [`item_result`](Kernel::item_result) once
//!   the thread is dispatched again.
//! - Boot code creates the first processes, threads and objects directly.
//!
//! The monitor drains the core's events, takes the scheduling baton if no
//! other core holds it, and finally tells the caller what the core should
//! execute next.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use log::{debug, info, trace, warn};
use spin::Mutex;

use crate::kern::config::SchedConfig;
use crate::kern::core_event::CoreEvent;
use crate::kern::counters::{counter, CounterSnapshot, SchedCounters};
use crate::kern::ici::{IciKind, TlbRange, TlbRendezvous, TlbRequest, TLB_MAX_RANGES};
use crate::kern::platform::Platform;
use crate::kern::processor::CpuCore;
use crate::kern::queue::{AtomicStack, LinkArena};
use crate::kern::sched::{sched_timer_node, SchedState};
use crate::kern::sched_item::SchedItem;
use crate::kern::status::{ItemResult, KernError, KernResult};
use crate::kern::thread::{LifeStage, RunState, ThreadAttr};
use crate::kern::timer::TimerKey;
use crate::types::{
    AlarmId, CoreIndex, CritSecId, EventId, MailboxId, NotifyId, Priority, ProcessId, SemId,
    ThreadId, NIL,
};

/// Baton owner while boot code edits scheduler state
const BOOT_BATON: u32 = NIL - 1;

/// What a core should do when it leaves the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreRun {
    /// Resume (or start) this thread
    Thread(ThreadId),
    /// Nothing to run; wait for the next interrupt
    Idle,
    /// The core was stopped for good
    Halted,
}

/// Cross-core mailbox of one thread slot
#[derive(Debug)]
pub(crate) struct ThreadSlot {
    pub(crate) item: Mutex<Option<SchedItem>>,
    pub(crate) result: Mutex<Option<ItemResult>>,
    pub(crate) process: AtomicU32,
}

impl ThreadSlot {
    fn new() -> Self {
        Self {
            item: Mutex::new(None),
            result: Mutex::new(None),
            process: AtomicU32::new(NIL),
        }
    }
}

/// Snapshot of one thread's scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadInfo {
    /// Creation serial; differs between threads that shared a slot
    pub serial: u64,
    pub process: ProcessId,
    pub life: LifeStage,
    pub run_state: RunState,
    pub base_prio: Priority,
    pub active_prio: Priority,
    pub last_run_core: Option<CoreIndex>,
    pub quantum_left: u32,
    pub total_run_time: u64,
    pub last_wait_ms: u64,
    pub exit_code: u32,
}

/// A scheduler instance for one machine
pub struct Kernel<P: Platform> {
    pub(crate) config: SchedConfig,
    pub(crate) platform: P,
    pub(crate) cores: Box<[CpuCore]>,
    pub(crate) slots: Box<[ThreadSlot]>,
    /// Threads with a queued call, plus the scheduler-timer node
    pub(crate) pending: AtomicStack,
    pub(crate) pending_links: LinkArena,
    /// Some pending work needs a scheduler pass
    pub(crate) request: AtomicBool,
    pub(crate) sched_timer_queued: AtomicBool,
    pub(crate) sched_timer_abs: AtomicU64,
    /// Index of the core holding the scheduling baton, or `NIL`
    pub(crate) scheduling_core: AtomicU32,
    pub(crate) state: Mutex<SchedState>,
    pub(crate) tlb: TlbRendezvous,
    pub(crate) counters: SchedCounters,
}

impl<P: Platform> Kernel<P> {
    pub fn new(config: SchedConfig, platform: P) -> KernResult<Self> {
        config.validate()?;
        let cores: Vec<CpuCore> = (0..config.core_count)
            .map(|i| CpuCore::new(CoreIndex(i), config.core_count))
            .collect();
        let slots: Vec<ThreadSlot> = (0..config.max_threads).map(|_| ThreadSlot::new()).collect();

        info!(
            target: "sched",
            "scheduler up: {} cores, {} thread slots, quantum {}ms",
            config.core_count,
            config.max_threads,
            config.default_quantum_ms
        );

        Ok(Self {
            config,
            platform,
            cores: cores.into_boxed_slice(),
            slots: slots.into_boxed_slice(),
            pending: AtomicStack::new(),
            pending_links: LinkArena::new(config.max_threads as usize + 1),
            request: AtomicBool::new(false),
            sched_timer_queued: AtomicBool::new(false),
            sched_timer_abs: AtomicU64::new(0),
            scheduling_core: AtomicU32::new(NIL),
            state: Mutex::new(SchedState::new(&config)),
            tlb: TlbRendezvous::new(),
            counters: SchedCounters::new(),
        })
    }

    pub fn config(&self) -> &SchedConfig {
        &self.config
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    pub fn reset_counters(&self) {
        self.counters.reset_all();
    }

    fn cpu(&self, core: CoreIndex) -> &CpuCore {
        self.cores
            .get(core.as_usize())
            .unwrap_or_else(|| sched_fatal!("{} does not exist", core))
    }

    // ------------------------------------------------------------------
    // Baton
    // ------------------------------------------------------------------

    pub(crate) fn take_baton(&self, owner: u32) -> bool {
        self.scheduling_core
            .compare_exchange(NIL, owner, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn release_baton(&self) {
        self.scheduling_core.store(NIL, Ordering::SeqCst);
    }

    /// Core currently running the scheduler
    pub fn scheduling_core(&self) -> Option<CoreIndex> {
        match self.scheduling_core.load(Ordering::SeqCst) {
            NIL | BOOT_BATON => None,
            c => Some(CoreIndex(c)),
        }
    }

    /// Run `f` on scheduler state from boot context
    fn with_boot_state<R>(
        &self,
        f: impl FnOnce(&mut SchedState) -> KernResult<R>,
    ) -> KernResult<R> {
        if !self.take_baton(BOOT_BATON) {
            warn!(target: "sched", "boot call while the scheduler is running");
            return Err(KernError::InvalidState);
        }
        let result = {
            let mut st = self.state.lock();
            f(&mut *st)
        };
        self.release_baton();
        self.request.store(true, Ordering::SeqCst);
        result
    }

    // ------------------------------------------------------------------
    // Boot
    // ------------------------------------------------------------------

    /// Register `core` with the scheduler; it starts idle
    pub fn add_current_core(&self, core: CoreIndex) -> KernResult<()> {
        let cpu = self.cores.get(core.as_usize()).ok_or(KernError::BadArgument)?;
        if !cpu.register() {
            return Err(KernError::InvalidState);
        }
        self.with_boot_state(|st| {
            st.core_mut(core).registered = true;
            st.core_prio.set(core, Priority::IDLE);
            st.idle_core_count += 1;
            Ok(())
        })?;
        info!(target: "sched", "{} online", core);
        Ok(())
    }

    pub fn start_sys_tick(&self) {
        info!(target: "sched", "system tick every {}ms", self.config.tick_ms);
        self.platform.start_sys_tick(self.config.tick_ms);
    }

    pub fn arm_sched_timer(&self, ms_from_now: u64) {
        self.platform.arm_sched_timer(ms_from_now);
    }

    pub fn create_process(&self) -> KernResult<ProcessId> {
        self.with_boot_state(Self::exec_process_create)
    }

    pub fn create_thread(&self, process: ProcessId, attr: ThreadAttr) -> KernResult<ThreadId> {
        self.with_boot_state(|st| self.exec_thread_create(st, process, attr))
    }

    pub fn create_event(&self, manual_reset: bool, signalled: bool) -> KernResult<EventId> {
        self.with_boot_state(|st| Self::exec_event_create(st, manual_reset, signalled))
    }

    pub fn create_semaphore(&self, initial: u32, max: u32) -> KernResult<SemId> {
        self.with_boot_state(|st| Self::exec_sem_create(st, initial, max))
    }

    pub fn create_alarm(&self, period_ms: u64, periodic: bool) -> KernResult<AlarmId> {
        self.with_boot_state(|st| self.exec_alarm_create(st, period_ms, periodic))
    }

    pub fn create_mailbox(&self, capacity: u32) -> KernResult<MailboxId> {
        self.with_boot_state(|st| Self::exec_mbox_create(st, capacity))
    }

    pub fn create_notify(&self) -> KernResult<NotifyId> {
        self.with_boot_state(Self::exec_notify_create)
    }

    // ------------------------------------------------------------------
    // Events and interrupts
    // ------------------------------------------------------------------

    /// Periodic tick on `core`; follow with `monitor(core)`
    pub fn on_timer_tick(&self, core: CoreIndex) {
        let now = self.platform.abs_time_ms();
        self.queue_cpu_core_event(core, CoreEvent::TimerTick { abs_time_ms: now });
    }

    pub fn queue_cpu_core_event(&self, core: CoreIndex, event: CoreEvent) {
        self.cpu(core).events.queue(event);
    }

    pub fn core_has_pending_events(&self, core: CoreIndex) -> bool {
        self.cpu(core).events.has_pending()
    }

    pub fn send_ici_to_one_core(&self, from: CoreIndex, to: CoreIndex, kinds: IciKind) {
        sched_assert!(from != to, "{} sent an ICI to itself", from);
        self.queue_cpu_core_event(to, CoreEvent::Ici { src: from, kinds });
        self.platform.send_ici(from, to);
        counter!(self.counters.icis_sent);
        trace!(target: "sched", "ICI {:?} {} -> {}", kinds, from, to);
    }

    /// Interrupt every other live core; returns how many were sent
    pub fn send_ici_to_all_other_cores(&self, from: CoreIndex, kinds: IciKind) -> u32 {
        let mut sent = 0;
        for cpu in self.cores.iter() {
            if cpu.index != from && cpu.is_registered() && !cpu.is_halted() {
                self.send_ici_to_one_core(from, cpu.index, kinds);
                sent += 1;
            }
        }
        sent
    }

    /// Invalidate `req` on every live core and wait until all have done so.
    /// Scheduling core only.
    pub(crate) fn tlb_invalidate_across_cores(&self, me: CoreIndex, req: &TlbRequest) {
        sched_assert!(
            self.scheduling_core.load(Ordering::SeqCst) == me.0,
            "TLB shootdown from {} without the baton",
            me
        );
        self.tlb.publish(req);
        let others = self.send_ici_to_all_other_cores(me, IciKind::TLB_INV);
        self.tlb_apply_local(me);
        self.tlb.wait_for(others + 1);
        self.tlb.clear();
        counter!(self.counters.tlb_shootdowns);
        debug!(
            target: "sched",
            "TLB shootdown for process {} acked by {} cores",
            req.process.0,
            others + 1
        );
    }

    fn tlb_apply_local(&self, core: CoreIndex) {
        let cpu = self.cpu(core);
        self.tlb.pages_for(cpu.active_process(), self.config.kernel_va_base, |va| {
            self.platform.invalidate_tlb_page(core, va)
        });
        self.tlb.ack();
    }

    fn handle_core_event(&self, core: CoreIndex, event: CoreEvent) {
        match event {
            CoreEvent::TimerTick { abs_time_ms } => {
                self.sched_timer_abs.fetch_max(abs_time_ms, Ordering::SeqCst);
                if !self.sched_timer_queued.swap(true, Ordering::SeqCst) {
                    self.pending
                        .push(&self.pending_links, sched_timer_node(&self.config));
                }
                self.request.store(true, Ordering::SeqCst);
            }
            CoreEvent::SchedCall { thread, .. } => {
                self.pending.push(&self.pending_links, thread.0);
                self.request.store(true, Ordering::SeqCst);
            }
            CoreEvent::Ici { src, kinds } => {
                trace!(target: "sched", "{} got ICI {:?} from {}", core, kinds, src);
                if kinds.contains(IciKind::TLB_INV) {
                    self.tlb_apply_local(core);
                }
                if kinds.contains(IciKind::PAGE_DIR_UPDATE) {
                    self.platform.update_page_dir(core);
                }
                if kinds.contains(IciKind::DEBUG) {
                    self.platform.debug_break(core);
                }
                if kinds.contains(IciKind::PANIC) {
                    warn!(target: "sched", "{} halted by {}", core, src);
                    self.cpu(core).halt();
                    self.platform.halt_core(core);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Core entry points
    // ------------------------------------------------------------------

    /// Drain `core`'s events and run the scheduler if work is waiting
    pub fn respond_to_call_from_thread(&self, core: CoreIndex) {
        for event in self.cpu(core).events.drain() {
            self.handle_core_event(core, event);
        }
        self.run_scheduler(core);
    }

    /// Entry from interrupt context and from scheduler calls. Processes
    /// everything pending for `core` and returns what it should run.
    pub fn monitor(&self, core: CoreIndex) -> CoreRun {
        let cpu = self.cpu(core);
        sched_assert!(cpu.is_registered(), "{} entered the monitor unregistered", core);
        if cpu.is_halted() {
            return CoreRun::Halted;
        }
        cpu.set_in_monitor(true);

        for event in cpu.events.drain() {
            self.handle_core_event(core, event);
        }

        let run = loop {
            if cpu.is_halted() {
                break CoreRun::Halted;
            }
            self.run_scheduler(core);

            let assigned = cpu.assigned();
            let running = cpu.running();
            if running.thread.is_some() && !running.same(assigned) {
                // Our thread was taken away; let the scheduler release it
                cpu.mark_stopped();
                self.request.store(true, Ordering::SeqCst);
                continue;
            }
            match assigned.thread {
                None => break CoreRun::Idle,
                Some(t) if assigned.claimed => {
                    if running.same(assigned) {
                        break CoreRun::Thread(t);
                    }
                    // Stopped in a call the scheduler has not finished
                    break CoreRun::Idle;
                }
                Some(t) => {
                    if cpu.claim(assigned) {
                        let process = self.slots[t.0 as usize].process.load(Ordering::SeqCst);
                        cpu.set_active_process((process != NIL).then_some(ProcessId(process)));
                        break CoreRun::Thread(t);
                    }
                }
            }
        };

        if run == CoreRun::Idle {
            counter!(self.counters.idle_entries);
        }
        cpu.set_in_monitor(false);
        run
    }

    /// Called by the thread running on `core` to hand `item` to the
    /// scheduler. Returns what the core runs next.
    pub fn thread_call_sched(&self, core: CoreIndex, item: SchedItem) -> CoreRun {
        let cpu = self.cpu(core);
        let Some(thread) = cpu.running().thread else {
            sched_fatal!("scheduler call from {} with no thread running", core)
        };
        {
            let mut slot = self.slots[thread.0 as usize].item.lock();
            sched_assert!(slot.is_none(), "{} called the scheduler twice", thread);
            *slot = Some(item);
        }
        cpu.mark_stopped();
        cpu.events.queue(CoreEvent::SchedCall {
            thread,
            abs_time_ms: self.platform.abs_time_ms(),
        });
        self.monitor(core)
    }

    /// Take the result of `thread`'s last scheduler item
    pub fn item_result(&self, thread: ThreadId) -> Option<ItemResult> {
        self.slots
            .get(thread.0 as usize)
            .and_then(|s| s.result.lock().take())
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn in_monitor(&self, core: CoreIndex) -> bool {
        self.cpu(core).in_monitor()
    }

    pub fn is_halted(&self, core: CoreIndex) -> bool {
        self.cpu(core).is_halted()
    }

    pub fn active_process(&self, core: CoreIndex) -> Option<ProcessId> {
        self.cpu(core).active_process()
    }

    pub fn tlb_acks(&self) -> u32 {
        self.tlb.acks()
    }

    pub fn tlb_params(&self) -> Option<(ProcessId, [TlbRange; TLB_MAX_RANGES])> {
        self.tlb.params()
    }

    pub fn sched_time_ms(&self) -> u64 {
        self.state.lock().time_ms
    }

    pub fn thread_info(&self, thread: ThreadId) -> Option<ThreadInfo> {
        let st = self.state.lock();
        st.threads.get(thread.0).map(|t| ThreadInfo {
            serial: t.serial,
            process: t.process,
            life: t.life,
            run_state: t.run_state,
            base_prio: t.base_prio,
            active_prio: t.active_prio,
            last_run_core: t.last_run_core,
            quantum_left: t.quantum_left,
            total_run_time: t.total_run_time,
            last_wait_ms: t.last_wait_ms,
            exit_code: t.exit_code,
        })
    }

    /// Thread the scheduler has placed on `core`
    pub fn core_thread(&self, core: CoreIndex) -> Option<ThreadId> {
        self.state.lock().cores.get(core.as_usize()).and_then(|c| c.running)
    }

    /// Ready threads in dispatch order
    pub fn ready_threads(&self) -> Vec<ThreadId> {
        self.state.lock().ready.iter().map(|(t, _)| t).collect()
    }

    pub fn event_signalled(&self, event: EventId) -> Option<bool> {
        self.state.lock().objects.events.get(event.0).map(|e| e.signalled)
    }

    pub fn semaphore_count(&self, sem: SemId) -> Option<u32> {
        self.state.lock().objects.sems.get(sem.0).map(|s| s.count)
    }

    pub fn alarm_signalled(&self, alarm: AlarmId) -> Option<bool> {
        self.state.lock().objects.alarms.get(alarm.0).map(|a| a.signalled)
    }

    /// Messages queued in a mailbox, reserved ones included
    pub fn mailbox_len(&self, mailbox: MailboxId) -> Option<usize> {
        self.state.lock().objects.mailboxes.get(mailbox.0).map(|m| m.queue.len())
    }

    pub fn notify_latched(&self, notify: NotifyId) -> Option<u32> {
        self.state.lock().objects.notifies.get(notify.0).map(|n| n.latched)
    }

    pub fn process_exited(&self, process: ProcessId) -> Option<bool> {
        self.state.lock().objects.processes.get(process.0).map(|p| p.exited)
    }

    pub fn critsec_owner(&self, cs: CritSecId) -> Option<ThreadId> {
        self.state.lock().objects.critsecs.get(cs.0).and_then(|c| c.owner)
    }

    /// Milliseconds until an alarm next fires
    pub fn alarm_remaining_ms(&self, alarm: AlarmId) -> Option<u64> {
        let mut st = self.state.lock();
        if st.objects.alarms.get(alarm.0).is_some_and(|a| a.timer.on_queue) {
            st.timer_remaining(TimerKey::Alarm(alarm))
        } else {
            None
        }
    }

    /// Milliseconds until a thread's wait times out
    pub fn wait_remaining_ms(&self, thread: ThreadId) -> Option<u64> {
        let mut st = self.state.lock();
        if st.threads.get(thread.0).is_some_and(|t| t.wait.is_some()) {
            st.timer_remaining(TimerKey::Wait(thread))
        } else {
            None
        }
    }
}
