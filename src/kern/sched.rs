//! Scheduling-core state and thread placement
//!
//! All scheduler state lives in one [`SchedState`]. Only the core holding
//! the scheduling baton touches it, so every transition below runs
//! serialized and without further locking.
//!
//! ## Moving threads on and off cores
//!
//! [`make_thread_active`](Kernel::make_thread_active) publishes a fresh
//! dispatch on the target core and interrupts it.
//! [`make_thread_inactive`](Kernel::make_thread_inactive) publishes an idle
//! dispatch; if the core was still executing the thread, the thread stays
//! in `Transition` on the awaiting-release list until the core reports the
//! dispatch stopped, and only then reaches its target state. A thread is
//! therefore never executing on two cores, and never queued ready while a
//! core still executes it.

use alloc::vec::Vec;
use core::sync::atomic::Ordering;

use bitflags::bitflags;
use heapless::Vec as HVec;
use log::{debug, trace};

use crate::kern::config::{SchedConfig, MAX_CORES};
use crate::kern::counters::counter;
use crate::kern::ici::IciKind;
use crate::kern::kernel::Kernel;
use crate::kern::objects::{AlarmObj, ObjectTable};
use crate::kern::platform::Platform;
use crate::kern::processor::{Dispatch, SEQ_MASK};
use crate::kern::runq::{CorePrioList, ReadyLists, ReadyPos};
use crate::kern::sched_item::SchedItem;
use crate::kern::slab::Slab;
use crate::kern::status::{ItemResult, KernError};
use crate::kern::thread::{AfterStop, RunState, SchedThread};
use crate::kern::timer::{TimerChain, TimerItem, TimerKey, TimerStore};
use crate::kern::wait::SatisfyMode;
use crate::types::{AlarmId, CoreIndex, ObjRef, Priority, ThreadId};

bitflags! {
    /// Scheduler-private per-core flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CoreExecFlags: u32 {
        /// Dispatch changed since the core last looked
        const CHANGED = 1 << 0;
        /// Running thread used up its quantum
        const QUANTUM_ZERO = 1 << 1;
    }
}

/// Scheduler view of one core
#[derive(Debug, Clone, Copy)]
pub struct SchedCpuCore {
    pub index: CoreIndex,
    pub registered: bool,
    pub running: Option<ThreadId>,
    /// Sequence of the last dispatch published to this core
    pub seq: u32,
    pub active_prio: Priority,
    pub exec_flags: CoreExecFlags,
    pub last_stop_time: u64,
}

impl SchedCpuCore {
    pub const fn new(index: CoreIndex) -> Self {
        Self {
            index,
            registered: false,
            running: None,
            seq: 0,
            active_prio: Priority::IDLE,
            exec_flags: CoreExecFlags::empty(),
            last_stop_time: 0,
        }
    }
}

/// A thread taken off a core that has not yet let go of it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AwaitingRelease {
    pub thread: ThreadId,
    pub core: CoreIndex,
    pub seq: u32,
}

/// Everything the scheduling core owns
#[derive(Debug)]
pub struct SchedState {
    /// Scheduler time: the last absolute time processed
    pub time_ms: u64,
    pub cores: HVec<SchedCpuCore, MAX_CORES>,
    pub core_prio: CorePrioList,
    pub idle_core_count: u32,
    pub ready: ReadyLists,
    pub threads: Slab<SchedThread>,
    pub next_thread_serial: u64,
    pub timers: TimerChain,
    pub objects: ObjectTable,
    /// Name of the item currently executing
    pub active_item: Option<&'static str>,
    pub active_thread: Option<ThreadId>,
    pub awaiting_release: Vec<AwaitingRelease>,
}

impl SchedState {
    pub fn new(config: &SchedConfig) -> Self {
        let mut cores = HVec::new();
        for i in 0..config.core_count {
            let _ = cores.push(SchedCpuCore::new(CoreIndex(i)));
        }
        Self {
            time_ms: 0,
            cores,
            core_prio: CorePrioList::new(),
            idle_core_count: 0,
            ready: ReadyLists::new(),
            threads: Slab::with_capacity(config.max_threads),
            next_thread_serial: 1,
            timers: TimerChain::new(),
            objects: ObjectTable::new(),
            active_item: None,
            active_thread: None,
            awaiting_release: Vec::new(),
        }
    }

    pub fn thread(&self, id: ThreadId) -> &SchedThread {
        self.threads
            .get(id.0)
            .unwrap_or_else(|| sched_fatal!("{} is not a live thread", id))
    }

    pub fn thread_mut(&mut self, id: ThreadId) -> &mut SchedThread {
        self.threads
            .get_mut(id.0)
            .unwrap_or_else(|| sched_fatal!("{} is not a live thread", id))
    }

    pub fn core(&self, core: CoreIndex) -> &SchedCpuCore {
        &self.cores[core.as_usize()]
    }

    pub fn core_mut(&mut self, core: CoreIndex) -> &mut SchedCpuCore {
        &mut self.cores[core.as_usize()]
    }

    /// Next dispatch sequence for `core`
    fn bump_seq(&mut self, core: CoreIndex) -> u32 {
        let c = self.core_mut(core);
        c.seq = (c.seq + 1) & SEQ_MASK;
        c.seq
    }

    fn timer_items(&mut self) -> (&mut TimerChain, TimerItems<'_>) {
        (
            &mut self.timers,
            TimerItems {
                threads: &mut self.threads,
                alarms: &mut self.objects.alarms,
            },
        )
    }

    /// Queue a timer item; true if it became the earliest
    pub fn add_timer_item(&mut self, key: TimerKey, start_ms: u64, wait_ms: u64) -> bool {
        let now = self.time_ms;
        let (chain, mut store) = self.timer_items();
        chain.add(&mut store, key, now, start_ms, wait_ms)
    }

    pub fn del_timer_item(&mut self, key: TimerKey) -> bool {
        let (chain, mut store) = self.timer_items();
        chain.remove(&mut store, key)
    }

    /// Milliseconds until the earliest timer item
    pub fn timer_head_delta(&mut self) -> Option<u64> {
        let (chain, store) = self.timer_items();
        chain.head_delta(&store)
    }

    pub fn timer_remaining(&mut self, key: TimerKey) -> Option<u64> {
        let (chain, store) = self.timer_items();
        chain.remaining(&store, key)
    }

    fn advance_timers(&mut self, elapsed_ms: u64) -> Vec<(TimerKey, u64)> {
        let (chain, mut store) = self.timer_items();
        chain.advance(&mut store, elapsed_ms)
    }
}

/// Timer items embedded in thread waits and alarms
pub struct TimerItems<'a> {
    threads: &'a mut Slab<SchedThread>,
    alarms: &'a mut Slab<AlarmObj>,
}

impl TimerStore for TimerItems<'_> {
    fn item(&self, key: TimerKey) -> &TimerItem {
        let item = match key {
            TimerKey::Wait(t) => self
                .threads
                .get(t.0)
                .and_then(|th| th.wait.as_ref())
                .map(|w| &w.timer),
            TimerKey::Alarm(a) => self.alarms.get(a.0).map(|al| &al.timer),
        };
        item.unwrap_or_else(|| sched_fatal!("timer item {:?} has no owner", key))
    }

    fn item_mut(&mut self, key: TimerKey) -> &mut TimerItem {
        let item = match key {
            TimerKey::Wait(t) => self
                .threads
                .get_mut(t.0)
                .and_then(|th| th.wait.as_mut())
                .map(|w| &mut w.timer),
            TimerKey::Alarm(a) => self.alarms.get_mut(a.0).map(|al| &mut al.timer),
        };
        item.unwrap_or_else(|| sched_fatal!("timer item {:?} has no owner", key))
    }
}

/// Node index of the scheduler-timer item on the pending stack
pub(crate) fn sched_timer_node(config: &SchedConfig) -> u32 {
    config.max_threads
}

impl<P: Platform> Kernel<P> {
    // ------------------------------------------------------------------
    // Scheduling-core entry
    // ------------------------------------------------------------------

    /// Run scheduler passes on `me` while work is requested and no other
    /// core holds the baton.
    pub(crate) fn run_scheduler(&self, me: CoreIndex) {
        loop {
            if !self.request.load(Ordering::SeqCst) {
                return;
            }
            if !self.take_baton(me.0) {
                return;
            }
            {
                let mut st = self.state.lock();
                while self.request.swap(false, Ordering::SeqCst) {
                    self.complete_releases(&mut st);
                    for node in self.pending.drain(&self.pending_links) {
                        self.exec_pending(&mut st, me, node);
                    }
                    self.check(&mut st, me);
                }
            }
            self.release_baton();
        }
    }

    fn exec_pending(&self, st: &mut SchedState, me: CoreIndex, node: u32) {
        if node == sched_timer_node(&self.config) {
            self.sched_timer_queued.store(false, Ordering::SeqCst);
            let now = self.sched_timer_abs.load(Ordering::SeqCst);
            sched_assert!(
                st.active_item.is_none(),
                "scheduler timer ran inside {:?}",
                st.active_item
            );
            st.active_item = Some("SchedTimer");
            self.time_passed(st, now);
            st.active_item = None;
            counter!(self.counters.sched_timer_passes);
            return;
        }

        let thread = ThreadId(node);
        let Some(item) = self.slots[node as usize].item.lock().take() else {
            sched_fatal!("{} queued a scheduler call without an item", thread)
        };
        self.exec_thread_item(st, me, thread, item);
    }

    /// Execute `thread`'s scheduler item with the thread detached from
    /// wherever it was, then put it back unless the item moved it.
    fn exec_thread_item(&self, st: &mut SchedState, me: CoreIndex, thread: ThreadId, item: SchedItem) {
        sched_assert!(
            st.active_item.is_none(),
            "{} started while {:?} is active",
            item.name(),
            st.active_item
        );
        st.active_item = Some(item.name());
        st.active_thread = Some(thread);
        counter!(self.counters.items_executed);
        trace!(target: "sched", "{} exec {}", thread, item.name());

        self.complete_releases(st);

        let (prior, prio) = {
            let t = st.thread(thread);
            (t.run_state, t.active_prio)
        };
        match prior {
            RunState::Running => {}
            RunState::Ready => {
                st.ready.remove(thread, prio);
                st.thread_mut(thread).run_state = RunState::Transition;
            }
            RunState::Stopped => {
                let t = st.thread_mut(thread);
                t.action_pending = true;
                t.run_state = RunState::Transition;
            }
            other => sched_fatal!("{} called the scheduler while {:?}", thread, other),
        }

        if let Some(result) = self.exec_item(st, me, thread, item) {
            self.post_result(thread, result);
        }

        match st.thread(thread).run_state {
            RunState::Running => self.redispatch(st, me, thread),
            RunState::Transition => self.settle(st, thread, AfterStop::ReadyHead),
            _ => {}
        }

        st.active_item = None;
        st.active_thread = None;
    }

    pub(crate) fn post_result(&self, thread: ThreadId, result: ItemResult) {
        *self.slots[thread.0 as usize].result.lock() = Some(result);
    }

    /// Whether `thread` has a scheduler call the scheduler has not taken yet
    fn has_pending_item(&self, thread: ThreadId) -> bool {
        self.slots[thread.0 as usize].item.lock().is_some()
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Publish `next` on `core` and interrupt it if it must notice.
    /// Returns the dispatch it replaced.
    fn publish_dispatch(&self, me: CoreIndex, core: CoreIndex, next: Dispatch) -> Dispatch {
        let cpu = &self.cores[core.as_usize()];
        let old = cpu.publish(next);
        if core != me {
            let live = old.thread.is_some() && old.claimed && !cpu.has_stopped(old.seq);
            if live {
                self.send_ici_to_one_core(me, core, IciKind::STOP);
            } else if next.thread.is_some() {
                self.send_ici_to_one_core(me, core, IciKind::WAKEUP);
            }
        }
        old
    }

    /// Put ready or detached `thread` on idle `core`
    pub(crate) fn make_thread_active(
        &self,
        st: &mut SchedState,
        me: CoreIndex,
        core: CoreIndex,
        thread: ThreadId,
    ) {
        let (state, prio) = {
            let t = st.thread(thread);
            (t.run_state, t.active_prio)
        };
        match state {
            RunState::Ready => {
                st.ready.remove(thread, prio);
            }
            RunState::Transition => {}
            other => sched_fatal!("{} made active while {:?}", thread, other),
        }
        sched_assert!(
            st.core(core).running.is_none(),
            "{} made active on busy {}",
            thread,
            core
        );

        let now = self.platform.abs_time_ms();
        let seq = st.bump_seq(core);
        {
            let t = st.thread_mut(thread);
            t.run_state = RunState::Running;
            t.dispatch = Some((core, seq));
            t.last_run_core = Some(core);
            t.run_start = now;
            if t.quantum_left == 0 {
                t.refill_quantum();
            }
        }
        {
            let c = st.core_mut(core);
            c.running = Some(thread);
            c.active_prio = prio;
            c.exec_flags.remove(CoreExecFlags::QUANTUM_ZERO);
            c.exec_flags.insert(CoreExecFlags::CHANGED);
        }
        st.idle_core_count -= 1;
        st.core_prio.set(core, prio);

        self.publish_dispatch(me, core, Dispatch::run(thread, seq));
        counter!(self.counters.dispatches);
        trace!(target: "sched", "{} -> {} seq {}", thread, core, seq);
    }

    /// Hand running `thread` a fresh dispatch on the core it already has
    fn redispatch(&self, st: &mut SchedState, me: CoreIndex, thread: ThreadId) {
        let Some((core, _)) = st.thread(thread).dispatch else {
            sched_fatal!("{} running without a dispatch", thread)
        };
        let seq = st.bump_seq(core);
        st.thread_mut(thread).dispatch = Some((core, seq));
        st.core_mut(core).exec_flags.insert(CoreExecFlags::CHANGED);
        self.publish_dispatch(me, core, Dispatch::run(thread, seq));
    }

    /// Take `thread` off its core or the ready list and send it to `target`
    pub(crate) fn make_thread_inactive(
        &self,
        st: &mut SchedState,
        me: CoreIndex,
        thread: ThreadId,
        target: AfterStop,
    ) {
        let (state, dispatch, prio) = {
            let t = st.thread(thread);
            (t.run_state, t.dispatch, t.active_prio)
        };

        match state {
            RunState::Running => {
                let Some((core, seq)) = dispatch else {
                    sched_fatal!("{} running without a dispatch", thread)
                };
                let now = self.platform.abs_time_ms();
                let idle_seq = st.bump_seq(core);
                {
                    let c = st.core_mut(core);
                    c.running = None;
                    c.active_prio = Priority::IDLE;
                    c.last_stop_time = now;
                    c.exec_flags.remove(CoreExecFlags::QUANTUM_ZERO);
                    c.exec_flags.insert(CoreExecFlags::CHANGED);
                }
                st.idle_core_count += 1;
                st.core_prio.set(core, Priority::IDLE);
                {
                    let t = st.thread_mut(thread);
                    t.dispatch = None;
                    t.total_run_time += now.saturating_sub(t.run_start);
                    t.last_stop_time = now;
                }

                let old = self.publish_dispatch(me, core, Dispatch::idle(idle_seq));
                sched_assert!(
                    old.thread == Some(thread) && old.seq == seq,
                    "{} dispatch on {} was replaced behind the scheduler",
                    thread,
                    core
                );
                if old.claimed && !self.cores[core.as_usize()].has_stopped(seq) {
                    sched_assert!(
                        matches!(
                            target,
                            AfterStop::ReadyHead | AfterStop::ReadyTail | AfterStop::Stopped
                        ),
                        "{} still executing on {} cannot go to {:?}",
                        thread,
                        core,
                        target
                    );
                    let t = st.thread_mut(thread);
                    t.run_state = RunState::Transition;
                    t.after_transition = target;
                    st.awaiting_release.push(AwaitingRelease { thread, core, seq });
                    trace!(target: "sched", "{} awaiting release from {}", thread, core);
                    return;
                }
            }
            RunState::Ready => {
                let removed = st.ready.remove(thread, prio);
                sched_assert!(removed, "{} ready but not on the ready list", thread);
            }
            RunState::Transition => {
                sched_assert!(
                    st.active_thread == Some(thread),
                    "{} in transition made inactive again",
                    thread
                );
            }
            other => sched_fatal!("{} made inactive while {:?}", thread, other),
        }

        self.settle(st, thread, target);
    }

    /// Put an off-core `thread` into `target`. A pending stop turns a
    /// ready target into `Stopped`.
    pub(crate) fn settle(&self, st: &mut SchedState, thread: ThreadId, target: AfterStop) {
        let t = st.thread_mut(thread);
        let target = match target {
            AfterStop::ReadyHead | AfterStop::ReadyTail if t.action_pending => AfterStop::Stopped,
            other => other,
        };
        let prio = t.active_prio;
        match target {
            AfterStop::ReadyHead | AfterStop::ReadyTail => {
                t.run_state = RunState::Ready;
                let pos = if target == AfterStop::ReadyHead {
                    ReadyPos::Head
                } else {
                    ReadyPos::Tail
                };
                st.ready.push(thread, prio, pos);
                #[cfg(feature = "sched_counters")]
                self.counters.max_ready.update_max(st.ready.len() as u64);
            }
            AfterStop::Stopped => {
                t.action_pending = false;
                t.run_state = RunState::Stopped;
            }
            AfterStop::Waiting => t.run_state = RunState::Waiting,
            AfterStop::BlockedCs => t.run_state = RunState::BlockedCs,
            AfterStop::Exited => t.run_state = RunState::None,
        }
    }

    /// Finish every transition whose core has let go
    pub(crate) fn complete_releases(&self, st: &mut SchedState) {
        let mut i = 0;
        while i < st.awaiting_release.len() {
            let AwaitingRelease { thread, core, seq } = st.awaiting_release[i];
            if !self.cores[core.as_usize()].has_stopped(seq) {
                i += 1;
                continue;
            }
            st.awaiting_release.remove(i);
            let t = st.thread(thread);
            sched_assert!(
                t.run_state == RunState::Transition,
                "{} released from {} while {:?}",
                thread,
                core,
                t.run_state
            );
            let target = t.after_transition;
            self.settle(st, thread, target);
            trace!(target: "sched", "{} released by {}", thread, core);
        }
    }

    /// Whether `thread` is parked on the awaiting-release list
    pub(crate) fn is_awaiting_release(st: &SchedState, thread: ThreadId) -> bool {
        st.awaiting_release.iter().any(|a| a.thread == thread)
    }

    /// Run `thread` on `core`, pushing whatever runs there to the ready head
    fn preempt_core(&self, st: &mut SchedState, me: CoreIndex, core: CoreIndex, thread: ThreadId) {
        if let Some(current) = st.core(core).running {
            self.make_thread_inactive(st, me, current, AfterStop::ReadyHead);
            counter!(self.counters.preemptions);
            debug!(target: "sched", "{} preempts {} on {}", thread, current, core);
        }
        self.make_thread_active(st, me, core, thread);
    }

    pub(crate) fn stop_thread(&self, st: &mut SchedState, me: CoreIndex, thread: ThreadId) {
        self.make_thread_inactive(st, me, thread, AfterStop::Stopped);
    }

    // ------------------------------------------------------------------
    // Placement
    // ------------------------------------------------------------------

    /// Rebalance after a pass: expire quanta, then place ready threads
    pub(crate) fn check(&self, st: &mut SchedState, me: CoreIndex) {
        for k in 0..st.cores.len() {
            let core = CoreIndex(k as u32);
            let c = st.core(core);
            if !c.registered || !c.exec_flags.contains(CoreExecFlags::QUANTUM_ZERO) {
                continue;
            }
            st.core_mut(core).exec_flags.remove(CoreExecFlags::QUANTUM_ZERO);
            let Some(current) = st.core(core).running else {
                continue;
            };
            let prio = st.thread(current).active_prio;

            let threads = &st.threads;
            let rival = st.ready.first_where(|t| {
                !self.has_pending_item(t)
                    && threads
                        .get(t.0)
                        .is_some_and(|th| th.attr.affinity.allows(core))
            });
            match rival {
                Some((_, rp)) if !prio.is_higher_than(rp) => {
                    self.make_thread_inactive(st, me, current, AfterStop::ReadyTail);
                    counter!(self.counters.quantum_expiries);
                    debug!(target: "sched", "{} quantum expired on {}", current, core);
                }
                _ => st.thread_mut(current).refill_quantum(),
            }
        }

        loop {
            let mut placed = false;
            for (thread, prio) in st.ready.snapshot() {
                if self.has_pending_item(thread) {
                    continue;
                }
                let (affinity, last) = {
                    let t = st.thread(thread);
                    (t.attr.affinity, t.last_run_core)
                };
                let target = last
                    .filter(|c| {
                        affinity.allows(*c) && st.core(*c).registered && st.core(*c).running.is_none()
                    })
                    .or_else(|| st.core_prio.idle_core(|c| affinity.allows(c)))
                    .or_else(|| st.core_prio.preemptible(prio, |c| affinity.allows(c)));
                if let Some(core) = target {
                    self.preempt_core(st, me, core, thread);
                    placed = true;
                    break;
                }
            }
            if !placed {
                break;
            }
        }
    }

    // ------------------------------------------------------------------
    // Time
    // ------------------------------------------------------------------

    /// Bring scheduler time up to `now_ms`: charge quanta, fire timers
    pub(crate) fn time_passed(&self, st: &mut SchedState, now_ms: u64) {
        if now_ms <= st.time_ms {
            return;
        }
        let elapsed = now_ms - st.time_ms;
        st.time_ms = now_ms;

        for k in 0..st.cores.len() {
            let core = CoreIndex(k as u32);
            let Some(thread) = st.core(core).running else {
                continue;
            };
            let t = st.thread_mut(thread);
            t.quantum_left = t.quantum_left.saturating_sub(elapsed.min(u32::MAX as u64) as u32);
            if t.quantum_left == 0 {
                st.core_mut(core).exec_flags.insert(CoreExecFlags::QUANTUM_ZERO);
            }
        }

        for (key, late_ms) in st.advance_timers(elapsed) {
            counter!(self.counters.timers_fired);
            match key {
                TimerKey::Wait(thread) => {
                    self.end_thread_wait(st, thread, Err(KernError::Timeout))
                }
                TimerKey::Alarm(alarm) => self.fire_alarm(st, alarm, now_ms - late_ms),
            }
        }

        self.rearm_sched_timer(st);
    }

    /// Signal `alarm`, whose deadline was `deadline_ms`, and pulse its
    /// waiters. A periodic alarm goes again one period after that deadline,
    /// skipping periods that already passed, and stays signalled only if
    /// nobody was waiting.
    fn fire_alarm(&self, st: &mut SchedState, alarm: AlarmId, deadline_ms: u64) {
        let Some(a) = st.objects.alarms.get_mut(alarm.0) else {
            sched_fatal!("alarm {} fired after removal", alarm.0)
        };
        a.signalled = true;
        let (periodic, period) = (a.periodic, a.period_ms);
        let waiting = a.waiters.len();
        trace!(target: "sched", "alarm {} fired", alarm.0);
        if periodic {
            let now = st.time_ms;
            let missed = now.saturating_sub(deadline_ms) / period;
            if missed > 0 {
                debug!(target: "sched", "alarm {} missed {} period(s)", alarm.0, missed);
            }
            let next = deadline_ms + (missed + 1) * period;
            st.add_timer_item(TimerKey::Alarm(alarm), now, next - now);
        }
        self.satisfy_waiters(st, ObjRef::Alarm(alarm), SatisfyMode::PulseAll);
        if let Some(a) = st.objects.alarms.get_mut(alarm.0) {
            if a.periodic && a.waiters.len() < waiting {
                a.signalled = false;
            }
        }
    }

    /// Point the platform deadline timer at the earliest timer item
    pub(crate) fn rearm_sched_timer(&self, st: &mut SchedState) {
        if let Some(delta) = st.timer_head_delta() {
            self.platform.arm_sched_timer(delta);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kern::thread::ThreadAttr;
    use crate::kern::wait::MacroWait;
    use crate::types::ProcessId;

    #[test]
    fn test_state_starts_empty() {
        let st = SchedState::new(&SchedConfig::new(3));
        assert_eq!(st.cores.len(), 3);
        assert!(st.cores.iter().all(|c| !c.registered && c.running.is_none()));
        assert!(st.ready.is_empty());
        assert_eq!(st.idle_core_count, 0);
    }

    #[test]
    fn test_seq_grows_per_core() {
        let mut st = SchedState::new(&SchedConfig::new(2));
        assert_eq!(st.bump_seq(CoreIndex(0)), 1);
        assert_eq!(st.bump_seq(CoreIndex(0)), 2);
        assert_eq!(st.bump_seq(CoreIndex(1)), 1);
    }

    #[test]
    fn test_timer_items_live_in_owners() {
        let mut st = SchedState::new(&SchedConfig::new(1));
        let id = st
            .threads
            .insert(SchedThread::new(
                ThreadId(0),
                1,
                ProcessId(0),
                ThreadAttr::new(Priority(4)),
            ))
            .unwrap();
        st.thread_mut(ThreadId(id)).wait = Some(MacroWait::new(ThreadId(id), false, 0));
        let alarm = st.objects.alarms.insert(AlarmObj::new(5, false).unwrap()).unwrap();

        assert!(st.add_timer_item(TimerKey::Wait(ThreadId(id)), 0, 20));
        assert!(st.add_timer_item(TimerKey::Alarm(AlarmId(alarm)), 0, 5));
        assert_eq!(st.timer_head_delta(), Some(5));
        assert_eq!(st.timer_remaining(TimerKey::Wait(ThreadId(id))), Some(20));
        assert!(st.thread(ThreadId(id)).wait.as_ref().unwrap().timer.on_queue);

        assert!(st.del_timer_item(TimerKey::Wait(ThreadId(id))));
        assert_eq!(st.advance_timers(5), vec![(TimerKey::Alarm(AlarmId(alarm)), 0)]);
        assert!(st.timers.is_empty());
    }

    #[test]
    #[should_panic]
    fn test_timer_item_without_wait_is_fatal() {
        let mut st = SchedState::new(&SchedConfig::new(1));
        st.add_timer_item(TimerKey::Wait(ThreadId(7)), 0, 10);
    }
}
