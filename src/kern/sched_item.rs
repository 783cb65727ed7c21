//! Scheduler items
//!
//! Every state change a thread asks for travels to the scheduling core as a
//! [`SchedItem`] and runs there, serialized with all other changes. Each
//! handler returns the result to post back to the calling thread, or `None`
//! when the thread blocked and its result will be posted later (a wait
//! satisfied, a critical section handed over).

use core::sync::atomic::Ordering;

use heapless::Vec as HVec;
use log::{debug, info, warn};

use crate::kern::config::MAX_WAIT_ENTRIES;
use crate::kern::ici::TlbRequest;
use crate::kern::kernel::Kernel;
use crate::kern::objects::{
    AlarmObj, CritSecObj, EventObj, MailboxObj, Message, NotifyObj, ProcessObj, SemObj,
};
use crate::kern::platform::Platform;
use crate::kern::runq::ReadyPos;
use crate::kern::sched::SchedState;
use crate::kern::status::{ItemOutput, ItemResult, KernError, KernResult};
use crate::kern::thread::{AfterStop, LifeStage, RunState, SchedThread, ThreadAttr};
use crate::kern::timer::TimerKey;
use crate::kern::wait::SatisfyMode;
use crate::types::{
    AlarmId, CoreIndex, CritSecId, EventId, MailboxId, NotifyId, ObjRef, ProcessId, SemId,
    ThreadId, NIL,
};

// ============================================================================
// Item Types
// ============================================================================

/// Arguments of a wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitRequest {
    pub objects: HVec<ObjRef, MAX_WAIT_ENTRIES>,
    pub wait_all: bool,
    /// `None` waits forever; `Some(0)` only tests
    pub timeout_ms: Option<u64>,
}

impl WaitRequest {
    /// Wait for any one of `objects`
    pub fn any(objects: &[ObjRef], timeout_ms: Option<u64>) -> KernResult<Self> {
        Self::build(objects, false, timeout_ms)
    }

    /// Wait for all of `objects` at once
    pub fn all(objects: &[ObjRef], timeout_ms: Option<u64>) -> KernResult<Self> {
        Self::build(objects, true, timeout_ms)
    }

    /// Block for `ms` milliseconds
    pub fn sleep(ms: u64) -> Self {
        Self {
            objects: HVec::new(),
            wait_all: false,
            timeout_ms: Some(ms),
        }
    }

    /// Give up the core to ready threads of the same priority
    pub fn yield_now() -> Self {
        Self::sleep(0)
    }

    fn build(objects: &[ObjRef], wait_all: bool, timeout_ms: Option<u64>) -> KernResult<Self> {
        let objects = HVec::from_slice(objects).map_err(|_| KernError::LimitExceeded)?;
        Ok(Self {
            objects,
            wait_all,
            timeout_ms,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventChange {
    Set,
    Reset,
    /// Satisfy current waiters and leave the event reset
    Pulse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmChange {
    Cancel,
    /// Restart the period from now
    Rearm,
}

/// A request executed on the scheduling core on behalf of a thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedItem {
    ThreadExit { code: u32 },
    ThreadWait(WaitRequest),
    ThreadCreate { process: ProcessId, attr: ThreadAttr },
    ThreadSetAttr { target: ThreadId, attr: ThreadAttr },
    ThreadStop { target: ThreadId },
    ThreadResume { target: ThreadId },
    ThreadCleanup { target: ThreadId },
    ProcessCreate,
    EventCreate { manual_reset: bool, signalled: bool },
    EventChange { event: EventId, change: EventChange },
    SemCreate { initial: u32, max: u32 },
    SemRelease { sem: SemId, count: u32 },
    AlarmCreate { period_ms: u64, periodic: bool },
    AlarmChange { alarm: AlarmId, change: AlarmChange },
    MboxCreate { capacity: u32 },
    /// Take the oldest message, waiting up to `timeout_ms` for one
    MboxRecv { mailbox: MailboxId, timeout_ms: Option<u64> },
    MsgSend { mailbox: MailboxId, msg: Message },
    NotifyCreate,
    /// OR `flags` into the notify and wake its best waiter
    NotifyLatch { notify: NotifyId, flags: u32 },
    CritSecCreate,
    CritSecEnter { cs: CritSecId },
    CritSecLeave { cs: CritSecId },
    InvalidateTlb(TlbRequest),
}

impl SchedItem {
    pub fn name(&self) -> &'static str {
        match self {
            SchedItem::ThreadExit { .. } => "ThreadExit",
            SchedItem::ThreadWait(_) => "ThreadWait",
            SchedItem::ThreadCreate { .. } => "ThreadCreate",
            SchedItem::ThreadSetAttr { .. } => "ThreadSetAttr",
            SchedItem::ThreadStop { .. } => "ThreadStop",
            SchedItem::ThreadResume { .. } => "ThreadResume",
            SchedItem::ThreadCleanup { .. } => "ThreadCleanup",
            SchedItem::ProcessCreate => "ProcessCreate",
            SchedItem::EventCreate { .. } => "EventCreate",
            SchedItem::EventChange { .. } => "EventChange",
            SchedItem::SemCreate { .. } => "SemCreate",
            SchedItem::SemRelease { .. } => "SemRelease",
            SchedItem::AlarmCreate { .. } => "AlarmCreate",
            SchedItem::AlarmChange { .. } => "AlarmChange",
            SchedItem::MboxCreate { .. } => "MboxCreate",
            SchedItem::MboxRecv { .. } => "MboxRecv",
            SchedItem::MsgSend { .. } => "MsgSend",
            SchedItem::NotifyCreate => "NotifyCreate",
            SchedItem::NotifyLatch { .. } => "NotifyLatch",
            SchedItem::CritSecCreate => "CritSecCreate",
            SchedItem::CritSecEnter { .. } => "CritSecEnter",
            SchedItem::CritSecLeave { .. } => "CritSecLeave",
            SchedItem::InvalidateTlb(_) => "InvalidateTlb",
        }
    }
}

// ============================================================================
// Execution
// ============================================================================

impl<P: Platform> Kernel<P> {
    /// Run `item` for `thread`
    pub(crate) fn exec_item(
        &self,
        st: &mut SchedState,
        me: CoreIndex,
        thread: ThreadId,
        item: SchedItem,
    ) -> Option<ItemResult> {
        match item {
            SchedItem::ThreadExit { code } => {
                self.exec_thread_exit(st, me, thread, code);
                None
            }
            SchedItem::ThreadWait(req) => self.exec_thread_wait(st, me, thread, &req),
            SchedItem::ThreadCreate { process, attr } => {
                Some(self.exec_thread_create(st, process, attr).map(ItemOutput::Thread))
            }
            SchedItem::ThreadSetAttr { target, attr } => {
                Some(self.exec_thread_set_attr(st, me, target, attr))
            }
            SchedItem::ThreadStop { target } => Some(self.exec_thread_stop(st, me, target)),
            SchedItem::ThreadResume { target } => Some(self.exec_thread_resume(st, target)),
            SchedItem::ThreadCleanup { target } => {
                Some(self.exec_thread_cleanup(st, thread, target))
            }
            SchedItem::ProcessCreate => {
                Some(Self::exec_process_create(st).map(ItemOutput::Process))
            }
            SchedItem::EventCreate {
                manual_reset,
                signalled,
            } => Some(
                Self::exec_event_create(st, manual_reset, signalled)
                    .map(|e| ItemOutput::Object(ObjRef::Event(e))),
            ),
            SchedItem::EventChange { event, change } => {
                Some(self.exec_event_change(st, event, change))
            }
            SchedItem::SemCreate { initial, max } => Some(
                Self::exec_sem_create(st, initial, max)
                    .map(|s| ItemOutput::Object(ObjRef::Semaphore(s))),
            ),
            SchedItem::SemRelease { sem, count } => Some(self.exec_sem_release(st, sem, count)),
            SchedItem::AlarmCreate {
                period_ms,
                periodic,
            } => Some(
                self.exec_alarm_create(st, period_ms, periodic)
                    .map(|a| ItemOutput::Object(ObjRef::Alarm(a))),
            ),
            SchedItem::AlarmChange { alarm, change } => {
                Some(self.exec_alarm_change(st, alarm, change))
            }
            SchedItem::MboxCreate { capacity } => Some(
                Self::exec_mbox_create(st, capacity)
                    .map(|m| ItemOutput::Object(ObjRef::Mailbox(m))),
            ),
            SchedItem::MboxRecv {
                mailbox,
                timeout_ms,
            } => self.exec_mbox_recv(st, me, thread, mailbox, timeout_ms),
            SchedItem::MsgSend { mailbox, msg } => Some(self.exec_msg_send(st, mailbox, msg)),
            SchedItem::NotifyCreate => Some(
                Self::exec_notify_create(st).map(|n| ItemOutput::Object(ObjRef::Notify(n))),
            ),
            SchedItem::NotifyLatch { notify, flags } => {
                Some(self.exec_notify_latch(st, notify, flags))
            }
            SchedItem::CritSecCreate => Some(Self::exec_critsec_create(st).map(ItemOutput::CritSec)),
            SchedItem::CritSecEnter { cs } => self.exec_critsec_enter(st, me, thread, cs),
            SchedItem::CritSecLeave { cs } => Some(self.exec_critsec_leave(st, thread, cs)),
            SchedItem::InvalidateTlb(req) => Some(self.exec_invalidate_tlb(me, &req)),
        }
    }

    // ------------------------------------------------------------------
    // Threads
    // ------------------------------------------------------------------

    fn exec_thread_exit(&self, st: &mut SchedState, me: CoreIndex, thread: ThreadId, code: u32) {
        self.make_thread_inactive(st, me, thread, AfterStop::Exited);
        let (process, owned) = {
            let t = st.thread_mut(thread);
            t.exit_code = code;
            t.advance_life(LifeStage::Exited);
            (t.process, core::mem::take(&mut t.owned_critsecs))
        };

        for cs in owned {
            if let Some(obj) = st.objects.critsecs.get_mut(cs.0) {
                warn!(target: "sched", "{} exited holding critsec {}", thread, cs.0);
                obj.owner = None;
                obj.recursion = 0;
                self.hand_off_critsec(st, cs);
            }
        }

        self.satisfy_waiters(st, ObjRef::Thread(thread), SatisfyMode::Consume);

        if let Some(p) = st.objects.processes.get_mut(process.0) {
            p.live_threads -= 1;
            if p.live_threads == 0 {
                p.exited = true;
                info!(target: "sched", "process {} exited", process.0);
                self.satisfy_waiters(st, ObjRef::Process(process), SatisfyMode::Consume);
            }
        }
        debug!(target: "sched", "{} exited with {}", thread, code);
    }

    /// Create a thread in `process`, queued ready at the tail
    pub(crate) fn exec_thread_create(
        &self,
        st: &mut SchedState,
        process: ProcessId,
        attr: ThreadAttr,
    ) -> KernResult<ThreadId> {
        let attr = attr.validate(&self.config)?;
        let proc_obj = st
            .objects
            .processes
            .get(process.0)
            .ok_or(KernError::NotFound)?;
        if proc_obj.exited {
            return Err(KernError::InvalidState);
        }
        let Some(idx) = st.threads.vacant_index() else {
            warn!(target: "sched", "thread table full ({} slots)", st.threads.capacity());
            return Err(KernError::OutOfResources);
        };

        let id = ThreadId(idx);
        let serial = st.next_thread_serial;
        st.next_thread_serial += 1;

        let mut t = SchedThread::new(id, serial, process, attr);
        t.advance_life(LifeStage::Instantiated);
        let inserted = st.threads.insert(t);
        sched_assert!(inserted == Some(idx), "thread slot {} taken under us", idx);

        {
            let slot = &self.slots[idx as usize];
            *slot.result.lock() = None;
            slot.process.store(process.0, Ordering::SeqCst);
        }
        if let Some(p) = st.objects.processes.get_mut(process.0) {
            p.live_threads += 1;
        }

        st.thread_mut(id).advance_life(LifeStage::Run);
        self.settle(st, id, AfterStop::ReadyTail);
        debug!(target: "sched", "{} created in process {} at {:?}", id, process.0, attr.priority);
        Ok(id)
    }

    fn exec_thread_set_attr(
        &self,
        st: &mut SchedState,
        me: CoreIndex,
        target: ThreadId,
        attr: ThreadAttr,
    ) -> ItemResult {
        let attr = attr.validate(&self.config)?;
        let t = st.threads.get_mut(target.0).ok_or(KernError::NotFound)?;
        if t.has_exited() {
            return Err(KernError::InvalidState);
        }
        let old_prio = t.active_prio;
        let new_prio = attr.priority;
        t.attr = attr;
        t.base_prio = new_prio;
        t.active_prio = new_prio;
        t.quantum_left = t.quantum_left.min(attr.quantum_ms);
        let state = t.run_state;
        let dispatch = t.dispatch;

        match state {
            RunState::Ready => {
                st.ready.remove(target, old_prio);
                st.ready.push(target, new_prio, ReadyPos::Tail);
            }
            RunState::Running => {
                if let Some((core, _)) = dispatch {
                    if attr.affinity.allows(core) {
                        st.core_mut(core).active_prio = new_prio;
                        st.core_prio.set(core, new_prio);
                    } else {
                        self.make_thread_inactive(st, me, target, AfterStop::ReadyHead);
                    }
                }
            }
            RunState::Waiting => {
                let entries: HVec<(usize, ObjRef), MAX_WAIT_ENTRIES> = st
                    .thread(target)
                    .wait
                    .as_ref()
                    .map(|w| w.entries.iter().map(|e| (e.index, e.obj)).collect())
                    .unwrap_or_default();
                for (index, obj) in entries {
                    if let Some(w) = st.waitable_mut(obj) {
                        w.waiters_mut().reprioritize(target, index, new_prio);
                    }
                }
            }
            _ => {}
        }
        Ok(ItemOutput::None)
    }

    fn exec_thread_stop(&self, st: &mut SchedState, me: CoreIndex, target: ThreadId) -> ItemResult {
        let t = st.threads.get(target.0).ok_or(KernError::NotFound)?;
        if t.has_exited() {
            return Err(KernError::InvalidState);
        }
        let state = t.run_state;
        match state {
            RunState::Running | RunState::Ready => self.stop_thread(st, me, target),
            RunState::Waiting | RunState::BlockedCs => st.thread_mut(target).action_pending = true,
            RunState::Transition => {
                if Self::is_awaiting_release(st, target) {
                    st.thread_mut(target).after_transition = AfterStop::Stopped;
                } else {
                    st.thread_mut(target).action_pending = true;
                }
            }
            RunState::Stopped => {}
            RunState::None => return Err(KernError::InvalidState),
        }
        Ok(ItemOutput::None)
    }

    fn exec_thread_resume(&self, st: &mut SchedState, target: ThreadId) -> ItemResult {
        let t = st.threads.get(target.0).ok_or(KernError::NotFound)?;
        let (state, pending, after) = (t.run_state, t.action_pending, t.after_transition);
        match state {
            RunState::Stopped => self.settle(st, target, AfterStop::ReadyTail),
            _ if pending => st.thread_mut(target).action_pending = false,
            RunState::Transition if after == AfterStop::Stopped => {
                st.thread_mut(target).after_transition = AfterStop::ReadyHead;
            }
            _ => return Err(KernError::InvalidState),
        }
        Ok(ItemOutput::None)
    }

    /// Free an exited thread's slot. The next thread created may take the
    /// same index; only its serial tells the two apart.
    fn exec_thread_cleanup(&self, st: &mut SchedState, caller: ThreadId, target: ThreadId) -> ItemResult {
        if target == caller {
            return Err(KernError::BadArgument);
        }
        let t = st.threads.get_mut(target.0).ok_or(KernError::NotFound)?;
        if t.life != LifeStage::Exited || !t.waiters.is_empty() {
            return Err(KernError::InvalidState);
        }
        t.advance_life(LifeStage::Killed);
        t.advance_life(LifeStage::Cleanup);
        st.threads.remove(target.0);

        let slot = &self.slots[target.0 as usize];
        *slot.result.lock() = None;
        slot.process.store(NIL, Ordering::SeqCst);
        debug!(target: "sched", "{} cleaned up", target);
        Ok(ItemOutput::None)
    }

    // ------------------------------------------------------------------
    // Processes and waitable objects
    // ------------------------------------------------------------------

    pub(crate) fn exec_process_create(st: &mut SchedState) -> KernResult<ProcessId> {
        st.objects
            .processes
            .insert(ProcessObj::new())
            .map(ProcessId)
            .ok_or(KernError::OutOfResources)
    }

    pub(crate) fn exec_event_create(
        st: &mut SchedState,
        manual_reset: bool,
        signalled: bool,
    ) -> KernResult<EventId> {
        st.objects
            .events
            .insert(EventObj::new(manual_reset, signalled))
            .map(EventId)
            .ok_or(KernError::OutOfResources)
    }

    fn exec_event_change(&self, st: &mut SchedState, event: EventId, change: EventChange) -> ItemResult {
        let ev = st.objects.events.get_mut(event.0).ok_or(KernError::NotFound)?;
        let obj = ObjRef::Event(event);
        match change {
            EventChange::Set => {
                ev.signalled = true;
                self.satisfy_waiters(st, obj, SatisfyMode::Consume);
            }
            EventChange::Reset => ev.signalled = false,
            EventChange::Pulse => {
                ev.signalled = false;
                let mode = if ev.manual_reset {
                    SatisfyMode::PulseAll
                } else {
                    SatisfyMode::PulseOne
                };
                self.satisfy_waiters(st, obj, mode);
            }
        }
        Ok(ItemOutput::None)
    }

    pub(crate) fn exec_sem_create(st: &mut SchedState, initial: u32, max: u32) -> KernResult<SemId> {
        let sem = SemObj::new(initial, max)?;
        st.objects
            .sems
            .insert(sem)
            .map(SemId)
            .ok_or(KernError::OutOfResources)
    }

    fn exec_sem_release(&self, st: &mut SchedState, sem: SemId, count: u32) -> ItemResult {
        let prev = st
            .objects
            .sems
            .get_mut(sem.0)
            .ok_or(KernError::NotFound)?
            .release(count)?;
        self.satisfy_waiters(st, ObjRef::Semaphore(sem), SatisfyMode::Consume);
        Ok(ItemOutput::Count(prev))
    }

    /// Create an alarm and start its first period now
    pub(crate) fn exec_alarm_create(
        &self,
        st: &mut SchedState,
        period_ms: u64,
        periodic: bool,
    ) -> KernResult<AlarmId> {
        let alarm = AlarmObj::new(period_ms, periodic)?;
        let id = st
            .objects
            .alarms
            .insert(alarm)
            .map(AlarmId)
            .ok_or(KernError::OutOfResources)?;
        self.arm_alarm(st, id, period_ms);
        Ok(id)
    }

    fn arm_alarm(&self, st: &mut SchedState, alarm: AlarmId, period_ms: u64) {
        let now = self.platform.abs_time_ms().max(st.time_ms);
        if st.add_timer_item(TimerKey::Alarm(alarm), now, period_ms) {
            self.rearm_sched_timer(st);
        }
    }

    fn exec_alarm_change(&self, st: &mut SchedState, alarm: AlarmId, change: AlarmChange) -> ItemResult {
        let a = st.objects.alarms.get_mut(alarm.0).ok_or(KernError::NotFound)?;
        a.signalled = false;
        let period = a.period_ms;
        st.del_timer_item(TimerKey::Alarm(alarm));
        if change == AlarmChange::Rearm {
            self.arm_alarm(st, alarm, period);
        }
        Ok(ItemOutput::None)
    }

    // ------------------------------------------------------------------
    // Mailboxes and notifies
    // ------------------------------------------------------------------

    pub(crate) fn exec_mbox_create(st: &mut SchedState, capacity: u32) -> KernResult<MailboxId> {
        let mailbox = MailboxObj::new(capacity)?;
        st.objects
            .mailboxes
            .insert(mailbox)
            .map(MailboxId)
            .ok_or(KernError::OutOfResources)
    }

    fn exec_msg_send(&self, st: &mut SchedState, mailbox: MailboxId, msg: Message) -> ItemResult {
        st.objects
            .mailboxes
            .get_mut(mailbox.0)
            .ok_or(KernError::NotFound)?
            .send(msg)?;
        self.satisfy_waiters(st, ObjRef::Mailbox(mailbox), SatisfyMode::Consume);
        Ok(ItemOutput::None)
    }

    pub(crate) fn exec_notify_create(st: &mut SchedState) -> KernResult<NotifyId> {
        st.objects
            .notifies
            .insert(NotifyObj::default())
            .map(NotifyId)
            .ok_or(KernError::OutOfResources)
    }

    fn exec_notify_latch(&self, st: &mut SchedState, notify: NotifyId, flags: u32) -> ItemResult {
        if flags == 0 {
            return Err(KernError::BadArgument);
        }
        st.objects
            .notifies
            .get_mut(notify.0)
            .ok_or(KernError::NotFound)?
            .latched |= flags;
        self.satisfy_waiters(st, ObjRef::Notify(notify), SatisfyMode::Consume);
        Ok(ItemOutput::None)
    }

    // ------------------------------------------------------------------
    // Critical sections
    // ------------------------------------------------------------------

    fn exec_critsec_create(st: &mut SchedState) -> KernResult<CritSecId> {
        st.objects
            .critsecs
            .insert(CritSecObj::default())
            .map(CritSecId)
            .ok_or(KernError::OutOfResources)
    }

    fn exec_critsec_enter(
        &self,
        st: &mut SchedState,
        me: CoreIndex,
        thread: ThreadId,
        cs: CritSecId,
    ) -> Option<ItemResult> {
        let Some(owner) = st.objects.critsecs.get(cs.0).map(|c| c.owner) else {
            return Some(Err(KernError::NotFound));
        };
        if owner == Some(thread) {
            if let Some(c) = st.objects.critsecs.get_mut(cs.0) {
                c.recursion += 1;
            }
            return Some(Ok(ItemOutput::None));
        }
        if st.thread(thread).owned_critsecs.is_full() {
            return Some(Err(KernError::OutOfResources));
        }

        match owner {
            None => {
                if let Some(c) = st.objects.critsecs.get_mut(cs.0) {
                    c.owner = Some(thread);
                    c.recursion = 1;
                }
                let _ = st.thread_mut(thread).owned_critsecs.push(cs);
                Some(Ok(ItemOutput::None))
            }
            Some(holder) => {
                if let Some(c) = st.objects.critsecs.get_mut(cs.0) {
                    c.blocked.push_back(thread);
                }
                st.thread_mut(thread).blocked_on = Some(cs);
                self.make_thread_inactive(st, me, thread, AfterStop::BlockedCs);
                debug!(target: "sched", "{} blocks on critsec {} held by {}", thread, cs.0, holder);
                None
            }
        }
    }

    fn exec_critsec_leave(&self, st: &mut SchedState, thread: ThreadId, cs: CritSecId) -> ItemResult {
        let c = st.objects.critsecs.get_mut(cs.0).ok_or(KernError::NotFound)?;
        if c.owner != Some(thread) {
            return Err(KernError::BadArgument);
        }
        c.recursion -= 1;
        if c.recursion == 0 {
            c.owner = None;
            let owned = &mut st.thread_mut(thread).owned_critsecs;
            if let Some(pos) = owned.iter().position(|o| *o == cs) {
                owned.swap_remove(pos);
            }
            self.hand_off_critsec(st, cs);
        }
        Ok(ItemOutput::None)
    }

    /// Give a free critical section to its first blocked thread
    fn hand_off_critsec(&self, st: &mut SchedState, cs: CritSecId) {
        let Some(next) = st
            .objects
            .critsecs
            .get_mut(cs.0)
            .and_then(|c| c.blocked.pop_front())
        else {
            return;
        };
        if let Some(c) = st.objects.critsecs.get_mut(cs.0) {
            c.owner = Some(next);
            c.recursion = 1;
        }
        let t = st.thread_mut(next);
        sched_assert!(
            t.run_state == RunState::BlockedCs && t.blocked_on == Some(cs),
            "{} handed critsec {} while {:?}",
            next,
            cs.0,
            t.run_state
        );
        t.blocked_on = None;
        let _ = t.owned_critsecs.push(cs);

        self.post_result(next, Ok(ItemOutput::None));
        self.settle(st, next, AfterStop::ReadyHead);
        debug!(target: "sched", "critsec {} handed to {}", cs.0, next);
    }

    // ------------------------------------------------------------------
    // TLB
    // ------------------------------------------------------------------

    fn exec_invalidate_tlb(&self, me: CoreIndex, req: &TlbRequest) -> ItemResult {
        req.validate()?;
        self.tlb_invalidate_across_cores(me, req);
        Ok(ItemOutput::None)
    }
}
