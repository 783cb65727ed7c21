//! Multi-object waits
//!
//! A thread waits on up to [`MAX_WAIT_ENTRIES`] objects at once, for any one
//! of them or for all of them together. The wait is a [`MacroWait`] hung off
//! the thread; each of its entries is mounted on its object's
//! [`WaitEntryPrioList`] so that an object change can find its waiters best
//! priority first.
//!
//! A wait-all is satisfied atomically: no object is consumed until every
//! object is signalled (or was pulsed while the thread waited). A pulse
//! leaves nothing signalled behind, so a pulsed entry is marked sticky and
//! counts as satisfied from then on.

use alloc::vec::Vec;
use heapless::Vec as HVec;
use log::debug;

use crate::kern::config::MAX_WAIT_ENTRIES;
use crate::kern::counters::counter;
use crate::kern::kernel::Kernel;
use crate::kern::platform::Platform;
use crate::kern::sched::SchedState;
use crate::kern::sched_item::WaitRequest;
use crate::kern::status::{ItemOutput, ItemResult, KernError};
use crate::kern::thread::{AfterStop, RunState, SchedThread};
use crate::kern::timer::{TimerItem, TimerKey};
use crate::types::{CoreIndex, MailboxId, ObjRef, Priority, ThreadId};

// ============================================================================
// Wait Entries
// ============================================================================

/// One object of a macro wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitEntry {
    pub index: usize,
    /// Pulsed while the thread waited
    pub sticky_pulse: bool,
    pub obj: ObjRef,
}

/// A thread's composite wait
#[derive(Debug)]
pub struct MacroWait {
    pub thread: ThreadId,
    pub wait_all: bool,
    pub timer: TimerItem,
    pub entries: HVec<WaitEntry, MAX_WAIT_ENTRIES>,
    pub started_ms: u64,
    /// Mailbox whose message the thread takes when the wait succeeds
    pub receive: Option<MailboxId>,
}

impl MacroWait {
    pub fn new(thread: ThreadId, wait_all: bool, started_ms: u64) -> Self {
        Self {
            thread,
            wait_all,
            timer: TimerItem::new(),
            entries: HVec::new(),
            started_ms,
            receive: None,
        }
    }
}

/// A waiter as seen from the object side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitLink {
    pub thread: ThreadId,
    pub entry: usize,
    pub prio: Priority,
}

/// An object's waiters, best priority first, FIFO within a priority
#[derive(Debug, Default)]
pub struct WaitEntryPrioList {
    links: Vec<WaitLink>,
}

impl WaitEntryPrioList {
    pub const fn new() -> Self {
        Self { links: Vec::new() }
    }

    pub fn insert(&mut self, link: WaitLink) {
        let at = self
            .links
            .iter()
            .position(|l| link.prio.is_higher_than(l.prio))
            .unwrap_or(self.links.len());
        self.links.insert(at, link);
    }

    pub fn remove(&mut self, thread: ThreadId, entry: usize) -> bool {
        match self
            .links
            .iter()
            .position(|l| l.thread == thread && l.entry == entry)
        {
            Some(pos) => {
                self.links.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Move a waiter to the position its new priority earns
    pub fn reprioritize(&mut self, thread: ThreadId, entry: usize, prio: Priority) {
        if self.remove(thread, entry) {
            self.insert(WaitLink { thread, entry, prio });
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &WaitLink> {
        self.links.iter()
    }

    pub fn snapshot(&self) -> Vec<WaitLink> {
        self.links.clone()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

// ============================================================================
// Waitable Objects
// ============================================================================

/// An object threads can wait on
pub trait Waitable {
    fn is_signalled(&self) -> bool;
    /// Take the signal a satisfied waiter uses up, returning the data word
    /// it carries (zero for plain signals)
    fn consume(&mut self) -> u32;
    fn waiters(&self) -> &WaitEntryPrioList;
    fn waiters_mut(&mut self) -> &mut WaitEntryPrioList;
}

impl Waitable for SchedThread {
    fn is_signalled(&self) -> bool {
        self.has_exited()
    }

    fn consume(&mut self) -> u32 {
        0
    }

    fn waiters(&self) -> &WaitEntryPrioList {
        &self.waiters
    }

    fn waiters_mut(&mut self) -> &mut WaitEntryPrioList {
        &mut self.waiters
    }
}

fn is_notify(obj: &ObjRef) -> bool {
    matches!(obj, ObjRef::Notify(_))
}

/// How an object change satisfies its waiters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SatisfyMode {
    /// Satisfy waiters while the object stays signalled
    Consume,
    /// Transient signal: the first waiter it satisfies
    PulseOne,
    /// Transient signal: every current waiter
    PulseAll,
}

impl SchedState {
    pub fn waitable(&self, obj: ObjRef) -> Option<&dyn Waitable> {
        match obj {
            ObjRef::Event(id) => self.objects.events.get(id.0).map(|o| o as &dyn Waitable),
            ObjRef::Semaphore(id) => self.objects.sems.get(id.0).map(|o| o as &dyn Waitable),
            ObjRef::Alarm(id) => self.objects.alarms.get(id.0).map(|o| o as &dyn Waitable),
            ObjRef::Process(id) => self.objects.processes.get(id.0).map(|o| o as &dyn Waitable),
            ObjRef::Thread(id) => self.threads.get(id.0).map(|o| o as &dyn Waitable),
            ObjRef::Mailbox(id) => self.objects.mailboxes.get(id.0).map(|o| o as &dyn Waitable),
            ObjRef::Notify(id) => self.objects.notifies.get(id.0).map(|o| o as &dyn Waitable),
        }
    }

    pub fn waitable_mut(&mut self, obj: ObjRef) -> Option<&mut dyn Waitable> {
        match obj {
            ObjRef::Event(id) => self
                .objects
                .events
                .get_mut(id.0)
                .map(|o| o as &mut dyn Waitable),
            ObjRef::Semaphore(id) => self
                .objects
                .sems
                .get_mut(id.0)
                .map(|o| o as &mut dyn Waitable),
            ObjRef::Alarm(id) => self
                .objects
                .alarms
                .get_mut(id.0)
                .map(|o| o as &mut dyn Waitable),
            ObjRef::Process(id) => self
                .objects
                .processes
                .get_mut(id.0)
                .map(|o| o as &mut dyn Waitable),
            ObjRef::Thread(id) => self.threads.get_mut(id.0).map(|o| o as &mut dyn Waitable),
            ObjRef::Mailbox(id) => self
                .objects
                .mailboxes
                .get_mut(id.0)
                .map(|o| o as &mut dyn Waitable),
            ObjRef::Notify(id) => self
                .objects
                .notifies
                .get_mut(id.0)
                .map(|o| o as &mut dyn Waitable),
        }
    }

    pub fn is_signalled(&self, obj: ObjRef) -> bool {
        self.waitable(obj).is_some_and(|w| w.is_signalled())
    }

    pub fn consume(&mut self, obj: ObjRef) -> u32 {
        match self.waitable_mut(obj) {
            Some(w) => w.consume(),
            None => sched_fatal!("consume of missing object {:?}", obj),
        }
    }

    /// Turn a successful receive into the message it reserved
    fn deliver(&mut self, receive: Option<MailboxId>, result: ItemResult) -> ItemResult {
        let (Some(mailbox), Ok(_)) = (receive, result) else {
            return result;
        };
        match self
            .objects
            .mailboxes
            .get_mut(mailbox.0)
            .and_then(|m| m.take_reserved())
        {
            Some(msg) => Ok(ItemOutput::Message(msg)),
            None => sched_fatal!("mailbox {} satisfied a receive without a message", mailbox.0),
        }
    }

    fn waiters_of(&mut self, obj: ObjRef) -> &mut WaitEntryPrioList {
        match self.waitable_mut(obj) {
            Some(w) => w.waiters_mut(),
            None => sched_fatal!("wait entry mounted on missing object {:?}", obj),
        }
    }
}

// ============================================================================
// Wait Execution
// ============================================================================

impl<P: Platform> Kernel<P> {
    /// Start a wait for `thread`. Returns the result if the wait finished
    /// at once, or `None` if the thread is now blocked.
    pub(crate) fn exec_thread_wait(
        &self,
        st: &mut SchedState,
        me: CoreIndex,
        thread: ThreadId,
        req: &WaitRequest,
    ) -> Option<ItemResult> {
        self.exec_wait(st, me, thread, req, None)
    }

    /// Start a wait that takes a message from `mailbox` when satisfied
    pub(crate) fn exec_mbox_recv(
        &self,
        st: &mut SchedState,
        me: CoreIndex,
        thread: ThreadId,
        mailbox: MailboxId,
        timeout_ms: Option<u64>,
    ) -> Option<ItemResult> {
        let mut objects = HVec::new();
        let _ = objects.push(ObjRef::Mailbox(mailbox));
        let req = WaitRequest {
            objects,
            wait_all: false,
            timeout_ms,
        };
        self.exec_wait(st, me, thread, &req, Some(mailbox))
    }

    fn exec_wait(
        &self,
        st: &mut SchedState,
        me: CoreIndex,
        thread: ThreadId,
        req: &WaitRequest,
        receive: Option<MailboxId>,
    ) -> Option<ItemResult> {
        let objects = &req.objects;

        for (i, obj) in objects.iter().enumerate() {
            let foreign_mailbox = matches!(obj, ObjRef::Mailbox(m) if receive != Some(*m));
            if objects[..i].contains(obj) || *obj == ObjRef::Thread(thread) || foreign_mailbox {
                return Some(Err(KernError::BadArgument));
            }
            if st.waitable(*obj).is_none() {
                return Some(Err(KernError::NotFound));
            }
        }

        if objects.is_empty() {
            match req.timeout_ms {
                None => return Some(Err(KernError::BadArgument)),
                Some(0) => {
                    self.make_thread_inactive(st, me, thread, AfterStop::ReadyTail);
                    return Some(Ok(ItemOutput::None));
                }
                Some(_) => {}
            }
        } else {
            if let Some(result) = Self::wait_test(st, objects, req.wait_all) {
                counter!(self.counters.waits_immediate);
                return Some(st.deliver(receive, Ok(result)));
            }
            if req.timeout_ms == Some(0) {
                return Some(Err(KernError::Timeout));
            }
        }

        let start = self.platform.abs_time_ms();
        let prio = st.thread(thread).active_prio;

        let mut wait = MacroWait::new(thread, req.wait_all, start);
        wait.receive = receive;
        for (index, obj) in objects.iter().enumerate() {
            // Request length is bounded by the same capacity
            let _ = wait.entries.push(WaitEntry {
                index,
                sticky_pulse: false,
                obj: *obj,
            });
        }
        st.thread_mut(thread).wait = Some(wait);

        for (entry, obj) in objects.iter().enumerate() {
            st.waiters_of(*obj).insert(WaitLink {
                thread,
                entry,
                prio,
            });
        }

        if let Some(ms) = req.timeout_ms {
            if st.add_timer_item(TimerKey::Wait(thread), start, ms) {
                self.rearm_sched_timer(st);
            }
        }

        self.make_thread_inactive(st, me, thread, AfterStop::Waiting);
        counter!(self.counters.waits_blocked);
        debug!(
            target: "sched",
            "{} waits on {} object(s) all={} timeout={:?}",
            thread,
            objects.len(),
            req.wait_all,
            req.timeout_ms
        );
        None
    }

    /// Satisfy a wait from current object state alone, consuming what it uses
    fn wait_test(st: &mut SchedState, objects: &[ObjRef], wait_all: bool) -> Option<ItemOutput> {
        if wait_all {
            if !objects.iter().all(|o| st.is_signalled(*o)) {
                return None;
            }
            let mut flags = 0;
            for obj in objects {
                flags |= st.consume(*obj);
            }
            return Some(Self::wait_output(0, objects.iter().any(is_notify), flags));
        }
        let index = objects.iter().position(|o| st.is_signalled(*o))?;
        let flags = st.consume(objects[index]);
        Some(Self::wait_output(index, is_notify(&objects[index]), flags))
    }

    /// Output of a satisfied wait. Notify bits taken by the wait are
    /// reported with it; a wait-all reports the union.
    fn wait_output(index: usize, notified: bool, flags: u32) -> ItemOutput {
        if notified {
            ItemOutput::Notified {
                index: index as u32,
                flags,
            }
        } else {
            ItemOutput::Signalled(index as u32)
        }
    }

    /// Finish `thread`'s wait with `result` and make it ready
    pub(crate) fn end_thread_wait(
        &self,
        st: &mut SchedState,
        thread: ThreadId,
        result: ItemResult,
    ) {
        // The timer item lives in the wait, so unlink it first
        st.del_timer_item(TimerKey::Wait(thread));
        let Some(wait) = st.thread_mut(thread).wait.take() else {
            sched_fatal!("{} ended a wait it was not in", thread)
        };

        for e in wait.entries.iter() {
            let removed = st.waiters_of(e.obj).remove(thread, e.index);
            sched_assert!(removed, "{} wait entry {} not on {:?}", thread, e.index, e.obj);
        }

        let now = self.platform.abs_time_ms();
        let t = st.thread_mut(thread);
        t.last_wait_ms = now.saturating_sub(wait.started_ms);
        sched_assert!(
            t.run_state == RunState::Waiting,
            "{} ended a wait while {:?}",
            thread,
            t.run_state
        );
        let result = st.deliver(wait.receive, result);
        debug!(target: "sched", "{} wait done: {:?}", thread, result);

        self.post_result(thread, result);
        self.settle(st, thread, AfterStop::ReadyHead);
    }

    /// Complete `thread`'s wait if its objects now allow it
    pub(crate) fn try_satisfy_wait(&self, st: &mut SchedState, thread: ThreadId) -> bool {
        let Some(wait) = st.thread(thread).wait.as_ref() else {
            return false;
        };
        let wait_all = wait.wait_all;
        let entries: HVec<WaitEntry, MAX_WAIT_ENTRIES> = wait.entries.clone();
        let ready = |e: &WaitEntry| e.sticky_pulse || st.is_signalled(e.obj);

        if wait_all {
            if !entries.iter().all(ready) {
                return false;
            }
            let mut flags = 0;
            for e in entries.iter().filter(|e| !e.sticky_pulse) {
                flags |= st.consume(e.obj);
            }
            let notified = entries.iter().any(|e| is_notify(&e.obj));
            self.end_thread_wait(st, thread, Ok(Self::wait_output(0, notified, flags)));
        } else {
            let Some(e) = entries.iter().find(|e| ready(*e)).copied() else {
                return false;
            };
            let flags = if e.sticky_pulse { 0 } else { st.consume(e.obj) };
            let output = Self::wait_output(e.index, is_notify(&e.obj), flags);
            self.end_thread_wait(st, thread, Ok(output));
        }
        true
    }

    /// Give the waiters of `obj` a chance after it changed
    pub(crate) fn satisfy_waiters(&self, st: &mut SchedState, obj: ObjRef, mode: SatisfyMode) {
        let links = match st.waitable(obj) {
            Some(w) => w.waiters().snapshot(),
            None => return,
        };

        for link in links {
            match mode {
                SatisfyMode::Consume => {
                    if !st.is_signalled(obj) {
                        break;
                    }
                    self.try_satisfy_wait(st, link.thread);
                }
                SatisfyMode::PulseOne | SatisfyMode::PulseAll => {
                    if let Some(e) = st
                        .thread_mut(link.thread)
                        .wait
                        .as_mut()
                        .and_then(|w| w.entries.get_mut(link.entry))
                    {
                        e.sticky_pulse = true;
                    }
                    let done = self.try_satisfy_wait(st, link.thread);
                    if done && mode == SatisfyMode::PulseOne {
                        break;
                    }
                }
            }
        }
    }
}
