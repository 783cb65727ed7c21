//! Waitable kernel objects
//!
//! Events, semaphores, alarms, processes, mailboxes and notifies, plus
//! kernel critical sections. Their state is owned by the scheduler and only changed by
//! scheduler items, so every object change and the waits it satisfies
//! happen in one serialized step.

use alloc::collections::VecDeque;

use crate::kern::config::{MAX_MAILBOX_SLOTS, MSG_ARGS};
use crate::kern::slab::Slab;
use crate::kern::status::{KernError, KernResult};
use crate::kern::timer::TimerItem;
use crate::kern::wait::{WaitEntryPrioList, Waitable};
use crate::types::ThreadId;

/// Objects of each kind a kernel may hold at once
pub const MAX_OBJECTS_PER_KIND: u32 = 1024;

// ============================================================================
// Event
// ============================================================================

#[derive(Debug)]
pub struct EventObj {
    pub manual_reset: bool,
    pub signalled: bool,
    pub waiters: WaitEntryPrioList,
}

impl EventObj {
    pub fn new(manual_reset: bool, signalled: bool) -> Self {
        Self {
            manual_reset,
            signalled,
            waiters: WaitEntryPrioList::new(),
        }
    }
}

impl Waitable for EventObj {
    fn is_signalled(&self) -> bool {
        self.signalled
    }

    fn consume(&mut self) -> u32 {
        if !self.manual_reset {
            self.signalled = false;
        }
        0
    }

    fn waiters(&self) -> &WaitEntryPrioList {
        &self.waiters
    }

    fn waiters_mut(&mut self) -> &mut WaitEntryPrioList {
        &mut self.waiters
    }
}

// ============================================================================
// Semaphore
// ============================================================================

#[derive(Debug)]
pub struct SemObj {
    pub count: u32,
    pub max: u32,
    pub waiters: WaitEntryPrioList,
}

impl SemObj {
    pub fn new(initial: u32, max: u32) -> KernResult<Self> {
        if max == 0 || initial > max {
            return Err(KernError::BadArgument);
        }
        Ok(Self {
            count: initial,
            max,
            waiters: WaitEntryPrioList::new(),
        })
    }

    /// Add `count`, returning the count before the release
    pub fn release(&mut self, count: u32) -> KernResult<u32> {
        if count == 0 {
            return Err(KernError::BadArgument);
        }
        let prev = self.count;
        match prev.checked_add(count) {
            Some(next) if next <= self.max => {
                self.count = next;
                Ok(prev)
            }
            _ => Err(KernError::LimitExceeded),
        }
    }
}

impl Waitable for SemObj {
    fn is_signalled(&self) -> bool {
        self.count > 0
    }

    fn consume(&mut self) -> u32 {
        sched_assert!(self.count > 0, "semaphore consumed at count zero");
        self.count -= 1;
        0
    }

    fn waiters(&self) -> &WaitEntryPrioList {
        &self.waiters
    }

    fn waiters_mut(&mut self) -> &mut WaitEntryPrioList {
        &mut self.waiters
    }
}

// ============================================================================
// Alarm
// ============================================================================

#[derive(Debug)]
pub struct AlarmObj {
    pub period_ms: u64,
    pub periodic: bool,
    pub signalled: bool,
    pub timer: TimerItem,
    pub waiters: WaitEntryPrioList,
}

impl AlarmObj {
    pub fn new(period_ms: u64, periodic: bool) -> KernResult<Self> {
        if period_ms == 0 {
            return Err(KernError::BadArgument);
        }
        Ok(Self {
            period_ms,
            periodic,
            signalled: false,
            timer: TimerItem::new(),
            waiters: WaitEntryPrioList::new(),
        })
    }
}

impl Waitable for AlarmObj {
    fn is_signalled(&self) -> bool {
        self.signalled
    }

    fn consume(&mut self) -> u32 {
        // One-shot alarms stay signalled once fired
        if self.periodic {
            self.signalled = false;
        }
        0
    }

    fn waiters(&self) -> &WaitEntryPrioList {
        &self.waiters
    }

    fn waiters_mut(&mut self) -> &mut WaitEntryPrioList {
        &mut self.waiters
    }
}

// ============================================================================
// Process
// ============================================================================

#[derive(Debug)]
pub struct ProcessObj {
    pub live_threads: u32,
    pub exited: bool,
    pub waiters: WaitEntryPrioList,
}

impl ProcessObj {
    pub fn new() -> Self {
        Self {
            live_threads: 0,
            exited: false,
            waiters: WaitEntryPrioList::new(),
        }
    }
}

impl Waitable for ProcessObj {
    fn is_signalled(&self) -> bool {
        self.exited
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

// ============================================================================
// Mailbox
// ============================================================================

/// What a mailbox carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Message {
    pub code: u32,
    pub args: [u32; MSG_ARGS],
}

impl Message {
    pub const fn new(code: u32, args: [u32; MSG_ARGS]) -> Self {
        Self { code, args }
    }
}

/// Bounded FIFO of messages. A receiver's wait is satisfied by reserving
/// the oldest unreserved message, which it then takes when it wakes.
#[derive(Debug)]
pub struct MailboxObj {
    pub queue: VecDeque<Message>,
    pub capacity: usize,
    /// Queued messages promised to satisfied receivers
    pub reserved: usize,
    pub waiters: WaitEntryPrioList,
}

impl MailboxObj {
    pub fn new(capacity: u32) -> KernResult<Self> {
        if capacity == 0 || capacity > MAX_MAILBOX_SLOTS {
            return Err(KernError::BadArgument);
        }
        Ok(Self {
            queue: VecDeque::with_capacity(capacity as usize),
            capacity: capacity as usize,
            reserved: 0,
            waiters: WaitEntryPrioList::new(),
        })
    }

    pub fn send(&mut self, msg: Message) -> KernResult<()> {
        if self.queue.len() >= self.capacity {
            return Err(KernError::OutOfResources);
        }
        self.queue.push_back(msg);
        Ok(())
    }

    /// Hand the oldest reserved message to its receiver
    pub fn take_reserved(&mut self) -> Option<Message> {
        if self.reserved == 0 {
            return None;
        }
        self.reserved -= 1;
        self.queue.pop_front()
    }
}

impl Waitable for MailboxObj {
    fn is_signalled(&self) -> bool {
        self.queue.len() > self.reserved
    }

    fn consume(&mut self) -> u32 {
        sched_assert!(self.is_signalled(), "mailbox consumed with nothing unreserved");
        self.reserved += 1;
        0
    }

    fn waiters(&self) -> &WaitEntryPrioList {
        &self.waiters
    }

    fn waiters_mut(&mut self) -> &mut WaitEntryPrioList {
        &mut self.waiters
    }
}

// ============================================================================
// Notify
// ============================================================================

/// Latches flag bits until one waiter takes them all
#[derive(Debug, Default)]
pub struct NotifyObj {
    pub latched: u32,
    pub waiters: WaitEntryPrioList,
}

impl Waitable for NotifyObj {
    fn is_signalled(&self) -> bool {
        self.latched != 0
    }

    fn consume(&mut self) -> u32 {
        core::mem::take(&mut self.latched)
    }

    fn waiters(&self) -> &WaitEntryPrioList {
        &self.waiters
    }

    fn waiters_mut(&mut self) -> &mut WaitEntryPrioList {
        &mut self.waiters
    }
}

// ============================================================================
// Critical Section
// ============================================================================

/// Kernel critical section: recursive, FIFO hand-off to blocked threads
#[derive(Debug, Default)]
pub struct CritSecObj {
    pub owner: Option<ThreadId>,
    pub recursion: u32,
    pub blocked: VecDeque<ThreadId>,
}

// ============================================================================
// Object Table
// ============================================================================

/// Every non-thread object the scheduler owns
#[derive(Debug)]
pub struct ObjectTable {
    pub events: Slab<EventObj>,
    pub sems: Slab<SemObj>,
    pub alarms: Slab<AlarmObj>,
    pub processes: Slab<ProcessObj>,
    pub mailboxes: Slab<MailboxObj>,
    pub notifies: Slab<NotifyObj>,
    pub critsecs: Slab<CritSecObj>,
}

impl ObjectTable {
    pub fn new() -> Self {
        Self {
            events: Slab::with_capacity(MAX_OBJECTS_PER_KIND),
            sems: Slab::with_capacity(MAX_OBJECTS_PER_KIND),
            alarms: Slab::with_capacity(MAX_OBJECTS_PER_KIND),
            processes: Slab::with_capacity(MAX_OBJECTS_PER_KIND),
            mailboxes: Slab::with_capacity(MAX_OBJECTS_PER_KIND),
            notifies: Slab::with_capacity(MAX_OBJECTS_PER_KIND),
            critsecs: Slab::with_capacity(MAX_OBJECTS_PER_KIND),
        }
    }
}
